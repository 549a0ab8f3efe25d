use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the number of neighbors carried by one record.
pub const MAX_NEIGHBORS: usize = 10;

/// The filesystem event that produced a record.
///
/// Serialized with the inotify mask names the wire schema uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "IN_CREATE")]
    Created,
    #[serde(rename = "IN_MOVED_TO")]
    MovedIn,
    #[serde(rename = "IN_CLOSE_WRITE")]
    WriteFinished,
}

impl EventKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventKind::Created => "IN_CREATE",
            EventKind::MovedIn => "IN_MOVED_TO",
            EventKind::WriteFinished => "IN_CLOSE_WRITE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for EventKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_CREATE" => Ok(EventKind::Created),
            "IN_MOVED_TO" => Ok(EventKind::MovedIn),
            "IN_CLOSE_WRITE" => Ok(EventKind::WriteFinished),
            other => Err(RecordError::UnknownEventKind(other.to_string())),
        }
    }
}

/// Digest pair and byte count produced by one hashing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHashes {
    pub sha256: [u8; 32],
    pub xxh128: u128,
    pub size_bytes: u64,
}

impl ContentHashes {
    /// Lowercase hex, 64 characters.
    pub fn sha256_hex(&self) -> String {
        self.sha256.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Lowercase hex, 32 characters, big-endian.
    pub fn xxh128_hex(&self) -> String {
        format!("{:032x}", self.xxh128)
    }

    /// Rebuild from the hex forms carried on the wire.
    pub fn from_hex(sha256: &str, xxh128: &str, size_bytes: u64) -> Result<Self, RecordError> {
        if sha256.len() != 64 || !is_hex(sha256) {
            return Err(RecordError::InvalidDigest {
                field: "sha256_hash",
                value: sha256.to_string(),
            });
        }
        let mut strong = [0u8; 32];
        for (i, byte) in strong.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&sha256[i * 2..i * 2 + 2], 16).map_err(|_| {
                RecordError::InvalidDigest {
                    field: "sha256_hash",
                    value: sha256.to_string(),
                }
            })?;
        }

        if xxh128.len() != 32 || !is_hex(xxh128) {
            return Err(RecordError::InvalidDigest {
                field: "xxh128_hash",
                value: xxh128.to_string(),
            });
        }
        let fast = u128::from_str_radix(xxh128, 16).map_err(|_| RecordError::InvalidDigest {
            field: "xxh128_hash",
            value: xxh128.to_string(),
        })?;

        Ok(Self {
            sha256: strong,
            xxh128: fast,
            size_bytes,
        })
    }
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Filesystem timestamps. Any of them may be missing depending on the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub changed: Option<DateTime<Utc>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record path is empty")]
    EmptyPath,

    #[error("Record path is not absolute: {0}")]
    RelativePath(PathBuf),

    #[error("Record lists {count} neighbors, at most {max} are allowed", max = MAX_NEIGHBORS)]
    TooManyNeighbors { count: usize },

    #[error("Unknown event type: {0}")]
    UnknownEventKind(String),

    #[error("Invalid {field}: {value}")]
    InvalidDigest { field: &'static str, value: String },
}

/// Immutable description of one detected file event.
///
/// Construction normalizes the neighbor list: duplicates and the record's
/// own path are dropped and the list is cut to [`MAX_NEIGHBORS`], keeping
/// the ranking order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    path: PathBuf,
    event_kind: EventKind,
    hashes: ContentHashes,
    times: FileTimes,
    detected_at: DateTime<Utc>,
    neighbors: Vec<PathBuf>,
}

impl FileRecord {
    pub fn new(
        path: impl Into<PathBuf>,
        event_kind: EventKind,
        hashes: ContentHashes,
        times: FileTimes,
        detected_at: DateTime<Utc>,
        neighbors: Vec<PathBuf>,
    ) -> Result<Self, RecordError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(RecordError::EmptyPath);
        }
        if !path.is_absolute() {
            return Err(RecordError::RelativePath(path));
        }

        let mut ranked: Vec<PathBuf> = Vec::with_capacity(neighbors.len().min(MAX_NEIGHBORS));
        for neighbor in neighbors {
            if ranked.len() == MAX_NEIGHBORS {
                break;
            }
            if neighbor == path || neighbor.as_os_str().is_empty() || ranked.contains(&neighbor) {
                continue;
            }
            ranked.push(neighbor);
        }

        Ok(Self {
            path,
            event_kind,
            hashes,
            times,
            detected_at,
            neighbors: ranked,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    pub fn hashes(&self) -> &ContentHashes {
        &self.hashes
    }

    pub fn size_bytes(&self) -> u64 {
        self.hashes.size_bytes
    }

    pub fn times(&self) -> &FileTimes {
        &self.times
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Related files, most related first.
    pub fn neighbors(&self) -> &[PathBuf] {
        &self.neighbors
    }
}
