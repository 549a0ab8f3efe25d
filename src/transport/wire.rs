//! JSON wire schema carried between publisher and consumers.
//!
//! One object per message. Field names and the `event_type` values are
//! fixed by the consumers already reading the exchange, so they do not
//! follow Rust naming.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ContentHashes, EventKind, FileRecord, FileTimes, MAX_NEIGHBORS, RecordError};

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp in {field}: {value}")]
    Timestamp { field: &'static str, value: String },

    #[error("Invalid record: {0}")]
    Record(#[from] RecordError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub file_path: String,
    pub event_type: EventKind,
    pub sha256_hash: String,
    pub xxh128_hash: String,
    pub size: u64,
    pub modified_time: Option<String>,
    pub accessed_time: Option<String>,
    pub changed_time: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub neighbors: Vec<String>,
}

impl From<&FileRecord> for WireRecord {
    fn from(record: &FileRecord) -> Self {
        let times = record.times();
        Self {
            file_path: record.path().to_string_lossy().into_owned(),
            event_type: record.event_kind(),
            sha256_hash: record.hashes().sha256_hex(),
            xxh128_hash: record.hashes().xxh128_hex(),
            size: record.size_bytes(),
            modified_time: times.modified.map(format_time),
            accessed_time: times.accessed.map(format_time),
            changed_time: times.changed.map(format_time),
            timestamp: format_time(record.detected_at()),
            neighbors: record
                .neighbors()
                .iter()
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

impl TryFrom<WireRecord> for FileRecord {
    type Error = WireError;

    fn try_from(wire: WireRecord) -> Result<Self, Self::Error> {
        if wire.neighbors.len() > MAX_NEIGHBORS {
            return Err(RecordError::TooManyNeighbors {
                count: wire.neighbors.len(),
            }
            .into());
        }

        let hashes = ContentHashes::from_hex(&wire.sha256_hash, &wire.xxh128_hash, wire.size)?;
        let times = FileTimes {
            modified: parse_optional("modified_time", wire.modified_time.as_deref())?,
            accessed: parse_optional("accessed_time", wire.accessed_time.as_deref())?,
            changed: parse_optional("changed_time", wire.changed_time.as_deref())?,
        };
        let detected_at = parse_time("timestamp", &wire.timestamp)?;

        Ok(FileRecord::new(
            PathBuf::from(wire.file_path),
            wire.event_type,
            hashes,
            times,
            detected_at,
            wire.neighbors.into_iter().map(PathBuf::from).collect(),
        )?)
    }
}

/// Serialize a record into one JSON message body.
pub fn encode(record: &FileRecord) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(&WireRecord::from(record))?)
}

/// Parse and validate one JSON message body.
pub fn decode(payload: &[u8]) -> Result<FileRecord, WireError> {
    let wire: WireRecord = serde_json::from_slice(payload)?;
    FileRecord::try_from(wire)
}

/// Timestamp text used on the wire and in the graph store.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// RFC 3339 with any offset, or a naive ISO-8601 timestamp taken as UTC.
fn parse_time(field: &'static str, value: &str) -> Result<DateTime<Utc>, WireError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| WireError::Timestamp {
            field,
            value: value.to_string(),
        })
}

fn parse_optional(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, WireError> {
    value.map(|v| parse_time(field, v)).transpose()
}
