//! Path to [`FileRecord`]: stat, hash, neighbors.

use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::error::{ProspectError, ProspectResult};
use super::hash::HashEngine;
use super::neighbors::NeighborResolver;
use crate::metrics::Metrics;
use crate::types::{EventKind, FileRecord, FileTimes};

/// Builds one immutable record per call. Reads files, writes nothing.
#[derive(Debug, Clone, Default)]
pub struct Prospector {
    engine: HashEngine,
    resolver: NeighborResolver,
    metrics: Option<Arc<Metrics>>,
}

impl Prospector {
    pub fn new(engine: HashEngine, resolver: NeighborResolver) -> Self {
        Self {
            engine,
            resolver,
            metrics: None,
        }
    }

    /// Report hash timings to a shared sink.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn prospect(&self, path: &Path, event_kind: EventKind) -> ProspectResult<FileRecord> {
        let detected_at = Utc::now();
        let path = absolute(path)?;

        let metadata = fs::metadata(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ProspectError::NotFound { path: path.clone() }
            } else {
                ProspectError::Stat {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        if !metadata.is_file() {
            return Err(ProspectError::NotRegularFile { path });
        }

        let started = Instant::now();
        let hashes = self.engine.hash_file(&path).map_err(|source| {
            if source.is_not_found() {
                ProspectError::NotFound { path: path.clone() }
            } else {
                ProspectError::ProspectFailed {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        if let Some(metrics) = &self.metrics {
            metrics.record_hash(started.elapsed(), hashes.size_bytes);
        }

        let neighbors = self.resolver.resolve(&path);

        Ok(FileRecord::new(
            path,
            event_kind,
            hashes,
            file_times(&metadata),
            detected_at,
            neighbors,
        )?)
    }
}

fn absolute(path: &Path) -> ProspectResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::path::absolute(path).map_err(|source| ProspectError::Stat {
        path: path.to_path_buf(),
        source,
    })
}

fn file_times(metadata: &Metadata) -> FileTimes {
    FileTimes {
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        accessed: metadata.accessed().ok().map(DateTime::<Utc>::from),
        changed: changed_time(metadata),
    }
}

#[cfg(unix)]
fn changed_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;
    DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32)
}

#[cfg(not(unix))]
fn changed_time(_metadata: &Metadata) -> Option<DateTime<Utc>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    #[test]
    fn test_prospect_builds_full_record() {
        let temp = TempDir::new().unwrap();
        let track = temp.path().join("track.flac");
        let data = vec![42u8; 1000];
        fs::write(&track, &data).unwrap();
        fs::write(temp.path().join("track.cue"), b"FILE track.flac").unwrap();

        let metrics = Arc::new(Metrics::new());
        let record = Prospector::default()
            .with_metrics(metrics.clone())
            .prospect(&track, EventKind::Created)
            .unwrap();

        assert_eq!(record.path(), track.as_path());
        assert_eq!(record.event_kind(), EventKind::Created);
        assert_eq!(record.size_bytes(), 1000);
        let expected: [u8; 32] = Sha256::digest(&data).into();
        assert_eq!(record.hashes().sha256, expected);
        assert_eq!(record.neighbors(), &[temp.path().join("track.cue")]);
        assert!(record.times().modified.is_some());
        assert_eq!(metrics.snapshot().bytes_hashed, 1000);
    }

    #[test]
    fn test_prospect_missing_path() {
        let temp = TempDir::new().unwrap();
        let err = Prospector::default()
            .prospect(&temp.path().join("gone.flac"), EventKind::Created)
            .unwrap_err();
        assert!(matches!(err, ProspectError::NotFound { .. }));
        assert!(err.is_benign());
    }

    #[test]
    fn test_prospect_directory() {
        let temp = TempDir::new().unwrap();
        let err = Prospector::default()
            .prospect(temp.path(), EventKind::MovedIn)
            .unwrap_err();
        assert!(matches!(err, ProspectError::NotRegularFile { .. }));
    }

    #[test]
    fn test_prospect_empty_file() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty.wav");
        fs::write(&empty, b"").unwrap();

        let record = Prospector::default()
            .prospect(&empty, EventKind::WriteFinished)
            .unwrap();
        assert_eq!(record.size_bytes(), 0);
        assert_eq!(
            record.hashes().sha256_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(record.neighbors().is_empty());
    }
}
