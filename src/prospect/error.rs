//! Error types for turning a path into a record.

use std::path::PathBuf;
use thiserror::Error;

use super::hash::HashError;
use crate::types::RecordError;

/// Errors from [`Prospector::prospect`](super::Prospector::prospect).
///
/// All of them are local to one path. Callers drop the event; a later
/// filesystem event for the same path starts a fresh attempt.
#[derive(Error, Debug)]
pub enum ProspectError {
    #[error("Path vanished before it could be read: {path}")]
    NotFound { path: PathBuf },

    #[error("Not a regular file: {path}")]
    NotRegularFile { path: PathBuf },

    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Prospect failed for {path}: {source}")]
    ProspectFailed { path: PathBuf, source: HashError },

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
}

impl ProspectError {
    /// Errors that mean "nothing to record" rather than a fault.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ProspectError::NotFound { .. } | ProspectError::NotRegularFile { .. }
        )
    }
}

pub type ProspectResult<T> = Result<T, ProspectError>;
