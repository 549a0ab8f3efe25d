//! Error types for the graph store.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Failed to open graph store at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Graph storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Corrupt node {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// A merge did not commit. Nothing was written, so retrying is safe.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Merge failed for {path}: {source}")]
    MergeFailed { path: PathBuf, source: GraphError },
}

pub type GraphResult<T> = Result<T, GraphError>;
