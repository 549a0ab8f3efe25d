//! Error types for the message transport.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open broker at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Broker storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Exchange '{0}' is not declared")]
    UnknownExchange(String),

    #[error("Delivery {id} is no longer held by this consumer")]
    StaleLease { id: i64 },
}

pub type TransportResult<T> = Result<T, TransportError>;
