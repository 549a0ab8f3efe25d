use std::sync::Arc;

use thiserror::Error;

use super::MessageBroker;
use super::error::TransportError;
use super::wire::{self, WireError};
use crate::metrics::Metrics;
use crate::types::FileRecord;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize record for {path}: {source}")]
    Serialize { path: String, source: WireError },

    #[error("Broker rejected record for {path}: {source}")]
    PublishFailed {
        path: String,
        source: TransportError,
    },
}

/// Broker confirmation for one published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Queues that durably stored a copy.
    pub routed: usize,
}

/// Serializes records and submits them to one exchange.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn MessageBroker>,
    exchange: String,
    metrics: Option<Arc<Metrics>>,
}

impl Publisher {
    pub fn new(broker: Arc<dyn MessageBroker>, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publish one record. `Ok` means the broker committed it.
    pub fn publish(&self, record: FileRecord) -> Result<Ack, PublishError> {
        let result = self.try_publish(&record);
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => metrics.record_published(),
                Err(_) => metrics.record_publish_failure(),
            }
        }
        result
    }

    fn try_publish(&self, record: &FileRecord) -> Result<Ack, PublishError> {
        let path = record.path().display().to_string();
        let payload = wire::encode(record).map_err(|source| PublishError::Serialize {
            path: path.clone(),
            source,
        })?;

        let receipt = self
            .broker
            .publish(&self.exchange, &payload)
            .map_err(|source| PublishError::PublishFailed {
                path: path.clone(),
                source,
            })?;

        if receipt.routed == 0 {
            tracing::warn!(
                "[publisher] no queue bound to '{}', {path} was not stored",
                self.exchange
            );
        } else {
            crate::debug_event!(
                "publisher",
                "published",
                "{} {path} -> {} queue(s)",
                record.event_kind(),
                receipt.routed
            );
        }

        Ok(Ack {
            routed: receipt.routed,
        })
    }
}
