//! Pull consumer that feeds the graph writer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::error::TransportError;
use super::wire::{self, WireError};
use super::{Delivery, MessageBroker};
use crate::graph::{GraphWriter, MergeError};
use crate::metrics::Metrics;

/// Longest pause between attempts while the broker keeps failing.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("Malformed message {id} (delivery {delivery_count}): {source}")]
    MalformedMessage {
        id: i64,
        delivery_count: u32,
        source: WireError,
    },

    #[error("Message {id} not merged: {source}")]
    MergeFailed { id: i64, source: MergeError },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing available on the queue.
    Idle,
    /// Merged and acknowledged.
    Merged { path: PathBuf, delivery_count: u32 },
    /// Merged, but the lease ran out first; the broker has already handed
    /// the message to someone else, whose merge is a no-op.
    LeaseExpired { path: PathBuf, delivery_count: u32 },
}

/// Totals for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub merged: u64,
    pub malformed: u64,
    pub merge_failures: u64,
    pub transport_errors: u64,
    /// Merged after the lease ran out; counted in `merged` as well.
    pub expired_leases: u64,
}

/// Consumes one queue, one message at a time.
///
/// A message is acknowledged only after the graph writer committed it.
/// Malformed payloads stay leased until the lease runs out and count toward
/// dead-lettering. Failed merges are released back to the queue without
/// counting, so a store outage never dead-letters a record.
pub struct Consumer {
    broker: Arc<dyn MessageBroker>,
    queue: String,
    writer: GraphWriter,
    poll_interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl Consumer {
    pub fn new(broker: Arc<dyn MessageBroker>, queue: impl Into<String>, writer: GraphWriter) -> Self {
        Self {
            broker,
            queue: queue.into(),
            writer,
            poll_interval: Duration::from_millis(250),
            metrics: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Receive, merge and acknowledge at most one message.
    pub fn poll_once(&self) -> Result<Outcome, ConsumeError> {
        let Some(delivery) = self.broker.receive(&self.queue)? else {
            return Ok(Outcome::Idle);
        };
        self.handle(delivery)
    }

    fn handle(&self, delivery: Delivery) -> Result<Outcome, ConsumeError> {
        let record = match wire::decode(&delivery.payload) {
            Ok(record) => record,
            Err(source) => {
                self.count(Metrics::record_malformed);
                return Err(ConsumeError::MalformedMessage {
                    id: delivery.id,
                    delivery_count: delivery.delivery_count,
                    source,
                });
            }
        };

        if let Err(source) = self.writer.merge(&record) {
            self.count(Metrics::record_merge_failure);
            if let Err(e) = self.broker.release(&delivery) {
                tracing::warn!(
                    "[consumer] could not release message {}, waiting for lease expiry: {e}",
                    delivery.id
                );
            }
            return Err(ConsumeError::MergeFailed {
                id: delivery.id,
                source,
            });
        }
        self.count(Metrics::record_merged);

        let path = record.path().to_path_buf();
        let delivery_count = delivery.delivery_count;
        match self.broker.ack(&delivery) {
            Ok(()) => Ok(Outcome::Merged {
                path,
                delivery_count,
            }),
            Err(TransportError::StaleLease { id }) => {
                crate::debug_event!(
                    "consumer",
                    "lease expired before ack",
                    "message {id} for {} redelivered elsewhere",
                    path.display()
                );
                Ok(Outcome::LeaseExpired {
                    path,
                    delivery_count,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Poll until `shutdown` fires, sleeping `poll_interval` when the queue
    /// is empty. With `drain`, return as soon as the queue is empty instead.
    ///
    /// Blocking; run it on a dedicated thread.
    pub fn run(&self, shutdown: &CancellationToken, drain: bool) -> ConsumeSummary {
        let mut summary = ConsumeSummary::default();
        let mut backoff = self.poll_interval;

        crate::log_event!("consumer", "started", "queue '{}'", self.queue);

        while !shutdown.is_cancelled() {
            match self.poll_once() {
                Ok(Outcome::Merged {
                    path,
                    delivery_count,
                }) => {
                    summary.merged += 1;
                    backoff = self.poll_interval;
                    if delivery_count > 1 {
                        crate::log_event!(
                            "consumer",
                            "merged redelivery",
                            "{} (delivery {delivery_count})",
                            path.display()
                        );
                    } else {
                        crate::debug_event!("consumer", "merged", "{}", path.display());
                    }
                }
                Ok(Outcome::LeaseExpired { .. }) => {
                    summary.merged += 1;
                    summary.expired_leases += 1;
                    backoff = self.poll_interval;
                }
                Ok(Outcome::Idle) => {
                    if drain {
                        break;
                    }
                    std::thread::sleep(self.poll_interval);
                }
                Err(e @ ConsumeError::MalformedMessage { .. }) => {
                    summary.malformed += 1;
                    tracing::warn!("[consumer] {e}");
                }
                Err(e @ ConsumeError::MergeFailed { .. }) => {
                    summary.merge_failures += 1;
                    tracing::error!("[consumer] {e}; retrying in {backoff:?}");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(ConsumeError::Transport(e)) => {
                    summary.transport_errors += 1;
                    tracing::error!("[consumer] broker error, retrying in {backoff:?}: {e}");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        crate::log_event!(
            "consumer",
            "stopped",
            "merged={} malformed={} merge_failures={}",
            summary.merged,
            summary.malformed,
            summary.merge_failures
        );
        summary
    }

    fn count(&self, record: fn(&Metrics)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }
}
