//! Durable at-least-once transport between the watcher and graph writers.
//!
//! Publishers hand serialized records to a fan-out exchange; every queue
//! bound to it gets its own persistent copy. Consumers lease one message at
//! a time and delete it with [`MessageBroker::ack`]. A lease that is not
//! acknowledged before the redelivery timeout makes the message available
//! again, possibly to another consumer.

mod consumer;
mod error;
mod publisher;
mod sqlite;
pub mod wire;

pub use consumer::{ConsumeError, ConsumeSummary, Consumer, Outcome};
pub use error::{TransportError, TransportResult};
pub use publisher::{Ack, PublishError, Publisher};
pub use sqlite::{BrokerOptions, QueueStats, SqliteBroker};

/// A message leased to one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    pub queue: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery; doubles as the lease token.
    pub delivery_count: u32,
}

/// What the broker did with a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Number of queues that received a copy.
    pub routed: usize,
}

/// Operations the pipeline needs from a broker.
///
/// Every call is blocking and durable: a successful `publish` has been
/// committed to storage before it returns.
pub trait MessageBroker: Send + Sync {
    fn publish(&self, exchange: &str, payload: &[u8]) -> TransportResult<PublishReceipt>;

    /// Lease the oldest available message on `queue`, if any.
    fn receive(&self, queue: &str) -> TransportResult<Option<Delivery>>;

    /// Remove a leased message for good.
    fn ack(&self, delivery: &Delivery) -> TransportResult<()>;

    /// Give a lease back so the message is offered again at once.
    ///
    /// Released deliveries do not count toward dead-lettering; use it for
    /// messages that failed for reasons outside the message itself.
    fn release(&self, delivery: &Delivery) -> TransportResult<()>;
}
