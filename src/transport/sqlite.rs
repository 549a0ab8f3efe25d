//! SQLite-backed durable broker.
//!
//! Every queue bound to an exchange receives its own copy of each published
//! message. A delivery is a lease: the message is hidden until
//! `leased_until` passes, after which the next `receive` offers it again.
//! Messages offered `max_deliveries` times without an ack move to
//! `dead_letters`.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::error::{TransportError, TransportResult};
use super::{Delivery, MessageBroker, PublishReceipt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    /// How long a delivery stays leased before it is offered again.
    pub redelivery_timeout: Duration,
    /// Deliveries after which an unacked message is dead-lettered.
    pub max_deliveries: u32,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            redelivery_timeout: Duration::from_secs(30),
            max_deliveries: 5,
        }
    }
}

/// Per-queue message counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: String,
    pub ready: u64,
    pub leased: u64,
    pub dead: u64,
}

pub struct SqliteBroker {
    conn: Mutex<Connection>,
    options: BrokerOptions,
}

impl std::fmt::Debug for SqliteBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBroker")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SqliteBroker {
    /// Open (or create) a broker database file.
    pub fn open(path: impl AsRef<Path>, options: BrokerOptions) -> TransportResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TransportError::Open {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| TransportError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::with_connection(conn, options)
    }

    /// Create an in-memory broker (for testing)
    pub fn open_in_memory(options: BrokerOptions) -> TransportResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, options)
    }

    fn with_connection(conn: Connection, options: BrokerOptions) -> TransportResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        // Returns the resulting mode ("memory" for in-memory databases).
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;

        let broker = Self {
            conn: Mutex::new(conn),
            options,
        };
        broker.init_schema()?;
        Ok(broker)
    }

    fn init_schema(&self) -> TransportResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exchanges (
                name TEXT PRIMARY KEY,
                kind TEXT NOT NULL DEFAULT 'fanout'
            );

            CREATE TABLE IF NOT EXISTS bindings (
                exchange TEXT NOT NULL REFERENCES exchanges(name),
                queue TEXT NOT NULL,
                PRIMARY KEY (exchange, queue)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                payload BLOB NOT NULL,
                published_at INTEGER NOT NULL,
                delivery_count INTEGER NOT NULL DEFAULT 0,
                released INTEGER NOT NULL DEFAULT 0,
                leased_until INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_messages_queue ON messages(queue, id);

            CREATE TABLE IF NOT EXISTS dead_letters (
                id INTEGER PRIMARY KEY,
                queue TEXT NOT NULL,
                payload BLOB NOT NULL,
                published_at INTEGER NOT NULL,
                delivery_count INTEGER NOT NULL,
                dead_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    /// Declare a durable fan-out exchange. Declaring twice is a no-op.
    pub fn declare_exchange(&self, name: &str) -> TransportResult<()> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO exchanges (name) VALUES (?1)",
            params![name],
        )?;
        Ok(())
    }

    /// Declare `queue` and bind it to `exchange`. Binding twice is a no-op.
    pub fn bind_queue(&self, exchange: &str, queue: &str) -> TransportResult<()> {
        let conn = self.conn.lock();
        if !exchange_exists(&conn, exchange)? {
            return Err(TransportError::UnknownExchange(exchange.to_string()));
        }
        conn.execute(
            "INSERT OR IGNORE INTO bindings (exchange, queue) VALUES (?1, ?2)",
            params![exchange, queue],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> TransportResult<Vec<QueueStats>> {
        let conn = self.conn.lock();
        let now = now_millis();
        let mut stmt = conn.prepare(
            "SELECT q.queue,
                (SELECT COUNT(*) FROM messages m
                  WHERE m.queue = q.queue AND (m.leased_until IS NULL OR m.leased_until <= ?1)),
                (SELECT COUNT(*) FROM messages m
                  WHERE m.queue = q.queue AND m.leased_until > ?1),
                (SELECT COUNT(*) FROM dead_letters d WHERE d.queue = q.queue)
             FROM (SELECT queue FROM bindings
                   UNION SELECT queue FROM messages
                   UNION SELECT queue FROM dead_letters) q
             ORDER BY q.queue",
        )?;
        let rows = stmt.query_map(params![now], |row| {
            Ok(QueueStats {
                queue: row.get(0)?,
                ready: row.get::<_, i64>(1)? as u64,
                leased: row.get::<_, i64>(2)? as u64,
                dead: row.get::<_, i64>(3)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl MessageBroker for SqliteBroker {
    fn publish(&self, exchange: &str, payload: &[u8]) -> TransportResult<PublishReceipt> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !exchange_exists(&tx, exchange)? {
            return Err(TransportError::UnknownExchange(exchange.to_string()));
        }

        let queues: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT queue FROM bindings WHERE exchange = ?1 ORDER BY queue")?;
            let rows = stmt.query_map(params![exchange], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let now = now_millis();
        for queue in &queues {
            tx.execute(
                "INSERT INTO messages (queue, payload, published_at) VALUES (?1, ?2, ?3)",
                params![queue, payload, now],
            )?;
        }
        tx.commit()?;

        Ok(PublishReceipt {
            routed: queues.len(),
        })
    }

    fn receive(&self, queue: &str) -> TransportResult<Option<Delivery>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_millis();
        let max = i64::from(self.options.max_deliveries);

        let dead = tx.execute(
            "INSERT INTO dead_letters (id, queue, payload, published_at, delivery_count, dead_at)
             SELECT id, queue, payload, published_at, delivery_count, ?3 FROM messages
             WHERE queue = ?1 AND delivery_count - released >= ?2 AND leased_until <= ?3",
            params![queue, max, now],
        )?;
        if dead > 0 {
            tx.execute(
                "DELETE FROM messages
                 WHERE queue = ?1 AND delivery_count - released >= ?2 AND leased_until <= ?3",
                params![queue, max, now],
            )?;
            tracing::warn!("[broker] dead-lettered {dead} message(s) on '{queue}'");
        }

        let next: Option<(i64, Vec<u8>, u32)> = tx
            .query_row(
                "SELECT id, payload, delivery_count FROM messages
                 WHERE queue = ?1 AND (leased_until IS NULL OR leased_until <= ?2)
                 ORDER BY id LIMIT 1",
                params![queue, now],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, payload, previous)) = next else {
            tx.commit()?;
            return Ok(None);
        };

        let lease = i64::try_from(self.options.redelivery_timeout.as_millis()).unwrap_or(i64::MAX);
        tx.execute(
            "UPDATE messages SET delivery_count = delivery_count + 1, leased_until = ?2
             WHERE id = ?1",
            params![id, now.saturating_add(lease)],
        )?;
        tx.commit()?;

        Ok(Some(Delivery {
            id,
            queue: queue.to_string(),
            payload,
            delivery_count: previous + 1,
        }))
    }

    fn ack(&self, delivery: &Delivery) -> TransportResult<()> {
        let removed = self.conn.lock().execute(
            "DELETE FROM messages WHERE id = ?1 AND delivery_count = ?2",
            params![delivery.id, delivery.delivery_count],
        )?;
        if removed == 0 {
            return Err(TransportError::StaleLease { id: delivery.id });
        }
        Ok(())
    }

    fn release(&self, delivery: &Delivery) -> TransportResult<()> {
        let released = self.conn.lock().execute(
            "UPDATE messages SET leased_until = NULL, released = released + 1
             WHERE id = ?1 AND delivery_count = ?2",
            params![delivery.id, delivery.delivery_count],
        )?;
        if released == 0 {
            return Err(TransportError::StaleLease { id: delivery.id });
        }
        Ok(())
    }
}

fn exchange_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM exchanges WHERE name = ?1",
        params![name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn broker(options: BrokerOptions) -> SqliteBroker {
        let broker = SqliteBroker::open_in_memory(options).unwrap();
        broker.declare_exchange("files").unwrap();
        broker.bind_queue("files", "graph").unwrap();
        broker
    }

    fn immediate_redelivery(max_deliveries: u32) -> BrokerOptions {
        BrokerOptions {
            redelivery_timeout: Duration::ZERO,
            max_deliveries,
        }
    }

    #[test]
    fn test_publish_fans_out_to_every_bound_queue() {
        let broker = broker(BrokerOptions::default());
        broker.bind_queue("files", "audit").unwrap();

        let receipt = broker.publish("files", b"one").unwrap();
        assert_eq!(receipt.routed, 2);

        assert_eq!(broker.receive("graph").unwrap().unwrap().payload, b"one");
        assert_eq!(broker.receive("audit").unwrap().unwrap().payload, b"one");
    }

    #[test]
    fn test_unknown_exchange() {
        let broker = SqliteBroker::open_in_memory(BrokerOptions::default()).unwrap();
        assert!(matches!(
            broker.publish("nowhere", b"x"),
            Err(TransportError::UnknownExchange(_))
        ));
        assert!(matches!(
            broker.bind_queue("nowhere", "q"),
            Err(TransportError::UnknownExchange(_))
        ));
    }

    #[test]
    fn test_unbound_exchange_routes_nowhere() {
        let broker = SqliteBroker::open_in_memory(BrokerOptions::default()).unwrap();
        broker.declare_exchange("files").unwrap();
        assert_eq!(broker.publish("files", b"x").unwrap().routed, 0);
    }

    #[test]
    fn test_lease_hides_message_until_acked() {
        let broker = broker(BrokerOptions::default());
        broker.publish("files", b"first").unwrap();
        broker.publish("files", b"second").unwrap();

        let first = broker.receive("graph").unwrap().unwrap();
        assert_eq!(first.payload, b"first");
        assert_eq!(first.delivery_count, 1);

        let second = broker.receive("graph").unwrap().unwrap();
        assert_eq!(second.payload, b"second");
        assert!(broker.receive("graph").unwrap().is_none());

        broker.ack(&first).unwrap();
        broker.ack(&second).unwrap();
        assert!(broker.stats().unwrap().iter().all(|s| s.ready == 0 && s.leased == 0));
    }

    #[test]
    fn test_expired_lease_is_redelivered() {
        let broker = broker(immediate_redelivery(5));
        broker.publish("files", b"payload").unwrap();

        let first = broker.receive("graph").unwrap().unwrap();
        let second = broker.receive("graph").unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.delivery_count, 2);

        // The first consumer lost its lease.
        assert!(matches!(
            broker.ack(&first),
            Err(TransportError::StaleLease { .. })
        ));
        broker.ack(&second).unwrap();
        assert!(broker.receive("graph").unwrap().is_none());
    }

    #[test]
    fn test_dead_letter_after_max_deliveries() {
        let broker = broker(immediate_redelivery(2));
        broker.publish("files", b"poison").unwrap();

        assert_eq!(broker.receive("graph").unwrap().unwrap().delivery_count, 1);
        assert_eq!(broker.receive("graph").unwrap().unwrap().delivery_count, 2);
        assert!(broker.receive("graph").unwrap().is_none());

        let stats = broker.stats().unwrap();
        assert_eq!(
            stats,
            vec![QueueStats {
                queue: "graph".to_string(),
                ready: 0,
                leased: 0,
                dead: 1,
            }]
        );
    }

    #[test]
    fn test_released_delivery_is_never_dead_lettered() {
        let broker = broker(immediate_redelivery(2));
        broker.publish("files", b"payload").unwrap();

        for attempt in 1..=6 {
            let delivery = broker.receive("graph").unwrap().unwrap();
            assert_eq!(delivery.delivery_count, attempt);
            broker.release(&delivery).unwrap();
        }

        let stats = broker.stats().unwrap();
        assert_eq!((stats[0].ready, stats[0].dead), (1, 0));

        // Deliveries that are not released still count toward the limit.
        broker.receive("graph").unwrap().unwrap();
        broker.receive("graph").unwrap().unwrap();
        assert!(broker.receive("graph").unwrap().is_none());
        assert_eq!(broker.stats().unwrap()[0].dead, 1);
    }

    #[test]
    fn test_release_makes_message_ready_at_once() {
        let broker = broker(BrokerOptions::default());
        broker.publish("files", b"payload").unwrap();

        let first = broker.receive("graph").unwrap().unwrap();
        assert!(broker.receive("graph").unwrap().is_none());
        broker.release(&first).unwrap();

        let second = broker.receive("graph").unwrap().unwrap();
        assert_eq!(second.delivery_count, 2);
        // The released lease is gone for good.
        assert!(matches!(
            broker.release(&first),
            Err(TransportError::StaleLease { .. })
        ));
        assert!(broker.ack(&first).is_err());
        broker.ack(&second).unwrap();
    }

    #[test]
    fn test_messages_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("broker.db");

        {
            let broker = SqliteBroker::open(&path, BrokerOptions::default()).unwrap();
            broker.declare_exchange("files").unwrap();
            broker.bind_queue("files", "graph").unwrap();
            broker.publish("files", b"durable").unwrap();
        }

        let broker = SqliteBroker::open(&path, BrokerOptions::default()).unwrap();
        let delivery = broker.receive("graph").unwrap().unwrap();
        assert_eq!(delivery.payload, b"durable");
    }
}
