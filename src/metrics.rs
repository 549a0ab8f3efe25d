//! Pipeline counters.
//!
//! A process-local sink of atomic counters shared by the watcher, the
//! publisher and the consumer. `snapshot()` gives a consistent-enough view
//! for logging; nothing here blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    files_processed: AtomicU64,
    files_dropped: AtomicU64,
    prospect_failures: AtomicU64,
    bytes_hashed: AtomicU64,
    hash_time_ns: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    merged: AtomicU64,
    malformed: AtomicU64,
    merge_failures: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub files_processed: u64,
    pub files_dropped: u64,
    pub prospect_failures: u64,
    pub bytes_hashed: u64,
    pub hash_time: Duration,
    pub published: u64,
    pub publish_failures: u64,
    pub merged: u64,
    pub malformed: u64,
    pub merge_failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A file was turned into a record.
    pub fn record_processed(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// A file vanished or was not a regular file.
    pub fn record_dropped(&self) {
        self.files_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prospect_failure(&self) {
        self.prospect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Time spent in one hashing pass and the bytes it covered.
    pub fn record_hash(&self, elapsed: Duration, bytes: u64) {
        self.hash_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.bytes_hashed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merged(&self) {
        self.merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_failure(&self) {
        self.merge_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_dropped: self.files_dropped.load(Ordering::Relaxed),
            prospect_failures: self.prospect_failures.load(Ordering::Relaxed),
            bytes_hashed: self.bytes_hashed.load(Ordering::Relaxed),
            hash_time: Duration::from_nanos(self.hash_time_ns.load(Ordering::Relaxed)),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            merge_failures: self.merge_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit the current counters at info level.
    pub fn log_summary(&self, component: &str) {
        let s = self.snapshot();
        crate::log_event!(
            component,
            "summary",
            "processed={} dropped={} failed={} hashed={}B in {:.2?} published={} publish_failures={} merged={} malformed={} merge_failures={}",
            s.files_processed,
            s.files_dropped,
            s.prospect_failures,
            s.bytes_hashed,
            s.hash_time,
            s.published,
            s.publish_failures,
            s.merged,
            s.malformed,
            s.merge_failures
        );
    }
}

impl MetricsSnapshot {
    /// Hashing throughput in MiB/s, zero when nothing was hashed.
    pub fn hash_throughput_mib(&self) -> f64 {
        let secs = self.hash_time.as_secs_f64();
        if secs > 0.0 {
            self.bytes_hashed as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        }
    }
}
