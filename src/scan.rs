//! One-shot scan of existing files.
//!
//! ```text
//! DISCOVER (walkdir) → PROSPECT (N threads) → PUBLISH (caller thread)
//!      │                     │                       │
//!      ▼                     ▼                       ▼
//!  [paths]               [records]                broker
//! ```
//!
//! Every regular file under the roots that passes the exclusion policy is
//! published as a `Created` record.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use walkdir::WalkDir;

use crate::ingest::report;
use crate::metrics::Metrics;
use crate::prospect::Prospector;
use crate::transport::Publisher;
use crate::types::{EventKind, FileRecord};
use crate::watcher::ExclusionPolicy;

/// Totals for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub discovered: usize,
    pub excluded: usize,
    pub published: usize,
    pub publish_failures: usize,
    pub elapsed: Duration,
}

pub struct Scanner {
    prospector: Arc<Prospector>,
    policy: ExclusionPolicy,
    metrics: Arc<Metrics>,
    threads: usize,
    recursive: bool,
}

impl Scanner {
    pub fn new(prospector: Prospector, policy: ExclusionPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            prospector: Arc::new(prospector),
            policy,
            metrics,
            threads: num_cpus::get().max(1),
            recursive: true,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Walk `roots`, prospect every file and publish the records.
    pub fn scan(&self, roots: &[PathBuf], publisher: &Publisher) -> ScanStats {
        let start = Instant::now();

        // Create bounded channels with backpressure
        let (path_tx, path_rx) = bounded::<PathBuf>(self.threads * 16);
        let (record_tx, record_rx) = bounded::<FileRecord>(self.threads * 4);

        // Stage 1: DISCOVER
        let discover_roots = roots.to_vec();
        let policy = self.policy.clone();
        let recursive = self.recursive;
        let discover_handle =
            thread::spawn(move || discover(&discover_roots, &policy, recursive, path_tx));

        // Stage 2: PROSPECT
        let prospect_handles: Vec<_> = (0..self.threads)
            .map(|_| {
                let rx = path_rx.clone();
                let tx = record_tx.clone();
                let prospector = Arc::clone(&self.prospector);
                let metrics = Arc::clone(&self.metrics);
                thread::spawn(move || prospect_stage(&prospector, &metrics, rx, tx))
            })
            .collect();
        drop(path_rx);
        drop(record_tx);

        // Stage 3: PUBLISH
        let mut stats = ScanStats::default();
        for record in record_rx {
            match publisher.publish(record) {
                Ok(_) => stats.published += 1,
                Err(e) => {
                    stats.publish_failures += 1;
                    tracing::error!("[scan] {e}");
                }
            }
        }

        match discover_handle.join() {
            Ok((discovered, excluded)) => {
                stats.discovered = discovered;
                stats.excluded = excluded;
            }
            Err(_) => tracing::error!("[scan] discover thread panicked"),
        }
        for handle in prospect_handles {
            if handle.join().is_err() {
                tracing::error!("[scan] prospect thread panicked");
            }
        }

        stats.elapsed = start.elapsed();
        crate::log_event!(
            "scan",
            "complete",
            "discovered={} excluded={} published={} failed={} in {:?}",
            stats.discovered,
            stats.excluded,
            stats.published,
            stats.publish_failures,
            stats.elapsed
        );
        stats
    }
}

/// Returns (files sent, files excluded).
fn discover(
    roots: &[PathBuf],
    policy: &ExclusionPolicy,
    recursive: bool,
    sender: Sender<PathBuf>,
) -> (usize, usize) {
    let mut discovered = 0;
    let mut excluded = 0;

    for root in roots {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(if recursive { usize::MAX } else { 1 });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[scan] {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if policy.is_excluded(entry.path()) {
                excluded += 1;
                continue;
            }
            discovered += 1;
            if sender.send(entry.into_path()).is_err() {
                // Channel closed
                return (discovered, excluded);
            }
        }
    }

    (discovered, excluded)
}

fn prospect_stage(
    prospector: &Prospector,
    metrics: &Metrics,
    receiver: Receiver<PathBuf>,
    sender: Sender<FileRecord>,
) {
    for path in receiver {
        if let Some(record) = report(prospector.prospect(&path, EventKind::Created), metrics) {
            if sender.send(record).is_err() {
                break;
            }
        }
    }
}
