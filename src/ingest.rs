//! Live ingestion: watcher -> prospector pool -> publisher.
//!
//! ```text
//! FileWatcher ──settled (bounded)──> dispatcher ──spawn_blocking──> prospect
//!      ^                              (Semaphore: workers)             │
//!      └──────────── done ─────────────────────────────────────────────┤
//!                                                                      v
//!                                         publisher <──records (bounded)
//! ```
//!
//! Shutdown runs front to back: the watcher stops and drops its sender, the
//! dispatcher waits for running prospect calls, the publisher empties the
//! record channel, and only then does [`IngestPipeline::run`] return.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::prospect::{ProspectResult, Prospector};
use crate::transport::Publisher;
use crate::types::FileRecord;
use crate::watcher::{FileWatcher, SettledPath, WatchError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Pipeline task '{task}' failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Concurrent prospect calls.
    pub workers: usize,
    /// Capacity of the settled-path and record channels.
    pub queue_capacity: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

pub struct IngestPipeline {
    prospector: Arc<Prospector>,
    publisher: Publisher,
    metrics: Arc<Metrics>,
    options: IngestOptions,
}

impl IngestPipeline {
    pub fn new(
        prospector: Prospector,
        publisher: Publisher,
        metrics: Arc<Metrics>,
        options: IngestOptions,
    ) -> Self {
        Self {
            prospector: Arc::new(prospector),
            publisher,
            metrics,
            options: IngestOptions {
                workers: options.workers.max(1),
                queue_capacity: options.queue_capacity.max(1),
            },
        }
    }

    /// Watch, prospect and publish until `shutdown` fires, then drain.
    pub async fn run(
        self,
        watcher: FileWatcher,
        shutdown: CancellationToken,
    ) -> Result<(), IngestError> {
        let (settled_tx, settled_rx) = mpsc::channel(self.options.queue_capacity);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (record_tx, record_rx) = mpsc::channel(self.options.queue_capacity);

        let publisher = self.publisher.clone();
        let publish_handle =
            tokio::task::spawn_blocking(move || publish_loop(publisher, record_rx));

        let dispatch_handle = tokio::spawn(dispatch(
            settled_rx,
            self.prospector.clone(),
            self.metrics.clone(),
            record_tx,
            done_tx,
            self.options.workers,
        ));

        let watched = watcher.watch(settled_tx, done_rx, shutdown.clone()).await;
        if watched.is_err() {
            // Let the rest of the process know the watcher is gone.
            shutdown.cancel();
        }

        dispatch_handle
            .await
            .map_err(|e| IngestError::TaskFailed {
                task: "dispatcher",
                reason: e.to_string(),
            })?;
        let published = publish_handle
            .await
            .map_err(|e| IngestError::TaskFailed {
                task: "publisher",
                reason: e.to_string(),
            })?;

        crate::log_event!("ingest", "drained", "{published} record(s) published");
        watched?;
        Ok(())
    }
}

/// Receives settled paths and runs at most `workers` prospect calls at once.
async fn dispatch(
    mut settled_rx: mpsc::Receiver<SettledPath>,
    prospector: Arc<Prospector>,
    metrics: Arc<Metrics>,
    record_tx: mpsc::Sender<FileRecord>,
    done_tx: mpsc::UnboundedSender<PathBuf>,
    workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    while let Some(settled) = settled_rx.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        let prospector = prospector.clone();
        let metrics = metrics.clone();
        let record_tx = record_tx.clone();
        let done_tx = done_tx.clone();

        tasks.spawn(async move {
            let _permit = permit;
            let SettledPath { path, kind } = settled;

            let target = path.clone();
            let result =
                tokio::task::spawn_blocking(move || prospector.prospect(&target, kind)).await;

            match result {
                Ok(result) => {
                    if let Some(record) = report(result, &metrics) {
                        if record_tx.send(record).await.is_err() {
                            tracing::error!(
                                "[ingest] publisher gone, record for {} lost",
                                path.display()
                            );
                        }
                    }
                }
                Err(e) => {
                    metrics.record_prospect_failure();
                    tracing::error!("[ingest] prospect task for {} failed: {e}", path.display());
                }
            }

            // After the record is queued: per-path publish order follows
            // cycle order.
            let _ = done_tx.send(path);
        });

        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                tracing::error!("[ingest] worker panicked: {e}");
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("[ingest] worker panicked: {e}");
        }
    }
}

/// Log and count one prospect outcome, keeping the record if there is one.
pub(crate) fn report(result: ProspectResult<FileRecord>, metrics: &Metrics) -> Option<FileRecord> {
    match result {
        Ok(record) => {
            metrics.record_processed();
            crate::debug_event!(
                "prospector",
                "record",
                "{} {} ({} bytes, {} neighbor(s))",
                record.event_kind(),
                record.path().display(),
                record.size_bytes(),
                record.neighbors().len()
            );
            Some(record)
        }
        Err(e) if e.is_benign() => {
            metrics.record_dropped();
            crate::debug_event!("prospector", "dropped", "{e}");
            None
        }
        Err(e) => {
            metrics.record_prospect_failure();
            tracing::warn!("[prospector] {e}");
            None
        }
    }
}

/// Blocking publish loop. Returns the number of records the broker accepted.
fn publish_loop(publisher: Publisher, mut record_rx: mpsc::Receiver<FileRecord>) -> u64 {
    let mut published = 0;
    while let Some(record) = record_rx.blocking_recv() {
        let path = record.path().to_path_buf();
        match publisher.publish(record) {
            Ok(_) => {
                published += 1;
                crate::log_event!("publisher", "published", "{}", path.display());
            }
            Err(e) => {
                tracing::error!("[publisher] {e}");
            }
        }
    }
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prospect::ProspectError;
    use crate::types::{ContentHashes, EventKind, FileTimes};
    use chrono::Utc;

    fn record() -> FileRecord {
        FileRecord::new(
            "/d/a.flac",
            EventKind::Created,
            ContentHashes {
                sha256: [0; 32],
                xxh128: 0,
                size_bytes: 0,
            },
            FileTimes::default(),
            Utc::now(),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_report_counts_outcomes() {
        let metrics = Metrics::new();

        assert!(report(Ok(record()), &metrics).is_some());
        assert!(
            report(
                Err(ProspectError::NotFound {
                    path: "/d/gone".into()
                }),
                &metrics
            )
            .is_none()
        );
        assert!(
            report(
                Err(ProspectError::Stat {
                    path: "/d/locked".into(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                }),
                &metrics
            )
            .is_none()
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_processed, 1);
        assert_eq!(snapshot.files_dropped, 1);
        assert_eq!(snapshot.prospect_failures, 1);
    }

    #[test]
    fn test_options_are_clamped() {
        use crate::transport::{BrokerOptions, SqliteBroker};

        let broker = Arc::new(SqliteBroker::open_in_memory(BrokerOptions::default()).unwrap());
        let pipeline = IngestPipeline::new(
            Prospector::default(),
            Publisher::new(broker, "files"),
            Arc::new(Metrics::new()),
            IngestOptions {
                workers: 0,
                queue_capacity: 0,
            },
        );
        assert_eq!(
            pipeline.options,
            IngestOptions {
                workers: 1,
                queue_capacity: 1
            }
        );
    }
}
