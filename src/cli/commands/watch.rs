//! Watch command: live ingestion until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::{open_broker, resolve_roots};
use crate::config::Settings;
use crate::ingest::{IngestOptions, IngestPipeline};
use crate::metrics::Metrics;
use crate::prospect::Prospector;
use crate::transport::Publisher;
use crate::watcher::{ExclusionPolicy, FileWatcher};

pub struct WatchArgs {
    pub roots: Vec<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub workers: Option<usize>,
}

pub async fn run(settings: &Settings, args: WatchArgs, shutdown: CancellationToken) -> Result<()> {
    let roots = resolve_roots(settings, args.roots)?;
    let broker = open_broker(settings)?;
    let metrics = Arc::new(Metrics::new());

    let watcher = FileWatcher::builder()
        .roots(roots)
        .recursive(settings.watcher.recursive)
        .exclusion_policy(ExclusionPolicy::new(
            settings.watcher.exclude_suffixes.iter().cloned(),
        ))
        .debounce_ms(args.debounce_ms.unwrap_or(settings.watcher.debounce_ms))
        .build()?;

    for root in watcher.roots() {
        eprintln!("Watching {}", root.display());
    }
    eprintln!(
        "Publishing to exchange '{}'. Press Ctrl-C to stop.",
        settings.broker.exchange
    );

    let publisher =
        Publisher::new(broker, settings.broker.exchange.clone()).with_metrics(metrics.clone());
    let pipeline = IngestPipeline::new(
        Prospector::default().with_metrics(metrics.clone()),
        publisher,
        metrics.clone(),
        IngestOptions {
            workers: args.workers.unwrap_or(settings.watcher.workers),
            queue_capacity: settings.watcher.queue_capacity,
        },
    );

    let result = pipeline.run(watcher, shutdown).await;
    metrics.log_summary("watch");

    let s = metrics.snapshot();
    eprintln!(
        "Stopped: {} processed, {} published, {} failed",
        s.files_processed,
        s.published,
        s.prospect_failures + s.publish_failures
    );
    Ok(result?)
}
