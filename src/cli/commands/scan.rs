//! Scan command: publish every existing file once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use super::{open_broker, resolve_roots};
use crate::config::Settings;
use crate::metrics::Metrics;
use crate::prospect::Prospector;
use crate::scan::{ScanStats, Scanner};
use crate::transport::Publisher;
use crate::watcher::ExclusionPolicy;

/// Blocking; walks and hashes on its own threads.
pub fn run(settings: &Settings, roots: Vec<PathBuf>, threads: Option<usize>) -> Result<ScanStats> {
    let roots = resolve_roots(settings, roots)?;
    let broker = open_broker(settings)?;
    let metrics = Arc::new(Metrics::new());

    let publisher =
        Publisher::new(broker, settings.broker.exchange.clone()).with_metrics(metrics.clone());
    let mut scanner = Scanner::new(
        Prospector::default().with_metrics(metrics.clone()),
        ExclusionPolicy::new(settings.watcher.exclude_suffixes.iter().cloned()),
        metrics.clone(),
    )
    .recursive(settings.watcher.recursive);
    if let Some(threads) = threads {
        scanner = scanner.with_threads(threads);
    }

    let stats = scanner.scan(&roots, &publisher);
    metrics.log_summary("scan");

    println!(
        "Scanned {} file(s) in {:.2?}: {} published, {} excluded, {} failed",
        stats.discovered, stats.elapsed, stats.published, stats.excluded, stats.publish_failures
    );
    let snapshot = metrics.snapshot();
    if snapshot.bytes_hashed > 0 {
        println!(
            "Hashed {} at {:.1} MiB/s",
            crate::cli::output::format_size(snapshot.bytes_hashed),
            snapshot.hash_throughput_mib()
        );
    }
    Ok(stats)
}
