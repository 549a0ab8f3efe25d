//! Consume command: merge published records into the graph.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::{open_broker, open_graph};
use crate::config::Settings;
use crate::graph::GraphWriter;
use crate::metrics::Metrics;
use crate::transport::{ConsumeSummary, Consumer};

pub async fn run(
    settings: &Settings,
    once: bool,
    queue: Option<String>,
    shutdown: CancellationToken,
) -> Result<ConsumeSummary> {
    let mut settings = settings.clone();
    if let Some(queue) = queue {
        settings.broker.queue = queue;
    }

    // Both stores must open before anything is received.
    let broker = open_broker(&settings)?;
    let store = open_graph(&settings)?;
    let metrics = Arc::new(Metrics::new());

    let consumer = Consumer::new(broker, settings.broker.queue.clone(), GraphWriter::new(store))
        .with_poll_interval(settings.broker.poll_interval())
        .with_metrics(metrics.clone());

    if !once {
        eprintln!(
            "Consuming queue '{}'. Press Ctrl-C to stop.",
            consumer.queue()
        );
    }

    let summary = tokio::task::spawn_blocking(move || consumer.run(&shutdown, once))
        .await
        .context("Consumer thread failed")?;
    metrics.log_summary("consume");

    println!(
        "Merged {} record(s); {} malformed, {} merge failure(s)",
        summary.merged, summary.malformed, summary.merge_failures
    );
    Ok(summary)
}
