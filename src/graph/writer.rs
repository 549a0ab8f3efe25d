use std::sync::Arc;

use super::error::MergeError;
use super::{GraphStore, GraphWrite, MergeBatch, NEIGHBOR, NodeFields};
use crate::types::FileRecord;

/// Merges file records into the graph.
///
/// A merge upserts the record's node, a stub for each neighbor and one
/// edge per neighbor, all in a single store transaction. Every write is
/// idempotent, so merging the same record again leaves the graph as it was.
#[derive(Clone)]
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn merge(&self, record: &FileRecord) -> Result<(), MergeError> {
        let batch = Self::plan(record);
        self.store
            .apply(&batch)
            .map_err(|source| MergeError::MergeFailed {
                path: record.path().to_path_buf(),
                source,
            })?;

        crate::debug_event!(
            "graph",
            "merged",
            "{} ({} neighbor(s))",
            record.path().display(),
            record.neighbors().len()
        );
        Ok(())
    }

    /// The writes one merge performs, in order.
    pub fn plan(record: &FileRecord) -> MergeBatch {
        let path = record.path().to_string_lossy().into_owned();
        let mut batch = MergeBatch::new();

        batch.push(GraphWrite::UpsertNode {
            path: path.clone(),
            fields: NodeFields::from(record),
        });
        for neighbor in record.neighbors() {
            let neighbor = neighbor.to_string_lossy().into_owned();
            batch.push(GraphWrite::EnsureStub {
                path: neighbor.clone(),
            });
            batch.push(GraphWrite::UpsertEdge {
                a: path.clone(),
                b: neighbor,
                relation: NEIGHBOR,
            });
        }
        batch
    }
}
