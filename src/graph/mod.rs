//! Persistent relationship graph of catalogued files.
//!
//! Nodes are keyed by absolute path and mirror the latest record seen for
//! that path. A node first named only as someone's neighbor is a stub until
//! its own record arrives. Edges are undirected `NEIGHBOR` relations.

mod error;
mod store;
mod writer;

pub use error::{GraphError, GraphResult, MergeError};
pub use store::{GraphSnapshot, GraphStats, SqliteGraphStore};
pub use writer::GraphWriter;

use std::str::FromStr;

use crate::transport::wire::format_time;
use crate::types::{EventKind, FileRecord};

/// Relation name of sibling edges.
pub const NEIGHBOR: &str = "NEIGHBOR";

/// Record fields stored on a full node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFields {
    pub event_kind: EventKind,
    pub sha256: String,
    pub xxh128: String,
    pub size_bytes: u64,
    pub modified_at: Option<String>,
    pub accessed_at: Option<String>,
    pub changed_at: Option<String>,
    pub detected_at: String,
}

impl From<&FileRecord> for NodeFields {
    fn from(record: &FileRecord) -> Self {
        let times = record.times();
        Self {
            event_kind: record.event_kind(),
            sha256: record.hashes().sha256_hex(),
            xxh128: record.hashes().xxh128_hex(),
            size_bytes: record.size_bytes(),
            modified_at: times.modified.map(format_time),
            accessed_at: times.accessed.map(format_time),
            changed_at: times.changed.map(format_time),
            detected_at: format_time(record.detected_at()),
        }
    }
}

/// A node as read back from the store. `fields` is `None` for stubs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub path: String,
    pub fields: Option<NodeFields>,
}

impl GraphNode {
    pub fn is_stub(&self) -> bool {
        self.fields.is_none()
    }
}

/// One idempotent store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphWrite {
    /// Create or overwrite a full node.
    UpsertNode { path: String, fields: NodeFields },
    /// Create a stub node unless the path already exists.
    EnsureStub { path: String },
    /// Assert an undirected edge. Endpoints may be given in either order.
    UpsertEdge {
        a: String,
        b: String,
        relation: &'static str,
    },
}

/// Writes applied together in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeBatch {
    writes: Vec<GraphWrite>,
}

impl MergeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: GraphWrite) {
        self.writes.push(write);
    }

    pub fn writes(&self) -> &[GraphWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Storage behind the [`GraphWriter`].
pub trait GraphStore: Send + Sync {
    /// Apply every write of `batch` or none of them.
    fn apply(&self, batch: &MergeBatch) -> GraphResult<()>;
}

pub(crate) fn parse_event_kind(path: &str, value: &str) -> GraphResult<EventKind> {
    EventKind::from_str(value).map_err(|e| GraphError::Corrupt {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
