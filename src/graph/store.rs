//! SQLite graph store.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::error::{GraphError, GraphResult};
use super::{GraphNode, GraphStore, GraphWrite, MergeBatch, NodeFields, parse_event_kind};

/// Node and edge counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: u64,
    pub stubs: u64,
    pub edges: u64,
}

/// Full contents of the store, ordered for comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    /// `(source, target, relation)` with `source < target`.
    pub edges: Vec<(String, String, String)>,
}

const NODE_COLUMNS: &str = "path, is_stub, event_kind, sha256, xxh128, size_bytes,
    modified_at, accessed_at, changed_at, detected_at";

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGraphStore").finish_non_exhaustive()
    }
}

impl SqliteGraphStore {
    /// Open (or create) a graph database file.
    pub fn open(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| GraphError::Open {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| GraphError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn open_in_memory() -> GraphResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> GraphResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                path TEXT PRIMARY KEY,
                is_stub INTEGER NOT NULL DEFAULT 1,
                event_kind TEXT,
                sha256 TEXT,
                xxh128 TEXT,
                size_bytes INTEGER,
                modified_at TEXT,
                accessed_at TEXT,
                changed_at TEXT,
                detected_at TEXT
            );

            CREATE TABLE IF NOT EXISTS edges (
                source TEXT NOT NULL REFERENCES nodes(path),
                target TEXT NOT NULL REFERENCES nodes(path),
                relation TEXT NOT NULL,
                PRIMARY KEY (source, target, relation),
                CHECK (source < target)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn node(&self, path: &str) -> GraphResult<Option<GraphNode>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE path = ?1"),
                params![path],
                RawNode::from_row,
            )
            .optional()?;
        raw.map(RawNode::into_node).transpose()
    }

    /// Paths joined to `path` by an edge, in path order.
    pub fn neighbors(&self, path: &str) -> GraphResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT target FROM edges WHERE source = ?1
             UNION
             SELECT source FROM edges WHERE target = ?1
             ORDER BY 1",
        )?;
        let rows = stmt.query_map(params![path], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    pub fn stats(&self) -> GraphResult<GraphStats> {
        let conn = self.conn.lock();
        let (nodes, stubs): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_stub), 0) FROM nodes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(GraphStats {
            nodes: nodes as u64,
            stubs: stubs as u64,
            edges: edges as u64,
        })
    }

    pub fn snapshot(&self) -> GraphResult<GraphSnapshot> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY path"))?;
        let raw = stmt
            .query_map([], RawNode::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let nodes = raw
            .into_iter()
            .map(RawNode::into_node)
            .collect::<GraphResult<Vec<_>>>()?;

        let mut stmt =
            conn.prepare("SELECT source, target, relation FROM edges ORDER BY source, target")?;
        let edges = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GraphSnapshot { nodes, edges })
    }
}

impl GraphStore for SqliteGraphStore {
    fn apply(&self, batch: &MergeBatch) -> GraphResult<()> {
        let mut conn = self.conn.lock();
        // Write lock taken up front; merges from other processes queue on it.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for write in batch.writes() {
            match write {
                GraphWrite::UpsertNode { path, fields } => {
                    tx.execute(
                        "INSERT INTO nodes (path, is_stub, event_kind, sha256, xxh128, size_bytes,
                                            modified_at, accessed_at, changed_at, detected_at)
                         VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT(path) DO UPDATE SET
                            is_stub = 0,
                            event_kind = excluded.event_kind,
                            sha256 = excluded.sha256,
                            xxh128 = excluded.xxh128,
                            size_bytes = excluded.size_bytes,
                            modified_at = excluded.modified_at,
                            accessed_at = excluded.accessed_at,
                            changed_at = excluded.changed_at,
                            detected_at = excluded.detected_at",
                        params![
                            path,
                            fields.event_kind.as_wire(),
                            fields.sha256,
                            fields.xxh128,
                            i64::try_from(fields.size_bytes).unwrap_or(i64::MAX),
                            fields.modified_at,
                            fields.accessed_at,
                            fields.changed_at,
                            fields.detected_at,
                        ],
                    )?;
                }
                GraphWrite::EnsureStub { path } => {
                    tx.execute(
                        "INSERT INTO nodes (path) VALUES (?1) ON CONFLICT(path) DO NOTHING",
                        params![path],
                    )?;
                }
                GraphWrite::UpsertEdge { a, b, relation } => {
                    let (source, target) = if a <= b { (a, b) } else { (b, a) };
                    tx.execute(
                        "INSERT INTO edges (source, target, relation) VALUES (?1, ?2, ?3)
                         ON CONFLICT DO NOTHING",
                        params![source, target, relation],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

/// Row image before validation.
struct RawNode {
    path: String,
    is_stub: bool,
    event_kind: Option<String>,
    sha256: Option<String>,
    xxh128: Option<String>,
    size_bytes: Option<i64>,
    modified_at: Option<String>,
    accessed_at: Option<String>,
    changed_at: Option<String>,
    detected_at: Option<String>,
}

impl RawNode {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            is_stub: row.get(1)?,
            event_kind: row.get(2)?,
            sha256: row.get(3)?,
            xxh128: row.get(4)?,
            size_bytes: row.get(5)?,
            modified_at: row.get(6)?,
            accessed_at: row.get(7)?,
            changed_at: row.get(8)?,
            detected_at: row.get(9)?,
        })
    }

    fn into_node(self) -> GraphResult<GraphNode> {
        if self.is_stub {
            return Ok(GraphNode {
                path: self.path,
                fields: None,
            });
        }

        let (Some(kind), Some(sha256), Some(xxh128), Some(size), Some(detected_at)) = (
            self.event_kind,
            self.sha256,
            self.xxh128,
            self.size_bytes,
            self.detected_at,
        ) else {
            return Err(GraphError::Corrupt {
                path: self.path,
                reason: "full node with missing fields".to_string(),
            });
        };

        let event_kind = parse_event_kind(&self.path, &kind)?;
        Ok(GraphNode {
            path: self.path,
            fields: Some(NodeFields {
                event_kind,
                sha256,
                xxh128,
                size_bytes: size.max(0) as u64,
                modified_at: self.modified_at,
                accessed_at: self.accessed_at,
                changed_at: self.changed_at,
                detected_at,
            }),
        })
    }
}
