pub mod cli;
pub mod config;
pub mod graph;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod prospect;
pub mod scan;
pub mod transport;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use graph::{GraphStore, GraphWriter, SqliteGraphStore};
pub use ingest::{IngestOptions, IngestPipeline};
pub use metrics::Metrics;
pub use prospect::{HashEngine, NeighborResolver, Prospector};
pub use scan::Scanner;
pub use transport::{Consumer, MessageBroker, Publisher, SqliteBroker};
pub use types::{ContentHashes, EventKind, FileRecord, FileTimes};
pub use watcher::{ExclusionPolicy, FileWatcher};
