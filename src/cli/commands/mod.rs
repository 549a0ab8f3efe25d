//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module. Long-running commands
//! take a cancellation token wired to Ctrl-C by `main`.

pub mod consume;
pub mod graph;
pub mod init;
pub mod prospect;
pub mod queue;
pub mod scan;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::config::Settings;
use crate::graph::SqliteGraphStore;
use crate::transport::SqliteBroker;

/// Open the broker and make sure the configured exchange and queue exist.
///
/// Binding the queue here means records published before the first
/// `consume` are retained for it.
pub fn open_broker(settings: &Settings) -> Result<Arc<SqliteBroker>> {
    let path = settings.broker_path();
    let broker = SqliteBroker::open(&path, settings.broker.options())
        .with_context(|| format!("Failed to open broker at {}", path.display()))?;
    broker.declare_exchange(&settings.broker.exchange)?;
    broker.bind_queue(&settings.broker.exchange, &settings.broker.queue)?;
    Ok(Arc::new(broker))
}

pub fn open_graph(settings: &Settings) -> Result<Arc<SqliteGraphStore>> {
    let path = settings.graph_path();
    let store = SqliteGraphStore::open(&path)
        .with_context(|| format!("Failed to open graph store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Roots given on the command line, else the configured ones.
pub fn resolve_roots(settings: &Settings, roots: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let roots = if roots.is_empty() {
        settings.roots()
    } else {
        roots
    };
    if roots.is_empty() {
        bail!("No roots given. Pass directories or set watcher.roots in settings.toml");
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_roots_override_settings() {
        let mut settings = Settings::default();
        settings.watcher.roots = vec![PathBuf::from("/media/library")];

        let roots = resolve_roots(&settings, vec![PathBuf::from("/media/in")]).unwrap();
        assert_eq!(roots, vec![PathBuf::from("/media/in")]);

        let roots = resolve_roots(&settings, Vec::new()).unwrap();
        assert_eq!(roots, vec![PathBuf::from("/media/library")]);

        assert!(resolve_roots(&Settings::default(), Vec::new()).is_err());
    }

    #[test]
    fn test_open_broker_binds_configured_queue() {
        let temp = TempDir::new().unwrap();
        let settings = Settings {
            workspace_root: Some(temp.path().to_path_buf()),
            ..Settings::default()
        };

        let broker = open_broker(&settings).unwrap();
        let stats = broker.stats().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].queue, "graph-writer");
        assert!(temp.path().join(".mediagraph/broker.db").exists());

        // Reopening is idempotent
        drop(broker);
        assert_eq!(open_broker(&settings).unwrap().stats().unwrap().len(), 1);
    }
}
