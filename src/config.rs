//! Configuration module for the media ingestion pipeline.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MEDIAGRAPH_` and use double
//! underscores to separate nested levels:
//! - `MEDIAGRAPH_WATCHER__DEBOUNCE_MS=250` sets `watcher.debounce_ms`
//! - `MEDIAGRAPH_BROKER__QUEUE=audit` sets `broker.queue`
//! - `MEDIAGRAPH_LOGGING__DEFAULT=info` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::BrokerOptions;
use crate::watcher::DEFAULT_EXCLUDE_SUFFIXES;

/// Directory holding the settings file and, by default, both databases.
pub const CONFIG_DIR: &str = ".mediagraph";

const ENV_PREFIX: &str = "MEDIAGRAPH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .mediagraph is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatcherConfig {
    /// Directories to watch and scan
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Settle window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Concurrent prospect calls
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the settled-path and record channels
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// File name suffixes that are never ingested
    #[serde(default = "default_exclude_suffixes")]
    pub exclude_suffixes: Vec<String>,

    /// Watch subdirectories of each root
    #[serde(default = "default_true")]
    pub recursive: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BrokerConfig {
    /// Broker database file
    #[serde(default = "default_broker_path")]
    pub path: PathBuf,

    /// Fan-out exchange records are published to
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Queue this process consumes from
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Seconds before an unacknowledged delivery is offered again
    #[serde(default = "default_redelivery_timeout_secs")]
    pub redelivery_timeout_secs: u64,

    /// Deliveries before a message is dead-lettered
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,

    /// Consumer sleep between polls of an empty queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GraphConfig {
    /// Graph database file
    #[serde(default = "default_graph_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for every module
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `mediagraph::watcher = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    64
}
fn default_exclude_suffixes() -> Vec<String> {
    DEFAULT_EXCLUDE_SUFFIXES
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_broker_path() -> PathBuf {
    PathBuf::from(".mediagraph/broker.db")
}
fn default_exchange() -> String {
    "files".to_string()
}
fn default_queue() -> String {
    "graph-writer".to_string()
}
fn default_redelivery_timeout_secs() -> u64 {
    30
}
fn default_max_deliveries() -> u32 {
    5
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_graph_path() -> PathBuf {
    PathBuf::from(".mediagraph/graph.db")
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            watcher: WatcherConfig::default(),
            broker: BrokerConfig::default(),
            graph: GraphConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            debounce_ms: default_debounce_ms(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            exclude_suffixes: default_exclude_suffixes(),
            recursive: true,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            path: default_broker_path(),
            exchange: default_exchange(),
            queue: default_queue(),
            redelivery_timeout_secs: default_redelivery_timeout_secs(),
            max_deliveries: default_max_deliveries(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn options(&self) -> BrokerOptions {
        BrokerOptions {
            redelivery_timeout: Duration::from_secs(self.redelivery_timeout_secs),
            max_deliveries: self.max_deliveries.max(1),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: default_graph_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .mediagraph directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file, without environment
    /// overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the workspace root by looking for .mediagraph directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .mediagraph is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn broker_path(&self) -> PathBuf {
        self.resolve(&self.broker.path)
    }

    pub fn graph_path(&self) -> PathBuf {
        self.resolve(&self.graph.path)
    }

    /// Watch roots, resolved against the workspace root.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.watcher.roots.iter().map(|r| self.resolve(r)).collect()
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let existed = config_path.exists();
        Settings::default().save(&config_path)?;
        if existed {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!("Created default configuration at: {}", config_path.display());
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watcher.debounce_ms, 500);
        assert_eq!(settings.watcher.workers, 4);
        assert!(settings.watcher.recursive);
        assert!(settings.watcher.exclude_suffixes.contains(&".part".to_string()));
        assert_eq!(settings.broker.exchange, "files");
        assert_eq!(settings.broker.queue, "graph-writer");
        assert_eq!(settings.broker.redelivery_timeout_secs, 30);
        assert_eq!(settings.graph.path, PathBuf::from(".mediagraph/graph.db"));
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[watcher]
roots = ["/media/incoming", "/media/library"]
debounce_ms = 1000
exclude_suffixes = [".lock"]

[broker]
queue = "audit"
max_deliveries = 3

[logging.modules]
"mediagraph::watcher" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(
            settings.watcher.roots,
            vec![
                PathBuf::from("/media/incoming"),
                PathBuf::from("/media/library")
            ]
        );
        assert_eq!(settings.watcher.debounce_ms, 1000);
        // Custom suffixes replace the defaults
        assert_eq!(settings.watcher.exclude_suffixes, vec![".lock"]);
        assert_eq!(settings.broker.queue, "audit");
        assert_eq!(settings.broker.max_deliveries, 3);
        // Untouched values keep their defaults
        assert_eq!(settings.broker.exchange, "files");
        assert_eq!(settings.watcher.workers, 4);
        assert_eq!(settings.logging.modules["mediagraph::watcher"], "debug");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.watcher.workers = 2;
        settings.broker.poll_interval_ms = 50;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watcher.workers, 2);
        assert_eq!(loaded.broker.poll_interval_ms, 50);
    }

    #[test]
    fn test_resolve_against_workspace_root() {
        let settings = Settings {
            workspace_root: Some(PathBuf::from("/srv/catalog")),
            ..Settings::default()
        };

        assert_eq!(
            settings.broker_path(),
            PathBuf::from("/srv/catalog/.mediagraph/broker.db")
        );
        assert_eq!(
            settings.resolve(Path::new("/abs/graph.db")),
            PathBuf::from("/abs/graph.db")
        );
    }

    #[test]
    fn test_broker_options() {
        let mut config = BrokerConfig::default();
        config.max_deliveries = 0;
        let options = config.options();
        assert_eq!(options.redelivery_timeout, Duration::from_secs(30));
        assert_eq!(options.max_deliveries, 1);
    }

    #[test]
    fn test_layered_config() {
        let temp_dir = TempDir::new().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        // Create config directory
        let config_dir = temp_dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();

        let toml_content = r#"
[watcher]
debounce_ms = 800
workers = 2

[broker]
exchange = "media"
"#;
        fs::write(config_dir.join("settings.toml"), toml_content).unwrap();

        // Set environment variables that should override config file
        unsafe {
            std::env::set_var("MEDIAGRAPH_WATCHER__DEBOUNCE_MS", "250");
            std::env::set_var("MEDIAGRAPH_BROKER__REDELIVERY_TIMEOUT_SECS", "5");
        }

        let settings = Settings::load().unwrap();

        // Environment variable should override config file
        assert_eq!(settings.watcher.debounce_ms, 250);
        // Config file value should be used when no env var
        assert_eq!(settings.watcher.workers, 2);
        assert_eq!(settings.broker.exchange, "media");
        // Env var sets a value not in the config file
        assert_eq!(settings.broker.redelivery_timeout_secs, 5);
        assert!(settings.workspace_root.is_some());

        // Clean up
        unsafe {
            std::env::remove_var("MEDIAGRAPH_WATCHER__DEBOUNCE_MS");
            std::env::remove_var("MEDIAGRAPH_BROKER__REDELIVERY_TIMEOUT_SECS");
        }
        std::env::set_current_dir(original_dir).unwrap();
    }
}
