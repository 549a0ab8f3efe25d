//! CLI argument parsing using clap.
//!
//! Contains the Cli struct, Commands enum, and all subcommand enums.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const QUICK_START: &str = "Quick Start:
  $ mediagraph init                 # Create .mediagraph/settings.toml
  $ mediagraph scan ~/Music         # Publish every existing file once
  $ mediagraph watch ~/Music        # Publish files as they settle
  $ mediagraph consume              # Merge published records into the graph
  $ mediagraph graph neighbors ~/Music/album/track.flac";

/// Media ingestion pipeline
#[derive(Parser, Debug)]
#[command(
    name = "mediagraph",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch media directories and build a file relationship graph",
    long_about = "Fingerprint media files as they land, publish one record per file to a \
                  durable broker, and merge the records into a graph of sibling files.",
    next_line_help = true,
    styles = clap_cargo_style(),
    before_help = QUICK_START
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .mediagraph directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show active settings
    #[command(about = "Display active settings")]
    Config,

    /// Watch directories and publish a record per settled file
    #[command(about = "Watch directories and publish records as files settle")]
    Watch {
        /// Directories to watch (overrides configured roots)
        #[arg(value_name = "ROOT")]
        roots: Vec<PathBuf>,

        /// Settle window in milliseconds (overrides config)
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Concurrent prospect calls (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Publish a record for every existing file under the roots
    #[command(about = "Publish every existing file once")]
    Scan {
        /// Directories to scan (overrides configured roots)
        #[arg(value_name = "ROOT")]
        roots: Vec<PathBuf>,

        /// Number of prospect threads
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Merge published records into the graph
    #[command(about = "Consume records and merge them into the graph")]
    Consume {
        /// Exit once the queue is empty
        #[arg(long)]
        once: bool,

        /// Queue to consume (overrides config)
        #[arg(short, long)]
        queue: Option<String>,
    },

    /// Fingerprint one file and print its wire record
    #[command(about = "Print the record a single file would publish")]
    Prospect {
        /// File to fingerprint
        path: PathBuf,
    },

    /// Query the relationship graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Inspect broker queues
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum GraphAction {
    /// Show one node
    Node {
        /// Absolute path of the file
        path: PathBuf,
    },

    /// List the files linked to a node
    Neighbors {
        /// Absolute path of the file
        path: PathBuf,
    },

    /// Count nodes, stubs and edges
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum QueueAction {
    /// Ready, leased and dead-lettered messages per queue
    Stats,
}
