//! Command-line interface for the ingestion pipeline.
//!
//! Argument parsing lives in [`args`], one module per command in
//! [`commands`].

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Cli, Commands, GraphAction, QueueAction};
