//! Filesystem watcher.
//!
//! Turns raw change notifications under the configured roots into settled
//! paths, ready to be prospected.
//!
//! # Architecture
//!
//! ```text
//! notify::RecommendedWatcher
//!         |
//!    signal::signals      (raw event -> Arm / Touch / WriteFinished / Gone)
//!         |
//!   ExclusionPolicy       (dotfiles, temp suffixes)
//!         |
//!     Debouncer           (Pending -> Settled, one in-flight call per path)
//!         |
//!   settled-path channel  (bounded; full -> re-armed)
//! ```

mod debouncer;
mod error;
mod file_watcher;
mod filter;
mod signal;

pub use debouncer::{Debouncer, SettledPath};
pub use error::WatchError;
pub use file_watcher::{FileWatcher, FileWatcherBuilder};
pub use filter::{DEFAULT_EXCLUDE_SUFFIXES, ExclusionPolicy};
pub use signal::{Signal, signals};
