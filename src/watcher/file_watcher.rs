//! Filesystem watcher that turns raw notifications into settled paths.

use std::path::PathBuf;

use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::debouncer::{Debouncer, SettledPath};
use super::error::WatchError;
use super::filter::ExclusionPolicy;
use super::signal::{Signal, signals};

/// Watches the configured roots and hands settled paths downstream.
///
/// One instance owns one `notify::RecommendedWatcher` and one [`Debouncer`].
/// Nothing else touches the settle timers.
pub struct FileWatcher {
    roots: Vec<PathBuf>,
    recursive: bool,
    policy: ExclusionPolicy,
    debouncer: Debouncer,
    tick: Duration,
    /// Channel for receiving file events.
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    /// The underlying file watcher.
    _watcher: notify::RecommendedWatcher,
}

impl FileWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> FileWatcherBuilder {
        FileWatcherBuilder::new()
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Run the event loop until `shutdown` fires.
    ///
    /// Settled paths go to `settled_tx`. The receiving side reports each
    /// finished prospect call on `done_rx`; until then the path is held in
    /// flight. When `settled_tx` is full the path is put back and offered
    /// again on the next tick.
    pub async fn watch(
        mut self,
        settled_tx: mpsc::Sender<SettledPath>,
        mut done_rx: mpsc::UnboundedReceiver<PathBuf>,
        shutdown: CancellationToken,
    ) -> Result<(), WatchError> {
        let armed = self.arm_roots()?;
        crate::log_event!(
            "watcher",
            "started",
            "{armed} root(s), settle window {}ms",
            self.debouncer.window().as_millis()
        );

        let mut tick = interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let dropped = self.debouncer.pending_count();
                    self.debouncer.clear();
                    crate::log_event!("watcher", "stopped", "{dropped} pending path(s) dropped");
                    return Ok(());
                }

                res = self.event_rx.recv() => {
                    match res {
                        Some(Ok(event)) => self.handle_event(event),
                        Some(Err(e)) => {
                            tracing::error!("[watcher] {}", event_error(e));
                        }
                        None => return Err(WatchError::ChannelClosed),
                    }
                }

                Some(path) = done_rx.recv() => {
                    self.debouncer.complete(&path);
                }

                _ = tick.tick() => {
                    self.dispatch_ready(&settled_tx)?;
                }
            }
        }
    }

    /// `Idle -> Armed`. A root that cannot be watched is skipped with a
    /// warning; failing every root is an error.
    fn arm_roots(&mut self) -> Result<usize, WatchError> {
        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let mut armed = 0;
        for root in &self.roots {
            match self._watcher.watch(root, mode) {
                Ok(()) => {
                    crate::debug_event!("watcher", "watching", "{}", root.display());
                    armed += 1;
                }
                Err(e) => {
                    let err = WatchError::PathWatchFailed {
                        path: root.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("[watcher] {err}");
                }
            }
        }

        if armed == 0 {
            return Err(WatchError::NoRoots {
                tried: self.roots.len(),
            });
        }
        Ok(armed)
    }

    fn handle_event(&mut self, event: Event) {
        for (path, signal) in signals(&event) {
            if self.policy.is_excluded(&path) {
                crate::debug_event!("watcher", "excluded", "{}", path.display());
                continue;
            }

            match signal {
                Signal::Arm(kind) => {
                    crate::debug_event!("watcher", "pending", "{kind} {}", path.display());
                    self.debouncer.arm(path, kind);
                }
                Signal::Touch => {
                    self.debouncer.touch(&path);
                }
                Signal::WriteFinished => {
                    self.debouncer.finish_write(path);
                }
                Signal::Gone => {
                    self.debouncer.remove(&path);
                }
            }
        }
    }

    fn dispatch_ready(&mut self, settled_tx: &mpsc::Sender<SettledPath>) -> Result<(), WatchError> {
        for settled in self.debouncer.take_ready() {
            match settled_tx.try_send(settled) {
                Ok(()) => {}
                Err(TrySendError::Full(settled)) => {
                    crate::debug_event!(
                        "watcher",
                        "workers busy, re-armed",
                        "{}",
                        settled.path.display()
                    );
                    self.debouncer.requeue(settled);
                }
                Err(TrySendError::Closed(_)) => return Err(WatchError::ChannelClosed),
            }
        }
        Ok(())
    }
}

/// Backend errors are reported and the loop keeps running.
fn event_error(e: notify::Error) -> WatchError {
    WatchError::EventError {
        details: e.to_string(),
    }
}

/// Builder for constructing a FileWatcher.
pub struct FileWatcherBuilder {
    roots: Vec<PathBuf>,
    recursive: bool,
    policy: ExclusionPolicy,
    debounce_ms: u64,
    tick_ms: u64,
}

impl FileWatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            recursive: true,
            policy: ExclusionPolicy::default(),
            debounce_ms: 500,
            tick_ms: 100,
        }
    }

    /// Add a root directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    pub fn roots(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.roots.extend(paths);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn exclusion_policy(mut self, policy: ExclusionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the debounce duration in milliseconds.
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// How often settled paths are collected.
    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.tick_ms = ms.max(1);
        self
    }

    /// Build the FileWatcher. Roots are made absolute here so every
    /// notification path is absolute too.
    pub fn build(self) -> Result<FileWatcher, WatchError> {
        if self.roots.is_empty() {
            return Err(WatchError::NoRoots { tried: 0 });
        }

        let roots = self
            .roots
            .iter()
            .map(|root| {
                std::path::absolute(root).map_err(|e| WatchError::PathWatchFailed {
                    path: root.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Create channel for events
        let (tx, rx) = mpsc::channel(1024);

        // Create the notify watcher
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        Ok(FileWatcher {
            roots,
            recursive: self.recursive,
            policy: self.policy,
            debouncer: Debouncer::new(self.debounce_ms),
            tick: Duration::from_millis(self.tick_ms),
            event_rx: rx,
            _watcher: watcher,
        })
    }
}

impl Default for FileWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
