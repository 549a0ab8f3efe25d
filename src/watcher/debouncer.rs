//! Per-path settle timers.
//!
//! Each path moves through `Pending -> Settled`. A pending path settles when
//! its close-after-write notification arrives or when it has been quiet for
//! the settle window. Settled paths are handed out once and stay in flight
//! until the caller reports completion, so a path never has two prospect
//! calls running at the same time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::types::EventKind;

/// A path that finished settling, with the event that opened its cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledPath {
    pub path: PathBuf,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: EventKind,
    last_event: Instant,
    write_finished: bool,
}

/// Settle-timer state owned by one watcher instance.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending paths: path -> cycle state.
    pending: HashMap<PathBuf, Pending>,
    /// Paths handed out by `take_ready` and not yet completed.
    in_flight: HashSet<PathBuf>,
    /// How long a path must be quiet before it settles.
    duration: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the given settle window in milliseconds.
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            in_flight: HashSet::new(),
            duration: Duration::from_millis(debounce_ms),
        }
    }

    pub fn window(&self) -> Duration {
        self.duration
    }

    /// A create or move-in notification.
    ///
    /// Opens a cycle, or resets the timer of the one already open. The event
    /// kind of an open cycle is kept.
    pub fn arm(&mut self, path: PathBuf, kind: EventKind) {
        let now = Instant::now();
        self.pending
            .entry(path)
            .and_modify(|p| p.last_event = now)
            .or_insert(Pending {
                kind,
                last_event: now,
                write_finished: false,
            });
    }

    /// Write activity. Only resets the timer of a pending path.
    ///
    /// Returns false when the path has no open cycle.
    pub fn touch(&mut self, path: &Path) -> bool {
        match self.pending.get_mut(path) {
            Some(pending) => {
                pending.last_event = Instant::now();
                true
            }
            None => false,
        }
    }

    /// A close-after-write notification. Settles the path on the next
    /// `take_ready`, opening a `WriteFinished` cycle if none was open.
    pub fn finish_write(&mut self, path: PathBuf) {
        let now = Instant::now();
        self.pending
            .entry(path)
            .and_modify(|p| {
                p.last_event = now;
                p.write_finished = true;
            })
            .or_insert(Pending {
                kind: EventKind::WriteFinished,
                last_event: now,
                write_finished: true,
            });
    }

    /// Forget a pending path (e.g., when the file is deleted or moved away).
    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Take all paths that settled, marking them in flight.
    ///
    /// A path whose previous prospect call is still running stays pending.
    pub fn take_ready(&mut self) -> Vec<SettledPath> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|path, pending| {
            let settled =
                pending.write_finished || now.duration_since(pending.last_event) >= self.duration;
            if settled && !self.in_flight.contains(path) {
                self.in_flight.insert(path.clone());
                ready.push(SettledPath {
                    path: path.clone(),
                    kind: pending.kind,
                });
                false
            } else {
                true
            }
        });

        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    /// The prospect call for `path` finished (successfully or not).
    pub fn complete(&mut self, path: &Path) {
        self.in_flight.remove(path);
    }

    /// Put back a settled path that could not be dispatched.
    ///
    /// It is ready again on the next `take_ready` unless a newer cycle for
    /// the same path already opened, in which case that cycle wins.
    pub fn requeue(&mut self, settled: SettledPath) {
        self.in_flight.remove(&settled.path);
        self.pending.entry(settled.path).or_insert(Pending {
            kind: settled.kind,
            last_event: Instant::now(),
            write_finished: true,
        });
    }

    /// Drop every timer and in-flight marker (shutdown).
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
    }

    /// Check if there are any pending changes.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn settled(path: &str, kind: EventKind) -> SettledPath {
        SettledPath {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn test_debouncer_basic() {
        let mut debouncer = Debouncer::new(50); // 50ms debounce

        let path = PathBuf::from("/media/track.flac");
        debouncer.arm(path.clone(), EventKind::Created);

        // Immediately after, nothing should be ready
        assert!(debouncer.take_ready().is_empty());
        assert!(debouncer.has_pending());

        sleep(Duration::from_millis(60));

        let ready = debouncer.take_ready();
        assert_eq!(ready, vec![settled("/media/track.flac", EventKind::Created)]);
        assert!(!debouncer.has_pending());
        assert_eq!(debouncer.in_flight_count(), 1);
    }

    #[test]
    fn test_rapid_writes_coalesce_into_one() {
        let mut debouncer = Debouncer::new(50);

        let path = PathBuf::from("/media/track.flac");
        debouncer.arm(path.clone(), EventKind::Created);

        let mut handed_out = 0;
        for _ in 0..10 {
            sleep(Duration::from_millis(10));
            assert!(debouncer.touch(&path));
            handed_out += debouncer.take_ready().len();
        }
        assert_eq!(handed_out, 0, "writes inside the window must keep resetting");

        sleep(Duration::from_millis(60));
        handed_out += debouncer.take_ready().len();
        sleep(Duration::from_millis(60));
        handed_out += debouncer.take_ready().len();

        assert_eq!(handed_out, 1);
    }

    #[test]
    fn test_touch_without_cycle_is_ignored() {
        let mut debouncer = Debouncer::new(50);
        assert!(!debouncer.touch(Path::new("/media/untracked.flac")));
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn test_write_finished_settles_immediately() {
        let mut debouncer = Debouncer::new(10_000);

        let path = PathBuf::from("/media/track.flac");
        debouncer.arm(path.clone(), EventKind::MovedIn);
        assert!(debouncer.take_ready().is_empty());

        debouncer.finish_write(path.clone());
        let ready = debouncer.take_ready();

        // The cycle keeps the event that opened it.
        assert_eq!(ready, vec![settled("/media/track.flac", EventKind::MovedIn)]);
    }

    #[test]
    fn test_close_write_without_open_cycle() {
        let mut debouncer = Debouncer::new(10_000);
        debouncer.finish_write(PathBuf::from("/media/rewritten.flac"));

        assert_eq!(
            debouncer.take_ready(),
            vec![settled("/media/rewritten.flac", EventKind::WriteFinished)]
        );
    }

    #[test]
    fn test_one_in_flight_call_per_path() {
        let mut debouncer = Debouncer::new(10_000);
        let path = PathBuf::from("/media/track.flac");

        debouncer.finish_write(path.clone());
        assert_eq!(debouncer.take_ready().len(), 1);

        // Touched again while the first call is still running.
        debouncer.finish_write(path.clone());
        assert!(debouncer.take_ready().is_empty());
        assert!(debouncer.has_pending());

        debouncer.complete(&path);
        assert_eq!(debouncer.take_ready().len(), 1);
    }

    #[test]
    fn test_requeue_makes_path_ready_again() {
        let mut debouncer = Debouncer::new(10_000);
        debouncer.finish_write(PathBuf::from("/media/a.flac"));

        let mut ready = debouncer.take_ready();
        debouncer.requeue(ready.remove(0));
        assert_eq!(debouncer.in_flight_count(), 0);

        assert_eq!(
            debouncer.take_ready(),
            vec![settled("/media/a.flac", EventKind::WriteFinished)]
        );
    }

    #[test]
    fn test_debouncer_multiple_files() {
        let mut debouncer = Debouncer::new(50);

        let path1 = PathBuf::from("/media/a.flac");
        let path2 = PathBuf::from("/media/b.flac");

        debouncer.arm(path1.clone(), EventKind::Created);
        sleep(Duration::from_millis(30));
        debouncer.arm(path2.clone(), EventKind::Created);

        sleep(Duration::from_millis(25));

        let ready = debouncer.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].path, path1);
        assert!(debouncer.has_pending());

        sleep(Duration::from_millis(30));

        let ready = debouncer.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].path, path2);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut debouncer = Debouncer::new(50);

        let path = PathBuf::from("/media/a.flac");
        debouncer.arm(path.clone(), EventKind::Created);
        debouncer.remove(&path);
        assert!(!debouncer.has_pending());

        debouncer.finish_write(path.clone());
        debouncer.take_ready();
        debouncer.arm(PathBuf::from("/media/b.flac"), EventKind::Created);
        debouncer.clear();
        assert_eq!(debouncer.pending_count(), 0);
        assert_eq!(debouncer.in_flight_count(), 0);
    }
}
