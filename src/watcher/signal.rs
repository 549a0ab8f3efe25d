//! Maps raw `notify` events onto watcher signals.

use std::path::PathBuf;

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind as NotifyKind};

use crate::types::EventKind;

/// What a raw notification means for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Opens (or resets) a pending cycle.
    Arm(EventKind),
    /// Write activity on a pending path.
    Touch,
    /// Close-after-write.
    WriteFinished,
    /// Deleted or moved away.
    Gone,
}

/// Per-path signals carried by one notification. Irrelevant kinds map to
/// nothing.
pub fn signals(event: &Event) -> Vec<(PathBuf, Signal)> {
    let each = |signal: Signal| -> Vec<(PathBuf, Signal)> {
        event.paths.iter().map(|p| (p.clone(), signal)).collect()
    };

    match event.kind {
        NotifyKind::Create(CreateKind::Folder) => Vec::new(),
        NotifyKind::Create(_) => each(Signal::Arm(EventKind::Created)),

        NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => each(Signal::Gone),
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push((from.clone(), Signal::Gone));
            }
            if let Some(to) = event.paths.get(1) {
                out.push((to.clone(), Signal::Arm(EventKind::MovedIn)));
            }
            out
        }
        // `To`, plus backends that cannot tell the two sides apart. A
        // vanished source is dropped later as not found.
        NotifyKind::Modify(ModifyKind::Name(_)) => each(Signal::Arm(EventKind::MovedIn)),

        NotifyKind::Modify(ModifyKind::Data(_)) | NotifyKind::Modify(ModifyKind::Any) => {
            each(Signal::Touch)
        }

        NotifyKind::Access(AccessKind::Close(AccessMode::Write)) => each(Signal::WriteFinished),

        NotifyKind::Remove(_) => each(Signal::Gone),

        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind, RemoveKind};

    fn event(kind: NotifyKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_create_and_move_arm() {
        assert_eq!(
            signals(&event(NotifyKind::Create(CreateKind::File), &["/m/a.flac"])),
            vec![(PathBuf::from("/m/a.flac"), Signal::Arm(EventKind::Created))]
        );
        assert_eq!(
            signals(&event(
                NotifyKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/m/b.flac"]
            )),
            vec![(PathBuf::from("/m/b.flac"), Signal::Arm(EventKind::MovedIn))]
        );
        assert!(signals(&event(NotifyKind::Create(CreateKind::Folder), &["/m/dir"])).is_empty());
    }

    #[test]
    fn test_rename_both_sides() {
        let out = signals(&event(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/m/old.part", "/m/new.flac"],
        ));
        assert_eq!(
            out,
            vec![
                (PathBuf::from("/m/old.part"), Signal::Gone),
                (PathBuf::from("/m/new.flac"), Signal::Arm(EventKind::MovedIn)),
            ]
        );
    }

    #[test]
    fn test_write_signals() {
        assert_eq!(
            signals(&event(
                NotifyKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/m/a.flac"]
            )),
            vec![(PathBuf::from("/m/a.flac"), Signal::Touch)]
        );
        assert_eq!(
            signals(&event(
                NotifyKind::Access(AccessKind::Close(AccessMode::Write)),
                &["/m/a.flac"]
            )),
            vec![(PathBuf::from("/m/a.flac"), Signal::WriteFinished)]
        );
    }

    #[test]
    fn test_ignored_kinds() {
        assert!(
            signals(&event(
                NotifyKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["/m/a.flac"]
            ))
            .is_empty()
        );
        assert!(
            signals(&event(
                NotifyKind::Access(AccessKind::Close(AccessMode::Read)),
                &["/m/a.flac"]
            ))
            .is_empty()
        );
        assert_eq!(
            signals(&event(NotifyKind::Remove(RemoveKind::File), &["/m/a.flac"])),
            vec![(PathBuf::from("/m/a.flac"), Signal::Gone)]
        );
    }
}
