//! File-watch subsystem: `add_watch` / `rm_watch` over the `notify`
//! crate, delivering `(DESCRIPTOR, ACTION, FILE [, FILE2])` events into
//! the input queue.

use crate::Kboard;
use core_events::{Event, NotifyAction, NotifyInfo};
use core_value::{EdError, Result};
use notify::event::{AccessKind, AccessMode, EventKind as NKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

bitflags::bitflags! {
    /// The closed flag set watches are created with.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WatchFlags: u8 {
        /// Also report mount/unmount activity on the watched path.
        const WATCH_MOUNTS = 1;
        /// Deliver renames as `moved` (with FILE2) instead of a
        /// deleted/created pair.
        const SEND_MOVED = 2;
    }
}

#[derive(Debug, Clone)]
struct WatchEntry {
    path: PathBuf,
    flags: WatchFlags,
}

type WatchTable = Arc<Mutex<HashMap<u32, WatchEntry>>>;

pub struct FileWatcher {
    watcher: RecommendedWatcher,
    entries: WatchTable,
    next_descriptor: u32,
}

impl FileWatcher {
    /// Build a watcher whose callback enqueues watch events on
    /// `kboard`'s ring.
    pub fn new(kboard: Arc<Kboard>) -> Result<Self> {
        let entries: WatchTable = Arc::default();
        let table = Arc::clone(&entries);
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let deliveries = translate(&event, &table.lock().unwrap());
                    for (descriptor, info) in deliveries {
                        let ev = Event::file_notify(descriptor, info, kboard.timestamp_now());
                        if !kboard.ring.enqueue(ev) {
                            debug!(target: "watch", descriptor, "notify_event_dropped");
                        }
                    }
                }
                Err(e) => warn!(target: "watch", error = %e, "watch_backend_error"),
            }
        })
        .map_err(|e| EdError::file_error(PathBuf::new(), e.to_string()))?;
        Ok(Self {
            watcher,
            entries,
            next_descriptor: 1,
        })
    }

    /// Start watching `path`; returns the opaque descriptor carried by
    /// delivered events. Failures raise a file-error with the path.
    pub fn add_watch(&mut self, path: &Path, flags: WatchFlags) -> Result<u32> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| EdError::file_error(path, e.to_string()))?;
        let descriptor = self.next_descriptor;
        self.next_descriptor += 1;
        self.entries.lock().unwrap().insert(
            descriptor,
            WatchEntry {
                path: path.to_path_buf(),
                flags,
            },
        );
        debug!(target: "watch", descriptor, path = %path.display(), ?flags, "add_watch");
        Ok(descriptor)
    }

    /// Cancel a watch. An unknown descriptor is a file-error.
    pub fn rm_watch(&mut self, descriptor: u32) -> Result<()> {
        let entry = self
            .entries
            .lock()
            .unwrap()
            .remove(&descriptor)
            .ok_or_else(|| {
                EdError::file_error(PathBuf::new(), format!("No such watch: {descriptor}"))
            })?;
        let still_watched = self
            .entries
            .lock()
            .unwrap()
            .values()
            .any(|e| e.path == entry.path);
        if !still_watched {
            self.watcher
                .unwatch(&entry.path)
                .map_err(|e| EdError::file_error(&entry.path, e.to_string()))?;
        }
        debug!(target: "watch", descriptor, "rm_watch");
        Ok(())
    }
}

fn classify(kind: &NKind) -> Option<NotifyAction> {
    match kind {
        NKind::Create(_) => Some(NotifyAction::Created),
        NKind::Remove(_) => Some(NotifyAction::Deleted),
        NKind::Modify(ModifyKind::Name(_)) => Some(NotifyAction::Moved),
        NKind::Modify(ModifyKind::Metadata(_)) => Some(NotifyAction::AttributeChanged),
        NKind::Modify(_) => Some(NotifyAction::Changed),
        NKind::Access(AccessKind::Close(AccessMode::Write)) => {
            Some(NotifyAction::ChangesDoneHint)
        }
        _ => None,
    }
}

fn covers(watched: &Path, changed: &Path) -> bool {
    changed == watched || changed.parent() == Some(watched)
}

/// Fan one back-end event out to every descriptor whose watch covers it.
/// Renames become `moved` only for watches that asked; others get the
/// deleted/created pair.
fn translate(event: &notify::Event, entries: &HashMap<u32, WatchEntry>) -> Vec<(u32, NotifyInfo)> {
    let Some(action) = classify(&event.kind) else {
        return Vec::new();
    };
    let Some(file) = event.paths.first() else {
        return Vec::new();
    };
    let other = event.paths.get(1);

    let mut out = Vec::new();
    for (&descriptor, entry) in entries {
        if !covers(&entry.path, file) {
            continue;
        }
        if action == NotifyAction::Moved && !entry.flags.contains(WatchFlags::SEND_MOVED) {
            out.push((
                descriptor,
                NotifyInfo {
                    action: NotifyAction::Deleted,
                    file: file.clone(),
                    other: None,
                },
            ));
            if let Some(other) = other {
                out.push((
                    descriptor,
                    NotifyInfo {
                        action: NotifyAction::Created,
                        file: other.clone(),
                        other: None,
                    },
                ));
            }
            continue;
        }
        out.push((
            descriptor,
            NotifyInfo {
                action,
                file: file.clone(),
                other: if action == NotifyAction::Moved {
                    other.cloned()
                } else {
                    None
                },
            },
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RenameMode};
    use pretty_assertions::assert_eq;

    fn entry_table(path: &Path, flags: WatchFlags) -> HashMap<u32, WatchEntry> {
        let mut table = HashMap::new();
        table.insert(
            7,
            WatchEntry {
                path: path.to_path_buf(),
                flags,
            },
        );
        table
    }

    #[test]
    fn classification_covers_the_action_set() {
        assert_eq!(
            classify(&NKind::Create(CreateKind::File)),
            Some(NotifyAction::Created)
        );
        assert_eq!(
            classify(&NKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(NotifyAction::Changed)
        );
        assert_eq!(
            classify(&NKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            Some(NotifyAction::AttributeChanged)
        );
        assert_eq!(
            classify(&NKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(NotifyAction::Moved)
        );
        assert_eq!(
            classify(&NKind::Access(AccessKind::Close(AccessMode::Write))),
            Some(NotifyAction::ChangesDoneHint)
        );
        assert_eq!(classify(&NKind::Access(AccessKind::Open(AccessMode::Read))), None);
    }

    #[test]
    fn rename_respects_send_moved_flag() {
        let dir = PathBuf::from("/tmp/w");
        let mut event = notify::Event::new(NKind::Modify(ModifyKind::Name(RenameMode::Both)));
        event.paths = vec![dir.join("a"), dir.join("b")];

        let with_flag = translate(&event, &entry_table(&dir, WatchFlags::SEND_MOVED));
        assert_eq!(with_flag.len(), 1);
        assert_eq!(with_flag[0].1.action, NotifyAction::Moved);
        assert_eq!(with_flag[0].1.other, Some(dir.join("b")));

        let without = translate(&event, &entry_table(&dir, WatchFlags::empty()));
        let actions: Vec<NotifyAction> = without.iter().map(|(_, i)| i.action).collect();
        assert_eq!(actions, vec![NotifyAction::Deleted, NotifyAction::Created]);
    }

    #[test]
    fn events_outside_the_watch_are_ignored() {
        let mut event = notify::Event::new(NKind::Create(CreateKind::File));
        event.paths = vec![PathBuf::from("/elsewhere/x")];
        let out = translate(&event, &entry_table(Path::new("/tmp/w"), WatchFlags::empty()));
        assert!(out.is_empty());
    }

    #[test]
    fn add_and_rm_watch_bookkeeping() {
        let kboard = Arc::new(Kboard::new(16));
        let mut watcher = FileWatcher::new(kboard).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let a = watcher.add_watch(dir.path(), WatchFlags::SEND_MOVED).unwrap();
        let b = watcher.add_watch(dir.path(), WatchFlags::empty()).unwrap();
        assert_ne!(a, b);

        watcher.rm_watch(a).unwrap();
        watcher.rm_watch(b).unwrap();
        let err = watcher.rm_watch(b).unwrap_err();
        assert!(matches!(err, EdError::FileError { .. }));

        let missing = dir.path().join("definitely/not/here");
        assert!(matches!(
            watcher.add_watch(&missing, WatchFlags::empty()),
            Err(EdError::FileError { .. })
        ));
    }
}
