//! Filesystem watch on the registry directory.
//!
//! The directory itself is watched for entry changes and its parent for
//! replacement of the directory. When the directory does not exist the
//! nearest existing ancestor is watched instead, so its creation is noticed
//! and the watch moves down once it appears.

use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

const REARM_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryChange {
    Created,
    Modified,
    Removed,
}

/// A change relevant to the registry, stripped of backend detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// An entry directly inside the directory changed.
    Entry {
        change: EntryChange,
        name: Option<String>,
    },
    /// The directory (or a path leading to it) was created, removed or
    /// replaced, or the backend lost track of events.
    IdentityChanged,
}

pub struct DirectoryWatcher {
    directory: PathBuf,
    watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl DirectoryWatcher {
    /// Starts watching `directory`; backend events are forwarded unfiltered to `events`.
    pub fn new(
        directory: &Path,
        events: UnboundedSender<notify::Result<Event>>,
    ) -> notify::Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = events.send(res);
            },
            Config::default(),
        )?;

        let mut this = Self {
            directory: directory.to_path_buf(),
            watcher,
            watched: Vec::new(),
        };
        this.rearm()?;
        Ok(this)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Paths currently registered with the backend.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    pub fn classify(&self, event: &Event) -> Option<RawEvent> {
        classify_event(&self.directory, event)
    }

    /// Drops every watch and registers the targets matching the current
    /// state of the filesystem.
    pub fn rearm(&mut self) -> notify::Result<()> {
        let mut last_error = None;

        for _ in 0..REARM_ATTEMPTS {
            for path in self.watched.drain(..) {
                let _ = self.watcher.unwatch(&path);
            }

            match self.watch_targets() {
                Ok(()) => {
                    debug!(watched = ?self.watched, "Directory watch armed");
                    return Ok(());
                }
                // The tree moved under us between probing and watching.
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| notify::Error::generic("unable to arm directory watch")))
    }

    fn watch_targets(&mut self) -> notify::Result<()> {
        for path in watch_targets(&self.directory) {
            self.watcher.watch(&path, RecursiveMode::NonRecursive)?;
            self.watched.push(path);
        }
        Ok(())
    }
}

fn watch_targets(directory: &Path) -> Vec<PathBuf> {
    if directory.is_dir() {
        let mut targets = vec![directory.to_path_buf()];
        if let Some(parent) = directory.parent().filter(|parent| parent.is_dir()) {
            targets.push(parent.to_path_buf());
        }
        return targets;
    }

    directory
        .ancestors()
        .skip(1)
        .find(|ancestor| ancestor.is_dir())
        .map(|ancestor| vec![ancestor.to_path_buf()])
        .unwrap_or_default()
}

/// Maps a backend event to what it means for `directory`.
///
/// Read-only access is ignored so that merging never feeds back into the
/// watch. Events about unrelated siblings of the directory are dropped.
pub fn classify_event(directory: &Path, event: &Event) -> Option<RawEvent> {
    if event.need_rescan() {
        return Some(RawEvent::IdentityChanged);
    }

    let change = match &event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => EntryChange::Modified,
        EventKind::Access(_) => return None,
        EventKind::Create(_) => EntryChange::Created,
        EventKind::Remove(_) => EntryChange::Removed,
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => EntryChange::Modified,
    };

    let mut entry = None;
    for path in &event.paths {
        if directory.starts_with(path) {
            return Some(RawEvent::IdentityChanged);
        }
        if path.parent() == Some(directory) {
            entry = Some(RawEvent::Entry {
                change,
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
            });
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn entry_inside_directory() {
        let dir = Path::new("/etc/machinesd/machines.d");
        let raw = classify_event(
            dir,
            &event(
                EventKind::Create(CreateKind::File),
                "/etc/machinesd/machines.d/99-webui.json",
            ),
        );
        assert_eq!(
            raw,
            Some(RawEvent::Entry {
                change: EntryChange::Created,
                name: Some("99-webui.json".to_string()),
            })
        );
    }

    #[test]
    fn directory_removal_is_identity_change() {
        let dir = Path::new("/etc/machinesd/machines.d");
        let raw = classify_event(
            dir,
            &event(EventKind::Remove(RemoveKind::Folder), "/etc/machinesd/machines.d"),
        );
        assert_eq!(raw, Some(RawEvent::IdentityChanged));
    }

    #[test]
    fn ancestor_creation_is_identity_change() {
        let dir = Path::new("/etc/machinesd/machines.d");
        let raw = classify_event(
            dir,
            &event(EventKind::Create(CreateKind::Folder), "/etc/machinesd"),
        );
        assert_eq!(raw, Some(RawEvent::IdentityChanged));
    }

    #[test]
    fn sibling_of_directory_is_ignored() {
        let dir = Path::new("/etc/machinesd/machines.d");
        let raw = classify_event(
            dir,
            &event(EventKind::Modify(ModifyKind::Any), "/etc/machinesd/other.conf"),
        );
        assert_eq!(raw, None);
    }

    #[test]
    fn nested_entry_is_ignored() {
        let dir = Path::new("/srv/machines.d");
        let raw = classify_event(
            dir,
            &event(EventKind::Create(CreateKind::File), "/srv/machines.d/sub/x.json"),
        );
        assert_eq!(raw, None);
    }

    #[test]
    fn read_access_is_ignored() {
        let dir = Path::new("/srv/machines.d");
        let raw = classify_event(
            dir,
            &event(
                EventKind::Access(AccessKind::Close(AccessMode::Read)),
                "/srv/machines.d/a.json",
            ),
        );
        assert_eq!(raw, None);
    }

    #[test]
    fn targets_for_existing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("machines.d");
        std::fs::create_dir(&dir).unwrap();

        assert_eq!(watch_targets(&dir), vec![dir.clone(), temp.path().to_path_buf()]);
    }

    #[test]
    fn targets_fall_back_to_nearest_ancestor() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a").join("b").join("machines.d");

        assert_eq!(watch_targets(&dir), vec![temp.path().to_path_buf()]);
    }
}
