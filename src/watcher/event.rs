//! Filesystem change events as the coordinator sees them.

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// What happened to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    /// Moved away; `to` is the destination when the watch facility knows it.
    Moved { to: Option<PathBuf> },
}

/// A single change notification for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    #[must_use]
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Created,
        }
    }

    #[must_use]
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Modified,
        }
    }

    #[must_use]
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Deleted,
        }
    }

    #[must_use]
    pub fn moved(from: impl Into<PathBuf>, to: Option<PathBuf>) -> Self {
        Self {
            path: from.into(),
            kind: FileEventKind::Moved { to },
        }
    }

    /// Translate a raw notify event into zero or more file events.
    ///
    /// Access and metadata-only events are dropped.
    #[must_use]
    pub fn from_notify(event: &Event) -> Vec<Self> {
        let paths = event.paths.iter().cloned();
        match event.kind {
            EventKind::Create(_) => paths.map(Self::created).collect(),
            EventKind::Remove(_) => paths.map(Self::deleted).collect(),
            EventKind::Modify(ModifyKind::Metadata(_))
            | EventKind::Access(_)
            | EventKind::Other => Vec::new(),
            EventKind::Modify(ModifyKind::Name(mode)) => Self::from_rename(mode, &event.paths),
            EventKind::Modify(_) | EventKind::Any => paths.map(Self::modified).collect(),
        }
    }

    fn from_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<Self> {
        match (mode, paths) {
            (RenameMode::Both, [from, to, ..]) => vec![Self::moved(from.clone(), Some(to.clone()))],
            (RenameMode::From, _) => paths.iter().map(|p| Self::moved(p.clone(), None)).collect(),
            (RenameMode::To, _) => paths.iter().cloned().map(Self::modified).collect(),
            // Platforms that cannot tell the two ends apart: whatever still
            // exists is the destination.
            _ => paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        Self::modified(p.clone())
                    } else {
                        Self::moved(p.clone(), None)
                    }
                })
                .collect(),
        }
    }
}
