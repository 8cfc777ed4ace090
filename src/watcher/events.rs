//! Translation of raw notify events into inventory events.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::filter::PathFilter;

/// A filesystem change, as the inventory sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// An entry appeared
    Created(PathBuf),
    /// Content or metadata changed
    Modified(PathBuf),
    /// An entry disappeared
    Removed(PathBuf),
    /// Rename with both ends known
    Moved {
        /// Old path
        from: PathBuf,
        /// New path
        to: PathBuf,
    },
    /// Source half of a rename whose destination is unknown (left the watch)
    MovedFrom(PathBuf),
    /// Destination half of a rename whose source is unknown (entered the watch)
    MovedTo(PathBuf),
    /// The kernel dropped events; the store can no longer be trusted to follow
    Overflow,
}

impl WatchEvent {
    /// The path that decides which worker applies the event.
    #[must_use]
    pub fn primary_path(&self) -> Option<&Path> {
        match self {
            Self::Created(p)
            | Self::Modified(p)
            | Self::Removed(p)
            | Self::MovedFrom(p)
            | Self::MovedTo(p) => Some(p),
            Self::Moved { from, .. } => Some(from),
            Self::Overflow => None,
        }
    }

    /// Translate one notify event. Access events and unknown kinds yield
    /// nothing; multi-path events yield one event per path.
    #[must_use]
    pub fn from_notify(event: &Event) -> Vec<Self> {
        if event.need_rescan() {
            return vec![Self::Overflow];
        }

        let paths = event.paths.iter().cloned();
        match &event.kind {
            EventKind::Create(_) => paths.map(Self::Created).collect(),
            EventKind::Remove(_) => paths.map(Self::Removed).collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::Both => match event.paths.as_slice() {
                    [from, to] => vec![Self::Moved {
                        from: from.clone(),
                        to: to.clone(),
                    }],
                    _ => paths.map(by_existence).collect(),
                },
                RenameMode::From => paths.map(Self::MovedFrom).collect(),
                RenameMode::To => paths.map(Self::MovedTo).collect(),
                RenameMode::Any | RenameMode::Other => paths.map(by_existence).collect(),
            },
            EventKind::Modify(_) => paths.map(Self::Modified).collect(),
            // Backends that can't classify: let the current state decide
            EventKind::Any => paths
                .map(|p| {
                    if exists(&p) {
                        Self::Modified(p)
                    } else {
                        Self::Removed(p)
                    }
                })
                .collect(),
            EventKind::Access(_) | EventKind::Other => Vec::new(),
        }
    }

    /// Restrict the event to what `filter` admits.
    ///
    /// A rename that crosses the filter boundary keeps only the admitted
    /// side: leaving becomes a removal, entering becomes a creation.
    #[must_use]
    pub fn filtered(self, filter: &PathFilter) -> Option<Self> {
        match self {
            Self::Overflow => Some(Self::Overflow),
            Self::Moved { from, to } => match (filter.admits(&from), filter.admits(&to)) {
                (true, true) => Some(Self::Moved { from, to }),
                (true, false) => Some(Self::MovedFrom(from)),
                (false, true) => Some(Self::MovedTo(to)),
                (false, false) => None,
            },
            other => {
                let admitted = other.primary_path().is_some_and(|p| filter.admits(p));
                if admitted {
                    Some(other)
                } else {
                    None
                }
            }
        }
    }
}

fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Unpaired rename notification: created if the path is there now, else removed.
fn by_existence(path: PathBuf) -> WatchEvent {
    if exists(&path) {
        WatchEvent::Created(path)
    } else {
        WatchEvent::Removed(path)
    }
}
