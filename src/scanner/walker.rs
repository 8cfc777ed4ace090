//! Volume walker built on `walkdir`.
//!
//! # Overview
//!
//! The [`Walker`] traverses one volume root depth-first and yields a
//! [`FileEntry`] for every regular file and directory beneath it. The walk
//! is single-threaded and sorted by file name so that runs are
//! reproducible.
//!
//! # Pruning
//!
//! - Top-level names matching the deny list are skipped without descending
//! - Entry names listed in `skip_components` are skipped at any depth
//! - Symlinks are never followed and never reported
//! - Sockets, fifos and device nodes are ignored
//!
//! # Example
//!
//! ```no_run
//! use voltrack::filter::PathFilter;
//! use voltrack::scanner::Walker;
//! use std::path::{Path, PathBuf};
//!
//! let filter = PathFilter::new(
//!     vec![PathBuf::from("/volume1")],
//!     vec!["tmp".to_string()],
//!     vec!["@eaDir".to_string()],
//! );
//! let walker = Walker::new(Path::new("/volume1"), &filter);
//! let entries: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} entries", entries.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use super::{FileEntry, ScanError};
use crate::filter::PathFilter;

/// Depth-first walker over a single volume root.
#[derive(Debug)]
pub struct Walker<'a> {
    /// Root path to walk
    root: PathBuf,
    /// Deny list and skipped names
    filter: &'a PathFilter,
    /// Whether depth-1 entries are top-level names under a volume
    at_volume_root: bool,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl<'a> Walker<'a> {
    /// Create a new walker for `root`.
    ///
    /// `root` is normally a volume root. It may also be a directory inside a
    /// volume (the watcher walks newly created directories); the deny list
    /// then no longer applies to its children, which aren't top-level.
    #[must_use]
    pub fn new(root: &Path, filter: &'a PathFilter) -> Self {
        let at_volume_root = filter.volume_for(root).map_or(true, |volume| volume == root);
        Self {
            root: root.to_path_buf(),
            filter,
            at_volume_root,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set, the iterator ends at the next entry. Callers
    /// check the same flag afterwards to tell a partial walk from a
    /// complete one.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Verify the root exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`], [`ScanError::NotADirectory`] or the
    /// I/O error from stat.
    pub fn check_root(&self) -> Result<(), ScanError> {
        let metadata =
            std::fs::metadata(&self.root).map_err(|e| ScanError::from_io(&self.root, e))?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(ScanError::NotADirectory(self.root.clone()))
        }
    }

    /// Whether `entry` should be skipped along with its subtree.
    fn is_pruned(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name();
        if self.at_volume_root && entry.depth() == 1 && self.filter.is_top_level_denied(name) {
            log::debug!("Skipping denied entry: {}", entry.path().display());
            return true;
        }
        if self.filter.is_skipped_name(name) {
            log::trace!("Skipping {}", entry.path().display());
            return true;
        }
        false
    }

    /// Walk the tree, yielding files and directories.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration. Parents are always yielded before their children.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let mut entries = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_pruned(entry));

        std::iter::from_fn(move || loop {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }
            let result = match entries.next()? {
                Ok(entry) => self.process_entry(&entry),
                Err(e) => Some(Err(self.handle_walk_error(e))),
            };
            if result.is_some() {
                return result;
            }
        })
    }

    fn process_entry(&self, entry: &DirEntry) -> Option<Result<FileEntry, ScanError>> {
        let path = entry.path();

        if entry.path_is_symlink() {
            log::trace!("Skipping symlink: {}", path.display());
            return None;
        }

        if path.to_str().is_none() {
            log::warn!("Skipping non-UTF-8 path: {}", path.display());
            return Some(Err(ScanError::NonUtf8Path(path.to_path_buf())));
        }

        // walkdir reports symlink_metadata when not following links
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => return Some(Err(self.handle_walk_error(e))),
        };

        let observed = FileEntry::from_metadata(path.to_path_buf(), &metadata);
        if observed.is_none() {
            log::trace!("Skipping special file: {}", path.display());
        }
        observed.map(Ok)
    }

    fn handle_walk_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        let err = match error.into_io_error() {
            Some(io) => ScanError::from_io(&path, io),
            None => ScanError::Io {
                path: path.clone(),
                source: std::io::Error::other("filesystem loop detected"),
            },
        };
        match &err {
            ScanError::NotFound(_) => {
                log::debug!("Entry vanished during walk: {}", path.display());
            }
            _ => log::warn!("{err}"),
        }
        err
    }
}
