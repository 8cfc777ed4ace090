//! Deny-list and path scoping for scans and watch events.
//!
//! The deny list is a set of name prefixes matched against the *first-level*
//! directory names under each volume root. Nested directories are never
//! checked against it: `/volume1/report/x` is denied by the prefix `rep`,
//! `/volume1/data/report/x` is not.
//!
//! Besides the deny list, a handful of component names are skipped anywhere
//! in the tree (`@eaDir` by default: Synology thumbnail directories).
//!
//! # Example
//!
//! ```
//! use voltrack::filter::{is_denied, PathFilter};
//! use std::path::{Path, PathBuf};
//!
//! assert!(is_denied("report", &["rep".to_string()]));
//! assert!(!is_denied("Report", &["rep".to_string()]));
//!
//! let filter = PathFilter::new(
//!     vec![PathBuf::from("/volume1")],
//!     vec!["report".to_string()],
//!     vec!["@eaDir".to_string()],
//! );
//! assert!(filter.admits(Path::new("/volume1/data/y.txt")));
//! assert!(!filter.admits(Path::new("/volume1/report/x.txt")));
//! ```

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Returns `true` iff `top_level_name` starts with any entry of `deny_list`.
///
/// Matching is case-sensitive. Empty entries are ignored, since an empty
/// prefix would deny every directory.
#[must_use]
pub fn is_denied(top_level_name: &str, deny_list: &[String]) -> bool {
    deny_list
        .iter()
        .any(|prefix| !prefix.is_empty() && top_level_name.starts_with(prefix.as_str()))
}

/// Volume membership plus deny/skip rules, shared by the walker and the watcher.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    volumes: Vec<PathBuf>,
    deny_list: Vec<String>,
    skip_components: Vec<String>,
}

impl PathFilter {
    /// Create a filter for the given volume roots.
    #[must_use]
    pub fn new(volumes: Vec<PathBuf>, deny_list: Vec<String>, skip_components: Vec<String>) -> Self {
        Self {
            volumes,
            deny_list,
            skip_components,
        }
    }

    /// Configured volume roots.
    #[must_use]
    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    /// Whether a top-level directory name is excluded.
    #[must_use]
    pub fn is_top_level_denied(&self, name: &OsStr) -> bool {
        // Non-UTF-8 names can't match a UTF-8 prefix list.
        name.to_str()
            .is_some_and(|name| is_denied(name, &self.deny_list))
    }

    /// Whether an entry name is skipped wherever it appears.
    #[must_use]
    pub fn is_skipped_name(&self, name: &OsStr) -> bool {
        self.skip_components.iter().any(|skip| OsStr::new(skip) == name)
    }

    /// The volume root `path` lives under, if any.
    ///
    /// When volumes nest, the deepest root wins.
    #[must_use]
    pub fn volume_for(&self, path: &Path) -> Option<&Path> {
        self.volumes
            .iter()
            .filter(|volume| path.starts_with(volume))
            .max_by_key(|volume| volume.components().count())
            .map(PathBuf::as_path)
    }

    /// Whether events/entries at `path` should reach the store.
    ///
    /// The path must be strictly inside a volume, its first component under
    /// the volume must not be denied, and no component may be a skipped name.
    #[must_use]
    pub fn admits(&self, path: &Path) -> bool {
        let Some(volume) = self.volume_for(path) else {
            return false;
        };
        let Ok(relative) = path.strip_prefix(volume) else {
            return false;
        };

        let mut components = relative.components().filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        });

        let Some(top_level) = components.next() else {
            // The volume root itself is never recorded.
            return false;
        };
        if self.is_top_level_denied(top_level) || self.is_skipped_name(top_level) {
            return false;
        }

        !components.any(|name| self.is_skipped_name(name))
    }

    /// Key used to keep events for the same subtree on the same watcher worker.
    ///
    /// Volume root joined with the first component below it.
    #[must_use]
    pub fn partition_key(&self, path: &Path) -> PathBuf {
        match self.volume_for(path) {
            Some(volume) => {
                let top = path
                    .strip_prefix(volume)
                    .ok()
                    .and_then(|rel| rel.components().next())
                    .map(|c| c.as_os_str().to_owned());
                match top {
                    Some(top) => volume.join(top),
                    None => volume.to_path_buf(),
                }
            }
            None => path.to_path_buf(),
        }
    }
}
