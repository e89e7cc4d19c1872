//! Repository discovery
//!
//! Walks a directory tree from a root and yields every git repository found,
//! depth-limited, never descending into a repository once its root has been
//! identified. Nested repositories (submodules checked out as plain
//! subdirectories, vendored clones) are therefore never reported twice.
//!
//! ```text
//! root/                 depth 0
//!   team-a/             depth 1
//!     service/          depth 2   <- repository, yielded
//!       vendor/lib/     (never visited)
//!   scratch/            depth 1
//! ```
//!
//! Symlinked directories are opaque unless `follow_symlinks` is enabled, in
//! which case walkdir's loop detection reports cycles as unreadable entries.

use anyhow::{bail, Context, Result};
use path_clean::PathClean;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::git::is_repository_root;

/// A discovered repository. Identity is the absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RepositoryHandle {
    path: PathBuf,
}

impl RepositoryHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// One item produced by the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
    /// A repository root
    Repository(RepositoryHandle),
    /// A directory below the depth limit that still had subdirectories
    DepthLimitReached(PathBuf),
    /// A directory that could not be read; the walk continues without it
    Unreadable { path: PathBuf, error: String },
}

/// Depth-bounded repository walker rooted at one directory
#[derive(Debug, Clone)]
pub struct RepositoryLocator {
    root: PathBuf,
    max_depth: usize,
    follow_symlinks: bool,
}

impl RepositoryLocator {
    /// Create a locator for `root`.
    ///
    /// Fails when `root` does not resolve to a readable directory; this is
    /// the only walk condition that is fatal for a whole run.
    pub fn new(root: impl AsRef<Path>, max_depth: usize) -> Result<Self> {
        let root = absolutize(root.as_ref())?;

        let metadata = std::fs::metadata(&root)
            .with_context(|| format!("Root path {} is not accessible", root.display()))?;
        if !metadata.is_dir() {
            bail!("Root path {} is not a directory", root.display());
        }
        std::fs::read_dir(&root)
            .with_context(|| format!("Root directory {} is not readable", root.display()))?;

        Ok(Self {
            root,
            max_depth,
            follow_symlinks: false,
        })
    }

    /// Traverse symlinked directories instead of treating them as opaque
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Start a fresh walk. Each call restarts from the root.
    pub fn locate(&self) -> Locate {
        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        Locate {
            walker,
            max_depth: self.max_depth,
        }
    }

    /// Convenience: only the repositories, warnings dropped
    pub fn repositories(&self) -> impl Iterator<Item = RepositoryHandle> {
        self.locate().filter_map(|item| match item {
            Discovered::Repository(handle) => Some(handle),
            _ => None,
        })
    }
}

/// Lazy walk produced by [`RepositoryLocator::locate`]
pub struct Locate {
    walker: walkdir::IntoIter,
    max_depth: usize,
}

impl Iterator for Locate {
    type Item = Discovered;

    fn next(&mut self) -> Option<Discovered> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!("Skipping unreadable directory {}: {}", path.display(), err);
                    return Some(Discovered::Unreadable {
                        path,
                        error: err.to_string(),
                    });
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();

            if is_repository_root(path) {
                self.walker.skip_current_dir();
                debug!("Found repository: {}", path.display());
                return Some(Discovered::Repository(RepositoryHandle::new(path)));
            }

            if entry.depth() > self.max_depth {
                self.walker.skip_current_dir();
                if has_subdirectories(path) {
                    warn!(
                        "Depth limit {} reached at {}, not descending further",
                        self.max_depth,
                        path.display()
                    );
                    return Some(Discovered::DepthLimitReached(path.to_path_buf()));
                }
            }
        }
    }
}

fn has_subdirectories(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|entries| {
            entries
                .flatten()
                .any(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        })
        .unwrap_or(false)
}

/// Expand `~`/`$VAR`, make absolute against the current directory and
/// normalize `.`/`..` without resolving symlinks
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(&path.to_string_lossy())
        .with_context(|| format!("Failed to expand path {}", path.display()))?
        .into_owned();
    let expanded = PathBuf::from(expanded);

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .context("Failed to determine current directory")?
            .join(expanded)
    };

    Ok(absolute.clean())
}
