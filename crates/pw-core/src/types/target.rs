//! The path under observation.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};

/// One filesystem path under observation.
///
/// A target is immutable for the lifetime of a watch session. Use
/// [`resolve`](Self::resolve) to turn a user-supplied path into the absolute,
/// canonical form the watcher works with.
///
/// # Examples
///
/// ```
/// use pw_core::WatchTarget;
/// use camino::Utf8Path;
///
/// let target = WatchTarget::new("/srv/app");
/// assert_eq!(
///     target.relative(Utf8Path::new("/srv/app/src/main.rs")).map(|p| p.as_str()),
///     Some("src/main.rs"),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchTarget {
    path: Utf8PathBuf,
}

impl WatchTarget {
    /// Wraps a path without touching the filesystem.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the watched path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns `true` if the path currently exists and can be stat'ed.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.as_std_path().symlink_metadata().is_ok()
    }

    /// Returns `true` if the target is an existing directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.path.is_dir()
    }

    /// Canonicalizes the path, resolving symlinks and relative components.
    ///
    /// # Errors
    ///
    /// Fails if the path does not exist, is not accessible, or resolves to a
    /// non-UTF-8 path.
    pub fn resolve(&self) -> io::Result<Self> {
        self.path.canonicalize_utf8().map(Self::new)
    }

    /// Strips the target prefix from `path`.
    ///
    /// Returns `None` when `path` lies outside the target. The target itself
    /// maps to an empty path.
    #[must_use]
    pub fn relative<'a>(&self, path: &'a Utf8Path) -> Option<&'a Utf8Path> {
        path.strip_prefix(&self.path).ok()
    }
}

impl std::fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.path.fmt(f)
    }
}

impl AsRef<Utf8Path> for WatchTarget {
    fn as_ref(&self) -> &Utf8Path {
        &self.path
    }
}
