//! Path filtering for raw events.
//!
//! Filters run on the notification thread before the pending batch is
//! touched, so excluded paths never cost a lock.
//!
//! Filters see the path **relative to the watch target** when the path lies
//! inside it (the target itself is the empty path), and the path as reported
//! otherwise.
//!
//! # Examples
//!
//! ```
//! use pw_watcher::{ExcludeFilter, FileFilter};
//! use camino::Utf8Path;
//!
//! let filter = ExcludeFilter::new([".git", "build/out"]);
//!
//! assert!(filter.should_process(Utf8Path::new("src/main.rs")));
//! assert!(!filter.should_process(Utf8Path::new(".git/index")));
//! assert!(!filter.should_process(Utf8Path::new("vendor/.git/HEAD")));
//! assert!(!filter.should_process(Utf8Path::new("build/out/app")));
//! assert!(filter.should_process(Utf8Path::new("build/src/app")));
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use smallvec::SmallVec;

/// A filter for determining which paths to process.
///
/// # Thread Safety
///
/// Filters must be [`Send`] and [`Sync`] because the notification thread
/// calls them, and `'static` because they live as long as the session.
///
/// # Examples
///
/// ```
/// use pw_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct NoSwapFiles;
///
/// impl FileFilter for NoSwapFiles {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         path.extension() != Some("swp")
///     }
/// }
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if events for `path` should reach the pending batch.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Drops paths matching any of a set of exclusion patterns.
///
/// A pattern containing a `/` is a prefix of the relative path, compared
/// component by component (`build/out` excludes `build/out/app` but not
/// `build/outer`). A pattern without a `/` excludes any path that has it as
/// one of its components (`.git` excludes `.git/HEAD` and `sub/.git/HEAD`).
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    prefixes: SmallVec<[Utf8PathBuf; 4]>,
    segments: SmallVec<[String; 4]>,
}

impl ExcludeFilter {
    /// Creates a filter from a list of patterns.
    ///
    /// Leading `./` and trailing `/` are ignored; blank patterns are skipped.
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .fold(Self::default(), |filter, pattern| filter.exclude(pattern.as_ref()))
    }

    /// Adds one exclusion pattern.
    #[must_use]
    pub fn exclude(mut self, pattern: &str) -> Self {
        let pattern = pattern.trim();
        let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
        let pattern = pattern.trim_end_matches('/');
        if pattern.is_empty() {
            return self;
        }

        if pattern.contains('/') {
            self.prefixes.push(Utf8PathBuf::from(pattern));
        } else if !self.segments.iter().any(|s| s == pattern) {
            self.segments.push(pattern.to_owned());
        }
        self
    }

    /// Returns `true` if no patterns were configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.segments.is_empty()
    }

    fn matches(&self, path: &Utf8Path) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
            || path
                .components()
                .any(|c| self.segments.iter().any(|s| s == c.as_str()))
    }
}

impl FileFilter for ExcludeFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        !self.matches(path)
    }
}

/// Accepts only paths with one of the given extensions.
///
/// # Examples
///
/// ```
/// use pw_watcher::{ExtensionFilter, FileFilter};
/// use camino::Utf8Path;
///
/// let filter = ExtensionFilter::new(&["rs", "toml"]);
/// assert!(filter.should_process(Utf8Path::new("src/lib.rs")));
/// assert!(!filter.should_process(Utf8Path::new("README.md")));
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: SmallVec<[String; 8]>,
}

impl ExtensionFilter {
    /// Creates a new extension filter.
    ///
    /// Extensions are given without the leading dot.
    #[must_use]
    pub fn new(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl FileFilter for ExtensionFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

/// Combines filters with AND logic.
///
/// An empty composite accepts everything.
pub struct CompositeFilter {
    filters: Vec<Box<dyn FileFilter>>,
}

impl CompositeFilter {
    /// Creates a new empty composite filter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Adds a filter to the composite.
    #[must_use]
    pub fn and<F: FileFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Default for CompositeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl FileFilter for CompositeFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.filters.iter().all(|f| f.should_process(path))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all_filter() {
        let filter = AcceptAllFilter;
        assert!(filter.should_process(Utf8Path::new("anything.txt")));
        assert!(filter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_exclude_segment_anywhere() {
        let filter = ExcludeFilter::new(["node_modules"]);
        assert!(!filter.should_process(Utf8Path::new("node_modules/pkg/index.js")));
        assert!(!filter.should_process(Utf8Path::new("web/node_modules/pkg")));
        assert!(filter.should_process(Utf8Path::new("web/node_modules_backup/pkg")));
    }

    #[test]
    fn test_exclude_prefix_is_component_wise() {
        let filter = ExcludeFilter::new(["build/out"]);
        assert!(!filter.should_process(Utf8Path::new("build/out")));
        assert!(!filter.should_process(Utf8Path::new("build/out/bin/app")));
        assert!(filter.should_process(Utf8Path::new("build/outer/app")));
        assert!(filter.should_process(Utf8Path::new("src/build/out/app")));
    }

    #[test]
    fn test_exclude_normalizes_patterns() {
        let filter = ExcludeFilter::new(["./logs/", "  ", "tmp/"]);
        assert!(!filter.should_process(Utf8Path::new("logs/today.log")));
        assert!(!filter.should_process(Utf8Path::new("cache/tmp/x")));
        assert!(!filter.is_empty());

        assert!(ExcludeFilter::new(["", " / "]).is_empty());
    }

    #[test]
    fn test_exclude_target_itself_is_processed() {
        let filter = ExcludeFilter::new([".git"]);
        assert!(filter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_extension_filter() {
        let filter = ExtensionFilter::new(&["rs", "toml"]);
        assert!(filter.should_process(Utf8Path::new("src/main.rs")));
        assert!(filter.should_process(Utf8Path::new("Cargo.toml")));
        assert!(!filter.should_process(Utf8Path::new("Makefile")));
    }

    #[test]
    fn test_composite_filter() {
        let filter = CompositeFilter::new()
            .and(ExtensionFilter::new(&["rs"]))
            .and(ExcludeFilter::new(["target"]));

        assert!(filter.should_process(Utf8Path::new("src/main.rs")));
        assert!(!filter.should_process(Utf8Path::new("target/debug/build.rs")));
        assert!(!filter.should_process(Utf8Path::new("src/main.c")));
        assert!(CompositeFilter::new().should_process(Utf8Path::new("x")));
    }

    #[test]
    fn test_boxed_and_arc_filters() {
        let boxed: Box<dyn FileFilter> = Box::new(ExcludeFilter::new([".git"]));
        assert!(!boxed.should_process(Utf8Path::new(".git/HEAD")));

        let shared = std::sync::Arc::new(ExtensionFilter::new(&["md"]));
        assert!(shared.should_process(Utf8Path::new("README.md")));
    }
}
