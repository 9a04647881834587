//! Error types for the pw-watcher crate.
//!
//! This module provides [`WatchError`] for failures of a watch session and
//! [`SinkError`] for failures while delivering events to a sink.

use camino::Utf8PathBuf;

/// Errors that can occur while delivering normalized events to a sink.
///
/// Sink errors are the sink's concern: the normalizer does not retry them.
/// They surface as [`WatchError::Sink`] from whichever call triggered the
/// flush.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing to the underlying stream failed.
    #[error("failed to write events: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialized.
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The receiving side of a channel sink is gone.
    #[error("sink receiver closed")]
    Closed,

    /// Any other sink-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Errors that can occur during a watch session.
///
/// # Error Recovery Strategy
///
/// - **Invalid target** ([`WatchError::InvalidTarget`]): Fatal to `start`
/// - **Not watchable** ([`WatchError::PathNotWatchable`]): Fatal - backend refused the path
/// - **Overflow** ([`WatchError::BackendOverflow`]): Recoverable - state may be stale, caller may rescan
/// - **Target removed** ([`WatchError::TargetRemoved`]): Fatal - nothing left to watch
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - event skipped
/// - Everything else: Fatal
///
/// The normalizer never retries; errors reach the caller exactly as the
/// source reported them.
///
/// # Examples
///
/// ```
/// use pw_watcher::WatchError;
///
/// fn handle_error(err: &WatchError) {
///     if err.is_recoverable() {
///         eprintln!("warning: {err}");
///     } else {
///         eprintln!("fatal: {err}");
///     }
/// }
/// # handle_error(&WatchError::BackendOverflow { path: None });
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The target does not exist or is not accessible at start time.
    #[error("invalid watch target: {0}")]
    InvalidTarget(Utf8PathBuf),

    /// The native backend refused to watch the path.
    #[error("path cannot be watched: {path}: {reason}")]
    PathNotWatchable {
        /// The path the backend refused.
        path: Utf8PathBuf,
        /// Human-readable reason.
        reason: String,
        /// The backend error, when there is one.
        #[source]
        source: Option<notify::Error>,
    },

    /// The watched target was deleted after the watch started.
    #[error("watch target removed: {0}")]
    TargetRemoved(Utf8PathBuf),

    /// The backend dropped events it could not buffer.
    #[error("backend overflow: events were dropped and the watched state may be stale")]
    BackendOverflow {
        /// The path the overflow was reported for, if the backend named one.
        path: Option<Utf8PathBuf>,
    },

    /// The native backend reported an error after the watch started.
    #[error("notify backend error: {0}")]
    Backend(#[from] notify::Error),

    /// A sink failed to accept a flush.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// A non-zero latency was requested outside a tokio runtime.
    #[error("a tokio runtime is required for a non-zero latency window")]
    NoRuntime,

    /// The error channel was closed unexpectedly.
    #[error("event channel closed unexpectedly")]
    ChannelClosed,

    /// A backend reported a path that is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl WatchError {
    /// Creates a new [`WatchError::InvalidTarget`] error.
    #[inline]
    pub fn invalid_target(path: impl Into<Utf8PathBuf>) -> Self {
        Self::InvalidTarget(path.into())
    }

    /// Creates a [`WatchError::PathNotWatchable`] from a backend error.
    pub fn not_watchable(path: impl Into<Utf8PathBuf>, source: notify::Error) -> Self {
        Self::PathNotWatchable {
            path: path.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a [`WatchError::PathNotWatchable`] with only a reason.
    pub fn not_watchable_reason(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::PathNotWatchable {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Returns `true` if watching can continue after this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::BackendOverflow { .. } | Self::NonUtf8Path(_))
    }

    /// Returns `true` if this error should end the watch.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns `true` for errors about the watched path itself.
    ///
    /// These are the errors a command-line front end reports as an invalid path.
    #[inline]
    #[must_use]
    pub const fn is_target_error(&self) -> bool {
        matches!(self, Self::InvalidTarget(_) | Self::PathNotWatchable { .. })
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::InvalidTarget(path) | Self::PathNotWatchable { path, .. } | Self::TargetRemoved(path) => {
                Some(path)
            }
            Self::BackendOverflow { path } => path.as_ref(),
            Self::Backend(_)
            | Self::Sink(_)
            | Self::NoRuntime
            | Self::ChannelClosed
            | Self::NonUtf8Path(_) => None,
        }
    }
}
