//! Raw and normalized path events.
//!
//! # Event Flow
//!
//! ```text
//! native backend ──► RawEvent ──► pending batch ──► NormalizedEvent ──► sink
//!                  (sequence)    (coalesced)       (observed_at)
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::kind::ChangeKind;

/// A notification as delivered by a native event source.
///
/// `sequence` orders events within and across native batches. Sources that
/// do not carry their own identifiers synthesize one.
///
/// # Examples
///
/// ```
/// use pw_core::{ChangeKind, RawEvent};
///
/// let raw = RawEvent::new("/tmp/a", ChangeKind::Modified, 1);
/// assert_eq!(raw.path.as_str(), "/tmp/a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawEvent {
    /// The path the backend reported.
    pub path: Utf8PathBuf,

    /// What happened to the path.
    pub kind: ChangeKind,

    /// Monotonically increasing identifier assigned by the source.
    pub sequence: u64,
}

impl RawEvent {
    /// Creates a raw event.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, kind: ChangeKind, sequence: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            sequence,
        }
    }
}

/// A coalesced change delivered to a sink.
///
/// Each flush contains at most one `NormalizedEvent` per path. Once emitted
/// the event is never touched again.
///
/// # Examples
///
/// ```
/// use pw_core::{ChangeKind, NormalizedEvent};
/// use camino::Utf8PathBuf;
///
/// let event = NormalizedEvent::now(Utf8PathBuf::from("/srv/app/main.rs"), ChangeKind::Created);
/// assert_eq!(event.file_name(), Some("main.rs"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// The path that changed.
    pub path: Utf8PathBuf,

    /// The coalesced kind for this flush.
    pub kind: ChangeKind,

    /// Wall-clock time the first raw event for this path in the batch was
    /// observed. Serialized as milliseconds since the Unix epoch.
    #[serde(rename = "observed_at_ms", with = "unix_millis")]
    pub observed_at: SystemTime,
}

impl NormalizedEvent {
    /// Creates an event with an explicit observation time.
    #[inline]
    #[must_use]
    pub const fn new(path: Utf8PathBuf, kind: ChangeKind, observed_at: SystemTime) -> Self {
        Self {
            path,
            kind,
            observed_at,
        }
    }

    /// Creates an event observed right now.
    #[inline]
    #[must_use]
    pub fn now(path: Utf8PathBuf, kind: ChangeKind) -> Self {
        Self::new(path, kind, SystemTime::now())
    }

    /// Returns the final path component, if any.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the changed path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Milliseconds since the Unix epoch at which the change was observed.
    ///
    /// Times before the epoch clamp to zero.
    #[must_use]
    pub fn observed_at_ms(&self) -> u64 {
        unix_millis::to_millis(self.observed_at)
    }
}

mod unix_millis {
    use super::{Duration, SystemTime, UNIX_EPOCH};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn to_millis(time: SystemTime) -> u64 {
        time.duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis(*time))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}
