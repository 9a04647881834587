//! Change classification for path events.
//!
//! This module provides the [`ChangeKind`] enum together with the coalescing
//! rule used when several notifications for the same path land in one
//! latency window.

use serde::{Deserialize, Serialize};

/// What happened to a path, as far as the backend could tell.
///
/// [`Unknown`](Self::Unknown) is a regular, permanent value: some backends
/// cannot classify every change, and that is not an error.
///
/// # Examples
///
/// ```
/// use pw_core::ChangeKind;
///
/// let kind = ChangeKind::Created.coalesce(ChangeKind::Modified);
/// assert_eq!(kind, ChangeKind::Modified);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The path was created.
    Created,

    /// The contents or metadata of the path changed.
    Modified,

    /// The path was removed.
    Removed,

    /// The path is the old name of a rename.
    RenamedFrom,

    /// The path is the new name of a rename.
    RenamedTo,

    /// The backend reported a change it could not classify.
    #[default]
    Unknown,
}

impl ChangeKind {
    /// All variants, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Modified,
        Self::Removed,
        Self::RenamedFrom,
        Self::RenamedTo,
        Self::Unknown,
    ];

    /// Merges an incoming kind into the kind already pending for a path.
    ///
    /// Known kinds follow last-kind-wins, so a removal dominates whatever was
    /// pending before it and a creation after a removal starts over.
    /// [`Unknown`](Self::Unknown) never overwrites a known kind, while a known
    /// kind always replaces [`Unknown`](Self::Unknown).
    ///
    /// # Examples
    ///
    /// ```
    /// use pw_core::ChangeKind;
    ///
    /// assert_eq!(ChangeKind::Modified.coalesce(ChangeKind::Removed), ChangeKind::Removed);
    /// assert_eq!(ChangeKind::Removed.coalesce(ChangeKind::Created), ChangeKind::Created);
    /// assert_eq!(ChangeKind::Created.coalesce(ChangeKind::Unknown), ChangeKind::Created);
    /// assert_eq!(ChangeKind::Unknown.coalesce(ChangeKind::Modified), ChangeKind::Modified);
    /// ```
    #[inline]
    #[must_use]
    pub const fn coalesce(self, incoming: Self) -> Self {
        match incoming {
            Self::Unknown => self,
            known => known,
        }
    }

    /// Folds a sequence of kinds left to right with [`coalesce`](Self::coalesce).
    ///
    /// Returns `None` for an empty sequence.
    #[must_use]
    pub fn fold(kinds: impl IntoIterator<Item = Self>) -> Option<Self> {
        kinds.into_iter().reduce(Self::coalesce)
    }

    /// Returns `true` when a pending entry of kind `self` should be treated
    /// as a fresh entry once `incoming` arrives.
    ///
    /// This is the removed-then-created case: the path disappeared and a new
    /// one took its place.
    #[inline]
    #[must_use]
    pub const fn restarts_with(self, incoming: Self) -> bool {
        matches!((self, incoming), (Self::Removed, Self::Created))
    }

    /// Returns `true` unless this is [`Unknown`](Self::Unknown).
    #[inline]
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Returns a short lowercase label.
    ///
    /// The label matches the serialized form.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::RenamedFrom => "renamed_from",
            Self::RenamedTo => "renamed_to",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
