//! The pending batch accumulated during one latency window.

use std::collections::hash_map::Entry;
use std::time::SystemTime;

use camino::Utf8PathBuf;
use pw_core::{ChangeKind, NormalizedEvent, RawEvent};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: ChangeKind,
    first_sequence: u64,
    observed_at: SystemTime,
}

/// Path to most-recent kind, plus what is needed to order the flush.
///
/// Every operation is an O(1) amortized map upsert except
/// [`into_events`](Self::into_events), which runs outside any lock.
#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    entries: FxHashMap<Utf8PathBuf, Pending>,
}

impl PendingBatch {
    /// Merges `raw` into the batch. Returns `true` if the path was new.
    pub(crate) fn upsert(&mut self, raw: RawEvent, observed_at: SystemTime) -> bool {
        match self.entries.entry(raw.path) {
            Entry::Occupied(mut slot) => {
                let pending = slot.get_mut();
                if pending.kind.restarts_with(raw.kind) {
                    *pending = Pending {
                        kind: raw.kind,
                        first_sequence: raw.sequence,
                        observed_at,
                    };
                } else {
                    pending.kind = pending.kind.coalesce(raw.kind);
                    pending.first_sequence = pending.first_sequence.min(raw.sequence);
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Pending {
                    kind: raw.kind,
                    first_sequence: raw.sequence,
                    observed_at,
                });
                true
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swaps the batch for an empty one.
    pub(crate) fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Converts the batch into events ordered by first-seen sequence.
    ///
    /// Equal sequences (two paths from one synthesized batch never share one,
    /// but foreign sources might) fall back to path order so the output stays
    /// deterministic.
    pub(crate) fn into_events(self) -> Vec<NormalizedEvent> {
        let mut entries: Vec<(Utf8PathBuf, Pending)> = self.entries.into_iter().collect();
        entries.sort_unstable_by(|(a_path, a), (b_path, b)| {
            a.first_sequence
                .cmp(&b.first_sequence)
                .then_with(|| a_path.cmp(b_path))
        });
        entries
            .into_iter()
            .map(|(path, pending)| NormalizedEvent::new(path, pending.kind, pending.observed_at))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_core::ChangeKind::{Created, Modified, Removed, RenamedTo, Unknown};

    fn kinds(batch: PendingBatch) -> Vec<(String, ChangeKind)> {
        batch
            .into_events()
            .into_iter()
            .map(|e| (e.path.into_string(), e.kind))
            .collect()
    }

    #[test]
    fn test_one_entry_per_path() {
        let mut batch = PendingBatch::default();
        let now = SystemTime::now();
        assert!(batch.upsert(RawEvent::new("/a", Modified, 1), now));
        assert!(!batch.upsert(RawEvent::new("/a", Removed, 2), now));

        assert_eq!(batch.len(), 1);
        assert_eq!(kinds(batch), vec![("/a".to_owned(), Removed)]);
    }

    #[test]
    fn test_orders_by_first_seen_sequence() {
        let mut batch = PendingBatch::default();
        let now = SystemTime::now();
        batch.upsert(RawEvent::new("/b", Created, 1), now);
        batch.upsert(RawEvent::new("/a", Created, 2), now);
        batch.upsert(RawEvent::new("/b", Modified, 3), now);

        assert_eq!(
            kinds(batch),
            vec![("/b".to_owned(), Modified), ("/a".to_owned(), Created)]
        );
    }

    #[test]
    fn test_out_of_order_sequences_use_smallest() {
        let mut batch = PendingBatch::default();
        let now = SystemTime::now();
        batch.upsert(RawEvent::new("/a", Modified, 10), now);
        batch.upsert(RawEvent::new("/b", Modified, 5), now);
        batch.upsert(RawEvent::new("/a", Unknown, 2), now);

        let order: Vec<_> = kinds(batch).into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["/a", "/b"]);
    }

    #[test]
    fn test_recreate_after_remove_is_fresh_entry() {
        let mut batch = PendingBatch::default();
        let earlier = SystemTime::UNIX_EPOCH;
        let later = SystemTime::now();
        batch.upsert(RawEvent::new("/a", Removed, 1), earlier);
        batch.upsert(RawEvent::new("/b", Modified, 2), earlier);
        batch.upsert(RawEvent::new("/a", Created, 3), later);

        let events = batch.into_events();
        assert_eq!(events[0].path.as_str(), "/b");
        assert_eq!(events[1].path.as_str(), "/a");
        assert_eq!(events[1].kind, Created);
        assert_eq!(events[1].observed_at, later);
    }

    #[test]
    fn test_unknown_keeps_known_kind() {
        let mut batch = PendingBatch::default();
        let now = SystemTime::now();
        batch.upsert(RawEvent::new("/a", RenamedTo, 1), now);
        batch.upsert(RawEvent::new("/a", Unknown, 2), now);
        assert_eq!(kinds(batch), vec![("/a".to_owned(), RenamedTo)]);
    }

    #[test]
    fn test_take_leaves_empty_batch() {
        let mut batch = PendingBatch::default();
        batch.upsert(RawEvent::new("/a", Created, 1), SystemTime::now());

        let taken = batch.take();
        assert!(batch.is_empty());
        assert_eq!(taken.len(), 1);
    }

    #[test]
    fn test_equal_sequences_fall_back_to_path() {
        let mut batch = PendingBatch::default();
        let now = SystemTime::now();
        batch.upsert(RawEvent::new("/z", Created, 1), now);
        batch.upsert(RawEvent::new("/m", Created, 1), now);

        let order: Vec<_> = kinds(batch).into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["/m", "/z"]);
    }
}
