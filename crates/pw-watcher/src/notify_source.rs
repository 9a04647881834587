//! [`EventSource`] backed by the `notify` crate.
//!
//! `notify` picks the platform backend (inotify, FSEvents,
//! ReadDirectoryChangesW, kqueue) and calls us back on its own thread. Each
//! callback is one native batch and becomes one
//! [`SourceHandle::ingest_batch`] call.

use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pw_core::{ChangeKind, RawEvent, WatchConfig, WatchTarget};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::WatchError;
use crate::normalizer::SourceHandle;
use crate::source::EventSource;

/// The native event source for the current platform.
///
/// # Examples
///
/// ```no_run
/// use pw_watcher::{ChannelSink, NotifySource, Normalizer};
/// use pw_core::WatchTarget;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), pw_watcher::WatchError> {
/// let (sink, mut batches) = ChannelSink::new();
/// let _handle = Normalizer::new(Duration::from_millis(100))
///     .start(&WatchTarget::new("./src"), NotifySource::new(true), sink)?;
///
/// while let Some(batch) = batches.recv().await {
///     for event in batch {
///         println!("{} {}", event.kind, event.path);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct NotifySource {
    recursive: bool,
    watcher: Option<RecommendedWatcher>,
    watched: Option<Utf8PathBuf>,
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource")
            .field("recursive", &self.recursive)
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

impl NotifySource {
    /// Creates an unsubscribed source.
    #[must_use]
    pub const fn new(recursive: bool) -> Self {
        Self {
            recursive,
            watcher: None,
            watched: None,
        }
    }

    /// Creates a source honoring the configured recursion.
    #[must_use]
    pub const fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.recursive)
    }

    /// Returns `true` while a native watch is registered.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    const fn mode(&self) -> RecursiveMode {
        if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        }
    }
}

impl EventSource for NotifySource {
    fn subscribe(&mut self, target: &WatchTarget, handle: SourceHandle) -> Result<(), WatchError> {
        let path = target.path();
        let mut watcher = notify::recommended_watcher(move |res| dispatch(&handle, res))
            .map_err(|e| WatchError::not_watchable(path, e))?;
        watcher
            .watch(path.as_std_path(), self.mode())
            .map_err(|e| WatchError::not_watchable(path, e))?;

        debug!(path = %path, recursive = self.recursive, "native watch registered");
        self.watcher = Some(watcher);
        self.watched = Some(path.to_owned());
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), WatchError> {
        if let (Some(mut watcher), Some(path)) = (self.watcher.take(), self.watched.take()) {
            // The path may already be gone, which removes the native watch.
            if let Err(err) = watcher.unwatch(path.as_std_path()) {
                debug!(path = %path, error = %err, "unwatch failed");
            }
            debug!(path = %path, "native watch released");
        }
        Ok(())
    }
}

/// Handles one `notify` callback.
fn dispatch(handle: &SourceHandle, res: notify::Result<notify::Event>) {
    let event = match res {
        Ok(event) => event,
        Err(err) => {
            handle.report(WatchError::Backend(err));
            return;
        }
    };

    if event.need_rescan() {
        let path = event
            .paths
            .first()
            .and_then(|p| Utf8Path::from_path(p))
            .map(Utf8Path::to_path_buf);
        handle.report(WatchError::BackendOverflow { path });
    }

    let target = handle.target().path();
    let target_removed =
        matches!(event.kind, EventKind::Remove(_)) && event.paths.iter().any(|p| p.as_path() == target.as_std_path());

    let raws = translate(event, || handle.next_sequence(), |path| {
        handle.report(WatchError::NonUtf8Path(path));
    });
    let ingested = if raws.is_empty() { Ok(()) } else { handle.ingest_batch(raws) };
    if let Err(err) = ingested {
        handle.report(err);
    }

    if target_removed {
        warn!(path = %target, "watch target removed");
        handle.report(WatchError::TargetRemoved(target.to_owned()));
    }
}

/// Maps a `notify` event kind to a [`ChangeKind`]. `None` means ignore.
///
/// `RenameMode::Both` maps to [`ChangeKind::RenamedFrom`]; [`translate`]
/// assigns [`ChangeKind::RenamedTo`] to its second path.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    let kind = match kind {
        EventKind::Access(_) => return None,
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::From | RenameMode::Both)) => ChangeKind::RenamedFrom,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::RenamedTo,
        EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) | EventKind::Any | EventKind::Other => {
            ChangeKind::Unknown
        }
        EventKind::Modify(_) => ChangeKind::Modified,
    };
    Some(kind)
}

/// Converts one `notify` event into raw events, one per UTF-8 path.
///
/// Paths that are not UTF-8 are handed to `skipped` instead.
fn translate(
    event: notify::Event,
    mut next_sequence: impl FnMut() -> u64,
    mut skipped: impl FnMut(PathBuf),
) -> SmallVec<[RawEvent; 4]> {
    let Some(kind) = classify(&event.kind) else {
        return SmallVec::new();
    };
    let rename_pair = matches!(event.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both)));

    event
        .paths
        .into_iter()
        .enumerate()
        .filter_map(|(index, path)| {
            let path = match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => path,
                Err(path) => {
                    debug!(path = %path.display(), "skipping non-UTF-8 path");
                    skipped(path);
                    return None;
                }
            };
            let kind = if rename_pair && index > 0 {
                ChangeKind::RenamedTo
            } else {
                kind
            };
            Some(RawEvent::new(path, kind, next_sequence()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::normalizer::Normalizer;
    use crate::sink::ChannelSink;
    use crate::source::ManualSource;
    use notify::event::{AccessKind, CreateKind, DataChange, Flag, MetadataKind, RemoveKind};
    use pw_core::NormalizedEvent;
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    fn kinds(event: notify::Event) -> Vec<(String, ChangeKind)> {
        let mut seq = 0;
        translate(
            event,
            || {
                seq += 1;
                seq
            },
            |_| {},
        )
        .into_iter()
        .map(|raw| (raw.path.into_string(), raw.kind))
        .collect()
    }

    #[test]
    fn test_classify_table() {
        let cases = [
            (EventKind::Create(CreateKind::File), Some(ChangeKind::Created)),
            (EventKind::Remove(RemoveKind::Folder), Some(ChangeKind::Removed)),
            (EventKind::Modify(ModifyKind::Data(DataChange::Content)), Some(ChangeKind::Modified)),
            (EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), Some(ChangeKind::Modified)),
            (EventKind::Modify(ModifyKind::Any), Some(ChangeKind::Modified)),
            (EventKind::Modify(ModifyKind::Name(RenameMode::From)), Some(ChangeKind::RenamedFrom)),
            (EventKind::Modify(ModifyKind::Name(RenameMode::To)), Some(ChangeKind::RenamedTo)),
            (EventKind::Modify(ModifyKind::Name(RenameMode::Any)), Some(ChangeKind::Unknown)),
            (EventKind::Any, Some(ChangeKind::Unknown)),
            (EventKind::Other, Some(ChangeKind::Unknown)),
            (EventKind::Access(AccessKind::Read), None),
        ];
        for (kind, expected) in cases {
            assert_eq!(classify(&kind), expected, "{kind:?}");
        }
    }

    #[test]
    fn test_rename_pair_splits_into_from_and_to() {
        let pair = event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &["/w/old", "/w/new"]);
        assert_eq!(
            kinds(pair),
            vec![
                ("/w/old".to_owned(), ChangeKind::RenamedFrom),
                ("/w/new".to_owned(), ChangeKind::RenamedTo),
            ]
        );
    }

    #[test]
    fn test_multi_path_event_gets_increasing_sequences() {
        let mut seq = 10;
        let raws = translate(
            event(EventKind::Create(CreateKind::Any), &["/w/a", "/w/b"]),
            || {
                seq += 1;
                seq
            },
            |_| {},
        );
        let sequences: Vec<_> = raws.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![11, 12]);
    }

    #[test]
    fn test_access_events_are_ignored() {
        let read = event(EventKind::Access(AccessKind::Any), &["/w/a"]);
        assert!(kinds(read).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bad = PathBuf::from(OsStr::from_bytes(b"/w/\xff"));
        let mixed = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path(bad)
            .add_path(PathBuf::from("/w/ok"));
        assert_eq!(kinds(mixed), vec![("/w/ok".to_owned(), ChangeKind::Created)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (_dir, source, mut handle) = manual_session();
        let producer = source.handle().unwrap();
        let bad = PathBuf::from(OsStr::from_bytes(b"/w/\xff"));

        dispatch(&producer, Ok(notify::Event::new(EventKind::Create(CreateKind::File)).add_path(bad.clone())));

        let err = handle.try_next_error().unwrap();
        assert!(err.is_recoverable());
        assert!(matches!(err, WatchError::NonUtf8Path(ref path) if *path == bad));
        assert!(handle.try_next_error().is_none());
    }

    fn manual_session() -> (TempDir, ManualSource, crate::WatchHandle) {
        let dir = TempDir::new().unwrap();
        let target = WatchTarget::new(Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap());
        let source = ManualSource::new();
        let sink = |_: &[NormalizedEvent]| -> Result<(), SinkError> { Ok(()) };
        let handle = Normalizer::new(Duration::ZERO)
            .start(&target, source.clone(), sink)
            .unwrap();
        (dir, source, handle)
    }

    #[test]
    fn test_rescan_reports_overflow() {
        let (_dir, source, mut handle) = manual_session();
        let producer = source.handle().unwrap();

        let rescan = event(EventKind::Other, &["/w"]).set_flag(Flag::Rescan);
        dispatch(&producer, Ok(rescan));

        let err = handle.try_next_error().unwrap();
        assert!(err.is_recoverable());
        assert!(matches!(err, WatchError::BackendOverflow { .. }));
        assert_eq!(err.path().map(|p| p.as_str()), Some("/w"));
    }

    #[test]
    fn test_backend_error_is_forwarded() {
        let (_dir, source, mut handle) = manual_session();
        let producer = source.handle().unwrap();

        dispatch(&producer, Err(notify::Error::generic("queue overflow")));

        assert!(matches!(handle.try_next_error(), Some(WatchError::Backend(_))));
    }

    #[test]
    fn test_removing_target_reports_error() {
        let (_dir, source, mut handle) = manual_session();
        let producer = source.handle().unwrap();
        let target = handle.target().path().to_owned();

        let child = event(EventKind::Remove(RemoveKind::File), &[target.join("a.txt").as_str()]);
        dispatch(&producer, Ok(child));
        assert!(handle.try_next_error().is_none());

        dispatch(&producer, Ok(event(EventKind::Remove(RemoveKind::Folder), &[target.as_str()])));
        let err = handle.try_next_error().unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, WatchError::TargetRemoved(ref path) if *path == target));
    }

    #[test]
    fn test_subscribe_missing_path_is_not_watchable() {
        let (dir, source, _handle) = manual_session();
        let missing = WatchTarget::new(Utf8PathBuf::try_from(dir.path().join("missing")).unwrap());

        let mut native = NotifySource::new(true);
        let err = native.subscribe(&missing, source.handle().unwrap()).unwrap_err();

        assert!(matches!(err, WatchError::PathNotWatchable { .. }));
        assert!(!native.is_watching());
    }

    #[tokio::test]
    async fn test_reports_file_creation() {
        let dir = TempDir::new().unwrap();
        let target = WatchTarget::new(Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap());
        let (sink, mut batches) = ChannelSink::new();
        let mut handle = Normalizer::new(Duration::from_millis(50))
            .start(&target, NotifySource::new(true), sink)
            .unwrap();
        let created = handle.target().path().join("hello.txt");

        std::fs::write(&created, "hi").unwrap();

        let found = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(batch) = batches.recv().await {
                if batch.iter().any(|e| e.path == created) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        assert!(found, "no event for {created}");
        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_deleting_watched_directory_reports_target_removed() {
        let dir = TempDir::new().unwrap();
        let watched = dir.path().join("w");
        std::fs::create_dir(&watched).unwrap();
        let target = WatchTarget::new(Utf8PathBuf::try_from(watched).unwrap());
        let (sink, _batches) = ChannelSink::new();
        let mut handle = Normalizer::new(Duration::from_millis(20))
            .start(&target, NotifySource::new(true), sink)
            .unwrap();
        let resolved = handle.target().path().to_owned();

        std::fs::remove_dir_all(&resolved).unwrap();

        let removed = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(err) = handle.next_error().await {
                if let WatchError::TargetRemoved(path) = err {
                    return Some(path);
                }
            }
            None
        })
        .await
        .unwrap_or(None);

        assert_eq!(removed, Some(resolved));
        handle.stop().unwrap();
    }
}
