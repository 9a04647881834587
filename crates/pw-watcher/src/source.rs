//! The seam between native notification backends and the normalizer.
//!
//! An [`EventSource`] is subscribed exactly once per session. It receives a
//! [`SourceHandle`] and pushes [`RawEvent`]s through it from whatever thread
//! the backend delivers on. Errors the backend raises after subscription go
//! through [`SourceHandle::report`] and reach the caller unchanged.

use std::sync::Arc;

use parking_lot::Mutex;
use pw_core::{RawEvent, WatchTarget};

use crate::error::WatchError;
use crate::normalizer::SourceHandle;

/// A native filesystem-notification backend.
///
/// Implementations translate the backend's own event shape into
/// [`RawEvent`]s. A backend that delivers several paths per callback should
/// forward them with one [`SourceHandle::ingest_batch`] call.
pub trait EventSource: Send + 'static {
    /// Starts delivering events for `target` to `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotWatchable`] if the backend refuses the
    /// path.
    fn subscribe(&mut self, target: &WatchTarget, handle: SourceHandle) -> Result<(), WatchError>;

    /// Stops delivering events and releases native resources.
    ///
    /// Called once, after the final flush. Events the backend still delivers
    /// afterwards are ignored.
    fn unsubscribe(&mut self) -> Result<(), WatchError>;
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn subscribe(&mut self, target: &WatchTarget, handle: SourceHandle) -> Result<(), WatchError> {
        (**self).subscribe(target, handle)
    }

    fn unsubscribe(&mut self) -> Result<(), WatchError> {
        (**self).unsubscribe()
    }
}

#[derive(Debug, Default)]
struct ManualState {
    handle: Option<SourceHandle>,
    subscriptions: usize,
    unsubscriptions: usize,
    refuse: Option<String>,
}

/// An [`EventSource`] driven by hand.
///
/// Clones share state, so one clone can be given to the normalizer while
/// another pushes events into it. Useful for tests and for embedding the
/// normalizer behind a backend that is not based on `notify`.
///
/// # Examples
///
/// ```
/// use pw_watcher::{ManualSource, Normalizer};
/// use pw_core::{ChangeKind, NormalizedEvent, RawEvent, WatchTarget};
/// use std::time::Duration;
///
/// let source = ManualSource::new();
/// let target = WatchTarget::new(std::env::temp_dir().to_string_lossy().into_owned());
/// let mut handle = Normalizer::new(Duration::ZERO)
///     .start(&target, source.clone(), |events: &[NormalizedEvent]| {
///         println!("{}", events[0].path);
///         Ok(())
///     })
///     .unwrap();
///
/// source.emit(RawEvent::new("/tmp/a", ChangeKind::Created, 1)).unwrap();
/// handle.stop().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    inner: Arc<Mutex<ManualState>>,
}

impl ManualSource {
    /// Creates a source that accepts any target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source whose `subscribe` always fails with
    /// [`WatchError::PathNotWatchable`].
    #[must_use]
    pub fn refusing(reason: impl Into<String>) -> Self {
        let source = Self::default();
        source.inner.lock().refuse = Some(reason.into());
        source
    }

    /// Returns the handle of the current subscription.
    #[must_use]
    pub fn handle(&self) -> Option<SourceHandle> {
        self.inner.lock().handle.clone()
    }

    /// Returns `true` between a successful `subscribe` and `unsubscribe`.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

    /// Number of successful `subscribe` calls.
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.inner.lock().subscriptions
    }

    /// Number of `unsubscribe` calls.
    #[must_use]
    pub fn unsubscriptions(&self) -> usize {
        self.inner.lock().unsubscriptions
    }

    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// [`WatchError::ChannelClosed`] when not subscribed, otherwise whatever
    /// [`SourceHandle::ingest`] returns.
    pub fn emit(&self, raw: RawEvent) -> Result<(), WatchError> {
        self.subscribed()?.ingest(raw)
    }

    /// Delivers one native batch.
    ///
    /// # Errors
    ///
    /// [`WatchError::ChannelClosed`] when not subscribed, otherwise whatever
    /// [`SourceHandle::ingest_batch`] returns.
    pub fn emit_batch(&self, batch: impl IntoIterator<Item = RawEvent>) -> Result<(), WatchError> {
        self.subscribed()?.ingest_batch(batch)
    }

    /// Reports a backend error to the session.
    ///
    /// # Errors
    ///
    /// [`WatchError::ChannelClosed`] when not subscribed.
    pub fn report(&self, err: WatchError) -> Result<(), WatchError> {
        self.subscribed()?.report(err);
        Ok(())
    }

    // Clone the handle out so ingestion never runs under our own lock.
    fn subscribed(&self) -> Result<SourceHandle, WatchError> {
        self.handle().ok_or(WatchError::ChannelClosed)
    }
}

impl EventSource for ManualSource {
    fn subscribe(&mut self, target: &WatchTarget, handle: SourceHandle) -> Result<(), WatchError> {
        let mut state = self.inner.lock();
        if let Some(reason) = &state.refuse {
            return Err(WatchError::not_watchable_reason(target.path(), reason.clone()));
        }
        state.handle = Some(handle);
        state.subscriptions += 1;
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), WatchError> {
        let mut state = self.inner.lock();
        state.handle = None;
        state.unsubscriptions += 1;
        Ok(())
    }
}
