//! The event normalizer.
//!
//! Turns a noisy stream of [`RawEvent`]s into at most one
//! [`NormalizedEvent`] per path per latency window, delivered to a [`Sink`]
//! in first-seen order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── notification thread ───────────────────────────┐
//! │  EventSource ──► SourceHandle::ingest ──► filter / granularity (no lock)   │
//! │                                       └─► state lock: upsert, arm timer    │
//! └────────────────────────────────────────────────┬───────────────────────────┘
//!                                                   │ armed_at
//!                                                   ▼
//! ┌──────────────────────────────── tokio runtime ─────────────────────────────┐
//! │  timer task: sleep_until(armed_at + latency) ──► spawn_blocking(flush)     │
//! │  flush: sink lock ──► state lock: swap batch ──► Sink::accept (no state)   │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With a zero latency there is no timer: every `ingest` delivers before it
//! returns, on the calling thread.
//!
//! # Locking
//!
//! Ingestion only ever takes the state lock, and only for a map upsert.
//! Flushes take the sink lock first and the state lock briefly inside it, so
//! flushes are serialized and [`WatchHandle::stop`] waits for one in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use pw_core::{ChangeKind, Granularity, RawEvent, WatchConfig, WatchTarget};
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::batch::PendingBatch;
use crate::error::WatchError;
use crate::filter::{AcceptAllFilter, ExcludeFilter, FileFilter};
use crate::sink::Sink;
use crate::source::EventSource;

/// Starts a watch session with default filtering and granularity.
///
/// Shorthand for `Normalizer::new(latency).start(target, source, sink)`.
///
/// # Errors
///
/// See [`Normalizer::start`].
pub fn start<S, K>(target: &WatchTarget, latency: Duration, source: S, sink: K) -> Result<WatchHandle, WatchError>
where
    S: EventSource,
    K: Sink,
{
    Normalizer::new(latency).start(target, source, sink)
}

/// Builder for a watch session.
///
/// # Examples
///
/// ```no_run
/// use pw_watcher::{ExcludeFilter, NotifySource, Normalizer, WriterSink};
/// use pw_core::{Granularity, OutputFormat, WatchTarget};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), pw_watcher::WatchError> {
/// let mut handle = Normalizer::new(Duration::from_millis(50))
///     .with_filter(ExcludeFilter::new([".git", "target"]))
///     .with_granularity(Granularity::Directory)
///     .start(
///         &WatchTarget::new("."),
///         NotifySource::new(true),
///         WriterSink::stdout(OutputFormat::Plain),
///     )?;
///
/// while let Some(err) = handle.next_error().await {
///     eprintln!("{err}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Normalizer {
    latency: Duration,
    filter: Box<dyn FileFilter>,
    granularity: Granularity,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("latency", &self.latency)
            .field("granularity", &self.granularity)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    /// Creates a normalizer that accepts every path.
    ///
    /// A zero `latency` delivers each event synchronously from `ingest`.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            filter: Box::new(AcceptAllFilter),
            granularity: Granularity::Path,
        }
    }

    /// Creates a normalizer from the watch section of a configuration.
    #[must_use]
    pub fn from_config(config: &WatchConfig) -> Self {
        let normalizer = Self::new(config.latency()).with_granularity(config.granularity);
        if config.exclude.is_empty() {
            normalizer
        } else {
            normalizer.with_filter(ExcludeFilter::new(&config.exclude))
        }
    }

    /// Replaces the path filter.
    #[must_use]
    pub fn with_filter<F: FileFilter>(mut self, filter: F) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Sets the reporting granularity.
    #[must_use]
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Returns the latency window.
    #[must_use]
    pub const fn latency(&self) -> Duration {
        self.latency
    }

    /// Starts watching `target`.
    ///
    /// The target is resolved to its canonical absolute path before the
    /// source is subscribed. Events the source reports are relative to that
    /// resolved path.
    ///
    /// # Errors
    ///
    /// - [`WatchError::InvalidTarget`] if the target does not exist or cannot
    ///   be resolved. The source is not subscribed.
    /// - [`WatchError::NoRuntime`] if the latency is non-zero and no tokio
    ///   runtime is running. The source is not subscribed.
    /// - Whatever [`EventSource::subscribe`] fails with.
    pub fn start<S, K>(self, target: &WatchTarget, source: S, sink: K) -> Result<WatchHandle, WatchError>
    where
        S: EventSource,
        K: Sink,
    {
        let target = target
            .resolve()
            .map_err(|_| WatchError::invalid_target(target.path()))?;

        let runtime = if self.latency.is_zero() {
            None
        } else {
            Some(tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?)
        };

        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = match runtime {
            Some(_) => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(rx))
            }
            None => (None, None),
        };

        let shared = Arc::new(Shared {
            target,
            latency: self.latency,
            filter: self.filter,
            granularity: self.granularity,
            sequence: AtomicU64::new(0),
            state: Mutex::new(State {
                batch: PendingBatch::default(),
                armed: false,
                stopped: false,
                timer: timer_tx,
                errors: Some(errors_tx),
            }),
            sink: Mutex::new(SinkSlot {
                sink: Box::new(sink),
                closed: false,
            }),
        });

        let timer_task = runtime
            .zip(timer_rx)
            .map(|(runtime, armed)| runtime.spawn(run_timer(Arc::clone(&shared), armed)));

        let mut handle = WatchHandle {
            shared: Arc::clone(&shared),
            source: Box::new(source),
            errors: errors_rx,
            timer_task,
            stopped: false,
        };

        if let Err(err) = handle.source.subscribe(&shared.target, SourceHandle { shared: Arc::clone(&shared) }) {
            handle.teardown();
            return Err(err);
        }

        info!(
            path = %shared.target,
            latency_ms = u64::try_from(shared.latency.as_millis()).unwrap_or(u64::MAX),
            granularity = ?shared.granularity,
            "watch started"
        );

        Ok(handle)
    }
}

struct State {
    batch: PendingBatch,
    armed: bool,
    stopped: bool,
    timer: Option<mpsc::UnboundedSender<Instant>>,
    errors: Option<mpsc::UnboundedSender<WatchError>>,
}

struct SinkSlot {
    sink: Box<dyn Sink>,
    closed: bool,
}

impl SinkSlot {
    fn deliver(&mut self, batch: PendingBatch) -> Result<usize, WatchError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let events = batch.into_events();
        self.sink.accept(&events)?;
        Ok(events.len())
    }
}

struct Shared {
    target: WatchTarget,
    latency: Duration,
    filter: Box<dyn FileFilter>,
    granularity: Granularity,
    sequence: AtomicU64,
    state: Mutex<State>,
    sink: Mutex<SinkSlot>,
}

impl Shared {
    /// Applies the filter and granularity. Runs outside every lock.
    fn prepare(&self, raw: RawEvent) -> Option<RawEvent> {
        let visible = self.target.relative(&raw.path).unwrap_or(&raw.path);
        if !self.filter.should_process(visible) {
            trace!(path = %raw.path, "filtered");
            return None;
        }

        if self.granularity == Granularity::Directory && !raw.path.is_dir() {
            let parent = raw
                .path
                .parent()
                .filter(|parent| parent.starts_with(self.target.path()))
                .map(camino::Utf8Path::to_path_buf);
            if let Some(parent) = parent {
                return Some(RawEvent::new(parent, ChangeKind::Modified, raw.sequence));
            }
        }

        Some(raw)
    }

    fn ingest(&self, raws: impl IntoIterator<Item = RawEvent>) -> Result<(), WatchError> {
        let observed_at = SystemTime::now();
        let armed_at = Instant::now();
        let prepared: SmallVec<[RawEvent; 8]> = raws.into_iter().filter_map(|raw| self.prepare(raw)).collect();

        if self.latency.is_zero() {
            let mut local = PendingBatch::default();
            for raw in prepared {
                local.upsert(raw, observed_at);
            }
            return self.deliver_now(local);
        }

        let mut state = self.state.lock();
        if state.stopped {
            return Ok(());
        }
        for raw in prepared {
            state.batch.upsert(raw, observed_at);
        }
        if !state.armed && !state.batch.is_empty() {
            state.armed = true;
            let sent = state.timer.as_ref().is_some_and(|timer| timer.send(armed_at).is_ok());
            if !sent {
                warn!(path = %self.target, "latency timer is gone; events stay pending until stop");
            }
        }
        Ok(())
    }

    /// Zero-latency delivery: one sink call per distinct path.
    fn deliver_now(&self, batch: PendingBatch) -> Result<(), WatchError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut slot = self.sink.lock();
        if slot.closed {
            return Ok(());
        }
        for event in batch.into_events() {
            slot.sink.accept(std::slice::from_ref(&event))?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<usize, WatchError> {
        let mut slot = self.sink.lock();
        if slot.closed {
            return Ok(0);
        }
        let batch = {
            let mut state = self.state.lock();
            state.armed = false;
            state.batch.take()
        };
        slot.deliver(batch)
    }

    /// The last flush of a session. The sink is never called again after it.
    fn close(&self) -> Result<usize, WatchError> {
        let mut slot = self.sink.lock();
        if slot.closed {
            return Ok(0);
        }
        let batch = {
            let mut state = self.state.lock();
            state.armed = false;
            state.batch.take()
        };
        slot.closed = true;
        slot.deliver(batch)
    }

    fn report(&self, err: WatchError) {
        let state = self.state.lock();
        match &state.errors {
            Some(errors) => {
                if let Err(mpsc::error::SendError(err)) = errors.send(err) {
                    debug!(error = %err, "error receiver dropped");
                }
            }
            None => debug!(error = %err, "error after stop"),
        }
    }
}

async fn run_timer(shared: Arc<Shared>, mut armed: mpsc::UnboundedReceiver<Instant>) {
    while let Some(armed_at) = armed.recv().await {
        tokio::time::sleep_until((armed_at + shared.latency).into()).await;

        let flusher = Arc::clone(&shared);
        match tokio::task::spawn_blocking(move || flusher.flush()).await {
            Ok(Ok(count)) => trace!(count, "flushed"),
            Ok(Err(err)) => shared.report(err),
            Err(join_error) => warn!(error = %join_error, "flush task failed"),
        }
    }
}

/// The producer side of a session, handed to [`EventSource::subscribe`].
///
/// Cheap to clone. Every clone feeds the same pending batch.
#[derive(Clone)]
pub struct SourceHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("target", &self.shared.target)
            .finish_non_exhaustive()
    }
}

impl SourceHandle {
    /// The resolved target of the session.
    #[must_use]
    pub fn target(&self) -> &WatchTarget {
        &self.shared.target
    }

    /// Returns the next synthesized sequence number, starting at 1.
    ///
    /// For sources whose backend does not carry event identifiers.
    pub fn next_sequence(&self) -> u64 {
        self.shared.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Merges one raw event into the pending batch.
    ///
    /// With a zero latency the event reaches the sink before this returns.
    /// Events arriving after [`WatchHandle::stop`] are dropped.
    ///
    /// # Errors
    ///
    /// [`WatchError::Sink`] if a zero-latency delivery fails.
    pub fn ingest(&self, raw: RawEvent) -> Result<(), WatchError> {
        self.shared.ingest(std::iter::once(raw))
    }

    /// Merges one native batch.
    ///
    /// With a zero latency, duplicates inside the batch are coalesced first
    /// and the sink is then called once per distinct path in first-seen
    /// order.
    ///
    /// # Errors
    ///
    /// [`WatchError::Sink`] if a zero-latency delivery fails.
    pub fn ingest_batch(&self, batch: impl IntoIterator<Item = RawEvent>) -> Result<(), WatchError> {
        self.shared.ingest(batch)
    }

    /// Forwards a backend error to the session's error channel.
    pub fn report(&self, err: WatchError) {
        self.shared.report(err);
    }
}

/// A running watch session.
///
/// Dropping the handle stops the session.
pub struct WatchHandle {
    shared: Arc<Shared>,
    source: Box<dyn EventSource>,
    errors: mpsc::UnboundedReceiver<WatchError>,
    timer_task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("target", &self.shared.target)
            .field("latency", &self.shared.latency)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WatchHandle {
    /// The resolved target.
    #[must_use]
    pub fn target(&self) -> &WatchTarget {
        &self.shared.target
    }

    /// The latency window.
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.shared.latency
    }

    /// Returns `true` until [`stop`](Self::stop) is called.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        !self.stopped
    }

    /// Number of distinct paths waiting for the next flush.
    #[must_use]
    pub fn pending_paths(&self) -> usize {
        self.shared.state.lock().batch.len()
    }

    /// Waits for the next error reported by the source or a timer flush.
    ///
    /// Returns `None` once the session is stopped and every error has been
    /// received.
    pub async fn next_error(&mut self) -> Option<WatchError> {
        self.errors.recv().await
    }

    /// Returns a reported error without waiting.
    pub fn try_next_error(&mut self) -> Option<WatchError> {
        self.errors.try_recv().ok()
    }

    /// Direct access to the error receiver, for `tokio::select!`.
    pub fn errors(&mut self) -> &mut mpsc::UnboundedReceiver<WatchError> {
        &mut self.errors
    }

    /// Stops the session.
    ///
    /// Waits for any in-flight flush, flushes what is still pending, then
    /// unsubscribes the source. The sink is not called after this returns.
    /// Calling `stop` again does nothing.
    ///
    /// # Errors
    ///
    /// The final flush's sink error if there is one, otherwise the source's
    /// unsubscribe error. The source is unsubscribed either way.
    pub fn stop(&mut self) -> Result<(), WatchError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        self.halt_ingest();
        let flushed = self.shared.close();
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        let released = self.source.unsubscribe();
        self.shared.state.lock().errors = None;

        match &flushed {
            Ok(count) => debug!(path = %self.shared.target, count, "final flush"),
            Err(err) => warn!(path = %self.shared.target, error = %err, "final flush failed"),
        }
        info!(path = %self.shared.target, "watch stopped");

        flushed.and(released)
    }

    fn halt_ingest(&self) {
        let mut state = self.shared.state.lock();
        state.stopped = true;
        state.timer = None;
    }

    /// Unwinds a session whose source never subscribed.
    fn teardown(&mut self) {
        self.stopped = true;
        self.halt_ingest();
        self.shared.sink.lock().closed = true;
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        self.shared.state.lock().errors = None;
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "error while stopping dropped watch");
        }
    }
}
