//! Consumers of normalized events.
//!
//! A [`Sink`] is called once per flush with the flush's events in first-seen
//! order. The normalizer calls it outside the pending-batch lock, so a slow
//! sink delays later flushes but never blocks ingestion.
//!
//! # Provided sinks
//!
//! - [`WriterSink`] - one line per event to any [`Write`]r (stdout in the CLI)
//! - [`ChannelSink`] - forwards each flush to a tokio channel
//! - any `FnMut(&[NormalizedEvent]) -> Result<(), SinkError>` closure

use std::io::{self, Write};

use pw_core::{NormalizedEvent, OutputFormat};
use tokio::sync::mpsc;

use crate::error::SinkError;

/// Receives normalized events, one call per flush.
///
/// # Examples
///
/// ```
/// use pw_watcher::{Sink, SinkError};
/// use pw_core::NormalizedEvent;
///
/// struct Counter(usize);
///
/// impl Sink for Counter {
///     fn accept(&mut self, events: &[NormalizedEvent]) -> Result<(), SinkError> {
///         self.0 += events.len();
///         Ok(())
///     }
/// }
/// ```
pub trait Sink: Send + 'static {
    /// Consumes one flush.
    ///
    /// # Errors
    ///
    /// Whatever the sink cannot handle; the normalizer forwards it unchanged.
    fn accept(&mut self, events: &[NormalizedEvent]) -> Result<(), SinkError>;
}

impl<F> Sink for F
where
    F: FnMut(&[NormalizedEvent]) -> Result<(), SinkError> + Send + 'static,
{
    fn accept(&mut self, events: &[NormalizedEvent]) -> Result<(), SinkError> {
        self(events)
    }
}

/// Writes one line per event in the configured [`OutputFormat`].
///
/// The writer is flushed once per batch so consumers reading a pipe see each
/// batch as soon as it is emitted.
///
/// # Examples
///
/// ```
/// use pw_watcher::{Sink, WriterSink};
/// use pw_core::{ChangeKind, NormalizedEvent, OutputFormat};
/// use camino::Utf8PathBuf;
///
/// let mut sink = WriterSink::new(Vec::new(), OutputFormat::Plain);
/// sink.accept(&[NormalizedEvent::now(Utf8PathBuf::from("/tmp/a"), ChangeKind::Created)]).unwrap();
/// assert_eq!(sink.into_inner(), b"/tmp/a\n");
/// ```
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    format: OutputFormat,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    /// Wraps a writer.
    #[must_use]
    pub const fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    /// Returns the output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Returns a reference to the underlying writer.
    pub const fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwraps the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<io::Stdout> {
    /// A sink writing to standard output.
    #[must_use]
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write + Send + 'static> Sink for WriterSink<W> {
    fn accept(&mut self, events: &[NormalizedEvent]) -> Result<(), SinkError> {
        for event in events {
            write_line(&mut self.writer, event, self.format)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Renders a single event as it would appear in a [`WriterSink`], without
/// the trailing newline.
///
/// # Errors
///
/// Returns [`SinkError::Serialize`] if JSON serialization fails.
pub fn render(event: &NormalizedEvent, format: OutputFormat) -> Result<String, SinkError> {
    let mut buf = Vec::with_capacity(event.path.as_str().len() + 16);
    write_line(&mut buf, event, format)?;
    buf.pop();
    String::from_utf8(buf).map_err(|e| SinkError::Other(e.to_string()))
}

fn write_line<W: Write>(writer: &mut W, event: &NormalizedEvent, format: OutputFormat) -> Result<(), SinkError> {
    match format {
        OutputFormat::Plain => writeln!(writer, "{}", event.path)?,
        OutputFormat::Kind => writeln!(writer, "{} {}", event.kind, event.path)?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, event)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Forwards each flush as a `Vec` on an unbounded tokio channel.
///
/// Sending never blocks, so the sink is safe to call from the notification
/// thread, the blocking pool, or inside the runtime.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<NormalizedEvent>>,
}

impl ChannelSink {
    /// Creates a sink and the receiver for its batches.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<NormalizedEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn accept(&mut self, events: &[NormalizedEvent]) -> Result<(), SinkError> {
        if events.is_empty() {
            return Ok(());
        }
        self.tx.send(events.to_vec()).map_err(|_| SinkError::Closed)
    }
}
