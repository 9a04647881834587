//! Path-change event normalization over native filesystem notifications.
//!
//! This crate sits between a native notification backend and a consumer. It
//! deduplicates bursts of raw notifications, holds them for a latency window,
//! and hands the consumer one event per changed path, in the order the paths
//! were first seen.
//!
//! # Overview
//!
//! - [`EventSource`] - the backend seam; [`NotifySource`] wraps `notify`,
//!   [`ManualSource`] is driven by hand
//! - [`Normalizer`] / [`start`] - the core; returns a [`WatchHandle`]
//! - [`Sink`] - the consumer seam; [`WriterSink`], [`ChannelSink`] and closures
//! - [`FileFilter`] - drops paths before they reach the pending batch
//!
//! # Crate Dependencies
//!
//! ```text
//! pw-cli ──► pw-watcher ──► pw-core
//!        └─────────────────►
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use pw_watcher::{NotifySource, Normalizer, WriterSink};
//! use pw_core::{OutputFormat, WatchConfig, WatchTarget};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WatchConfig::default();
//!     let mut handle = Normalizer::from_config(&config).start(
//!         &WatchTarget::new("/srv/app"),
//!         NotifySource::from_config(&config),
//!         WriterSink::stdout(OutputFormat::Plain),
//!     )?;
//!
//!     if let Some(err) = handle.next_error().await {
//!         eprintln!("watch failed: {err}");
//!     }
//!     handle.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! # Coalescing
//!
//! Within one window, the emitted kind for a path is the left fold of
//! [`ChangeKind::coalesce`](pw_core::ChangeKind::coalesce) over the kinds
//! received for it: known kinds replace each other, `Unknown` never replaces
//! a known kind, and a creation after a removal starts a fresh entry.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod batch;
pub mod error;
pub mod filter;
pub mod normalizer;
pub mod notify_source;
pub mod sink;
pub mod source;

// Re-export error types
pub use error::{SinkError, WatchError};

// Re-export filter types
pub use filter::{AcceptAllFilter, CompositeFilter, ExcludeFilter, ExtensionFilter, FileFilter};

// Re-export the normalizer
pub use normalizer::{Normalizer, SourceHandle, WatchHandle, start};

// Re-export sources and sinks
pub use notify_source::NotifySource;
pub use sink::{ChannelSink, Sink, WriterSink, render};
pub use source::{EventSource, ManualSource};
