//! Core types, errors, and configuration for the pathwatch tool.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - Domain types ([`ChangeKind`], [`RawEvent`], [`NormalizedEvent`], [`WatchTarget`])
//! - Configuration structures ([`Config`], [`WatchConfig`], [`OutputConfig`])
//! - [`ConfigError`] for configuration failures

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, Granularity, MAX_LATENCY_MS, OutputConfig, OutputFormat, WatchConfig};
pub use error::ConfigError;
pub use types::{ChangeKind, NormalizedEvent, RawEvent, WatchTarget};
