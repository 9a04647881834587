//! Domain types for the pathwatch tool.
//!
//! # Module Organization
//!
//! - [`kind`] - Change classification and the coalescing rule
//! - [`event`] - Raw notifications and normalized events
//! - [`target`] - The watched path
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use pw_core::{ChangeKind, NormalizedEvent, RawEvent, WatchTarget};
//! ```

pub mod event;
pub mod kind;
pub mod target;

pub use event::{NormalizedEvent, RawEvent};
pub use kind::ChangeKind;
pub use target::WatchTarget;
