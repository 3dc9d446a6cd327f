//! # telecall diagnostics
//!
//! Logging setup and call timelines for troubleshooting.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod call_timeline;
pub mod debug_logger;

// Re-export main types
pub use call_timeline::{CallReport, CallTimeline, TimelineEntry, TimelineEvent};
pub use debug_logger::DebugLogger;
