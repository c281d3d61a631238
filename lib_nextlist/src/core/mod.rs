//! # Core Module
//!
//! ## Contained Modules:
//! - **`pipeline`**: turns framed feed payloads into tally updates and
//!   operator alerts, and keeps running counts of what happened.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Payload handling from decode to sheet update.
pub mod pipeline;

pub use pipeline::{LineOutcome, OperatorAlerts, PipelineStats, VotePipeline};
