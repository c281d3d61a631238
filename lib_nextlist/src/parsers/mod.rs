//! # Parsers Module
//!
//! Turns decoded feed lines into structured alert payloads and classifies them.
//!
//! ## Contained Modules:
//! - **`alert_payload`**: serde model of the Streamloots alert JSON, tolerant of
//!   missing and oddly typed fields.
//! - **`interpreter`**: pure classification of a payload into a vote intent,
//!   a subscription notice, a schema-drift condition, or nothing.

/// Serde model for Streamloots alert payloads.
pub mod alert_payload;
/// Vote extraction and payload classification.
pub mod interpreter;

pub use alert_payload::{AlertPayload, InterpretError};
pub use interpreter::{canonical_game_id, interpret, Interpretation, VoteIntent};
