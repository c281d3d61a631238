//! # Data Ingestors Module
//!
//! Long-lived clients that pull events from upstream feeds and hand them, one
//! at a time, to a handler.
//!
//! ## Contained Modules:
//! - **`streamloots_sse`**: a resilient client for the Streamloots alert stream
//!   with bounded reconnects and a read-idle watchdog.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// The Streamloots alert stream client.
pub mod streamloots_sse;

pub use streamloots_sse::{
    frame_payload, ConnectionState, ConnectorConfig, LineHandler, RetryReport, SessionError,
    StreamlootsConnector, STREAMLOOTS_ALERTS_URL,
};
