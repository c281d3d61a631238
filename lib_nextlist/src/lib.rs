//! # lib_nextlist
//!
//! Building blocks for the NextList vote feed: a resilient Streamloots alert
//! stream connector, a tolerant alert interpreter, and a tally applier that
//! keeps the NextList worksheet sorted by votes.
//!
//! Feature gates follow the folder layout. `ingestors`, `parsers`, `tally` and
//! `core` are always compiled; `configs`, `loggers` and `retrieve` pull in their
//! heavier dependencies only when enabled.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Typed configuration loaded once at startup.
#[cfg(feature = "configs")]
pub mod configs;
/// Log dispatch setup and operator-facing alerts.
#[cfg(feature = "loggers")]
pub mod loggers;
/// Retrying HTTP client used by remote store clients.
#[cfg(feature = "retrieve")]
pub mod retrieve;

/// Glue between the feed connector, the interpreter and the tally applier.
pub mod core;
/// Long-lived feed connectors.
pub mod ingestors;
/// Alert payload model and vote extraction.
pub mod parsers;
/// Tabular store interface and the vote tally applier.
pub mod tally;

pub use crate::core::pipeline::{LineOutcome, PipelineStats, VotePipeline};
pub use ingestors::streamloots_sse::{ConnectorConfig, LineHandler, RetryReport, StreamlootsConnector};
pub use parsers::interpreter::{interpret, Interpretation, VoteIntent};
pub use tally::applier::{TallyApplier, TallyError, TallyUpdate};
pub use tally::store::{MemorySheet, TallyStore};
