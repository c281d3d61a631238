//! # Configuration Modules
//!
//! Startup configuration for the NextList feed, read once from an INI file.

/// The `[main]` / `[nextlist]` configuration file and its typed form.
pub mod config_nextlist;

pub use config_nextlist::{ConfigError, MainSection, NextListConfig, NextListSection};
