//! # Local Logger Setup
//!
//! Installs the process-wide `log` dispatcher once at startup. Records go to
//! stdout and, when a log file is configured, are appended to that file.

use anyhow::Result;
use std::fs;
use std::path::Path;

/// Maps a configured level name onto a filter. Unknown names fall back to `Info`.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" | "critical" | "fatal" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Builds the dispatcher without installing it.
///
/// Format: `[YYYY-mm-dd HH:MM:SS][target][LEVEL] message`. Chatty HTTP
/// internals are capped at `Warn`.
pub fn build_dispatch(log_level: &str, log_file: Option<&Path>) -> Result<fern::Dispatch> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    Ok(dispatch)
}

/// Installs the global logger. Call once, before any component logs.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    build_dispatch(log_level, log_file)?.apply()?;
    Ok(())
}
