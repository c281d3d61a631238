//! # Operator Alerts
//!
//! Notices meant for the person running the feed rather than for the log
//! file. Schema drift means the upstream payload contract changed and needs a
//! human; it is printed as a red banner so it cannot be mistaken for a routine
//! per-message error.

use colored::*;

use crate::core::pipeline::OperatorAlerts;

/// Alerts written to the terminal (colored) and to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAlerts;

impl OperatorAlerts for ConsoleAlerts {
    fn schema_drift(&self, context: &str) {
        log::error!(target: "nextlist::schema_drift", "SCHEMA DRIFT: {context}");
        let banner = format!(
            " STREAMLOOTS SCHEMA DRIFT: {context}. Votes are being dropped until the parser is updated. "
        );
        eprintln!("{}", banner.bright_white().on_bright_red().bold());
    }

    fn subscription(&self, message: &str) {
        log::info!(target: "nextlist::subscription", "Subscription alert: {message}");
        println!("{}", format!("New subscription: {message}").bright_green());
    }
}
