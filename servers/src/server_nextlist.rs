//! # NextList Vote Server
//!
//! Follows a channel's Streamloots alert stream and adds every NextList vote
//! to the matching game row of the NextList spreadsheet, keeping the sheet
//! sorted by votes.
//!
//! Startup order:
//! 1.  Loads `.env`, then the INI configuration (`NEXTLIST_CONFIG` or `config.ini`).
//! 2.  Installs logging from `main.log_level` / `main.log_file`.
//! 3.  Authenticates with Google (service-account credentials from the
//!     environment, refreshed as needed) and opens the spreadsheet once; it is
//!     reused for the life of the process.
//! 4.  Runs the feed connector until its retries are exhausted or Ctrl-C.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio::signal;

use lib_nextlist::configs::NextListConfig;
use lib_nextlist::loggers::{ConsoleAlerts, setup_logging};
use lib_nextlist::retrieve::ky_http::{ApiClient, Authorization};
use lib_nextlist::tally::sheets::{SHEETS_SCOPES, SheetsStore};
use lib_nextlist::{StreamlootsConnector, TallyApplier, VotePipeline};

/// Retries for individual Sheets API calls, separate from feed reconnects.
const SHEETS_MAX_RETRIES: u32 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config_path = NextListConfig::default_path();
    let config = match NextListConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", config_path.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(&config.main.log_level, config.main.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("NextList server stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: NextListConfig) -> Result<ExitCode> {
    let auth = match config.access_token() {
        Some(token) => {
            log::warn!("Using a fixed Sheets access token; it will not be refreshed.");
            Authorization::Bearer(token)
        }
        None => Authorization::google(SHEETS_SCOPES).await?,
    };
    let api = ApiClient::new(&config.nextlist.sheets_api_url, auth, SHEETS_MAX_RETRIES)?;
    let store = SheetsStore::open(api, &config.nextlist.spreadsheet_id)
        .await
        .with_context(|| format!("Unable to open spreadsheet {}", config.nextlist.spreadsheet_id))?;

    let applier = TallyApplier::new(
        store,
        config.nextlist.vote_column_label.clone(),
        config.nextlist.name_column_label.clone(),
    );
    let mut pipeline = VotePipeline::new(applier, ConsoleAlerts);
    let mut connector = StreamlootsConnector::new(config.connector_config())?;

    log::info!(
        "Following Streamloots channel {} into spreadsheet {}",
        config.main.streamloots_id,
        config.nextlist.spreadsheet_id
    );

    let code = tokio::select! {
        report = connector.run_with_retry(&mut pipeline) => {
            log::error!(
                "Exhausted feed retries after {} sessions ({} timeouts, {} payloads, {} handler errors). Last error: {}",
                report.sessions,
                report.timeouts,
                report.payloads,
                report.handler_errors,
                report
                    .last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "none".to_string())
            );
            ExitCode::FAILURE
        }
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, shutting down.");
            ExitCode::SUCCESS
        }
    };

    let stats = pipeline.stats();
    log::info!(
        "Votes applied: {}, unsorted: {}, lost: {}; ignored: {}, subscriptions: {}, schema drift: {}",
        stats.applied,
        stats.unsorted,
        stats.lost_updates,
        stats.ignored,
        stats.subscriptions,
        stats.schema_drift
    );
    Ok(code)
}
