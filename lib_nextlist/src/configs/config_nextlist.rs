use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use config::{ext::*, *};

use crate::ingestors::streamloots_sse::{ConnectorConfig, STREAMLOOTS_ALERTS_URL};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "NEXTLIST_CONFIG";
/// Configuration file used when [`CONFIG_PATH_VAR`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config.ini";
/// Fallback for `nextlist.access_token`.
pub const ACCESS_TOKEN_VAR: &str = "GOOGLE_SHEETS_ACCESS_TOKEN";
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration key {0} is missing")]
    Missing(&'static str),

    #[error("Configuration key {key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to read configuration from {path}: {reason}")]
    Source { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MainSection {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub streamloots_id: String,
    pub max_retries: u32,
    pub connection_retry_wait_seconds: u64,
    pub feed_base_url: String,
    pub read_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NextListSection {
    pub spreadsheet_id: String,
    pub vote_column_label: String,
    pub name_column_label: String,
    pub sheets_api_url: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NextListConfig {
    pub main: MainSection,
    pub nextlist: NextListSection,
}

impl NextListConfig {
    /// Path from `NEXTLIST_CONFIG`, or `config.ini` in the working directory.
    pub fn default_path() -> PathBuf {
        env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Reads an INI file. A missing file behaves like an empty one, so the
    /// error names the first required key instead.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_file: String = path.to_string_lossy().to_string();
        let config_data: Box<dyn ConfigurationRoot> = DefaultConfigurationBuilder::new()
            .add_ini_file(&config_file.is().optional())
            .build()
            .map_err(|e| ConfigError::Source {
                path: config_file.clone(),
                reason: format!("{e:?}"),
            })?;

        let mut config_options: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in config_data.iter(None) {
            config_options.insert(key.to_string(), value.to_string());
        }
        Self::from_pairs(config_options)
    }

    /// Builds the typed configuration from flattened `section:key` (or
    /// `section.key`) pairs. Keys are matched without regard to case.
    pub fn from_pairs(pairs: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let options: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(key, value)| (key.to_lowercase().replace(':', "."), value.trim().to_string()))
            .collect();
        let text = |key: &str| options.get(key).filter(|value| !value.is_empty()).cloned();
        let required = |key: &'static str| text(key).ok_or(ConfigError::Missing(key));
        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match text(key) {
                None => Ok(default),
                Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
            }
        };

        let max_retries = number("main.max_retries", 3)?;
        let main = MainSection {
            log_level: text("main.log_level").unwrap_or_else(|| "info".to_string()),
            log_file: text("main.log_file").map(PathBuf::from),
            streamloots_id: required("main.streamloots_id")?,
            max_retries: u32::try_from(max_retries).map_err(|_| ConfigError::Invalid {
                key: "main.max_retries",
                value: max_retries.to_string(),
            })?,
            connection_retry_wait_seconds: number("main.connection_retry_wait_seconds", 10)?,
            feed_base_url: text("main.feed_base_url")
                .unwrap_or_else(|| STREAMLOOTS_ALERTS_URL.to_string()),
            read_timeout_seconds: number("main.read_timeout_seconds", 60)?,
        };
        let nextlist = NextListSection {
            spreadsheet_id: required("nextlist.spreadsheet_id")?,
            vote_column_label: text("nextlist.vote_column_label")
                .unwrap_or_else(|| "Votes".to_string()),
            name_column_label: text("nextlist.name_column_label")
                .unwrap_or_else(|| "Name".to_string()),
            sheets_api_url: text("nextlist.sheets_api_url")
                .unwrap_or_else(|| SHEETS_API_URL.to_string()),
            access_token: text("nextlist.access_token"),
        };

        Ok(Self { main, nextlist })
    }

    /// Connector settings for the configured channel.
    pub fn connector_config(&self) -> ConnectorConfig {
        let mut connector =
            ConnectorConfig::for_channel(&self.main.feed_base_url, &self.main.streamloots_id);
        connector.max_attempts = self.main.max_retries;
        connector.retry_wait = Duration::from_secs(self.main.connection_retry_wait_seconds);
        connector.read_timeout = Duration::from_secs(self.main.read_timeout_seconds);
        connector
    }

    /// Fixed bearer token overriding Google credential discovery: the
    /// configured one, else the `GOOGLE_SHEETS_ACCESS_TOKEN` environment
    /// variable. Such a token is never refreshed; meant for short runs.
    pub fn access_token(&self) -> Option<String> {
        self.nextlist
            .access_token
            .clone()
            .or_else(|| env::var(ACCESS_TOKEN_VAR).ok().filter(|token| !token.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let config = NextListConfig::from_pairs(pairs(&[
            ("main:streamloots_id", "chan-1"),
            ("NextList:Spreadsheet_Id", "sheet-1"),
        ]))
        .unwrap();

        assert_eq!(config.main.log_level, "info");
        assert_eq!(config.main.log_file, None);
        assert_eq!(config.main.max_retries, 3);
        assert_eq!(config.main.connection_retry_wait_seconds, 10);
        assert_eq!(config.nextlist.spreadsheet_id, "sheet-1");
        assert_eq!(config.nextlist.vote_column_label, "Votes");

        let connector = config.connector_config();
        assert_eq!(
            connector.endpoint,
            "https://widgets.streamloots.com/alerts/chan-1/media-stream"
        );
        assert_eq!(connector.retry_wait, Duration::from_secs(10));
        assert_eq!(connector.read_timeout, Duration::from_secs(60));
    }

    #[test]
    fn overrides_and_errors() {
        let config = NextListConfig::from_pairs(pairs(&[
            ("main.streamloots_id", "chan-1"),
            ("main.max_retries", "5"),
            ("main.connection_retry_wait_seconds", " 2 "),
            ("main.log_file", "logs/nextlist.log"),
            ("nextlist.spreadsheet_id", "sheet-1"),
            ("nextlist.access_token", "tok"),
        ]))
        .unwrap();
        assert_eq!(config.connector_config().max_attempts, 5);
        assert_eq!(config.connector_config().retry_wait, Duration::from_secs(2));
        assert_eq!(config.main.log_file, Some(PathBuf::from("logs/nextlist.log")));
        assert_eq!(config.access_token().as_deref(), Some("tok"));

        let missing = NextListConfig::from_pairs(pairs(&[("main.streamloots_id", "chan-1")]));
        assert!(matches!(missing, Err(ConfigError::Missing("nextlist.spreadsheet_id"))));

        let invalid = NextListConfig::from_pairs(pairs(&[
            ("main.streamloots_id", "chan-1"),
            ("main.max_retries", "three"),
            ("nextlist.spreadsheet_id", "sheet-1"),
        ]));
        assert!(matches!(invalid, Err(ConfigError::Invalid { key: "main.max_retries", .. })));
    }

    #[test]
    fn loads_an_ini_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(
            &path,
            "[main]\nlog_level = debug\nstreamloots_id = chan-9\nmax_retries = 4\n\n[nextlist]\nspreadsheet_id = sheet-9\n",
        )
        .unwrap();

        let config = NextListConfig::load(&path).unwrap();
        assert_eq!(config.main.log_level, "debug");
        assert_eq!(config.main.streamloots_id, "chan-9");
        assert_eq!(config.main.max_retries, 4);
        assert_eq!(config.nextlist.spreadsheet_id, "sheet-9");
    }

    #[test]
    fn missing_file_reports_required_key() {
        let dir = tempfile::tempdir().unwrap();
        let result = NextListConfig::load(&dir.path().join("absent.ini"));
        assert!(matches!(result, Err(ConfigError::Missing("main.streamloots_id"))));
    }
}
