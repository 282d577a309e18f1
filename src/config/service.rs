//! Process configuration
//!
//! Loaded from environment variables or a TOML file:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | CALLSHEET_CONFIG | config.json | Configuration document path |
//! | CALLSHEET_SPREADSHEET_ID | - | Spreadsheet holding the tables |
//! | CALLSHEET_TRANSPORT | memory | memory or http |
//! | CALLSHEET_SHEETS_URL | Sheets v4 endpoint | Values API base URL |
//! | CALLSHEET_SHEETS_TOKEN | - | Bearer token for the values API |
//! | CALLSHEET_EVICTION_INTERVAL_SECS | 10 | Seconds between eviction cycles |
//! | CALLSHEET_EVICTION_TABLE | Requests | Table scanned for evictions |
//! | CALLSHEET_CONFIRM_TIMEOUT_SECS | 180 | Confirmation gate timeout |
//! | CALLSHEET_LOG_JSON | false | Emit JSON log lines |

use crate::config::ConfigError;
use crate::confirm::DEFAULT_CONFIRMATION_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Which sheet transport to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process tables, lost on exit
    #[default]
    Memory,
    /// Remote values API (needs the `sheets-http` feature)
    Http,
}

impl std::str::FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(TransportKind::Memory),
            "http" => Ok(TransportKind::Http),
            other => Err(ConfigError::Invalid(format!("unknown transport: {}", other))),
        }
    }
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub config_path: PathBuf,
    pub spreadsheet_id: String,
    pub transport: TransportKind,
    pub sheets_url: String,
    pub sheets_token: Option<String>,
    #[serde(with = "duration_secs")]
    pub eviction_interval: Duration,
    pub eviction_table: String,
    #[serde(with = "duration_secs")]
    pub confirmation_timeout: Duration,
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            config_path: PathBuf::from("config.json"),
            spreadsheet_id: String::new(),
            transport: TransportKind::Memory,
            sheets_url: DEFAULT_SHEETS_URL.to_string(),
            sheets_token: None,
            eviction_interval: Duration::from_secs(10),
            eviction_table: "Requests".to_string(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            log_json: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ServiceConfig::default();
        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::Invalid(format!("{} must be whole seconds", key))),
                None => Ok(default),
            }
        };

        let config = ServiceConfig {
            config_path: lookup("CALLSHEET_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_path),
            spreadsheet_id: lookup("CALLSHEET_SPREADSHEET_ID").unwrap_or_default(),
            transport: match lookup("CALLSHEET_TRANSPORT") {
                Some(v) => v.parse()?,
                None => defaults.transport,
            },
            sheets_url: lookup("CALLSHEET_SHEETS_URL").unwrap_or(defaults.sheets_url),
            sheets_token: lookup("CALLSHEET_SHEETS_TOKEN"),
            eviction_interval: secs("CALLSHEET_EVICTION_INTERVAL_SECS", defaults.eviction_interval)?,
            eviction_table: lookup("CALLSHEET_EVICTION_TABLE").unwrap_or(defaults.eviction_table),
            confirmation_timeout: secs(
                "CALLSHEET_CONFIRM_TIMEOUT_SECS",
                defaults.confirmation_timeout,
            )?,
            log_json: lookup("CALLSHEET_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eviction_interval.is_zero() {
            return Err(ConfigError::Invalid("eviction interval must be non-zero".to_string()));
        }
        if self.eviction_table.is_empty() {
            return Err(ConfigError::Invalid("eviction table must be named".to_string()));
        }
        if self.transport == TransportKind::Http {
            if self.spreadsheet_id.is_empty() {
                return Err(ConfigError::Invalid(
                    "http transport needs a spreadsheet id".to_string(),
                ));
            }
            if self.sheets_token.is_none() {
                return Err(ConfigError::Invalid(
                    "http transport needs a bearer token".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Serde helper for Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
