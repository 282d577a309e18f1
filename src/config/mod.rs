//! Configuration: the shared JSON document and the process settings

mod document;
mod service;

pub use document::{ConfigDocument, ConfigFile, MessageLocator};
pub use service::{ServiceConfig, TransportKind, DEFAULT_SHEETS_URL};

/// Error type for configuration loading and saving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read or written
    Io(String),
    /// Contents do not match the schema
    Parse(String),
    /// Contents parse but break a rule
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "config I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "config does not match schema: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
