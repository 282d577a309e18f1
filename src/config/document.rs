//! The shared configuration document.
//!
//! A small JSON file edited both by this process and by hand. It is re-read
//! on every access so outside edits show up immediately, validated on every
//! read and write, and only ever replaced whole.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Schema of the configuration document. Fields are declared in key order so
/// the written file has sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    /// Locator of the callers list message, `"<channel>-<message>"`
    pub callers_message: String,
    pub callers_role: u64,
    /// Locator of the requests list message, `"<channel>-<message>"`
    pub requests_message: String,
    pub requests_role: u64,
    /// Days a request may wait before it is evicted
    pub requests_timeout: u32,
    /// Voice channel of the live show
    pub show_vc: u64,
    /// Operator channel for audit messages and loop failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<u64>,
}

impl ConfigDocument {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_timeout == 0 {
            return Err(ConfigError::Invalid(
                "requests_timeout must be at least 1 day".to_string(),
            ));
        }
        Ok(())
    }

    pub fn requests_message(&self) -> Option<MessageLocator> {
        MessageLocator::parse(&self.requests_message)
    }

    pub fn callers_message(&self) -> Option<MessageLocator> {
        MessageLocator::parse(&self.callers_message)
    }
}

/// Channel + message pair, stored as `"<channel-id>-<message-id>"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageLocator {
    pub channel_id: u64,
    pub message_id: u64,
}

impl MessageLocator {
    /// Malformed locators mean "not configured", not an error
    pub fn parse(s: &str) -> Option<MessageLocator> {
        let mut parts = s.split('-');
        let channel_id = parts.next()?.trim().parse().ok()?;
        let message_id = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(MessageLocator {
            channel_id,
            message_id,
        })
    }
}

impl std::fmt::Display for MessageLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.channel_id, self.message_id)
    }
}

/// File-backed configuration document
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// Bind to `path` and validate it once up front
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let file = ConfigFile { path: path.into() };
        file.read()?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh, validated read
    pub fn read(&self) -> Result<ConfigDocument, ConfigError> {
        let raw = self.raw()?;
        let doc: ConfigDocument =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Read without schema checks, for showing a broken file to an operator
    pub fn read_unvalidated(&self) -> Result<serde_json::Value, ConfigError> {
        let raw = self.raw()?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// File contents as-is
    pub fn raw(&self) -> Result<String, ConfigError> {
        fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", self.path.display(), e)))
    }

    /// Validate, then replace the whole file
    pub fn write(&self, doc: &ConfigDocument) -> Result<(), ConfigError> {
        doc.validate()?;
        let mut body =
            serde_json::to_string_pretty(doc).map_err(|e| ConfigError::Parse(e.to_string()))?;
        body.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| ConfigError::Io(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", self.path.display(), e)))?;
        info!(path = %self.path.display(), "configuration written");
        Ok(())
    }

    /// Read-modify-write of the whole document
    pub fn update<F>(&self, edit: F) -> Result<ConfigDocument, ConfigError>
    where
        F: FnOnce(&mut ConfigDocument),
    {
        let mut doc = self.read()?;
        edit(&mut doc);
        self.write(&doc)?;
        Ok(doc)
    }

    pub fn requests_timeout_days(&self) -> Result<u32, ConfigError> {
        Ok(self.read()?.requests_timeout)
    }

    pub fn requests_message(&self) -> Result<Option<MessageLocator>, ConfigError> {
        let locator = self.read()?.requests_message();
        if locator.is_none() {
            debug!("requests message not configured");
        }
        Ok(locator)
    }

    pub fn callers_message(&self) -> Result<Option<MessageLocator>, ConfigError> {
        Ok(self.read()?.callers_message())
    }

    pub fn operator_channel(&self) -> Result<Option<u64>, ConfigError> {
        Ok(self.read()?.terminal)
    }
}
