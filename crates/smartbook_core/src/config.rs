//! Core configuration.
//!
//! # Responsibility
//! - Hold tunables shared by services: collection name, log level and the
//!   scheme used to complete scheme-less URLs.
//! - Load them from JSON, falling back to defaults for absent keys.
//!
//! # Invariants
//! - A validated config has a non-blank collection, a supported log level
//!   and an `http` or `https` default scheme.

use crate::logging::{default_log_level, normalize_level};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub const DEFAULT_COLLECTION: &str = "bookmarks";
pub const DEFAULT_URL_SCHEME: &str = "https";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Gateway collection holding bookmark rows.
    pub collection: String,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Prepended to URLs that do not start with `http`.
    pub default_url_scheme: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            log_level: default_log_level().to_string(),
            default_url_scheme: DEFAULT_URL_SCHEME.to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("collection cannot be blank".to_string()));
        }
        normalize_level(&self.log_level).map_err(ConfigError::Invalid)?;
        match self.default_url_scheme.as_str() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "default_url_scheme must be http or https, got `{other}`"
            ))),
        }
    }
}
