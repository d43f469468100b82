//! Bar configuration loaded from a TOML file.
//!
//! The configuration is a list of widget entries, each carrying the
//! widget name plus a loosely-typed options table. Widgets pull their
//! own options out with the typed accessors and fall back to defaults
//! for anything missing or mistyped; unknown options only produce a
//! warning so a typo never takes the bar down.
//!
//! ```toml
//! [[widgets]]
//! name = "desktops"
//!
//! [[widgets]]
//! name = "weather"
//! options = { location = "Amsterdam", unit = "c", refresh_interval = 600 }
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Default poll cadence for timed widgets, in seconds.
pub const DEFAULT_REFRESH_INTERVAL: u64 = 60;

/// Errors from loading the bar configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level bar configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BarConfig {
    /// Widgets to host, in display order.
    #[serde(default)]
    pub widgets: Vec<WidgetEntry>,
}

impl BarConfig {
    /// Load the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::parse(&raw)?)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// One widget instance in the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetEntry {
    /// Widget name ("desktops", "weather", "email").
    pub name: String,
    /// Widget-specific options.
    #[serde(default)]
    pub options: toml::Table,
}

impl WidgetEntry {
    /// Create an entry with no options, mainly for tests and defaults.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            options: toml::Table::new(),
        }
    }

    /// String option, or `default` when missing or mistyped.
    pub fn option_str(&self, key: &str, default: &str) -> String {
        self.options
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    /// Boolean option, or `default` when missing or mistyped.
    pub fn option_bool(&self, key: &str, default: bool) -> bool {
        self.options
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Poll cadence in seconds. Zero or negative values fall back to
    /// the default so a bad config cannot produce a busy loop.
    pub fn refresh_interval(&self) -> u64 {
        self.options
            .get("refresh_interval")
            .and_then(|v| v.as_integer())
            .filter(|&v| v > 0)
            .map(|v| v as u64)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }

    /// Warn about options this widget does not understand.
    pub fn warn_unknown_options(&self, known_keys: &[&str]) {
        for key in self.options.keys() {
            if !known_keys.contains(&key.as_str()) {
                warn!(
                    "Unknown option '{}' for widget '{}' - possible typo?",
                    key, self.name
                );
            }
        }
    }
}
