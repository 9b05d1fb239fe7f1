//! Configuration file parser for ~/.config/sitemap-scout/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but logged, since they are usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::filter::FilterSpec;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `User-Agent` sent with every discovery request.
    pub user_agent: String,

    /// Per-request timeout in seconds, covering both headers and body.
    pub request_timeout_secs: u64,

    /// Largest response body accepted from any candidate, in bytes.
    pub max_response_bytes: usize,

    /// Permit requests to localhost and private address ranges.
    /// Off by default because robots.txt can point discovery anywhere.
    pub allow_private_hosts: bool,

    /// Default filter applied when no filter flags are given.
    pub filter: FilterSpec,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "Mozilla/5.0 (compatible; sitemap-scout/{})",
                env!("CARGO_PKG_VERSION")
            ),
            request_timeout_secs: 15,
            max_response_bytes: 50 * 1024 * 1024,
            allow_private_hosts: false,
            filter: FilterSpec::default(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Default location: `$HOME/.config/sitemap-scout/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("sitemap-scout")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        warn_unknown_keys(&content);

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            timeout_secs = config.request_timeout_secs,
            allow_private_hosts = config.allow_private_hosts,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn warn_unknown_keys(content: &str) {
    const KNOWN_KEYS: [&str; 5] = [
        "user_agent",
        "request_timeout_secs",
        "max_response_bytes",
        "allow_private_hosts",
        "filter",
    ];
    const KNOWN_FILTER_KEYS: [&str; 4] = [
        "include_keywords",
        "include_pattern",
        "exclude_keywords",
        "exclude_pattern",
    ];

    let Ok(raw) = content.parse::<toml::Table>() else {
        return;
    };

    for (key, value) in &raw {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        }
        if key != "filter" {
            continue;
        }
        if let Some(table) = value.as_table() {
            for filter_key in table.keys() {
                if !KNOWN_FILTER_KEYS.contains(&filter_key.as_str()) {
                    tracing::warn!(key = %format!("filter.{filter_key}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
