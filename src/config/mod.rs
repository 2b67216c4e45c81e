//! Configuration management.
//!
//! This module provides functions for locating the edusync data directory,
//! resolving the database path, and loading settings.
//!
//! # Layout
//!
//! - **Database**: `~/.edusync/data/edusync.db`
//! - **Settings**: `~/.edusync/config.json`
//!
//! `EDUSYNC_HOME` relocates the whole directory (used by the integration
//! tests and by devices that keep data on removable storage).

use crate::error::{Error, Result};
use crate::model::is_valid_collection_name;
use crate::outbox::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the edusync data directory.
///
/// `EDUSYNC_HOME` if set, otherwise `~/.edusync/`.
#[must_use]
pub fn edusync_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("EDUSYNC_HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    directories::BaseDirs::new().map(|b| b.home_dir().join(".edusync"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `EDUSYNC_TEST_DB=1` (or any non-empty value).
/// This redirects all database operations to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("EDUSYNC_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Get the test database path.
///
/// Returns `~/.edusync/test/edusync.db` for isolated testing.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    edusync_dir().map(|dir| dir.join("test").join("edusync.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `EDUSYNC_TEST_DB` environment variable → uses test database
/// 3. `EDUSYNC_DB` environment variable
/// 4. Default location: `~/.edusync/data/edusync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("EDUSYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    edusync_dir().map(|dir| dir.join("data").join("edusync.db"))
}

/// Get the settings file path.
///
/// # Errors
///
/// Returns `Error::Config` if no home directory can be determined.
pub fn config_path() -> Result<PathBuf> {
    edusync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

// ── Settings file ─────────────────────────────────────────────

/// Contents of `config.json`. Every field is optional on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdusyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub mirror: MirrorSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_max_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_interval_secs: Option<u64>,
}

/// Collections mirrored wholesale, and how often `watch` re-reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
}

/// Load settings from `path`. A missing file yields the defaults.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<EdusyncConfig> {
    if !path.exists() {
        return Ok(EdusyncConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Load settings from the default location.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<EdusyncConfig> {
    load_config_from(&config_path()?)
}

/// Write settings to `path`, creating its directory.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be written.
pub fn save_config_to(path: &Path, config: &EdusyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

// ── Resolved settings ─────────────────────────────────────────

/// Settings after applying flag > environment > file > default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
    pub probe_interval: Duration,
    pub collections: Vec<String>,
    pub poll_interval: Duration,
}

/// Environment overrides, read once so resolution stays testable.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub remote: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: Option<String>,
}

impl EnvOverrides {
    /// Read `EDUSYNC_REMOTE`, `EDUSYNC_TOKEN` and `EDUSYNC_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            remote: read("EDUSYNC_REMOTE"),
            token: read("EDUSYNC_TOKEN"),
            timeout_secs: read("EDUSYNC_TIMEOUT_SECS"),
        }
    }
}

impl EdusyncConfig {
    /// Apply overrides and defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `EDUSYNC_TIMEOUT_SECS` is not a number or
    /// a configured collection name is not a plain identifier.
    pub fn resolve(&self, remote_flag: Option<&str>, env: &EnvOverrides) -> Result<ResolvedSettings> {
        let endpoint = remote_flag
            .map(str::to_string)
            .or_else(|| env.remote.clone())
            .or_else(|| self.remote.endpoint.clone())
            .filter(|e| !e.trim().is_empty());

        let token = env.token.clone().or_else(|| self.remote.token.clone());

        let timeout_secs = match &env.timeout_secs {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("EDUSYNC_TIMEOUT_SECS must be a number of seconds, got '{raw}'"))
            })?,
            None => self.remote.timeout_secs.unwrap_or(15),
        };

        let defaults = BackoffPolicy::default();
        let backoff = BackoffPolicy {
            base: self
                .outbox
                .backoff_base_secs
                .map_or(defaults.base, Duration::from_secs),
            max: self
                .outbox
                .backoff_max_secs
                .map_or(defaults.max, Duration::from_secs),
        };

        if let Some(bad) = self
            .mirror
            .collections
            .iter()
            .find(|name| !is_valid_collection_name(name))
        {
            return Err(Error::Config(format!("Invalid collection name in mirror.collections: '{bad}'")));
        }

        Ok(ResolvedSettings {
            endpoint,
            token,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            backoff,
            probe_interval: Duration::from_secs(self.watch.probe_interval_secs.unwrap_or(3).max(1)),
            collections: self.mirror.collections.clone(),
            poll_interval: Duration::from_secs(self.mirror.poll_interval_secs.unwrap_or(5).max(1)),
        })
    }
}
