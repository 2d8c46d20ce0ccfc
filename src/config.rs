//! Configuration types for the sync client.

use crate::error::{Result, TimeslicerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeslicerConfig {
    /// Remote state store connection.
    pub remote: RemoteConfig,
    /// Save/reload timing policy.
    pub sync: SyncConfig,
    /// Reference time zone for day/week keys.
    pub time: TimeConfig,
}

/// Remote state store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the state service (e.g. `https://api.example.com/timeslicer`).
    ///
    /// When `None`, state is kept in a local file per client identity.
    pub api_base: Option<String>,
    /// Client identity sent as the `X-TimeSlicer-Client` header.
    ///
    /// Every device using the same identity shares one document.
    pub client_id: String,
    /// Optional bearer token for the `Authorization` header.
    pub bearer_token: Option<String>,
    /// Per-request timeout. A request exceeding it counts as a failed attempt.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            client_id: "default".to_owned(),
            bearer_token: None,
            request_timeout_secs: 10,
        }
    }
}

/// Delay growth between save retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// `retry_delay * attempt`.
    Linear,
    /// `retry_delay * 2^(attempt - 1)`.
    #[default]
    Exponential,
}

impl BackoffKind {
    /// Delay before retry number `attempt` (1-based) given a base delay.
    pub fn delay(self, base: Duration, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Linear => base.saturating_mul(attempt),
            Self::Exponential => {
                let shift = (attempt - 1).min(31);
                base.saturating_mul(1u32 << shift)
            }
        }
    }
}

/// Save coalescing, retry, and reload timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum write attempts per document before it is dropped.
    pub max_save_attempts: u32,
    /// Base delay between write attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Growth of the retry delay.
    pub backoff: BackoffKind,
    /// Delay between the first save request and the write, during which
    /// newer documents replace the pending one.
    pub save_debounce_ms: u64,
    /// A remote reload is discarded when a local commit happened within this
    /// window of the reload starting.
    pub reconcile_debounce_ms: u64,
    /// Periodic reload interval while visible.
    pub resync_interval_secs: u64,
    /// Periodic day/week rollover check interval.
    pub rollover_check_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_save_attempts: 3,
            retry_delay_ms: 500,
            backoff: BackoffKind::default(),
            save_debounce_ms: 250,
            reconcile_debounce_ms: 2_000,
            resync_interval_secs: 30,
            rollover_check_secs: 60,
        }
    }
}

impl SyncConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn reconcile_debounce(&self) -> Duration {
        Duration::from_millis(self.reconcile_debounce_ms)
    }
}

/// Time zone settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// IANA zone name used to derive day and week keys.
    pub time_zone: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_zone: "America/Los_Angeles".to_owned(),
        }
    }
}

impl TimeConfig {
    /// Parse the configured zone.
    ///
    /// # Errors
    ///
    /// Returns [`TimeslicerError::Config`] for unknown zone names.
    pub fn zone(&self) -> Result<chrono_tz::Tz> {
        self.time_zone.parse::<chrono_tz::Tz>().map_err(|e| {
            TimeslicerError::Config(format!("unknown time zone '{}': {e}", self.time_zone))
        })
    }
}

impl TimeslicerConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TimeslicerError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TimeslicerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`paths::config_file()`).
    pub fn default_config_path() -> PathBuf {
        crate::paths::config_file()
    }

    /// Apply `TIMESLICER_API_BASE`, `TIMESLICER_TOKEN`, and
    /// `TIMESLICER_CLIENT_ID` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(base) = get("TIMESLICER_API_BASE") {
            self.remote.api_base = Some(base);
        }
        if let Some(token) = get("TIMESLICER_TOKEN") {
            self.remote.bearer_token = Some(token);
        }
        if let Some(client_id) = get("TIMESLICER_CLIENT_ID") {
            self.remote.client_id = client_id;
        }
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs.max(1))
    }
}
