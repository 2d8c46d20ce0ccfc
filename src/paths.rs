//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (local state store) | `~/Library/Application Support/timeslicer/` | `~/.local/share/timeslicer/` |
//! | Config | `~/Library/Application Support/timeslicer/` | `~/.config/timeslicer/` |
//!
//! # Environment Overrides
//!
//! - `TIMESLICER_DATA_DIR` overrides [`data_dir`]
//! - `TIMESLICER_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the file-backed state documents used when no remote store is
/// configured.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TIMESLICER_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("timeslicer"))
        .unwrap_or_else(|| PathBuf::from("/tmp/timeslicer-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TIMESLICER_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("timeslicer"))
        .unwrap_or_else(|| PathBuf::from("/tmp/timeslicer-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory for locally stored state documents (`data_dir()/state/`).
#[must_use]
pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}
