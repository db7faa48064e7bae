//! Application directory paths for Lara.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/lara/` | `~/.local/share/lara/` |
//! | Config | `~/Library/Application Support/lara/` | `~/.config/lara/` |
//!
//! Overrides for testing or custom deployments:
//! - `LARA_DATA_DIR` overrides [`data_dir`]
//! - `LARA_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory (logs live below it).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LARA_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("lara"))
        .unwrap_or_else(|| PathBuf::from("/tmp/lara-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LARA_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("lara"))
        .unwrap_or_else(|| PathBuf::from("/tmp/lara-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
