//! Global configuration and the settings store the core consumes.
//!
//! Loaded from `~/.config/relaydl/config.toml`. The user-facing knobs (remote
//! base URL, preferred save location) are exposed through [`SettingsSource`];
//! the rest tunes polling, timeouts and retries.

mod base_url;
mod settings;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub use base_url::{normalize_base_url, ConfigError};
pub use settings::{FileSettings, MemorySettings, SettingKey, SettingsSource};

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per remote call (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Timeouts applied by the remote job client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connect timeout for every remote call.
    pub connect_secs: u64,
    /// Total timeout for JSON API calls (info, start, poll, cancel).
    pub request_secs: u64,
    /// Lower bound of the total timeout for an artifact transfer.
    pub artifact_min_secs: u64,
    /// Slowest acceptable average artifact rate; scales the artifact timeout with its size.
    pub artifact_min_bytes_per_sec: u64,
    /// Abort a transfer that stays below this rate for `low_speed_secs`.
    pub low_speed_bytes_per_sec: u32,
    pub low_speed_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            request_secs: 30,
            artifact_min_secs: 300,
            artifact_min_bytes_per_sec: 64 * 1024,
            low_speed_bytes_per_sec: 1024,
            low_speed_secs: 60,
        }
    }
}

impl TimeoutConfig {
    /// Total timeout for an artifact of `size` bytes, or None when the size is unknown
    /// (only the low-speed abort applies then).
    pub fn artifact_timeout(&self, size: Option<u64>) -> Option<Duration> {
        let size = size?;
        let rate = self.artifact_min_bytes_per_sec.max(1);
        let secs = (size / rate).max(self.artifact_min_secs);
        Some(Duration::from_secs(secs))
    }
}

/// Global configuration loaded from `~/.config/relaydl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Base URL of the remote processing server (e.g. `http://nas.local:8000/`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Folder chosen by the user for finished artifacts. None = platform media folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_location: Option<PathBuf>,
    /// Interval between status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive failed polls tolerated before the job is failed.
    #[serde(default = "default_poll_failure_ceiling")]
    pub poll_failure_ceiling: u32,
    /// Capacity of the progress broadcast channel.
    #[serde(default = "default_progress_capacity")]
    pub progress_channel_capacity: usize,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_failure_ceiling() -> u32 {
    30
}

fn default_progress_capacity() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            download_location: None,
            poll_interval_ms: default_poll_interval_ms(),
            poll_failure_ceiling: default_poll_failure_ceiling(),
            progress_channel_capacity: default_progress_capacity(),
            timeouts: TimeoutConfig::default(),
            retry: None,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("relaydl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// State directory (`~/.local/state/relaydl`) holding the log, the ledger and control sockets.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("relaydl")?;
    Ok(xdg_dirs.get_state_home().join("relaydl"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RelayConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<RelayConfig> {
    if !path.exists() {
        let default_cfg = RelayConfig::default();
        save_at(path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: RelayConfig = toml::from_str(&data)?;
    Ok(cfg)
}

/// Write `cfg` to `path` through a temp file + rename so a crash never leaves half a config.
pub fn save_at(path: &Path, cfg: &RelayConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, toml)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
