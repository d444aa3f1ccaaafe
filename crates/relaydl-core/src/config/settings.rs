//! Key/value settings view consumed by the core (base URL, save location).

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::RwLock;

use super::{load_or_init_at, save_at, RelayConfig};

/// Keys the core reads at job start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    BaseUrl,
    DownloadLocation,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::BaseUrl => "base_url",
            SettingKey::DownloadLocation => "download_location",
        }
    }
}

impl FromStr for SettingKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base_url" | "base-url" => Ok(SettingKey::BaseUrl),
            "download_location" | "download-location" => Ok(SettingKey::DownloadLocation),
            other => anyhow::bail!("unknown setting {:?}", other),
        }
    }
}

/// Simple read/write settings source. Values are plain strings; `None` means unset.
pub trait SettingsSource: Send + Sync {
    fn get(&self, key: SettingKey) -> Option<String>;
    fn set(&self, key: SettingKey, value: Option<&str>) -> Result<()>;
}

/// Settings backed by `config.toml`. Each read goes to disk so edits made by
/// another process (e.g. `relaydl config set-url`) are picked up by the next job.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Settings at the default XDG config path.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(super::config_path()?))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn load(&self) -> Result<RelayConfig> {
        load_or_init_at(&self.path)
    }
}

impl SettingsSource for FileSettings {
    fn get(&self, key: SettingKey) -> Option<String> {
        let cfg = match self.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "could not read settings: {:#}", e);
                return None;
            }
        };
        match key {
            SettingKey::BaseUrl => cfg.base_url,
            SettingKey::DownloadLocation => cfg
                .download_location
                .map(|p| p.to_string_lossy().into_owned()),
        }
        .filter(|v| !v.trim().is_empty())
    }

    fn set(&self, key: SettingKey, value: Option<&str>) -> Result<()> {
        let mut cfg = self.load()?;
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        match key {
            SettingKey::BaseUrl => cfg.base_url = value.map(str::to_string),
            SettingKey::DownloadLocation => cfg.download_location = value.map(PathBuf::from),
        }
        save_at(&self.path, &cfg)?;
        tracing::debug!(key = key.as_str(), "setting updated");
        Ok(())
    }
}

/// In-memory settings, for tests and embedders that keep settings elsewhere.
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<SettingKey, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: SettingKey, value: impl Into<String>) -> Self {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value.into());
        self
    }
}

impl SettingsSource for MemorySettings {
    fn get(&self, key: SettingKey) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }

    fn set(&self, key: SettingKey, value: Option<&str>) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        match value {
            Some(v) => values.insert(key, v.to_string()),
            None => values.remove(&key),
        };
        Ok(())
    }
}
