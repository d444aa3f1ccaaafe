//! `relaydl config ...` – show and edit the user-facing settings.

use anyhow::Result;
use relaydl_core::config::{normalize_base_url, FileSettings, SettingKey, SettingsSource};

use crate::cli::ConfigAction;

pub fn run_config(settings: &FileSettings, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => print!("{}", show(settings)?),
        ConfigAction::SetUrl { url } => {
            let normalized = normalize_base_url(&url)?;
            settings.set(SettingKey::BaseUrl, Some(normalized.as_str()))?;
            println!("Remote server set to {}", normalized);
        }
        ConfigAction::SetLocation { path } => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            std::fs::create_dir_all(&path)?;
            settings.set(SettingKey::DownloadLocation, Some(&path.to_string_lossy()))?;
            println!("Downloads will be saved to {}", path.display());
        }
        ConfigAction::ClearLocation => {
            settings.set(SettingKey::DownloadLocation, None)?;
            println!("Downloads will be saved to the Videos / Music folders");
        }
    }
    Ok(())
}

fn show(settings: &FileSettings) -> Result<String> {
    let cfg = settings.load()?;
    let mut out = format!("config file:       {}\n", settings.path().display());
    out.push_str(&format!(
        "base_url:          {}\n",
        settings.get(SettingKey::BaseUrl).as_deref().unwrap_or("(not set)")
    ));
    out.push_str(&format!(
        "download_location: {}\n",
        settings
            .get(SettingKey::DownloadLocation)
            .as_deref()
            .unwrap_or("(Videos / Music)")
    ));
    out.push_str(&format!("poll_interval_ms:  {}\n", cfg.poll_interval_ms));
    out.push_str(&format!("poll_failure_ceiling: {}\n", cfg.poll_failure_ceiling));
    Ok(out)
}
