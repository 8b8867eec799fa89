use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Overrides the platform data directory.
pub const DATA_DIR_ENV: &str = "DRIP_DATA_DIR";
/// Set to `off` (or `0`/`false`) to deny notification permission.
pub const NOTIFICATIONS_ENV: &str = "DRIP_NOTIFICATIONS";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub notifications: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "drip")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        let notifications = std::env::var(NOTIFICATIONS_ENV)
            .map(|v| notifications_enabled(&v))
            .unwrap_or(true);

        Self::from_data_dir(data_dir, notifications)
    }

    pub fn from_data_dir(data_dir: PathBuf, notifications: bool) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("drip.db");
        let log_dir = data_dir.join("logs");
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

        Ok(Config {
            db_path,
            data_dir,
            log_dir,
            notifications,
        })
    }
}

fn notifications_enabled(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "off" | "0" | "false" | "no"
    )
}
