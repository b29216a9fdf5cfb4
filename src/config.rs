use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::device::{DEFAULT_DEVICE_PATH, DEFAULT_SIGNAL_NAME};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_path: String,
    pub signal_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig {
                log_level: "info".to_string(),
            },
            device: DeviceConfig {
                device_path: DEFAULT_DEVICE_PATH.to_string(),
                signal_name: DEFAULT_SIGNAL_NAME.to_string(),
            },
        }
    }
}

pub fn load() -> Result<Config, io::Error> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        info!("Config file not found, creating default config");
        let default_config = Config::default();
        save(&default_config)?;
        return Ok(default_config);
    }

    let config_data = fs::read_to_string(config_path)?;
    let config: Config = serde_json::from_str(&config_data)?;

    Ok(config)
}

pub fn save(config: &Config) -> Result<(), io::Error> {
    let config_path = get_config_path()?;

    // Ensure directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_json = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_json)?;

    Ok(())
}

fn get_config_path() -> Result<PathBuf, io::Error> {
    let dirs = directories::ProjectDirs::from("com", "procwatch", "procwatch").ok_or(
        io::Error::new(io::ErrorKind::NotFound, "Could not determine config directory"),
    )?;

    let config_dir = dirs.config_dir();
    Ok(config_dir.join("config.json"))
}
