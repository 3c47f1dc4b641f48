// SPDX-License-Identifier: GPL-3.0-only

//! User configuration handling

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Name of the directory under the user config dir
const CONFIG_DIR: &str = "digicam";

/// Name of the configuration file
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the streaming helper script. When unset, the script is
    /// looked up next to the executable.
    pub helper_script: Option<PathBuf>,
    /// Directory where captured stills are written. When unset, the
    /// current working directory is used.
    pub photo_dir: Option<PathBuf>,
    /// Hot-plug poll interval in seconds
    pub hotplug_interval_secs: u64,
    /// Whether to attach the in-app preview decoder after a stream starts.
    /// Disabling it leaves the loopback device entirely to external
    /// consumers.
    pub preview_enabled: bool,
    /// Port of the camera selected in the previous run
    pub last_camera_port: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            helper_script: None,
            photo_dir: None,
            hotplug_interval_secs: crate::constants::timing::HOTPLUG_INTERVAL.as_secs(),
            preview_enabled: true,
            last_camera_port: None,
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults on any error
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    debug!(path = ?path, "Loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Malformed configuration, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist the configuration
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, contents)?;
        debug!(path = ?path, "Saved configuration");
        Ok(())
    }

    /// Resolve the streaming helper script path.
    ///
    /// An explicitly configured path wins; otherwise the script is expected
    /// next to the executable.
    pub fn resolve_helper_script(&self) -> PathBuf {
        if let Some(path) = &self.helper_script {
            return path.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::constants::tools::STREAM_HELPER)
    }

    /// Resolve the directory captured stills are written to
    pub fn resolve_photo_dir(&self) -> PathBuf {
        self.photo_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_preview() {
        let config = Config::default();
        assert!(config.preview_enabled);
        assert_eq!(config.hotplug_interval_secs, 15);
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = Config::default();
        config.last_camera_port = Some("usb:001,004".to_string());
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }
}
