// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_COLOR_MODE, DEFAULT_DEPTH_MODE, DEFAULT_SMOOTHING_FACTOR, DEPTH_MAX_USABLE_MM,
    DEPTH_MIN_USABLE_MM,
};
use crate::driver::VideoMode;
use crate::errors::{ConfigError, ConfigResult};

/// User configuration, persisted as JSON under the platform config directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Near bound of the default depth clipping range (mm)
    pub depth_near_mm: u16,
    /// Far bound of the default depth clipping range (mm)
    pub depth_far_mm: u16,
    /// Reverse the depth ramp in remapped views
    pub invert_depth_view: bool,
    /// Mirror streams horizontally by default
    pub mirror: bool,
    /// Skeleton smoothing factor applied to new user trackers
    pub smoothing_factor: f32,
    /// Preferred mode for depth and IR streams
    pub depth_mode: VideoMode,
    /// Preferred mode for color streams
    pub color_mode: VideoMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            depth_near_mm: DEPTH_MIN_USABLE_MM,
            depth_far_mm: DEPTH_MAX_USABLE_MM,
            invert_depth_view: false,
            mirror: false,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            depth_mode: DEFAULT_DEPTH_MODE,
            color_mode: DEFAULT_COLOR_MODE,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults on any
    /// failure (missing file, unreadable, unparsable)
    pub fn load() -> Config {
        let Some(path) = Self::default_path() else {
            return Config::default();
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to load config, using defaults");
                Config::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> ConfigResult<Config> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Persist to the default location, creating the directory if needed
    pub fn save(&self) -> ConfigResult<()> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("depthsense").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_clipping_matches_usable_range() {
        let config = Config::default();
        assert_eq!(config.depth_near_mm, 500);
        assert_eq!(config.depth_far_mm, 4000);
        assert!(config.depth_near_mm < config.depth_far_mm);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = Config::default();
        config.mirror = true;
        config.depth_mode = VideoMode {
            width: 320,
            height: 240,
            fps: 60,
        };

        let text = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
