// Configuration management for Reframe

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compose::CanvasPolicy;
use crate::encoding::presets::{DEFAULT_PRESET, MAX_PRESET, MIN_PRESET};
use crate::encoding::EncoderConfig;
use crate::segment::{KeyframeFormat, DEFAULT_THRESHOLD};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `projects/`
    #[serde(default = "get_default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Extraction sensitivity: summed intensity difference that starts a new scene.
    /// Lower keeps more keyframes.
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Image format for extracted keyframes
    #[serde(default)]
    pub keyframe_format: KeyframeFormat,

    /// Output quality preset (1 = lightest, 5 = maximum)
    #[serde(default = "default_encoder_preset")]
    pub encoder_preset: u8,

    /// Keyframe interval in output frames (0 = encoder default)
    #[serde(default)]
    pub keyframe_interval: u32,

    /// What composition does with images that don't match the first image's size
    #[serde(default)]
    pub canvas_policy: CanvasPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: get_default_workspace_root(),
            threshold: DEFAULT_THRESHOLD,
            keyframe_format: KeyframeFormat::default(),
            encoder_preset: DEFAULT_PRESET,
            keyframe_interval: 0,
            canvas_policy: CanvasPolicy::default(),
        }
    }
}

impl Config {
    /// Load config from disk or return default
    pub fn load_or_default(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        log::warn!("Failed to parse config {}: {}", config_path.display(), e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read config file {}: {}", config_path.display(), e);
                }
            }
        }

        Self::default()
    }

    /// Save config to disk
    pub fn save(&self, config_path: &Path) -> anyhow::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(config_path, contents)?;

        Ok(())
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            preset_level: self.encoder_preset.clamp(MIN_PRESET, MAX_PRESET),
            keyframe_interval: self.keyframe_interval,
            ..EncoderConfig::default()
        }
    }
}

/// Get the default config file path
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reframe")
        .join("config.toml")
}

/// Get the default workspace root
fn get_default_workspace_root() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("reframe"))
        .unwrap_or_else(|| PathBuf::from("reframe"))
}

/// Default extraction threshold (for serde)
fn default_threshold() -> u64 {
    DEFAULT_THRESHOLD
}

/// Default encoder preset (for serde)
fn default_encoder_preset() -> u8 {
    DEFAULT_PRESET
}
