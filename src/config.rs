use crate::{enums::QualityMode, filters::EnhancementFilters, viewport::WindowLevel};

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub filters: EnhancementFilters,
    #[serde(default = "default_presets")]
    pub presets: Vec<WindowPreset>,
    #[serde(default)]
    pub toolkit: ToolkitConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            interaction: InteractionConfig::default(),
            playback: PlaybackConfig::default(),
            render: RenderConfig::default(),
            filters: EnhancementFilters::default(),
            presets: default_presets(),
            toolkit: ToolkitConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let interaction = &self.interaction;
        for (name, value) in [
            ("interaction.zoom_sensitivity", interaction.zoom_sensitivity),
            ("interaction.window_sensitivity", interaction.window_sensitivity),
            ("interaction.rotate_sensitivity", interaction.rotate_sensitivity),
            ("interaction.scroll_step_px", interaction.scroll_step_px),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.playback.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "playback.interval_ms must be at least 1".into(),
            ));
        }
        if self.render.supersample == 0 {
            return Err(ConfigError::Invalid(
                "render.supersample must be at least 1".into(),
            ));
        }
        if let Some(preset) = self.presets.iter().find(|p| !(p.width > 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "preset {} needs a positive width",
                preset.name
            )));
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Option<&WindowPreset> {
        self.presets
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Zoom factor change per pixel of vertical drag.
    pub zoom_sensitivity: f32,
    /// Window width/center change per pixel of drag.
    pub window_sensitivity: f32,
    /// Degrees per pixel of horizontal drag.
    pub rotate_sensitivity: f32,
    /// Vertical drag distance that moves the stack by one frame.
    pub scroll_step_px: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            zoom_sensitivity: 0.01,
            window_sensitivity: 1.0,
            rotate_sensitivity: 0.5,
            scroll_step_px: 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub quality: QualityMode,
    /// Samples per axis per output pixel in high quality mode.
    pub supersample: u32,
    /// Weight of the unsharp mask at sharpness 100%.
    pub sharpen_gain: f32,
    /// Neighbouring frames queued for decode around the current one.
    pub prefetch_radius: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            quality: QualityMode::Standard,
            supersample: 2,
            sharpen_gain: 1.0,
            prefetch_radius: 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Worker threads for decode and render; 0 picks the rayon default.
    pub threads: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowPreset {
    pub name: String,
    pub width: f32,
    pub center: f32,
}

impl WindowPreset {
    fn new(name: &str, width: f32, center: f32) -> Self {
        Self {
            name: name.to_string(),
            width,
            center,
        }
    }

    pub fn window(&self) -> WindowLevel {
        WindowLevel::new(self.width, self.center)
    }
}

fn default_presets() -> Vec<WindowPreset> {
    vec![
        WindowPreset::new("Brain", 80.0, 40.0),
        WindowPreset::new("Abdomen", 400.0, 40.0),
        WindowPreset::new("Mediastinum", 350.0, 50.0),
        WindowPreset::new("Lung", 1500.0, -600.0),
        WindowPreset::new("Bone", 2000.0, 500.0),
    ]
}
