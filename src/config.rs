use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Engine-wide settings, shared between the render thread and whoever owns the session.
pub type SharedSettings = Arc<ArcSwap<Settings>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Hz
    pub sample_rate: u32,
    pub mixer_channels: usize,
    pub fx_units: usize,
    pub master_volume: f32,
    /// Ticks between progress callbacks, 0 disables them.
    pub progress_interval: u64,
    /// Frames
    pub ring_capacity: usize,
    pub ring_wait_ms: u64,
    pub wav_bits: WavBits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WavBits {
    Int16,
    Float32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            mixer_channels: 16,
            fx_units: 4,
            master_volume: 1.0,
            progress_interval: 44100,
            ring_capacity: 4096,
            ring_wait_ms: 100,
            wav_bits: WavBits::Int16,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to write settings: {0}")]
    Serialize(#[from] ron::Error),
    #[error("{0}")]
    Invalid(String),
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let settings: Settings = ron::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.mixer_channels == 0 {
            return Err(ConfigError::Invalid("mixer_channels must be at least 1".into()));
        }
        if self.ring_capacity == 0 {
            return Err(ConfigError::Invalid("ring_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn shared(self) -> SharedSettings {
        Arc::new(ArcSwap::from_pointee(self))
    }
}
