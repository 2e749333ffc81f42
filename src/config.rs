// config.rs

use crate::error::{Result, SyncError};
use config::FileFormat;
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;

/// Lead time reserved before the first tick so the audio device can schedule it
pub const DEFAULT_START_OFFSET: f64 = 0.5;
/// Tempo reported while no map is loaded
pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_FRAME_RATE: u32 = 60;
/// Prefix for environment overrides, e.g. `BEATSYNC_START_OFFSET`
pub const ENV_PREFIX: &str = "BEATSYNC";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub start_offset: f64,
    pub default_bpm: f64,
    pub manual_offset: f64,
    pub frame_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_offset: DEFAULT_START_OFFSET,
            default_bpm: DEFAULT_BPM,
            manual_offset: 0.0,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

impl EngineConfig {
    /// Defaults, then the optional settings file, then `BEATSYNC_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("Reading engine settings from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let parsed: EngineConfig = settings.try_deserialize()?;
        parsed.validate()?;
        debug!("Engine settings: {:?}", parsed);
        Ok(parsed)
    }

    /// Defaults overlaid with settings from an in-memory document
    pub fn from_text(text: &str, format: FileFormat) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, format))
            .build()?;
        let parsed: EngineConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start_offset.is_finite() || self.start_offset < 0.0 {
            return Err(SyncError::Config(format!(
                "start_offset must be non-negative, got {}",
                self.start_offset
            )));
        }
        if !self.default_bpm.is_finite() || self.default_bpm <= 0.0 {
            return Err(SyncError::Config(format!(
                "default_bpm must be positive, got {}",
                self.default_bpm
            )));
        }
        if !self.manual_offset.is_finite() {
            return Err(SyncError::Config("manual_offset must be finite".to_string()));
        }
        if self.frame_rate == 0 {
            return Err(SyncError::Config("frame_rate must be positive".to_string()));
        }
        Ok(())
    }
}
