// Metronome configuration loaded from RON
//
// Read-only input: nothing in the crate writes settings back.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::recorder::RecorderConfig;
use crate::sequencer::click::ClickConfig;
use crate::sequencer::scheduler::{SchedulerConfig, SchedulerConfigError};
use crate::sequencer::tempo::Tempo;

/// File the runner looks for in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "metronome.ron";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Scheduler settings: {0}")]
    Scheduler(#[from] SchedulerConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// BPM at startup; clamped into the supported range
    pub initial_tempo: f64,
    pub scheduler: SchedulerConfig,
    pub click: ClickConfig,
    pub recorder: RecorderConfig,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            initial_tempo: Tempo::DEFAULT_BPM,
            scheduler: SchedulerConfig::default(),
            click: ClickConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl MetronomeConfig {
    /// Parse and validate; out-of-range scheduler timing is an error
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path.as_ref())?;
        let config = Self::from_ron_str(&source)?;
        info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Defaults when the file is missing; a file that fails to parse is
    /// reported and ignored
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("Ignoring {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::clamped(self.initial_tempo)
    }
}
