// Tempo - Bounded BPM and inter-beat duration

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TempoError {
    #[error("BPM must be between {min} and {max}, got {bpm}")]
    OutOfRange { bpm: f64, min: f64, max: f64 },
}

/// Tempo in BPM (Beats Per Minute), always within [`Tempo::MIN_BPM`, `Tempo::MAX_BPM`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 40.0;
    pub const MAX_BPM: f64 = 240.0;
    pub const DEFAULT_BPM: f64 = 120.0;

    /// Creates a new tempo, rejecting values outside [40, 240] (and NaN)
    pub fn new(bpm: f64) -> Result<Self, TempoError> {
        if !(Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm) {
            return Err(TempoError::OutOfRange {
                bpm,
                min: Self::MIN_BPM,
                max: Self::MAX_BPM,
            });
        }
        Ok(Self { bpm })
    }

    /// Creates a tempo, saturating at the bounds (for sliders and nudges)
    pub fn clamped(bpm: f64) -> Self {
        if bpm.is_nan() {
            return Self::default();
        }
        Self {
            bpm: bpm.clamp(Self::MIN_BPM, Self::MAX_BPM),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds (60 / BPM)
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(self.beat_duration_seconds())
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: Self::DEFAULT_BPM,
        }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}
