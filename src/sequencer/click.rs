// Click synthesizer - Turns a beat into a scheduled tone
// Downbeats get the higher pitch; volume is sampled when the click is built

use serde::{Deserialize, Serialize};

use crate::audio::clock::AudioClock;
use crate::audio::parameters::AtomicGain;
use crate::audio::tone::ToneEvent;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Beat index divisible by 4 (downbeat)
    Accent,
    /// Every other beat
    Regular,
}

impl ClickType {
    pub fn for_beat(beat_index: usize) -> Self {
        if beat_index % 4 == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }
}

/// Click sound parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub accent_frequency_hz: f32,
    pub regular_frequency_hz: f32,
    /// Silence to full volume
    pub attack_secs: f64,
    /// Onset to end of the decay, where the oscillator stops
    pub decay_secs: f64,
    /// Gain the exponential decay reaches at `decay_secs`
    pub floor_gain: f32,
    /// Initial volume in [0, 1]
    pub volume: f32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            accent_frequency_hz: 1000.0,
            regular_frequency_hz: 800.0,
            attack_secs: 0.01,
            decay_secs: 0.08,
            floor_gain: 0.001,
            volume: 0.5,
        }
    }
}

/// Builds click tones and hands them to the clock
#[derive(Debug, Clone)]
pub struct ClickSynth {
    config: ClickConfig,
    volume: AtomicGain,
}

impl ClickSynth {
    pub fn new(config: ClickConfig) -> Self {
        let volume = AtomicGain::new(config.volume);
        Self { config, volume }
    }

    /// Shared volume handle; changes apply to clicks built afterwards
    pub fn volume_control(&self) -> AtomicGain {
        self.volume.clone()
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.set(volume);
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    pub fn frequency_for(&self, click_type: ClickType) -> f32 {
        match click_type {
            ClickType::Accent => self.config.accent_frequency_hz,
            ClickType::Regular => self.config.regular_frequency_hz,
        }
    }

    /// Tone for beat `beat_index` starting at audio time `at`
    pub fn click(&self, beat_index: usize, at: f64) -> ToneEvent {
        ToneEvent {
            start: at,
            frequency: self.frequency_for(ClickType::for_beat(beat_index)),
            peak_gain: self.volume.get(),
            attack: self.config.attack_secs,
            duration: self.config.decay_secs,
            floor_gain: self.config.floor_gain,
        }
    }

    /// Build the click and commit it to `clock`
    pub fn trigger<C: AudioClock>(&self, clock: &C, beat_index: usize, at: f64) -> ToneEvent {
        let tone = self.click(beat_index, at);
        clock.schedule_tone(tone);
        tone
    }
}

impl Default for ClickSynth {
    fn default() -> Self {
        Self::new(ClickConfig::default())
    }
}
