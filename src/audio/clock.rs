// Clock source - The time reference the beat scheduler runs against

use super::tone::ToneEvent;
use parking_lot::Mutex;
use std::sync::Arc;

/// A monotonically increasing audio clock that can play tones at exact times
///
/// Implementations must be cheap to query: the scheduler reads the clock once
/// per poll and schedules every beat in the lookahead window against that
/// single reading.
pub trait AudioClock: Send + 'static {
    /// Current audio time in seconds
    fn current_time(&self) -> f64;

    /// Commit a tone to play at `tone.start`
    fn schedule_tone(&self, tone: ToneEvent);
}

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    tones: Vec<ToneEvent>,
}

/// Hand-driven clock that records every scheduled tone
///
/// Used for offline rendering of click schedules and for deterministic tests
/// of the scheduler. Clones share the same time and tone log.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `time` seconds
    pub fn starting_at(time: f64) -> Self {
        let clock = Self::new();
        clock.set_time(time);
        clock
    }

    /// Move the clock to `time`; moving backwards is ignored
    pub fn set_time(&self, time: f64) {
        let mut state = self.state.lock();
        if time > state.now {
            state.now = time;
        }
    }

    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.lock();
        if seconds > 0.0 {
            state.now += seconds;
        }
    }

    /// All tones scheduled so far, in scheduling order
    pub fn tones(&self) -> Vec<ToneEvent> {
        self.state.lock().tones.clone()
    }

    /// Drain the tone log
    pub fn take_tones(&self) -> Vec<ToneEvent> {
        std::mem::take(&mut self.state.lock().tones)
    }
}

impl AudioClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.state.lock().now
    }

    fn schedule_tone(&self, tone: ToneEvent) {
        self.state.lock().tones.push(tone);
    }
}
