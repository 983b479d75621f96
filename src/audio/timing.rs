// Audio timing - Sample counter exposed as a clock in seconds

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared rendered-sample counter
///
/// The output callback advances it after each buffer; any thread can read
/// it as the current audio time. It only moves while the stream runs, so a
/// suspended context has a frozen clock.
#[derive(Clone, Debug)]
pub struct AudioTiming {
    /// Frames rendered since the stream was created
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioTiming {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Current frame position (called from the scheduler thread)
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance frame position (called from the audio callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Release);
    }

    /// Current audio time in seconds
    pub fn current_time(&self) -> f64 {
        self.time_of(self.current_sample())
    }

    /// Time in seconds of a given frame
    pub fn time_of(&self, sample: u64) -> f64 {
        sample as f64 / self.sample_rate
    }

    /// First frame at or after `time` seconds
    pub fn sample_at(&self, time: f64) -> u64 {
        if time <= 0.0 {
            0
        } else {
            (time * self.sample_rate).ceil() as u64
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
