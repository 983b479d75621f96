// Atomic parameters - Lock-free control values shared with the scheduler
// Gain is stored as f32 bits inside an AtomicU32

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Shared gain in [0.0, 1.0]
///
/// Cloning yields another handle to the same value, so the UI can keep one
/// handle while the click synthesizer reads through another.
#[derive(Clone, Debug)]
pub struct AtomicGain {
    inner: Arc<AtomicU32>,
}

impl AtomicGain {
    pub fn new(value: f32) -> Self {
        Self {
            inner: Arc::new(AtomicU32::new(Self::sanitize(value).to_bits())),
        }
    }

    /// Set the gain, clamped to [0.0, 1.0]. NaN is treated as silence.
    pub fn set(&self, value: f32) {
        self.inner
            .store(Self::sanitize(value).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }

    fn sanitize(value: f32) -> f32 {
        if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        }
    }
}

impl Default for AtomicGain {
    fn default() -> Self {
        Self::new(0.5)
    }
}
