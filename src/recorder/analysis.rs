// Live input analysis - Rolling window of the latest captured samples
//
// The capture callback writes with `try_lock`, so a reader holding the lock
// costs the window one chunk instead of blocking the audio thread.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct AnalysisWindow {
    samples: Vec<f32>,
    write_pos: usize,
}

/// What a waveform renderer reads while recording
#[derive(Clone, Debug)]
pub struct AnalysisHandle {
    window: Arc<Mutex<AnalysisWindow>>,
}

impl AnalysisHandle {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: Arc::new(Mutex::new(AnalysisWindow {
                samples: vec![0.0; window_size.max(1)],
                write_pos: 0,
            })),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.lock().samples.len()
    }

    /// Feed interleaved frames, downmixed to mono. Drops the chunk if a
    /// reader currently holds the window.
    pub fn push_interleaved(&self, data: &[f32], channels: usize) {
        let Some(mut window) = self.window.try_lock() else {
            return;
        };
        let channels = channels.max(1);
        let len = window.samples.len();

        for frame in data.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            let pos = window.write_pos;
            window.samples[pos] = mono;
            window.write_pos = (pos + 1) % len;
        }
    }

    /// Window contents, oldest sample first
    pub fn time_domain(&self) -> Vec<f32> {
        let window = self.window.lock();
        let (newer, older) = window.samples.split_at(window.write_pos);
        older.iter().chain(newer).copied().collect()
    }

    pub fn peak(&self) -> f32 {
        self.window
            .lock()
            .samples
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        let window = self.window.lock();
        let sum: f32 = window.samples.iter().map(|s| s * s).sum();
        (sum / window.samples.len() as f32).sqrt()
    }
}
