// Audio module - Output context, clock and tone rendering
//
// The output stream's rendered-sample counter is the metronome's time
// reference. Everything that must happen "at time T" is expressed as a
// `ToneEvent` and rendered sample-accurately inside the cpal callback.

pub mod clock;
pub mod context;
pub mod dsp_utils;
pub mod parameters;
pub mod timing;
pub mod tone;

use thiserror::Error;

pub use clock::{AudioClock, ManualClock};
pub use context::{AudioContext, ContextHandle, ContextState};
pub use tone::{ToneEvent, ToneRenderer};

/// Errors raised while acquiring or driving the audio output context
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoOutputDevice,

    #[error("Output configuration error: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Unsupported sample format: {0}. Supported formats: F32, I16, U16")]
    UnsupportedSampleFormat(String),

    #[error("Error in stream creation: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Error in stream beginning: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Error while suspending stream: {0}")]
    Pause(#[from] cpal::PauseStreamError),
}
