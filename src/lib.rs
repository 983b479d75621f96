// Click Track - Library exports for the runner, tests and benchmarks

pub mod app;
pub mod audio;
pub mod config;
pub mod messaging;
pub mod recorder;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use app::{MetronomeApp, RecordingEvent};
pub use audio::timing::AudioTiming;
pub use audio::{AudioClock, AudioContext, AudioError, ContextHandle, ManualClock, ToneEvent};
pub use config::{ConfigError, MetronomeConfig};
pub use messaging::channels::create_notification_channel;
pub use recorder::{
    CaptureBackend, CaptureConstraints, ClipFormat, CpalCapture, RecordedClip, Recorder,
    RecorderConfig, RecorderError,
};
pub use sequencer::{
    BeatScheduler, ClickSynth, ClickType, Metronome, MetronomeError, Pattern, ScheduledBeat,
    SchedulerConfig, SchedulerConfigError, SharedDisplay, Tempo, TransportState, VisualBeat, VisualSync,
};
