// Sequencer module
// Tempo, pattern and lookahead scheduling of the metronome clicks

pub mod click;
pub mod metronome;
pub mod pattern;
pub mod poll;
pub mod scheduler;
pub mod tempo;
pub mod transport;
pub mod visual;

pub use click::{ClickConfig, ClickSynth, ClickType};
pub use metronome::{Metronome, MetronomeError};
pub use pattern::{Pattern, STEPS};
pub use scheduler::{
    BeatScheduler, COUNT_IN_BEATS, ScheduledBeat, SchedulerConfig, SchedulerConfigError,
};
pub use tempo::{Tempo, TempoError};
pub use transport::TransportState;
pub use visual::{BeatPhase, DisplaySnapshot, SharedDisplay, VisualBeat, VisualSync};
