// App controller - Owns the audio context, the metronome and the recorder
//
// The audio context is created on the first transport start or recording
// start and reused afterwards; it is never recreated implicitly. Recorder
// failures become notifications and never touch the metronome.

use log::{info, warn};
use ringbuf::traits::Producer;
use std::path::{Path, PathBuf};

use crate::audio::{AudioContext, AudioError, ContextHandle};
use crate::config::MetronomeConfig;
use crate::messaging::{Notification, NotificationCategory, NotificationProducer};
use crate::recorder::{
    CaptureBackend, CaptureConstraints, LiveInput, RecordedClip, Recorder, RecorderError,
};
use crate::sequencer::{
    Metronome, MetronomeError, Pattern, SharedDisplay, Tempo, TransportState,
};

/// Outcome of `toggle_recording`
pub enum RecordingEvent {
    Started(LiveInput),
    Finished(RecordedClip),
    /// Reported through a notification
    Failed,
}

pub struct MetronomeApp<B: CaptureBackend> {
    // Declared before the context so the poll loop stops before the stream goes
    metronome: Metronome<ContextHandle>,
    recorder: Recorder<B>,
    context: Option<AudioContext>,
    constraints: CaptureConstraints,
    notifications: NotificationProducer,
}

impl<B: CaptureBackend> MetronomeApp<B> {
    pub fn new(
        config: &MetronomeConfig,
        backend: B,
        notifications: NotificationProducer,
    ) -> Result<Self, MetronomeError> {
        let mut metronome = Metronome::new(config.scheduler.clone(), config.click.clone())?;
        metronome.set_tempo(config.tempo())?;

        Ok(Self {
            metronome,
            recorder: Recorder::new(backend, config.recorder.clone()),
            context: None,
            constraints: CaptureConstraints::default(),
            notifications,
        })
    }

    /// The context, created on first call and resumed on every call
    ///
    /// A failed resume is not fatal: it is reported and tried again next time.
    fn acquire_context(&mut self) -> Result<ContextHandle, AudioError> {
        let context = match self.context.take() {
            Some(context) => context,
            None => AudioContext::new()?,
        };
        let context = self.context.insert(context);

        let resumed = context.resume();
        let handle = context.handle();
        if let Err(err) = resumed {
            self.notify(Notification::warning(
                NotificationCategory::Audio,
                format!("Could not resume audio output: {err}"),
            ));
        }
        Ok(handle)
    }

    /// Release the output once neither the transport nor a recording needs it
    fn suspend_if_idle(&mut self) {
        if self.metronome.is_running() || self.recorder.is_recording() {
            return;
        }
        let Some(context) = self.context.as_mut() else {
            return;
        };
        if let Err(err) = context.suspend() {
            self.notify(Notification::warning(
                NotificationCategory::Audio,
                format!("Could not suspend audio output: {err}"),
            ));
        }
    }

    pub fn start(&mut self) -> Result<(), MetronomeError> {
        let clock = self.acquire_context()?;
        self.metronome.start(clock)
    }

    pub fn stop(&mut self) {
        self.metronome.stop();
        self.suspend_if_idle();
    }

    /// Start when stopped, stop otherwise; returns the resulting state
    pub fn toggle_playback(&mut self) -> Result<TransportState, MetronomeError> {
        if self.metronome.is_running() {
            self.stop();
        } else {
            self.start()?;
        }
        Ok(self.metronome.transport())
    }

    /// Saturates at the tempo bounds
    pub fn set_tempo(&mut self, bpm: f64) -> Result<Tempo, MetronomeError> {
        let tempo = Tempo::clamped(bpm);
        self.metronome.set_tempo(tempo)?;
        Ok(tempo)
    }

    pub fn set_pattern(&mut self, pattern: Pattern) -> Result<(), MetronomeError> {
        self.metronome.set_pattern(pattern)
    }

    pub fn toggle_step(&mut self, step: usize) -> Result<bool, MetronomeError> {
        self.metronome.toggle_step(step)
    }

    pub fn set_volume(&self, volume: f32) {
        self.metronome.set_volume(volume);
    }

    pub fn set_capture_constraints(&mut self, constraints: CaptureConstraints) {
        self.constraints = constraints;
    }

    pub fn toggle_recording(&mut self) -> RecordingEvent {
        if self.recorder.is_recording() {
            let event = match self.recorder.stop() {
                Ok(clip) => {
                    self.notify(Notification::info(
                        NotificationCategory::Recorder,
                        format!("Recording finished ({:.1}s)", clip.duration_secs()),
                    ));
                    RecordingEvent::Finished(clip)
                }
                Err(err) => {
                    self.report_recorder_error(&err);
                    RecordingEvent::Failed
                }
            };
            self.suspend_if_idle();
            return event;
        }

        // Capture does not depend on the output stream
        if let Err(err) = self.acquire_context() {
            self.notify(Notification::warning(
                NotificationCategory::Audio,
                format!("Recording without audio output: {err}"),
            ));
        }

        match self.recorder.start(&self.constraints) {
            Ok(live) => RecordingEvent::Started(live),
            Err(err) => {
                self.suspend_if_idle();
                self.report_recorder_error(&err);
                RecordingEvent::Failed
            }
        }
    }

    /// Periodic housekeeping; picks up capture failures
    pub fn update(&mut self) {
        if let Err(err) = self.recorder.check_device() {
            self.report_recorder_error(&err);
            self.suspend_if_idle();
        }
    }

    pub fn save_clip(&mut self, clip: &RecordedClip, dir: impl AsRef<Path>) -> Option<PathBuf> {
        match clip.save_to(dir) {
            Ok(path) => {
                self.notify(Notification::info(
                    NotificationCategory::Storage,
                    format!("Saved {}", clip.file_name()),
                ));
                Some(path)
            }
            Err(err) => {
                self.report_recorder_error(&err);
                None
            }
        }
    }

    pub fn display(&self) -> SharedDisplay {
        self.metronome.display()
    }

    pub fn transport(&self) -> TransportState {
        self.metronome.transport()
    }

    pub fn metronome(&self) -> &Metronome<ContextHandle> {
        &self.metronome
    }

    pub fn recorder(&self) -> &Recorder<B> {
        &self.recorder
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    fn report_recorder_error(&mut self, err: &RecorderError) {
        let category = match err {
            RecorderError::Io(_) => NotificationCategory::Storage,
            _ => NotificationCategory::Recorder,
        };
        self.notify(Notification::error(category, err.to_string()));
    }

    fn notify(&mut self, notification: Notification) {
        info!("{notification}");
        if self.notifications.try_push(notification).is_err() {
            warn!("Notification queue full, message dropped");
        }
    }
}
