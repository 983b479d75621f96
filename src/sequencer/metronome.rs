// Metronome - Transport control around the beat scheduler
//
// Owns the scheduler and the poll loop driving it. Every settings change
// halts the poll loop, mutates the scheduler and then spawns a fresh loop, so
// no tick can observe a half-applied change.

use log::{debug, warn};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::click::{ClickConfig, ClickSynth};
use super::pattern::Pattern;
use super::poll::PollLoop;
use super::scheduler::{BeatScheduler, SchedulerConfig};
use super::tempo::Tempo;
use super::transport::TransportState;
use super::visual::{SharedDisplay, VisualSync};
use crate::audio::AudioError;
use crate::audio::clock::AudioClock;
use crate::audio::parameters::AtomicGain;

#[derive(Debug, Error)]
pub enum MetronomeError {
    #[error("Audio output unavailable: {0}")]
    Audio(#[from] AudioError),

    #[error("Failed to spawn timing thread: {0}")]
    Spawn(#[from] io::Error),
}

pub struct Metronome<C: AudioClock> {
    scheduler: Arc<Mutex<BeatScheduler<C>>>,
    display: SharedDisplay,
    volume: AtomicGain,
    poll_interval: Duration,
    poll: Option<PollLoop>,
}

impl<C: AudioClock> Metronome<C> {
    pub fn new(config: SchedulerConfig, click: ClickConfig) -> Result<Self, MetronomeError> {
        let poll_interval = config.poll_interval();
        let synth = ClickSynth::new(click);
        let volume = synth.volume_control();
        let visual = VisualSync::new()?;
        let display = visual.display();

        Ok(Self {
            scheduler: Arc::new(Mutex::new(BeatScheduler::new(config, synth, visual))),
            display,
            volume,
            poll_interval,
            poll: None,
        })
    }

    /// Start a fresh session on `clock`, beginning with the count-in
    pub fn start(&mut self, clock: C) -> Result<(), MetronomeError> {
        self.halt_polling();
        self.scheduler.lock().start(clock);
        self.spawn_polling()
    }

    /// Stop the transport; safe to call when already stopped
    pub fn stop(&mut self) {
        self.halt_polling();
        self.scheduler.lock().stop();
    }

    pub fn set_tempo(&mut self, tempo: Tempo) -> Result<(), MetronomeError> {
        self.reconfigure(|scheduler| scheduler.set_tempo(tempo))
    }

    pub fn set_pattern(&mut self, pattern: Pattern) -> Result<(), MetronomeError> {
        self.reconfigure(|scheduler| scheduler.set_pattern(pattern))
    }

    /// Flip one pattern step; returns its new value
    pub fn toggle_step(&mut self, step: usize) -> Result<bool, MetronomeError> {
        self.reconfigure(|scheduler| scheduler.toggle_step(step))
    }

    /// Applies to clicks scheduled from now on
    pub fn set_volume(&self, volume: f32) {
        self.volume.set(volume);
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    pub fn display(&self) -> SharedDisplay {
        self.display.clone()
    }

    pub fn transport(&self) -> TransportState {
        self.display.transport()
    }

    /// True between `start` and `stop`, count-in included
    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_active()
    }

    pub fn tempo(&self) -> Tempo {
        self.scheduler.lock().tempo()
    }

    pub fn pattern(&self) -> Pattern {
        self.scheduler.lock().pattern()
    }

    fn reconfigure<R>(
        &mut self,
        change: impl FnOnce(&mut BeatScheduler<C>) -> R,
    ) -> Result<R, MetronomeError> {
        let was_polling = self.halt_polling();
        let result = change(&mut self.scheduler.lock());
        if was_polling {
            self.spawn_polling()?;
        }
        Ok(result)
    }

    /// Stop the poll loop and wait for any in-flight tick; returns whether
    /// a loop was running
    fn halt_polling(&mut self) -> bool {
        match self.poll.take() {
            Some(poll) => {
                poll.stop();
                true
            }
            None => false,
        }
    }

    fn spawn_polling(&mut self) -> Result<(), MetronomeError> {
        let scheduler = Arc::clone(&self.scheduler);
        let poll = PollLoop::spawn(self.poll_interval, move || {
            scheduler.lock().poll();
        });

        match poll {
            Ok(poll) => {
                self.poll = Some(poll);
                Ok(())
            }
            Err(err) => {
                warn!("Could not spawn poll loop, stopping transport: {err}");
                self.scheduler.lock().stop();
                Err(err.into())
            }
        }
    }
}

impl<C: AudioClock> Drop for Metronome<C> {
    fn drop(&mut self) {
        if self.poll.is_some() {
            debug!("Metronome dropped while running");
        }
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use std::thread;

    fn metronome() -> Metronome<ManualClock> {
        Metronome::new(SchedulerConfig::default(), ClickConfig::default()).unwrap()
    }

    #[test]
    fn test_start_and_stop() {
        let mut metronome = metronome();
        let clock = ManualClock::new();

        metronome.start(clock.clone()).unwrap();
        assert!(metronome.is_running());
        assert_eq!(metronome.transport(), TransportState::CountingIn);

        metronome.stop();
        assert!(!metronome.is_running());
        assert_eq!(metronome.transport(), TransportState::Stopped);
        assert_eq!(metronome.display().highlighted(), None);
    }

    #[test]
    fn test_stop_when_stopped_is_harmless() {
        let mut metronome = metronome();
        metronome.stop();
        metronome.stop();
        assert_eq!(metronome.transport(), TransportState::Stopped);
    }

    #[test]
    fn test_poll_loop_schedules_clicks() {
        let mut metronome = metronome();
        let clock = ManualClock::new();
        metronome.start(clock.clone()).unwrap();

        clock.set_time(0.05);
        thread::sleep(Duration::from_millis(80));
        metronome.stop();

        let tones = clock.tones();
        assert_eq!(tones.len(), 1);
        assert!((tones[0].start - 0.1).abs() < 1e-9);
        assert_eq!(tones[0].frequency, 1000.0);
    }

    #[test]
    fn test_no_clicks_after_stop() {
        let mut metronome = metronome();
        let clock = ManualClock::new();
        metronome.start(clock.clone()).unwrap();
        metronome.stop();

        clock.set_time(5.0);
        thread::sleep(Duration::from_millis(60));
        assert!(clock.tones().is_empty());
    }

    #[test]
    fn test_settings_apply_while_stopped() {
        let mut metronome = metronome();
        metronome.set_tempo(Tempo::new(90.0).unwrap()).unwrap();
        assert!(!metronome.toggle_step(3).unwrap());

        assert_eq!(metronome.tempo().bpm(), 90.0);
        assert!(!metronome.pattern().is_active(3));
        assert!(!metronome.is_running());
    }

    #[test]
    fn test_volume_is_shared_with_synth() {
        let metronome = metronome();
        metronome.set_volume(0.2);
        assert_eq!(metronome.volume(), 0.2);
    }
}
