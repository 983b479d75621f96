// Beat scheduler - Lookahead scheduling of count-in and pattern beats
//
// Each poll reads the audio clock once and commits every beat whose due time
// falls inside `now + lookahead`. Audio is scheduled at the beat's exact
// clock time; only the highlight goes through a wall-clock timer. A late poll
// catches up by committing every beat that became due, in order, so the
// rhythm never loses a beat.

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::click::ClickSynth;
use super::pattern::{Pattern, STEPS};
use super::tempo::Tempo;
use super::transport::TransportState;
use super::visual::{SharedDisplay, VisualBeat, VisualSync, VisualUpdate};
use crate::audio::clock::AudioClock;
use crate::audio::tone::ToneEvent;

/// Count-in beats played before the pattern starts
pub const COUNT_IN_BEATS: i32 = 4;

/// Timing of the poll loop and the lookahead window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    pub lookahead_secs: f64,
    /// Gap between a (re)start and the first beat
    pub start_offset_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SchedulerConfigError {
    #[error("Poll interval must be between 1 and {max} ms, got {got}")]
    PollInterval { got: u64, max: u64 },

    #[error("Lookahead must be between the poll interval ({min}s) and {max}s, got {got}")]
    Lookahead { got: f64, min: f64, max: f64 },

    #[error("Start offset must be between 0 and {max}s, got {got}")]
    StartOffset { got: f64, max: f64 },
}

impl SchedulerConfig {
    pub const MAX_POLL_INTERVAL_MS: u64 = 250;
    pub const MAX_LOOKAHEAD_SECS: f64 = 1.0;
    pub const MAX_START_OFFSET_SECS: f64 = 1.0;

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(1, Self::MAX_POLL_INTERVAL_MS))
    }

    fn poll_interval_secs(&self) -> f64 {
        self.poll_interval().as_secs_f64()
    }

    /// Reject values that would silence the scheduler or flood it
    ///
    /// The lookahead must cover at least one poll interval, otherwise every
    /// beat is committed late.
    pub fn validate(&self) -> Result<(), SchedulerConfigError> {
        if !(1..=Self::MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(SchedulerConfigError::PollInterval {
                got: self.poll_interval_ms,
                max: Self::MAX_POLL_INTERVAL_MS,
            });
        }

        let min_lookahead = self.poll_interval_secs();
        // Range checks are false for NaN
        if !(min_lookahead..=Self::MAX_LOOKAHEAD_SECS).contains(&self.lookahead_secs) {
            return Err(SchedulerConfigError::Lookahead {
                got: self.lookahead_secs,
                min: min_lookahead,
                max: Self::MAX_LOOKAHEAD_SECS,
            });
        }

        if !(0.0..=Self::MAX_START_OFFSET_SECS).contains(&self.start_offset_secs) {
            return Err(SchedulerConfigError::StartOffset {
                got: self.start_offset_secs,
                max: Self::MAX_START_OFFSET_SECS,
            });
        }

        Ok(())
    }

    /// Saturate every value into its valid range; non-finite values fall
    /// back to the defaults
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let poll_interval_ms = self.poll_interval_ms.clamp(1, Self::MAX_POLL_INTERVAL_MS);
        let min_lookahead = poll_interval_ms as f64 / 1000.0;

        let lookahead_secs = if self.lookahead_secs.is_finite() {
            self.lookahead_secs
        } else {
            defaults.lookahead_secs
        };
        let start_offset_secs = if self.start_offset_secs.is_finite() {
            self.start_offset_secs
        } else {
            defaults.start_offset_secs
        };

        Self {
            poll_interval_ms,
            lookahead_secs: lookahead_secs.clamp(min_lookahead, Self::MAX_LOOKAHEAD_SECS),
            start_offset_secs: start_offset_secs.clamp(0.0, Self::MAX_START_OFFSET_SECS),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 25,
            lookahead_secs: 0.1,
            start_offset_secs: 0.1,
        }
    }
}

/// A beat committed by one poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBeat {
    /// Cursor value the beat was scheduled from (-4..=15)
    pub cursor: i32,
    /// Audio time the beat plays at
    pub time: f64,
    pub visual: VisualBeat,
    /// The click, if the beat is audible
    pub tone: Option<ToneEvent>,
    /// First pattern beat after the count-in
    pub enters_running: bool,
}

impl ScheduledBeat {
    pub fn is_audible(&self) -> bool {
        self.tone.is_some()
    }

    pub fn is_count_in(&self) -> bool {
        self.cursor < 0
    }
}

/// State owned by one transport session
struct Session<C> {
    clock: C,
    cursor: i32,
    next_event_time: f64,
    generation: u64,
    counting_in: bool,
}

/// Cursor after `cursor`: count-in climbs to 0, pattern steps wrap 15 -> 0
fn advance_cursor(cursor: i32) -> i32 {
    if cursor < 0 {
        cursor + 1
    } else {
        (cursor + 1) % STEPS as i32
    }
}

/// Decides which beats play when, and keeps the highlight in phase
pub struct BeatScheduler<C: AudioClock> {
    config: SchedulerConfig,
    pattern: Pattern,
    tempo: Tempo,
    synth: ClickSynth,
    visual: VisualSync,
    session: Option<Session<C>>,
}

impl<C: AudioClock> BeatScheduler<C> {
    /// Out-of-range timing values are clamped
    pub fn new(config: SchedulerConfig, synth: ClickSynth, visual: VisualSync) -> Self {
        if let Err(err) = config.validate() {
            warn!("Clamping scheduler timing: {err}");
        }

        Self {
            config: config.clamped(),
            pattern: Pattern::default(),
            tempo: Tempo::default(),
            synth,
            visual,
            session: None,
        }
    }

    /// Begin a session on `clock`: count-in from cursor -4, first beat at
    /// now + start offset. An existing session is discarded first.
    pub fn start(&mut self, clock: C) {
        if self.session.is_some() {
            self.stop();
        }

        let generation = self.visual.start_session(TransportState::CountingIn);
        let next_event_time = clock.current_time() + self.config.start_offset_secs;

        info!(
            "Transport started at {} (first beat at {next_event_time:.3}s)",
            self.tempo
        );

        self.session = Some(Session {
            clock,
            cursor: -COUNT_IN_BEATS,
            next_event_time,
            generation,
            counting_in: true,
        });
    }

    /// End the session: pending highlights are cancelled before the state
    /// returns to "no beat highlighted"
    pub fn stop(&mut self) {
        self.visual.reset();
        if self.session.take().is_some() {
            info!("Transport stopped");
        }
    }

    /// Commit every beat due before `now + lookahead`
    pub fn poll(&mut self) -> Vec<ScheduledBeat> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let now = session.clock.current_time();
        let horizon = now + self.config.lookahead_secs;
        let beat_duration = self.tempo.beat_duration_seconds();
        let mut scheduled = Vec::new();

        while session.next_event_time < horizon {
            let due = session.next_event_time;
            // A beat that is already late still plays, as soon as possible
            let at = due.max(now);
            let cursor = session.cursor;

            let (visual, audible) = if cursor < 0 {
                (VisualBeat::count_in((cursor + COUNT_IN_BEATS) as usize), true)
            } else {
                let step = cursor as usize;
                (VisualBeat::step(step), self.pattern.is_active(step))
            };

            let tone = audible.then(|| self.synth.trigger(&session.clock, visual.index, at));

            let enters_running = cursor == 0 && session.counting_in;
            if enters_running {
                session.counting_in = false;
            }

            self.visual.schedule(
                session.generation,
                VisualSync::delay_until(at, now),
                VisualUpdate {
                    beat: visual,
                    enters_running,
                },
            );

            trace!("Beat {cursor} at {at:.3}s (audible: {audible})");

            scheduled.push(ScheduledBeat {
                cursor,
                time: at,
                visual,
                tone,
                enters_running,
            });

            session.next_event_time = due + beat_duration;
            session.cursor = advance_cursor(cursor);
        }

        scheduled
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
        self.resync();
    }

    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
        self.resync();
    }

    /// Flip one step; returns its new value
    pub fn toggle_step(&mut self, step: usize) -> bool {
        let active = self.pattern.toggle(step);
        self.resync();
        active
    }

    /// Re-anchor the session after a settings change
    ///
    /// Running sessions jump to cursor 0 at now + start offset; phase is not
    /// preserved. A session still counting in restarts its count-in.
    fn resync(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let (cursor, transport) = if session.counting_in {
            (-COUNT_IN_BEATS, TransportState::CountingIn)
        } else {
            (0, TransportState::Running)
        };

        session.generation = self.visual.resync_session(transport);
        session.cursor = cursor;
        session.next_event_time = session.clock.current_time() + self.config.start_offset_secs;

        debug!(
            "Scheduler resynced to cursor {cursor} at {:.3}s ({}, {})",
            session.next_event_time, self.tempo, self.pattern
        );
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Cursor of the next beat to schedule, if a session is active
    pub fn cursor(&self) -> Option<i32> {
        self.session.as_ref().map(|session| session.cursor)
    }

    pub fn next_event_time(&self) -> Option<f64> {
        self.session.as_ref().map(|session| session.next_event_time)
    }

    /// Transport state as shown to the user
    pub fn transport(&self) -> TransportState {
        self.visual.display().transport()
    }

    pub fn display(&self) -> SharedDisplay {
        self.visual.display()
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn synth(&self) -> &ClickSynth {
        &self.synth
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use std::thread;
    use std::time::Instant;

    fn scheduler() -> BeatScheduler<ManualClock> {
        BeatScheduler::new(
            SchedulerConfig::default(),
            ClickSynth::default(),
            VisualSync::new().unwrap(),
        )
    }

    /// Poll every 25ms of clock time until `until`
    fn run_until(
        scheduler: &mut BeatScheduler<ManualClock>,
        clock: &ManualClock,
        until: f64,
    ) -> Vec<ScheduledBeat> {
        let mut beats = scheduler.poll();
        while clock.current_time() < until {
            clock.advance(0.025);
            beats.extend(scheduler.poll());
        }
        beats
    }

    #[test]
    fn test_cursor_advance() {
        assert_eq!(advance_cursor(-4), -3);
        assert_eq!(advance_cursor(-1), 0);
        assert_eq!(advance_cursor(0), 1);
        assert_eq!(advance_cursor(15), 0);
    }

    #[test]
    fn test_poll_without_session_is_empty() {
        let mut scheduler = scheduler();
        assert!(scheduler.poll().is_empty());
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.transport(), TransportState::Stopped);
    }

    #[test]
    fn test_start_enters_count_in() {
        let mut scheduler = scheduler();
        let clock = ManualClock::starting_at(3.0);

        scheduler.start(clock);
        assert_eq!(scheduler.cursor(), Some(-4));
        assert_eq!(scheduler.next_event_time(), Some(3.1));
        assert_eq!(scheduler.transport(), TransportState::CountingIn);
    }

    #[test]
    fn test_first_poll_fills_lookahead_only() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        scheduler.start(clock.clone());

        // First beat at 0.1s is not yet inside [0, 0.1)
        assert!(scheduler.poll().is_empty());

        clock.set_time(0.01);
        let beats = scheduler.poll();
        assert_eq!(beats.len(), 1);
        assert_eq!(beats[0].cursor, -4);
        assert_eq!(beats[0].visual, VisualBeat::count_in(0));
    }

    #[test]
    fn test_count_in_then_pattern_at_120() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        scheduler.start(clock.clone());

        let beats = run_until(&mut scheduler, &clock, 3.0);
        let expected_times = [0.1, 0.6, 1.1, 1.6, 2.1, 2.6];
        assert!(beats.len() >= expected_times.len());

        for (beat, expected) in beats.iter().zip(expected_times) {
            assert!(
                (beat.time - expected).abs() < 1e-9,
                "beat {} at {} (expected {expected})",
                beat.cursor,
                beat.time
            );
            assert!(beat.is_audible());
        }

        let cursors: Vec<i32> = beats.iter().take(6).map(|b| b.cursor).collect();
        assert_eq!(cursors, vec![-4, -3, -2, -1, 0, 1]);
        assert!(beats[4].enters_running);
        assert_eq!(beats.iter().filter(|b| b.enters_running).count(), 1);
    }

    #[test]
    fn test_count_in_visual_indices() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        scheduler.start(clock.clone());

        let beats = run_until(&mut scheduler, &clock, 2.0);
        let visuals: Vec<VisualBeat> = beats.iter().take(4).map(|b| b.visual).collect();
        assert_eq!(
            visuals,
            (0..4).map(VisualBeat::count_in).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_silent_steps_still_advance() {
        let mut scheduler = scheduler();
        scheduler.set_pattern(Pattern::silent());
        let clock = ManualClock::new();
        scheduler.start(clock.clone());

        let beats = run_until(&mut scheduler, &clock, 5.0);
        let count_in: Vec<_> = beats.iter().filter(|b| b.is_count_in()).collect();
        let pattern: Vec<_> = beats.iter().filter(|b| !b.is_count_in()).collect();

        assert_eq!(count_in.len(), 4);
        assert!(count_in.iter().all(|b| b.is_audible()));
        assert!(pattern.len() >= 4);
        assert!(pattern.iter().all(|b| !b.is_audible()));
        assert_eq!(clock.tones().len(), 4);
    }

    #[test]
    fn test_cursor_wraps_after_fifteen() {
        let mut scheduler = scheduler();
        scheduler.set_tempo(Tempo::new(240.0).unwrap());
        let clock = ManualClock::new();
        scheduler.start(clock.clone());

        // 4 count-in + 16 steps + 2 at 0.25s spacing
        let beats = run_until(&mut scheduler, &clock, 5.6);
        let cursors: Vec<i32> = beats.iter().map(|b| b.cursor).collect();
        assert_eq!(cursors[4..20], (0..16).collect::<Vec<_>>()[..]);
        assert_eq!(cursors[20], 0);
        assert!(cursors.iter().all(|c| (-4..=15).contains(c)));
    }

    #[test]
    fn test_delayed_poll_catches_up_in_order() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        scheduler.start(clock.clone());

        // The timer stalls for 1.2 seconds
        clock.set_time(1.2);
        let beats = scheduler.poll();

        // Beats due at 0.1, 0.6, 1.1 are late; 1.1 < 1.3 horizon is included
        assert_eq!(
            beats.iter().map(|b| b.cursor).collect::<Vec<_>>(),
            vec![-4, -3, -2]
        );
        assert!(beats.iter().all(|b| b.time >= 1.2));
        assert!(beats.windows(2).all(|w| w[0].time <= w[1].time));

        // The grid is not shifted: the next beat is still due at 1.6
        assert!((scheduler.next_event_time().unwrap() - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_stop_clears_session_and_display() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        scheduler.start(clock.clone());
        run_until(&mut scheduler, &clock, 0.5);

        scheduler.stop();
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.cursor(), None);

        // Pending highlights from the stopped session never land
        thread::sleep(Duration::from_millis(150));
        let snapshot = scheduler.display().snapshot();
        assert_eq!(snapshot.beat, None);
        assert_eq!(snapshot.transport, TransportState::Stopped);
    }

    #[test]
    fn test_toggle_while_stopped_keeps_cursor() {
        let mut scheduler = scheduler();
        assert!(!scheduler.toggle_step(2));
        assert_eq!(scheduler.cursor(), None);
        assert!(!scheduler.pattern().is_active(2));
    }

    #[test]
    fn test_change_while_running_resyncs_to_zero() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        scheduler.start(clock.clone());
        run_until(&mut scheduler, &clock, 3.0);

        scheduler.set_tempo(Tempo::new(90.0).unwrap());
        let resumed_at = clock.current_time() + 0.1;
        assert_eq!(scheduler.cursor(), Some(0));
        assert_eq!(scheduler.next_event_time(), Some(resumed_at));
        assert_eq!(scheduler.transport(), TransportState::Running);

        clock.advance(0.025);
        let after = scheduler.poll();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].cursor, 0);
        assert!(!after[0].enters_running);
        assert_eq!(after[0].time, resumed_at);
        assert_eq!(scheduler.cursor(), Some(1));
    }

    #[test]
    fn test_change_during_count_in_restarts_count_in() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        scheduler.start(clock.clone());
        run_until(&mut scheduler, &clock, 0.7);

        scheduler.toggle_step(0);
        assert_eq!(scheduler.cursor(), Some(-4));
        assert_eq!(scheduler.transport(), TransportState::CountingIn);
    }

    #[test]
    fn test_highlight_follows_audio_time() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        let display = scheduler.display();
        scheduler.start(clock.clone());

        // Beat -4 is due 80ms after this poll's clock reading
        clock.set_time(0.02);
        let started = Instant::now();
        assert_eq!(scheduler.poll().len(), 1);
        assert_eq!(display.highlighted(), None);

        while display.highlighted().is_none() && started.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(started.elapsed() >= Duration::from_millis(75));
        assert_eq!(display.highlighted(), Some(VisualBeat::count_in(0)));
    }

    #[test]
    fn test_tempo_change_cancels_pending_count_in_highlight() {
        let mut scheduler = scheduler();
        let clock = ManualClock::new();
        let display = scheduler.display();
        scheduler.start(clock.clone());

        // Beat -4 is committed with an 80ms highlight delay
        clock.set_time(0.02);
        assert_eq!(scheduler.poll().len(), 1);
        scheduler.set_tempo(Tempo::new(90.0).unwrap());

        thread::sleep(Duration::from_millis(200));
        assert_ne!(display.highlighted(), Some(VisualBeat::count_in(0)));
        assert_eq!(display.highlighted(), None);
        assert_eq!(display.transport(), TransportState::CountingIn);
    }

    #[test]
    fn test_pattern_change_cancels_pending_step_highlight() {
        let mut scheduler = scheduler();
        scheduler.set_tempo(Tempo::new(240.0).unwrap());
        let clock = ManualClock::new();
        let display = scheduler.display();
        scheduler.start(clock.clone());

        // Count-in is late, step 0 at 1.1 lands 50ms after this poll
        clock.set_time(1.05);
        let beats = scheduler.poll();
        assert_eq!(beats.last().map(|b| b.cursor), Some(0));
        scheduler.toggle_step(3);

        thread::sleep(Duration::from_millis(200));
        assert_ne!(display.highlighted(), Some(VisualBeat::step(0)));
        assert_eq!(display.transport(), TransportState::Running);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SchedulerConfig::default().validate(), Ok(()));
        assert_eq!(SchedulerConfig::default().clamped(), SchedulerConfig::default());
    }

    #[test]
    fn test_invalid_lookahead_is_rejected() {
        for lookahead_secs in [-0.2, 0.0, 0.01, f64::NAN, f64::INFINITY, 3600.0] {
            let config = SchedulerConfig {
                lookahead_secs,
                ..SchedulerConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(SchedulerConfigError::Lookahead { .. })),
                "lookahead {lookahead_secs}"
            );
        }
    }

    #[test]
    fn test_invalid_start_offset_and_poll_interval_are_rejected() {
        for start_offset_secs in [-1.0, f64::NAN, f64::NEG_INFINITY, 60.0] {
            let config = SchedulerConfig {
                start_offset_secs,
                ..SchedulerConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SchedulerConfigError::StartOffset { .. })
            ));
        }

        for poll_interval_ms in [0, 10_000] {
            let config = SchedulerConfig {
                poll_interval_ms,
                ..SchedulerConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SchedulerConfigError::PollInterval { .. })
            ));
        }
    }

    #[test]
    fn test_clamped_config_is_always_valid() {
        let values = [-5.0, 0.0, 0.003, 0.5, 3600.0, f64::NAN, f64::INFINITY];
        for lookahead_secs in values {
            for start_offset_secs in values {
                let config = SchedulerConfig {
                    poll_interval_ms: 40,
                    lookahead_secs,
                    start_offset_secs,
                }
                .clamped();
                assert_eq!(config.validate(), Ok(()), "{config:?}");
            }
        }

        let nan = SchedulerConfig {
            lookahead_secs: f64::NAN,
            ..SchedulerConfig::default()
        };
        assert_eq!(nan.clamped().lookahead_secs, 0.1);
    }

    #[test]
    fn test_negative_lookahead_still_schedules_beats() {
        let config = SchedulerConfig {
            lookahead_secs: -0.2,
            start_offset_secs: f64::INFINITY,
            ..SchedulerConfig::default()
        };
        let mut scheduler: BeatScheduler<ManualClock> =
            BeatScheduler::new(config, ClickSynth::default(), VisualSync::new().unwrap());
        assert_eq!(scheduler.config().lookahead_secs, 0.025);
        assert_eq!(scheduler.config().start_offset_secs, 0.1);

        let clock = ManualClock::new();
        scheduler.start(clock.clone());
        let beats = run_until(&mut scheduler, &clock, 2.0);
        assert_eq!(
            beats.iter().take(4).map(|b| b.cursor).collect::<Vec<_>>(),
            vec![-4, -3, -2, -1]
        );
    }
}
