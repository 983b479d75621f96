// Tone rendering - Sample-accurate playback of scheduled click tones
//
// A `ToneEvent` is the unit the scheduler commits to: "play this pitch with
// this envelope starting at audio time T". The renderer lives inside the
// output callback and mixes every active event without allocating.

use super::dsp_utils::flush_denormals_to_zero;
use super::timing::AudioTiming;
use std::f32::consts::TAU;

/// One scheduled tone with a linear attack and exponential decay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEvent {
    /// Onset in audio-clock seconds
    pub start: f64,
    pub frequency: f32,
    /// Gain reached at the end of the attack
    pub peak_gain: f32,
    /// Attack length in seconds (silence to peak)
    pub attack: f64,
    /// Total length in seconds; the oscillator stops here
    pub duration: f64,
    /// Gain the exponential decay reaches at `start + duration`
    pub floor_gain: f32,
}

impl ToneEvent {
    /// Audio time at which the oscillator stops
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Envelope value at absolute audio time `time`
    pub fn gain_at(&self, time: f64) -> f32 {
        let t = time - self.start;
        if t < 0.0 || t >= self.duration || self.peak_gain <= 0.0 {
            return 0.0;
        }

        if self.attack > 0.0 && t < self.attack {
            return self.peak_gain * (t / self.attack) as f32;
        }

        let decay_span = self.duration - self.attack;
        if decay_span <= 0.0 {
            return self.peak_gain;
        }

        // Exponential ramp peak -> floor, same curve as an exponential
        // automation ramp on a gain node.
        let floor = self.floor_gain.clamp(f32::MIN_POSITIVE, self.peak_gain);
        let progress = ((t - self.attack) / decay_span) as f32;
        self.peak_gain * (floor / self.peak_gain).powf(progress)
    }
}

#[derive(Debug, Clone)]
struct ActiveTone {
    event: ToneEvent,
    start_sample: u64,
    end_sample: u64,
    phase: f32,
    phase_increment: f32,
}

/// Mixes scheduled tones into the output, one frame at a time
#[derive(Debug)]
pub struct ToneRenderer {
    timing: AudioTiming,
    tones: Vec<ActiveTone>,
    /// Tones tagged with an older epoch were scheduled before the last
    /// suspend and are never played
    epoch: u64,
}

impl ToneRenderer {
    /// Upper bound on simultaneously sounding tones. At 240 BPM with an 80ms
    /// tail at most two clicks ever overlap; the rest is headroom for
    /// catch-up bursts after a stalled poll.
    pub const MAX_TONES: usize = 32;

    pub fn new(timing: AudioTiming) -> Self {
        Self {
            timing,
            tones: Vec::with_capacity(Self::MAX_TONES),
            epoch: 0,
        }
    }

    /// Queue a tone scheduled during `epoch`. A newer epoch drops every
    /// sounding tone first; a stale one is discarded.
    pub fn push_tagged(&mut self, epoch: u64, event: ToneEvent) -> bool {
        if epoch < self.epoch {
            return false;
        }
        self.enter_epoch(epoch);
        self.push(event)
    }

    /// Silence everything from epochs before `epoch`
    pub fn enter_epoch(&mut self, epoch: u64) {
        if epoch > self.epoch {
            self.clear();
            self.epoch = epoch;
        }
    }

    /// Queue a tone for rendering. Returns false if the renderer is full.
    pub fn push(&mut self, event: ToneEvent) -> bool {
        if self.tones.len() >= Self::MAX_TONES {
            return false;
        }

        let sample_rate = self.timing.sample_rate() as f32;
        self.tones.push(ActiveTone {
            event,
            start_sample: self.timing.sample_at(event.start),
            end_sample: self.timing.sample_at(event.end()),
            phase: 0.0,
            phase_increment: TAU * event.frequency / sample_rate,
        });
        true
    }

    /// Render the mono sample for frame `sample_index`
    pub fn next_sample(&mut self, sample_index: u64) -> f32 {
        if self.tones.is_empty() {
            return 0.0;
        }

        let time = self.timing.time_of(sample_index);
        let mut output = 0.0;

        for tone in self.tones.iter_mut() {
            if sample_index < tone.start_sample || sample_index >= tone.end_sample {
                continue;
            }
            output += tone.phase.sin() * tone.event.gain_at(time);
            tone.phase = (tone.phase + tone.phase_increment) % TAU;
        }

        self.tones.retain(|tone| sample_index + 1 < tone.end_sample);

        flush_denormals_to_zero(output)
    }

    pub fn active_tones(&self) -> usize {
        self.tones.len()
    }

    fn clear(&mut self) {
        self.tones.clear();
    }
}
