// Audio context - Lazily created cpal output stream acting as the clock
//
// # Format Support
//
// The device's preferred sample format is detected through
// `default_output_config()` and a stream of the matching type is built.
// Rendering happens in f32; conversion to the device format happens when
// writing each frame (via cpal's `FromSample<f32>`).
//
// # Stream Limitations
//
// On macOS (CoreAudio) `Stream` is neither Send nor Sync, so the context
// itself stays on the thread that created it. Other threads talk to the
// stream through `ContextHandle`, which only holds the sample counter and
// the producer side of the tone queue.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{error, info, warn};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::AudioError;
use super::clock::AudioClock;
use super::dsp_utils::soft_clip;
use super::timing::AudioTiming;
use super::tone::{ToneEvent, ToneRenderer};

/// Tones queued between two output callbacks. A 100ms lookahead at 240 BPM
/// commits at most one or two clicks per poll.
const TONE_QUEUE_CAPACITY: usize = 256;

/// Whether the output stream is currently pulling audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not rendering; the clock is frozen
    Suspended,
    Running,
}

/// A tone on its way to the output callback, tagged with the suspend epoch
/// it was scheduled in
#[derive(Debug, Clone, Copy)]
struct QueuedTone {
    epoch: u64,
    tone: ToneEvent,
}

struct SharedContext {
    timing: AudioTiming,
    tones: Mutex<HeapProd<QueuedTone>>,
    /// Bumped on every suspend
    epoch: Arc<AtomicU64>,
}

/// Thread-safe clock handle onto an `AudioContext`
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<SharedContext>,
}

impl ContextHandle {
    pub fn sample_rate(&self) -> f64 {
        self.inner.timing.sample_rate()
    }
}

impl AudioClock for ContextHandle {
    fn current_time(&self) -> f64 {
        self.inner.timing.current_time()
    }

    fn schedule_tone(&self, tone: ToneEvent) {
        let queued = QueuedTone {
            epoch: self.inner.epoch.load(Ordering::Acquire),
            tone,
        };
        let mut producer = self.inner.tones.lock();
        if producer.try_push(queued).is_err() {
            warn!("Tone queue full, dropping click at {:.3}s", tone.start);
        }
    }
}

/// The single audio-processing context of the application
///
/// Created on first use (first transport start or first recording), starts
/// suspended, and is resumed explicitly. Resuming an already running context
/// is a no-op.
pub struct AudioContext {
    _device: Device,
    stream: Stream,
    handle: ContextHandle,
    state: ContextState,
    sample_rate: u32,
    channels: u16,
}

impl AudioContext {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        info!(
            "Audio output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device.default_output_config()?;
        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();
        let config: StreamConfig = supported_config.into();

        let timing = AudioTiming::new(sample_rate as f64);
        let (producer, consumer) = HeapRb::<QueuedTone>::new(TONE_QUEUE_CAPACITY).split();
        let renderer = ToneRenderer::new(timing.clone());
        let epoch = Arc::new(AtomicU64::new(0));

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(
                &device,
                &config,
                consumer,
                renderer,
                timing.clone(),
                Arc::clone(&epoch),
            )
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(
                &device,
                &config,
                consumer,
                renderer,
                timing.clone(),
                Arc::clone(&epoch),
            )
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(
                &device,
                &config,
                consumer,
                renderer,
                timing.clone(),
                Arc::clone(&epoch),
            )
            }
            other => return Err(AudioError::UnsupportedSampleFormat(format!("{other:?}"))),
        }?;

        // Some hosts start streams on creation; the context starts suspended
        // until the first explicit resume.
        if let Err(err) = stream.pause() {
            warn!("Could not pause freshly created output stream: {err}");
        }

        info!("Audio context created: {sample_rate} Hz, {channels} channels (suspended)");

        Ok(Self {
            _device: device,
            stream,
            handle: ContextHandle {
                inner: Arc::new(SharedContext {
                    timing,
                    tones: Mutex::new(producer),
                    epoch,
                }),
            },
            state: ContextState::Suspended,
            sample_rate,
            channels,
        })
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Start (or keep) pulling audio. Idempotent.
    pub fn resume(&mut self) -> Result<(), AudioError> {
        if self.state == ContextState::Running {
            return Ok(());
        }
        self.stream.play()?;
        self.state = ContextState::Running;
        info!("Audio context resumed");
        Ok(())
    }

    /// Stop pulling audio; the clock freezes until the next resume
    ///
    /// Tones still queued or sounding are dropped, so a resume never replays
    /// clicks from before the suspend.
    pub fn suspend(&mut self) -> Result<(), AudioError> {
        if self.state == ContextState::Suspended {
            return Ok(());
        }
        self.stream.pause()?;
        self.handle.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.state = ContextState::Suspended;
        info!("Audio context suspended");
        Ok(())
    }

    /// Clock handle for the scheduler thread
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Build the output stream for sample type `T`
    ///
    /// The callback drains newly scheduled tones, renders mono frames from the
    /// sample counter's position and copies each frame to every channel.
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mut tones: HeapCons<QueuedTone>,
        mut renderer: ToneRenderer,
        timing: AudioTiming,
        epoch: Arc<AtomicU64>,
    ) -> Result<Stream, AudioError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let channels = config.channels as usize;

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // ========== SACRED ZONE ==========
                // No allocations, No I/O, No blocking locks
                renderer.enter_epoch(epoch.load(Ordering::Acquire));
                while let Some(queued) = tones.try_pop() {
                    // Renderer full or stale: the click is lost, the clock keeps going
                    let _ = renderer.push_tagged(queued.epoch, queued.tone);
                }

                let mut sample_index = timing.current_sample();
                for frame in data.chunks_mut(channels) {
                    let sample = soft_clip(renderer.next_sample(sample_index));
                    let value = T::from_sample(sample);
                    for channel_sample in frame.iter_mut() {
                        *channel_sample = value;
                    }
                    sample_index += 1;
                }

                timing.advance(data.len() / channels);
                // ========== SACRED ZONE END ==========
            },
            move |err| {
                error!("Audio output stream error: {err}");
            },
            None,
        )?;

        Ok(stream)
    }
}
