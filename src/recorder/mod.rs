// Recorder - Microphone capture into an encoded clip
//
// Independent of the beat scheduler. Chunks flow from the capture callback to
// a collector thread; `stop` tears the stream down first, then tells the
// collector to finish, so every chunk the device delivered ends up in the
// clip.

pub mod analysis;
pub mod capture;
pub mod clip;
pub mod encoder;
pub mod status;

pub use analysis::AnalysisHandle;
pub use capture::{
    CaptureBackend, CaptureConstraints, CaptureSink, CaptureStream, CpalCapture, StreamFormat,
};
pub use clip::{RecordedClip, clip_file_name};
pub use encoder::{ClipEncoder, ClipFormat, WavEncoder, select_format};
pub use status::{AtomicDeviceStatus, DeviceStatus};

use chrono::Local;
use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::thread::{self, JoinHandle};
use thiserror::Error;

use capture::CaptureMessage;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No microphone available")]
    DeviceUnavailable,

    #[error("No supported recording format (tried {tried:?})")]
    UnsupportedFormat { tried: Vec<ClipFormat> },

    #[error("Microphone error: {0}")]
    Device(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Failed to encode recording: {0}")]
    Encode(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Most preferred first
    pub preferred_formats: Vec<ClipFormat>,
    /// Samples kept for the live waveform
    pub analysis_window: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            preferred_formats: ClipFormat::PREFERENCE.to_vec(),
            analysis_window: 2048,
        }
    }
}

/// Handed back when recording starts
#[derive(Clone)]
pub struct LiveInput {
    pub analysis: AnalysisHandle,
    pub stream: StreamFormat,
    pub format: ClipFormat,
}

struct ActiveRecording<S> {
    stream: S,
    format: ClipFormat,
    control: Sender<CaptureMessage>,
    collector: JoinHandle<Vec<f32>>,
    sink: CaptureSink,
    analysis: AnalysisHandle,
}

pub struct Recorder<B: CaptureBackend> {
    backend: B,
    encoder: Box<dyn ClipEncoder>,
    config: RecorderConfig,
    status: AtomicDeviceStatus,
    active: Option<ActiveRecording<B::Stream>>,
    last_error: Option<String>,
}

impl<B: CaptureBackend> Recorder<B> {
    pub fn new(backend: B, config: RecorderConfig) -> Self {
        Self::with_encoder(backend, Box::new(WavEncoder), config)
    }

    pub fn with_encoder(backend: B, encoder: Box<dyn ClipEncoder>, config: RecorderConfig) -> Self {
        Self {
            backend,
            encoder,
            config,
            status: AtomicDeviceStatus::default(),
            active: None,
            last_error: None,
        }
    }

    /// Open the microphone and start collecting
    pub fn start(&mut self, constraints: &CaptureConstraints) -> Result<LiveInput, RecorderError> {
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        self.last_error = None;

        let result = self.open(constraints);
        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    fn open(&mut self, constraints: &CaptureConstraints) -> Result<LiveInput, RecorderError> {
        self.status.set(DeviceStatus::Connecting);

        let (chunk_tx, chunk_rx) = crossbeam_channel::unbounded();
        let analysis = AnalysisHandle::new(self.config.analysis_window);
        let sink = CaptureSink::new(chunk_tx.clone(), analysis.clone(), self.status.clone());

        let stream = self.backend.open(constraints, sink.clone())?;

        let Some(format) = select_format(&self.config.preferred_formats, self.encoder.as_ref())
        else {
            stream.stop();
            return Err(RecorderError::UnsupportedFormat {
                tried: self.config.preferred_formats.clone(),
            });
        };

        let collector = match thread::Builder::new()
            .name("recorder-collector".to_string())
            .spawn(move || collect(chunk_rx))
        {
            Ok(handle) => handle,
            Err(err) => {
                stream.stop();
                return Err(err.into());
            }
        };

        let stream_format = stream.format();
        self.status.set(DeviceStatus::Connected);
        info!(
            "Recording started ({} Hz, {} channels, {})",
            stream_format.sample_rate,
            stream_format.channels,
            format.mime_type()
        );

        self.active = Some(ActiveRecording {
            stream,
            format,
            control: chunk_tx,
            collector,
            sink,
            analysis: analysis.clone(),
        });

        Ok(LiveInput {
            analysis,
            stream: stream_format,
            format,
        })
    }

    /// Tear down the stream, flush buffered chunks and encode the clip
    pub fn stop(&mut self) -> Result<RecordedClip, RecorderError> {
        let active = self.active.take().ok_or(RecorderError::NotRecording)?;

        match self.finish_and_encode(active) {
            Ok(clip) => {
                self.status.set(DeviceStatus::Idle);
                info!(
                    "Recording stopped: {:.2}s, {} bytes",
                    clip.duration_secs(),
                    clip.bytes().len()
                );
                Ok(clip)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Tear the capture down, drain the collector and encode what it gathered
    fn finish_and_encode(
        &self,
        active: ActiveRecording<B::Stream>,
    ) -> Result<RecordedClip, RecorderError> {
        let stream_format = active.stream.format();
        let samples = Self::finish(active.stream, active.control, active.collector)?;
        let bytes = self.encoder.encode(active.format, stream_format, &samples)?;

        let frames = samples.len() / stream_format.channels.max(1) as usize;
        Ok(RecordedClip::new(
            bytes,
            active.format,
            stream_format,
            frames,
            Local::now(),
        ))
    }

    /// Stop recording if the device reported a failure since the last check
    pub fn check_device(&mut self) -> Result<(), RecorderError> {
        let Some(active) = &self.active else {
            return Ok(());
        };
        if !self.status.is_error() {
            return Ok(());
        }

        let message = active
            .sink
            .take_error()
            .unwrap_or_else(|| "capture stream failed".to_string());

        if let Some(active) = self.active.take() {
            // Captured audio is discarded
            let _ = Self::finish(active.stream, active.control, active.collector);
        }

        let err = RecorderError::Device(message);
        self.fail(&err);
        Err(err)
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Message of the most recent failure, cleared by the next `start`
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    /// Analysis window of the running recording
    pub fn analysis(&self) -> Option<AnalysisHandle> {
        self.active.as_ref().map(|active| active.analysis.clone())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn finish(
        stream: B::Stream,
        control: Sender<CaptureMessage>,
        collector: JoinHandle<Vec<f32>>,
    ) -> Result<Vec<f32>, RecorderError> {
        stream.stop();
        let _ = control.send(CaptureMessage::Finish);
        collector
            .join()
            .map_err(|_| RecorderError::Device("recording collector panicked".to_string()))
    }

    fn fail(&mut self, err: &RecorderError) {
        warn!("Recording failed: {err}");
        self.status.set(DeviceStatus::Idle);
        self.last_error = Some(err.to_string());
    }
}

impl<B: CaptureBackend> Drop for Recorder<B> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take()
            && Self::finish(active.stream, active.control, active.collector).is_err()
        {
            error!("Recording collector panicked during shutdown");
        }
    }
}

fn collect(chunks: Receiver<CaptureMessage>) -> Vec<f32> {
    let mut samples = Vec::new();
    for message in chunks {
        match message {
            CaptureMessage::Chunk(chunk) => samples.extend_from_slice(&chunk),
            CaptureMessage::Finish => break,
        }
    }
    samples
}
