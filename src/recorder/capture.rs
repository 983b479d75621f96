// Microphone capture - Input streams feeding the recorder
//
// A `CaptureBackend` opens an input stream and streams interleaved f32 chunks
// into the `CaptureSink` it was handed. The sink also carries the analysis
// window and the device health cell, so a backend never talks to the
// recorder directly.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, Device, FromSample, PlayStreamError, Sample,
    SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig,
};
use crossbeam_channel::Sender;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

use super::RecorderError;
use super::analysis::AnalysisHandle;
use super::status::{AtomicDeviceStatus, DeviceStatus};

/// What the caller asks of the input device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Input device by name; the host default when unset
    pub device_name: Option<String>,
    /// Requested sample rate; the device default when unset or unsupported
    pub sample_rate: Option<u32>,
}

/// Layout of the samples a capture stream delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

pub(crate) enum CaptureMessage {
    Chunk(Vec<f32>),
    /// Sent by the recorder after the stream is torn down
    Finish,
}

/// Where a capture stream delivers its data and reports failures
#[derive(Clone)]
pub struct CaptureSink {
    chunks: Sender<CaptureMessage>,
    analysis: AnalysisHandle,
    status: AtomicDeviceStatus,
    last_error: Arc<Mutex<Option<String>>>,
}

impl CaptureSink {
    pub(crate) fn new(
        chunks: Sender<CaptureMessage>,
        analysis: AnalysisHandle,
        status: AtomicDeviceStatus,
    ) -> Self {
        Self {
            chunks,
            analysis,
            status,
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Deliver one chunk of interleaved samples; the buffer itself is
    /// handed to the collector
    pub fn push_chunk(&self, chunk: Vec<f32>, channels: u16) {
        self.analysis.push_interleaved(&chunk, channels as usize);
        // The collector only goes away after the recorder stopped listening
        let _ = self.chunks.send(CaptureMessage::Chunk(chunk));
    }

    /// Report a device failure; the recorder stops on its next health check
    pub fn report_error(&self, message: impl Into<String>) {
        *self.last_error.lock() = Some(message.into());
        self.status.set(DeviceStatus::Error);
    }

    pub(crate) fn take_error(&self) -> Option<String> {
        self.last_error.lock().take()
    }
}

/// An open input stream
pub trait CaptureStream {
    fn format(&self) -> StreamFormat;

    /// Stop the device and release it. No chunk is delivered afterwards.
    fn stop(self);
}

/// Source of capture streams (the microphone, or a fake in tests)
pub trait CaptureBackend {
    type Stream: CaptureStream;

    fn open(
        &mut self,
        constraints: &CaptureConstraints,
        sink: CaptureSink,
    ) -> Result<Self::Stream, RecorderError>;
}

/// Microphone capture through cpal
pub struct CpalCapture {
    host: cpal::Host,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn find_device(&self, name: Option<&str>) -> Result<Device, RecorderError> {
        let Some(name) = name else {
            return self
                .host
                .default_input_device()
                .ok_or(RecorderError::DeviceUnavailable);
        };

        let devices = self
            .host
            .input_devices()
            .map_err(|e| RecorderError::Device(e.to_string()))?;

        for device in devices {
            if device.name().is_ok_and(|n| n == name) {
                return Ok(device);
            }
        }

        warn!("Input device '{name}' not found");
        Err(RecorderError::DeviceUnavailable)
    }

    fn select_config(
        device: &Device,
        sample_rate: Option<u32>,
    ) -> Result<SupportedStreamConfig, RecorderError> {
        let default = device.default_input_config().map_err(map_config_error)?;

        let Some(rate) = sample_rate else {
            return Ok(default);
        };

        let matching = device
            .supported_input_configs()
            .map_err(|e| RecorderError::Device(e.to_string()))?
            .find(|range| {
                range.sample_format() == default.sample_format()
                    && range.min_sample_rate().0 <= rate
                    && rate <= range.max_sample_rate().0
            });

        match matching {
            Some(range) => Ok(range.with_sample_rate(cpal::SampleRate(rate))),
            None => {
                warn!(
                    "Input device does not support {rate} Hz, using {} Hz",
                    default.sample_rate().0
                );
                Ok(default)
            }
        }
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        sink: CaptureSink,
    ) -> Result<Stream, RecorderError>
    where
        T: SizedSample + Send + 'static,
        f32: FromSample<T>,
    {
        let channels = config.channels;
        let error_sink = sink.clone();

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let chunk: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
                    sink.push_chunk(chunk, channels);
                },
                move |err| {
                    error!("Audio input stream error: {err}");
                    error_sink.report_error(err.to_string());
                },
                None,
            )
            .map_err(map_build_error)
    }
}

impl Default for CpalCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for CpalCapture {
    type Stream = CpalCaptureStream;

    fn open(
        &mut self,
        constraints: &CaptureConstraints,
        sink: CaptureSink,
    ) -> Result<CpalCaptureStream, RecorderError> {
        let device = self.find_device(constraints.device_name.as_deref())?;
        let supported = Self::select_config(&device, constraints.sample_rate)?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        info!(
            "Audio input device: {} ({} Hz, {} channels)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels
        );

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, sink),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, sink),
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, sink),
            other => Err(RecorderError::Device(format!(
                "unsupported input sample format {other:?}"
            ))),
        }?;

        stream.play().map_err(map_play_error)?;

        Ok(CpalCaptureStream {
            stream,
            format: StreamFormat {
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
        })
    }
}

pub struct CpalCaptureStream {
    stream: Stream,
    format: StreamFormat,
}

impl CaptureStream for CpalCaptureStream {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn stop(self) {
        if let Err(err) = self.stream.pause() {
            warn!("Could not pause input stream: {err}");
        }
        // Dropping the stream joins the callback
        drop(self.stream);
        info!("Audio input stream closed");
    }
}

fn map_config_error(err: DefaultStreamConfigError) -> RecorderError {
    match err {
        DefaultStreamConfigError::DeviceNotAvailable => RecorderError::DeviceUnavailable,
        other => RecorderError::Device(other.to_string()),
    }
}

/// Hosts report a refused microphone as a backend error when the stream is built
fn map_build_error(err: BuildStreamError) -> RecorderError {
    match err {
        BuildStreamError::DeviceNotAvailable => RecorderError::DeviceUnavailable,
        BuildStreamError::BackendSpecific { err } => RecorderError::PermissionDenied(err.description),
        other => RecorderError::Device(other.to_string()),
    }
}

fn map_play_error(err: PlayStreamError) -> RecorderError {
    match err {
        PlayStreamError::DeviceNotAvailable => RecorderError::DeviceUnavailable,
        other => RecorderError::Device(other.to_string()),
    }
}
