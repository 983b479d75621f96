// Clip encoding - Captured f32 samples to a finished audio file in memory

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::RecorderError;
use super::capture::StreamFormat;

/// Output formats, in the order the recorder prefers them by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipFormat {
    WavFloat32,
    WavPcm24,
    WavPcm16,
}

impl ClipFormat {
    pub const PREFERENCE: [ClipFormat; 3] = [
        ClipFormat::WavFloat32,
        ClipFormat::WavPcm24,
        ClipFormat::WavPcm16,
    ];

    pub fn mime_type(&self) -> &'static str {
        match self {
            ClipFormat::WavFloat32 => "audio/wav;codecs=3",
            ClipFormat::WavPcm24 | ClipFormat::WavPcm16 => "audio/wav;codecs=1",
        }
    }

    pub fn extension(&self) -> &'static str {
        "wav"
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            ClipFormat::WavFloat32 => 32,
            ClipFormat::WavPcm24 => 24,
            ClipFormat::WavPcm16 => 16,
        }
    }

    fn wav_spec(&self, stream: StreamFormat) -> WavSpec {
        WavSpec {
            channels: stream.channels,
            sample_rate: stream.sample_rate,
            bits_per_sample: self.bits_per_sample(),
            sample_format: match self {
                ClipFormat::WavFloat32 => SampleFormat::Float,
                ClipFormat::WavPcm24 | ClipFormat::WavPcm16 => SampleFormat::Int,
            },
        }
    }
}

/// Turns a finished capture into file bytes
pub trait ClipEncoder: Send {
    fn supports(&self, format: ClipFormat) -> bool;

    /// `samples` are interleaved according to `stream`
    fn encode(
        &self,
        format: ClipFormat,
        stream: StreamFormat,
        samples: &[f32],
    ) -> Result<Vec<u8>, RecorderError>;
}

/// First entry of `preferences` that `encoder` supports
pub fn select_format(preferences: &[ClipFormat], encoder: &dyn ClipEncoder) -> Option<ClipFormat> {
    preferences
        .iter()
        .copied()
        .find(|format| encoder.supports(*format))
}

/// Convert f32 sample to i16 with proper clamping
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * i16::MAX as f32) as i16
    } else {
        (clamped * -(i16::MIN as f32)) as i16
    }
}

const I24_MAX: f32 = 8_388_607.0;

/// Convert f32 sample to a 24-bit integer carried in an i32
pub fn f32_to_i24(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) * I24_MAX) as i32
}

/// WAV encoder backed by hound
#[derive(Debug, Default, Clone, Copy)]
pub struct WavEncoder;

impl ClipEncoder for WavEncoder {
    fn supports(&self, _format: ClipFormat) -> bool {
        true
    }

    fn encode(
        &self,
        format: ClipFormat,
        stream: StreamFormat,
        samples: &[f32],
    ) -> Result<Vec<u8>, RecorderError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, format.wav_spec(stream))?;
            match format {
                ClipFormat::WavFloat32 => {
                    for &sample in samples {
                        writer.write_sample(sample)?;
                    }
                }
                ClipFormat::WavPcm24 => {
                    for &sample in samples {
                        writer.write_sample(f32_to_i24(sample))?;
                    }
                }
                ClipFormat::WavPcm16 => {
                    for &sample in samples {
                        writer.write_sample(f32_to_i16(sample))?;
                    }
                }
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}
