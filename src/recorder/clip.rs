// Recorded clip - Encoded bytes plus the metadata needed to save them

use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use log::info;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use super::RecorderError;
use super::capture::StreamFormat;
use super::encoder::ClipFormat;

const FILE_PREFIX: &str = "metronome-recording";

/// `metronome-recording_<RFC 3339 timestamp, millis, ':' as '-'>.<ext>`
pub fn clip_file_name<Tz>(timestamp: &DateTime<Tz>, extension: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stamp = timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, false)
        .replace(':', "-");
    format!("{FILE_PREFIX}_{stamp}.{extension}")
}

#[derive(Debug, Clone)]
pub struct RecordedClip {
    bytes: Vec<u8>,
    format: ClipFormat,
    stream: StreamFormat,
    frames: usize,
    created_at: DateTime<Local>,
}

impl RecordedClip {
    pub fn new(
        bytes: Vec<u8>,
        format: ClipFormat,
        stream: StreamFormat,
        frames: usize,
        created_at: DateTime<Local>,
    ) -> Self {
        Self {
            bytes,
            format,
            stream,
            frames,
            created_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn format(&self) -> ClipFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn stream_format(&self) -> StreamFormat {
        self.stream
    }

    pub fn duration_secs(&self) -> f64 {
        if self.stream.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.stream.sample_rate as f64
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn file_name(&self) -> String {
        clip_file_name(&self.created_at, self.format.extension())
    }

    /// Write the clip into `dir` under its canonical name
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, RecorderError> {
        let path = dir.as_ref().join(self.file_name());
        fs::write(&path, &self.bytes)?;
        info!("Saved recording to {}", path.display());
        Ok(path)
    }
}
