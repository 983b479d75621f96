// Integration test: Recorder lifecycle against a fake microphone
//
// The fake backend hands the sink back to the test, which plays the role of
// the device callback.

use click_track::recorder::{
    CaptureBackend, CaptureConstraints, CaptureSink, CaptureStream, ClipEncoder, ClipFormat,
    DeviceStatus, Recorder, RecorderConfig, RecorderError, StreamFormat,
};
use hound::WavReader;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const FORMAT: StreamFormat = StreamFormat {
    sample_rate: 16_000,
    channels: 2,
};

#[derive(Clone, Copy)]
enum Behaviour {
    Works,
    Denied,
    Missing,
}

struct FakeMicrophone {
    behaviour: Behaviour,
    open_streams: Arc<AtomicUsize>,
    sinks: Vec<CaptureSink>,
}

impl FakeMicrophone {
    fn new(behaviour: Behaviour) -> (Self, Arc<AtomicUsize>) {
        let open_streams = Arc::new(AtomicUsize::new(0));
        (
            Self {
                behaviour,
                open_streams: Arc::clone(&open_streams),
                sinks: Vec::new(),
            },
            open_streams,
        )
    }

    fn sink(&self) -> CaptureSink {
        self.sinks.last().cloned().expect("stream was opened")
    }
}

struct FakeStream {
    open_streams: Arc<AtomicUsize>,
}

impl CaptureStream for FakeStream {
    fn format(&self) -> StreamFormat {
        FORMAT
    }

    fn stop(self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CaptureBackend for FakeMicrophone {
    type Stream = FakeStream;

    fn open(
        &mut self,
        _constraints: &CaptureConstraints,
        sink: CaptureSink,
    ) -> Result<FakeStream, RecorderError> {
        match self.behaviour {
            Behaviour::Works => {
                self.sinks.push(sink);
                self.open_streams.fetch_add(1, Ordering::SeqCst);
                Ok(FakeStream {
                    open_streams: Arc::clone(&self.open_streams),
                })
            }
            Behaviour::Denied => Err(RecorderError::PermissionDenied(
                "user refused microphone access".to_string(),
            )),
            Behaviour::Missing => Err(RecorderError::DeviceUnavailable),
        }
    }
}

/// Encoder that cannot produce anything
struct NoCodecs;

impl ClipEncoder for NoCodecs {
    fn supports(&self, _format: ClipFormat) -> bool {
        false
    }

    fn encode(
        &self,
        _format: ClipFormat,
        _stream: StreamFormat,
        _samples: &[f32],
    ) -> Result<Vec<u8>, RecorderError> {
        unreachable!("no format is ever selected")
    }
}

#[test]
fn test_record_stereo_clip() {
    let (microphone, open_streams) = FakeMicrophone::new(Behaviour::Works);
    let mut recorder = Recorder::new(microphone, RecorderConfig::default());

    let live = recorder.start(&CaptureConstraints::default()).unwrap();
    assert_eq!(live.stream, FORMAT);
    assert_eq!(open_streams.load(Ordering::SeqCst), 1);

    let sink = recorder.backend().sink();
    let chunk: Vec<f32> = (0..1_600).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
    for _ in 0..10 {
        sink.push_chunk(chunk.clone(), FORMAT.channels);
    }

    // The live analysis sees the downmixed signal
    assert!(live.analysis.peak() < 1e-6);

    let clip = recorder.stop().unwrap();
    assert_eq!(open_streams.load(Ordering::SeqCst), 0);
    assert_eq!(clip.format(), ClipFormat::WavFloat32);
    assert_eq!(clip.mime_type(), "audio/wav;codecs=3");
    assert!((clip.duration_secs() - 0.5).abs() < 1e-9);

    let reader = WavReader::new(Cursor::new(clip.bytes().to_vec())).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.duration(), 8_000);
}

#[test]
fn test_preference_order_is_honoured() {
    let (microphone, _open) = FakeMicrophone::new(Behaviour::Works);
    let config = RecorderConfig {
        preferred_formats: vec![ClipFormat::WavPcm16, ClipFormat::WavFloat32],
        ..RecorderConfig::default()
    };
    let mut recorder = Recorder::new(microphone, config);

    let live = recorder.start(&CaptureConstraints::default()).unwrap();
    assert_eq!(live.format, ClipFormat::WavPcm16);

    let clip = recorder.stop().unwrap();
    let reader = WavReader::new(Cursor::new(clip.into_bytes())).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 16);
}

#[test]
fn test_no_supported_format_closes_stream() {
    let (microphone, open_streams) = FakeMicrophone::new(Behaviour::Works);
    let mut recorder =
        Recorder::with_encoder(microphone, Box::new(NoCodecs), RecorderConfig::default());

    let result = recorder.start(&CaptureConstraints::default());
    match result {
        Err(RecorderError::UnsupportedFormat { tried }) => {
            assert_eq!(tried, ClipFormat::PREFERENCE.to_vec());
        }
        _ => panic!("expected UnsupportedFormat"),
    }

    assert!(!recorder.is_recording());
    assert_eq!(open_streams.load(Ordering::SeqCst), 0);
    assert!(recorder.last_error().is_some_and(|e| e.contains("supported")));
    assert_eq!(recorder.status(), DeviceStatus::Idle);
}

#[test]
fn test_permission_denied_is_reported() {
    let (microphone, open_streams) = FakeMicrophone::new(Behaviour::Denied);
    let mut recorder = Recorder::new(microphone, RecorderConfig::default());

    assert!(matches!(
        recorder.start(&CaptureConstraints::default()),
        Err(RecorderError::PermissionDenied(_))
    ));
    assert!(!recorder.is_recording());
    assert_eq!(open_streams.load(Ordering::SeqCst), 0);
    assert!(recorder.last_error().is_some_and(|e| e.contains("denied")));
}

#[test]
fn test_missing_device_is_reported() {
    let (microphone, _open) = FakeMicrophone::new(Behaviour::Missing);
    let mut recorder = Recorder::new(microphone, RecorderConfig::default());

    assert!(matches!(
        recorder.start(&CaptureConstraints::default()),
        Err(RecorderError::DeviceUnavailable)
    ));
    assert!(recorder.stop().is_err());
}

#[test]
fn test_device_error_stops_recording() {
    let (microphone, open_streams) = FakeMicrophone::new(Behaviour::Works);
    let mut recorder = Recorder::new(microphone, RecorderConfig::default());
    recorder.start(&CaptureConstraints::default()).unwrap();

    // Healthy stream: nothing to report
    assert!(recorder.check_device().is_ok());

    recorder.backend().sink().report_error("device unplugged");
    match recorder.check_device() {
        Err(RecorderError::Device(message)) => assert_eq!(message, "device unplugged"),
        other => panic!("expected a device error, got {other:?}"),
    }

    assert!(!recorder.is_recording());
    assert_eq!(open_streams.load(Ordering::SeqCst), 0);
    assert!(recorder.last_error().is_some());
    assert!(recorder.check_device().is_ok());
}

#[test]
fn test_restart_after_failure_clears_error() {
    let (microphone, _open) = FakeMicrophone::new(Behaviour::Works);
    let mut recorder = Recorder::new(microphone, RecorderConfig::default());

    recorder.start(&CaptureConstraints::default()).unwrap();
    recorder.backend().sink().report_error("glitch");
    assert!(recorder.check_device().is_err());

    recorder.start(&CaptureConstraints::default()).unwrap();
    assert_eq!(recorder.last_error(), None);
    assert_eq!(recorder.status(), DeviceStatus::Connected);
    recorder.stop().unwrap();
}

#[test]
fn test_saved_clip_uses_canonical_name() {
    let (microphone, _open) = FakeMicrophone::new(Behaviour::Works);
    let mut recorder = Recorder::new(microphone, RecorderConfig::default());
    recorder.start(&CaptureConstraints::default()).unwrap();
    recorder.backend().sink().push_chunk(vec![0.1; 64], FORMAT.channels);
    let clip = recorder.stop().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = clip.save_to(dir.path()).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();

    assert!(name.starts_with("metronome-recording_"));
    assert!(name.ends_with(".wav"));
    assert!(!name.contains(':'));
    assert_eq!(std::fs::read(&path).unwrap(), clip.bytes());
}
