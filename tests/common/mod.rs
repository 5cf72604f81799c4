// SPDX-License-Identifier: GPL-3.0-only

//! In-memory encoders, microphone and muxer for driving whole sessions
//! without a media framework

#![allow(dead_code)]

use camera_recorder::backends::audio::{MicrophoneFactory, MicrophoneSettings, MicrophoneSource};
use camera_recorder::backends::camera::types::VideoFrame;
use camera_recorder::config::RecorderConfig;
use camera_recorder::errors::{MuxerError, RecordingError};
use camera_recorder::media::encoders::{
    AudioEncoder, AudioEncoderFactory, AudioEncoderListener, AudioEncoderSettings, DequeueResult,
    InputSurface, PcmChunk, VideoEncoder, VideoEncoderFactory, VideoEncoderSettings,
};
use camera_recorder::media::sample::{
    EncodedSample, SampleData, SampleFlags, SampleInfo, TrackFormat,
};
use camera_recorder::pipelines::video::{
    MediaBackends, MuxerBackend, MuxerFactory, TrackIndex,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Capture timestamp of the first test frame
pub const FIRST_FRAME_NS: u64 = 1_000_000_000;

/// Spacing between test frames (30 fps)
pub const FRAME_INTERVAL_NS: u64 = 33_333_000;

/// Generous bound for anything the render thread does
pub const WAIT: Duration = Duration::from_secs(5);

/// Solid RGBA frame number `index`
pub fn frame(index: u64, width: u32, height: u32) -> VideoFrame {
    let data = vec![0x80u8; (width * height * 4) as usize];
    VideoFrame::new(data, width, height, FIRST_FRAME_NS + index * FRAME_INTERVAL_NS)
}

/// Zero-based microseconds of frame `index` once muxed
pub fn frame_pts_us(index: u64) -> i64 {
    (index * FRAME_INTERVAL_NS / 1000) as i64
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn test_config(audio: bool) -> RecorderConfig {
    let mut config = RecorderConfig::default();
    config.audio.enabled = audio;
    config.timing.drain_poll_timeout_ms = 1;
    config.timing.finalize_timeout_ms = 2_000;
    config
}

// ===== Video encoder =====

/// Status the fake encoder reports before its next sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedStatus {
    BuffersChanged,
    Invalid(i32),
}

#[derive(Debug, Default)]
pub struct VideoEncoderLog {
    pub settings: Option<VideoEncoderSettings>,
    pub started: bool,
    pub format_reported: bool,
    pub injected: VecDeque<InjectedStatus>,
    pub statuses_served: u64,
    pub queued: VecDeque<i64>,
    pub frames_swapped: u64,
    pub end_of_input: bool,
    pub eos_sent: bool,
    pub released: bool,
}

/// Encoder that emits one sample per submitted picture, one picture late
#[derive(Clone, Default)]
pub struct FakeVideoEncoderFactory {
    pub log: Arc<Mutex<VideoEncoderLog>>,
    fail_create: bool,
}

impl FakeVideoEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn frames_swapped(&self) -> u64 {
        self.log.lock().unwrap().frames_swapped
    }

    pub fn wait_for_swaps(&self, count: u64) -> bool {
        wait_until(WAIT, || self.frames_swapped() >= count)
    }

    pub fn is_released(&self) -> bool {
        self.log.lock().unwrap().released
    }

    /// Queue `count` copies of `status` ahead of any further output
    pub fn inject(&self, status: InjectedStatus, count: usize) {
        let mut log = self.log.lock().unwrap();
        log.injected.extend(std::iter::repeat_n(status, count));
    }

    pub fn statuses_served(&self) -> u64 {
        self.log.lock().unwrap().statuses_served
    }
}

impl VideoEncoderFactory for FakeVideoEncoderFactory {
    fn probe(&self) -> Result<(), RecordingError> {
        Ok(())
    }

    fn create(
        &self,
        settings: &VideoEncoderSettings,
    ) -> Result<Box<dyn VideoEncoder>, RecordingError> {
        if self.fail_create {
            return Err(RecordingError::EncoderConfiguration(
                "unsupported profile".into(),
            ));
        }
        self.log.lock().unwrap().settings = Some(settings.clone());
        Ok(Box::new(FakeVideoEncoder {
            log: Arc::clone(&self.log),
            width: settings.width,
            height: settings.height,
        }))
    }
}

struct FakeVideoEncoder {
    log: Arc<Mutex<VideoEncoderLog>>,
    width: u32,
    height: u32,
}

impl VideoEncoder for FakeVideoEncoder {
    fn create_input_surface(&mut self) -> Result<Box<dyn InputSurface>, RecordingError> {
        Ok(Box::new(FakeSurface {
            log: Arc::clone(&self.log),
            drawn: None,
        }))
    }

    fn start(&mut self) -> Result<(), RecordingError> {
        self.log.lock().unwrap().started = true;
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> DequeueResult {
        let mut log = self.log.lock().unwrap();
        if !log.started {
            return DequeueResult::TryAgainLater;
        }
        if !log.format_reported {
            log.format_reported = true;
            return DequeueResult::OutputFormatChanged;
        }
        if let Some(status) = log.injected.pop_front() {
            log.statuses_served += 1;
            return match status {
                InjectedStatus::BuffersChanged => DequeueResult::OutputBuffersChanged,
                InjectedStatus::Invalid(code) => DequeueResult::Invalid(code),
            };
        }
        if let Some(pts) = log.queued.pop_front() {
            return DequeueResult::Sample(EncodedSample::new(
                SampleData::Owned(vec![0x65; 32]),
                pts,
                SampleFlags::NONE,
            ));
        }
        if log.end_of_input && !log.eos_sent {
            log.eos_sent = true;
            return DequeueResult::Sample(EncodedSample::empty(0, SampleFlags::END_OF_STREAM));
        }
        DequeueResult::TryAgainLater
    }

    fn output_format(&self) -> Option<TrackFormat> {
        Some(TrackFormat::video("video/avc", self.width, self.height))
    }

    fn signal_end_of_input(&mut self) -> Result<(), RecordingError> {
        self.log.lock().unwrap().end_of_input = true;
        Ok(())
    }

    fn stop(&mut self) {}

    fn release(&mut self) {
        self.log.lock().unwrap().released = true;
    }
}

struct FakeSurface {
    log: Arc<Mutex<VideoEncoderLog>>,
    drawn: Option<i64>,
}

impl InputSurface for FakeSurface {
    fn draw_frame(
        &mut self,
        frame: &VideoFrame,
        _width: u32,
        _height: u32,
    ) -> Result<(), RecordingError> {
        self.drawn = Some((frame.timestamp_ns / 1000) as i64);
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), RecordingError> {
        if let Some(pts) = self.drawn.take() {
            let mut log = self.log.lock().unwrap();
            log.queued.push_back(pts);
            log.frames_swapped += 1;
        }
        Ok(())
    }

    fn release(&mut self) {}
}

// ===== Audio encoder =====

#[derive(Default)]
struct AudioEncoderLog {
    listener: Option<Arc<dyn AudioEncoderListener>>,
    started: bool,
    end_of_stream: bool,
    stopped: bool,
    released: bool,
}

/// Test-side handle that plays the audio encoder's notification thread
#[derive(Clone, Default)]
pub struct FakeAudioDriver {
    inner: Arc<(Mutex<AudioEncoderLog>, Condvar)>,
}

impl FakeAudioDriver {
    pub fn wait_started(&self) -> bool {
        let (lock, started) = &*self.inner;
        let log = lock.lock().unwrap();
        let (log, _) = started
            .wait_timeout_while(log, WAIT, |log| !log.started)
            .unwrap();
        log.started
    }

    /// Listener cloned out so notifications run without the lock held
    fn listener(&self) -> Option<Arc<dyn AudioEncoderListener>> {
        self.inner.0.lock().unwrap().listener.clone()
    }

    pub fn emit_format(&self, sample_rate: u32, channels: u32) {
        if let Some(listener) = self.listener() {
            listener.on_output_format_changed(TrackFormat::audio(
                "audio/mp4a-latm",
                sample_rate,
                channels,
            ));
        }
    }

    pub fn emit_output(&self, pts_us: i64, size: usize) {
        if let Some(listener) = self.listener() {
            listener.on_output_available(EncodedSample::new(
                SampleData::Owned(vec![0x21; size]),
                pts_us,
                SampleFlags::NONE,
            ));
        }
    }

    pub fn emit_codec_config(&self) {
        if let Some(listener) = self.listener() {
            listener.on_output_available(EncodedSample::new(
                SampleData::Owned(vec![0x12, 0x08]),
                0,
                SampleFlags::CODEC_CONFIG,
            ));
        }
    }

    pub fn request_input(&self, capacity: usize) -> Option<PcmChunk> {
        self.listener()?.on_input_available(capacity)
    }

    pub fn end_of_stream_signalled(&self) -> bool {
        self.inner.0.lock().unwrap().end_of_stream
    }

    pub fn is_released(&self) -> bool {
        let log = self.inner.0.lock().unwrap();
        log.released && log.listener.is_none()
    }
}

#[derive(Clone, Default)]
pub struct FakeAudioEncoderFactory {
    pub driver: FakeAudioDriver,
}

impl AudioEncoderFactory for FakeAudioEncoderFactory {
    fn create(
        &self,
        _settings: &AudioEncoderSettings,
    ) -> Result<Arc<dyn AudioEncoder>, RecordingError> {
        Ok(Arc::new(FakeAudioEncoder {
            driver: self.driver.clone(),
        }))
    }
}

struct FakeAudioEncoder {
    driver: FakeAudioDriver,
}

impl AudioEncoder for FakeAudioEncoder {
    fn start(&self, listener: Arc<dyn AudioEncoderListener>) -> Result<(), RecordingError> {
        let (lock, started) = &*self.driver.inner;
        let mut log = lock.lock().unwrap();
        log.listener = Some(listener);
        log.started = true;
        started.notify_all();
        Ok(())
    }

    /// Answers immediately with the end-of-stream unit
    fn signal_end_of_stream(&self) {
        let listener = {
            let mut log = self.driver.inner.0.lock().unwrap();
            log.end_of_stream = true;
            log.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_output_available(EncodedSample::empty(0, SampleFlags::END_OF_STREAM));
        }
    }

    fn stop(&self) {
        self.driver.inner.0.lock().unwrap().stopped = true;
    }

    fn release(&self) {
        let mut log = self.driver.inner.0.lock().unwrap();
        log.listener = None;
        log.released = true;
    }
}

// ===== Microphone =====

/// Microphone producing silence on every read
#[derive(Clone, Default)]
pub struct FakeMicrophoneFactory {
    fail: bool,
}

impl FakeMicrophoneFactory {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl MicrophoneFactory for FakeMicrophoneFactory {
    fn create(
        &self,
        _settings: &MicrophoneSettings,
    ) -> Result<Box<dyn MicrophoneSource>, RecordingError> {
        if self.fail {
            return Err(RecordingError::Audio("no capture device".into()));
        }
        Ok(Box::new(FakeMicrophone))
    }
}

struct FakeMicrophone;

impl MicrophoneSource for FakeMicrophone {
    fn start(&mut self) -> Result<(), RecordingError> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        buf.fill(0);
        buf.len()
    }

    fn stop(&mut self) {}

    fn release(&mut self) {}
}

// ===== Muxer =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenSample {
    pub kind: &'static str,
    pub pts_us: i64,
    pub size: usize,
}

#[derive(Debug, Default)]
pub struct MuxerLog {
    pub tracks: Vec<TrackFormat>,
    pub started: bool,
    pub stopped: bool,
    pub samples: Vec<WrittenSample>,
}

impl MuxerLog {
    pub fn pts_of(&self, kind: &str) -> Vec<i64> {
        self.samples
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.pts_us)
            .collect()
    }
}

/// Records container operations; creates an empty file at the output path
#[derive(Clone, Default)]
pub struct MemoryMuxerFactory {
    pub log: Arc<Mutex<MuxerLog>>,
    fail_write_at: Option<usize>,
}

impl MemoryMuxerFactory {
    /// Muxer whose `attempt`-th write (1-based) fails
    pub fn failing_write(attempt: usize) -> Self {
        Self {
            fail_write_at: Some(attempt),
            ..Self::default()
        }
    }
}

impl MuxerFactory for MemoryMuxerFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn MuxerBackend>, MuxerError> {
        std::fs::write(path, b"").map_err(|e| MuxerError::Backend(e.to_string()))?;
        Ok(Box::new(MemoryMuxer {
            log: Arc::clone(&self.log),
            fail_write_at: self.fail_write_at,
            attempts: 0,
        }))
    }
}

struct MemoryMuxer {
    log: Arc<Mutex<MuxerLog>>,
    fail_write_at: Option<usize>,
    attempts: usize,
}

impl MuxerBackend for MemoryMuxer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<TrackIndex, MuxerError> {
        let mut log = self.log.lock().unwrap();
        log.tracks.push(format.clone());
        Ok(log.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<(), MuxerError> {
        self.log.lock().unwrap().started = true;
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &SampleInfo,
    ) -> Result<(), MuxerError> {
        self.attempts += 1;
        if Some(self.attempts) == self.fail_write_at {
            return Err(MuxerError::Backend("no space left on device".into()));
        }
        let mut log = self.log.lock().unwrap();
        let kind = log.tracks[track].kind.label();
        log.samples.push(WrittenSample {
            kind,
            pts_us: info.presentation_time_us,
            size: data.len(),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MuxerError> {
        self.log.lock().unwrap().stopped = true;
        Ok(())
    }
}

// ===== Wiring =====

/// Fakes for every backend plus handles to inspect them
pub struct Harness {
    pub video: FakeVideoEncoderFactory,
    pub audio: FakeAudioDriver,
    pub muxer: MemoryMuxerFactory,
    pub backends: MediaBackends,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parts(FakeVideoEncoderFactory::new(), FakeMicrophoneFactory::default())
    }

    pub fn with_parts(
        video: FakeVideoEncoderFactory,
        microphone: impl MicrophoneFactory + 'static,
    ) -> Self {
        Self::build(video, microphone, MemoryMuxerFactory::default())
    }

    pub fn with_muxer(muxer: MemoryMuxerFactory) -> Self {
        Self::build(FakeVideoEncoderFactory::new(), FakeMicrophoneFactory::default(), muxer)
    }

    fn build(
        video: FakeVideoEncoderFactory,
        microphone: impl MicrophoneFactory + 'static,
        muxer: MemoryMuxerFactory,
    ) -> Self {
        let audio = FakeAudioEncoderFactory::default();
        let backends = MediaBackends {
            video_encoder: Arc::new(video.clone()),
            audio_encoder: Arc::new(audio.clone()),
            microphone: Arc::new(microphone),
            muxer: Arc::new(muxer.clone()),
        };
        Self {
            video,
            audio: audio.driver,
            muxer,
            backends,
        }
    }

    pub fn muxer_log(&self) -> std::sync::MutexGuard<'_, MuxerLog> {
        self.muxer.log.lock().unwrap()
    }
}
