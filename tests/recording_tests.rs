// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end recording sessions against in-memory backends

mod common;

use camera_recorder::backends::audio::{
    AudioSamples, AudioSamplesInterceptor, InterceptedMicrophoneFactory,
};
use camera_recorder::backends::camera::types::SensorRotation;
use camera_recorder::errors::RecordingError;
use camera_recorder::pipelines::video::{
    FinalizeOutcome, MediaRecorder, RolloverListener, SessionState, VideoFileRenderer,
};
use common::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn output_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("clips").join("session.mp4")
}

fn recorder(harness: &Harness, audio: bool) -> MediaRecorder {
    MediaRecorder::new(true, test_config(audio), harness.backends.clone(), None)
}

fn submit_frames(recorder: &MediaRecorder, range: std::ops::Range<u64>) {
    for index in range {
        recorder
            .on_frame(frame(index, WIDTH, HEIGHT))
            .expect("frame accepted");
    }
}

fn stop_and_wait(recorder: &MediaRecorder) -> FinalizeOutcome {
    recorder
        .stop()
        .expect("session was running")
        .wait(WAIT)
        .expect("session finalized")
}

#[test]
fn test_video_only_session_saves_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    recorder.start(&path).unwrap();
    assert!(recorder.is_recording());
    submit_frames(&recorder, 0..10);

    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Saved(path.clone()));
    assert!(path.exists());
    assert!(!recorder.is_recording());

    let log = harness.muxer_log();
    assert_eq!(log.tracks.len(), 1);
    assert!(log.tracks[0].is_video());
    assert!(log.started && log.stopped);
    let expected: Vec<i64> = (0..10).map(frame_pts_us).collect();
    assert_eq!(log.pts_of("video"), expected);
    assert!(harness.video.is_released());
}

#[test]
fn test_encoder_configured_from_first_frame() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    recorder.start(&output_path(&dir)).unwrap();
    recorder
        .on_frame(frame(0, HEIGHT, WIDTH).with_rotation(SensorRotation::Rotate90))
        .unwrap();

    let settings = harness.video.log.lock().unwrap().settings.clone().unwrap();
    assert_eq!((settings.width, settings.height), (WIDTH, HEIGHT));
    assert_eq!(settings.frame_rate, 30);

    stop_and_wait(&recorder);
}

#[test]
fn test_audio_and_video_timelines_are_zero_based() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::new();
    let recorder = recorder(&harness, true);

    recorder.start(&path).unwrap();
    submit_frames(&recorder, 0..3);
    assert!(harness.audio.wait_started());

    // Dropped: the muxer has not started yet
    harness.audio.emit_output(1_990_000, 64);
    harness.audio.emit_format(44_100, 1);
    harness.audio.emit_codec_config();
    for pts in [2_000_000, 2_000_000, 2_023_000, 1_999_000, 2_046_000] {
        harness.audio.emit_output(pts, 64);
    }
    submit_frames(&recorder, 3..6);

    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Saved(path));

    let log = harness.muxer_log();
    assert_eq!(log.tracks.len(), 2);
    assert_eq!(log.pts_of("audio"), vec![0, 1, 23_000, 23_001, 46_000]);
    let video: Vec<i64> = (0..6).map(frame_pts_us).collect();
    assert_eq!(log.pts_of("video"), video);
    assert!(log.samples.iter().all(|s| s.size > 0));

    assert!(harness.audio.end_of_stream_signalled());
    assert!(harness.audio.is_released());
}

#[test]
fn test_buffered_video_is_flushed_before_other_writes() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let recorder = recorder(&harness, true);

    recorder.start(&output_path(&dir)).unwrap();
    submit_frames(&recorder, 0..6);
    assert!(harness.video.wait_for_swaps(6));
    assert!(harness.muxer_log().samples.is_empty());

    harness.audio.emit_format(44_100, 1);
    harness.audio.emit_output(500_000, 32);
    harness.audio.emit_output(523_000, 32);

    {
        let log = harness.muxer_log();
        let kinds: Vec<&str> = log.samples.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec!["video", "video", "video", "video", "video", "audio", "audio"]
        );
        let flushed: Vec<i64> = log.samples[..5].iter().map(|s| s.pts_us).collect();
        assert_eq!(flushed, (0..5).map(frame_pts_us).collect::<Vec<_>>());
    }

    stop_and_wait(&recorder);
    assert_eq!(harness.muxer_log().pts_of("video").len(), 6);
}

#[test]
fn test_session_discarded_when_audio_never_registers() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::new();
    let recorder = recorder(&harness, true);

    recorder.start(&path).unwrap();
    submit_frames(&recorder, 0..4);
    assert!(harness.audio.wait_started());

    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Discarded);
    assert!(!path.exists());

    let log = harness.muxer_log();
    assert!(!log.started);
    assert!(log.samples.is_empty());
}

#[test]
fn test_microphone_failure_falls_back_to_video_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::with_parts(FakeVideoEncoderFactory::new(), FakeMicrophoneFactory::failing());
    let recorder = recorder(&harness, true);

    recorder.start(&path).unwrap();
    submit_frames(&recorder, 0..30);

    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Saved(path));
    let log = harness.muxer_log();
    assert_eq!(log.tracks.len(), 1);
    let video = log.pts_of("video");
    assert_eq!(video.len(), 30);
    // One second at 30 fps
    assert_eq!(video.last(), Some(&frame_pts_us(29)));
    assert!(log.pts_of("audio").is_empty());
}

#[test]
fn test_frames_queued_before_stop_are_encoded() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    recorder.start(&output_path(&dir)).unwrap();
    submit_frames(&recorder, 0..50);
    let handle = recorder.stop().unwrap();

    assert!(matches!(handle.wait(WAIT), Some(FinalizeOutcome::Saved(_))));
    assert_eq!(harness.muxer_log().pts_of("video").len(), 50);
}

#[test]
fn test_frame_released_after_draw() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    recorder.start(&output_path(&dir)).unwrap();
    let first = frame(0, WIDTH, HEIGHT);
    let retained = first.retain();
    assert_eq!(retained.data.ref_count(), 2);

    recorder.on_frame(first).unwrap();
    assert!(harness.video.wait_for_swaps(1));
    assert_eq!(retained.data.ref_count(), 1);

    stop_and_wait(&recorder);
}

#[test]
fn test_resolution_change_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    recorder.start(&output_path(&dir)).unwrap();
    recorder.on_frame(frame(0, WIDTH, HEIGHT)).unwrap();

    let err = recorder.on_frame(frame(1, 32, 32)).unwrap_err();
    assert!(matches!(
        err,
        RecordingError::ResolutionChanged {
            expected: (WIDTH, HEIGHT),
            actual: (32, 32),
        }
    ));
    assert!(recorder.is_recording());

    stop_and_wait(&recorder);
    assert_eq!(harness.muxer_log().pts_of("video").len(), 1);
}

#[test]
fn test_frames_rejected_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    recorder.start(&output_path(&dir)).unwrap();
    submit_frames(&recorder, 0..2);
    stop_and_wait(&recorder);

    assert!(matches!(
        recorder.on_frame(frame(2, WIDTH, HEIGHT)),
        Err(RecordingError::NotRecording)
    ));
    assert!(recorder.stop().is_none());
}

#[test]
fn test_encoder_configuration_failure_ends_session() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::with_parts(FakeVideoEncoderFactory::failing(), FakeMicrophoneFactory::default());
    let recorder = recorder(&harness, true);

    recorder.start(&output_path(&dir)).unwrap();
    let err = recorder.on_frame(frame(0, WIDTH, HEIGHT)).unwrap_err();
    assert!(matches!(err, RecordingError::EncoderConfiguration(_)));
    assert!(!recorder.is_recording());

    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Discarded);
}

#[test]
fn test_start_requires_absolute_path() {
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    let err = recorder.start(std::path::Path::new("clips/out.mp4")).unwrap_err();
    assert!(matches!(err, RecordingError::InvalidOutputPath(_)));
    assert!(!recorder.is_recording());
}

#[test]
fn test_start_while_recording_keeps_session() {
    let dir = tempfile::tempdir().unwrap();
    let first = output_path(&dir);
    let second = dir.path().join("other.mp4");
    let harness = Harness::new();
    let recorder = recorder(&harness, false);

    recorder.start(&first).unwrap();
    assert_eq!(recorder.record_file(), Some(first.clone()));
    recorder.start(&second).unwrap();
    // The requested path is remembered, the running session keeps its file
    assert_eq!(recorder.record_file(), Some(second.clone()));
    assert!(recorder.is_recording());

    submit_frames(&recorder, 0..2);
    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Saved(first));
    assert!(!second.exists());
}

#[test]
fn test_no_video_source_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::new();
    let recorder = MediaRecorder::new(false, test_config(false), harness.backends.clone(), None);

    recorder.start(&path).unwrap();
    assert_eq!(recorder.record_file(), Some(path));
    assert!(!recorder.is_recording());
    assert!(matches!(
        recorder.on_frame(frame(0, WIDTH, HEIGHT)),
        Err(RecordingError::NotRecording)
    ));
    assert!(recorder.stop().is_none());
}

#[test]
fn test_renderer_state_machine() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let harness = Harness::new();
    let config = test_config(false);

    let mut renderer = VideoFileRenderer::new(&path, &config, &harness.backends, None).unwrap();
    assert_eq!(renderer.state(), SessionState::Running);
    renderer.submit_frame(frame(0, WIDTH, HEIGHT)).unwrap();

    let handle = renderer.release();
    assert_ne!(renderer.state(), SessionState::Running);
    assert!(matches!(
        renderer.submit_frame(frame(1, WIDTH, HEIGHT)),
        Err(RecordingError::NotRecording)
    ));

    assert_eq!(handle.wait(WAIT), Some(FinalizeOutcome::Saved(path.clone())));
    assert_eq!(renderer.state(), SessionState::Stopped);

    // Releasing again reports the same outcome
    assert_eq!(
        renderer.release().wait(WAIT),
        Some(FinalizeOutcome::Saved(path))
    );
}

#[test]
fn test_rollover_listener_notified() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let mut config = test_config(false);
    config.timing.rollover_secs = 0;

    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    let listener: Arc<dyn RolloverListener> = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let recorder = MediaRecorder::new(true, config, harness.backends.clone(), Some(listener));

    recorder.start(&output_path(&dir)).unwrap();
    submit_frames(&recorder, 0..3);
    assert!(harness.video.wait_for_swaps(3));
    assert_eq!(fired.load(Ordering::SeqCst), 3);

    // Advisory only: the session keeps recording
    assert!(recorder.is_recording());
    stop_and_wait(&recorder);
}

#[test]
fn test_intercepted_microphone_feeds_audio_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let interceptor = Arc::new(AudioSamplesInterceptor::new());
    let harness = Harness::with_parts(
        FakeVideoEncoderFactory::new(),
        InterceptedMicrophoneFactory::new(Arc::clone(&interceptor)),
    );
    let recorder = recorder(&harness, true);

    recorder.start(&output_path(&dir)).unwrap();
    submit_frames(&recorder, 0..3);
    assert!(harness.audio.wait_started());
    assert_eq!(interceptor.attached_count(), 1);

    interceptor.on_samples_ready(&AudioSamples {
        sample_rate: 44_100,
        channels: 1,
        data: vec![7u8; 512],
    });
    let chunk = harness.audio.request_input(1024).expect("pcm available");
    assert_eq!(chunk.data, vec![7u8; 512]);

    harness.audio.emit_format(44_100, 1);
    stop_and_wait(&recorder);

    assert_eq!(interceptor.attached_count(), 0);
    assert!(harness.audio.request_input(1024).is_none());
}

#[test]
fn test_muxer_write_failure_keeps_recording_up_to_last_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::with_muxer(MemoryMuxerFactory::failing_write(3));
    let recorder = recorder(&harness, false);

    recorder.start(&path).unwrap();
    submit_frames(&recorder, 0..10);
    assert!(harness.video.wait_for_swaps(10));
    // The drain cycle aborted but the session is still live
    assert!(recorder.is_recording());
    recorder.on_frame(frame(10, WIDTH, HEIGHT)).unwrap();

    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Saved(path.clone()));
    assert!(path.exists());

    let log = harness.muxer_log();
    assert!(log.stopped);
    assert_eq!(log.pts_of("video"), vec![frame_pts_us(0), frame_pts_us(1)]);
    assert!(harness.video.is_released());
}

#[test]
fn test_invalid_encoder_status_bounded_per_drain_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::new();
    harness.video.inject(InjectedStatus::Invalid(-1000), 40);
    let recorder = recorder(&harness, false);

    recorder.start(&path).unwrap();
    submit_frames(&recorder, 0..2);
    assert!(harness.video.wait_for_swaps(2));
    // First cycle only starts the encoder, the second gives up after the bound
    assert_eq!(
        harness.video.statuses_served(),
        camera_recorder::constants::timing::MAX_INVALID_POLLS as u64
    );
    assert!(harness.muxer_log().samples.is_empty());

    submit_frames(&recorder, 2..6);
    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Saved(path));
    assert_eq!(harness.video.statuses_served(), 40);
    let expected: Vec<i64> = (0..6).map(frame_pts_us).collect();
    assert_eq!(harness.muxer_log().pts_of("video"), expected);
}

#[test]
fn test_output_buffers_changed_continues_drain() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(&dir);
    let harness = Harness::new();
    harness.video.inject(InjectedStatus::BuffersChanged, 3);
    let recorder = recorder(&harness, false);

    recorder.start(&path).unwrap();
    submit_frames(&recorder, 0..2);
    assert!(harness.video.wait_for_swaps(2));
    // Same cycle went on to write the first frame
    assert_eq!(harness.video.statuses_served(), 3);
    assert_eq!(harness.muxer_log().pts_of("video"), vec![frame_pts_us(0)]);

    submit_frames(&recorder, 2..5);
    assert_eq!(stop_and_wait(&recorder), FinalizeOutcome::Saved(path));
    let expected: Vec<i64> = (0..5).map(frame_pts_us).collect();
    assert_eq!(harness.muxer_log().pts_of("video"), expected);
}
