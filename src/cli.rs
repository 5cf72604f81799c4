// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Recording a live test pattern to MP4
//! - Listing available encoders
//! - Listing microphones

use camera_recorder::backends::audio::{
    AudioSamples, AudioSamplesInterceptor, InterceptedMicrophoneFactory, enumerate_audio_devices,
};
use camera_recorder::backends::camera::{FrameLoopController, LoopAction, TestPatternSource};
use camera_recorder::config::RecorderConfig;
use camera_recorder::constants;
use camera_recorder::errors::RecordingError;
use camera_recorder::media::encoders::{detect_encoders, log_available_encoders};
use camera_recorder::pipelines::video::{
    FinalizeOutcome, MediaBackends, MediaRecorder, ReleaseHandle, RolloverListener,
};
use camera_recorder::storage;
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Options of the `record` command
pub struct RecordOptions {
    pub duration: u64,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub no_audio: bool,
    pub tone: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Record the live test pattern until the duration elapses or Ctrl+C
pub fn record(options: RecordOptions) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;
    log_available_encoders();

    let mut config = RecorderConfig::load(options.config.as_deref())?;
    if options.no_audio {
        config.audio.enabled = false;
    }

    let mut backends = MediaBackends::gstreamer(&config);
    let interceptor = Arc::new(AudioSamplesInterceptor::new());
    if options.tone {
        backends = backends.with_microphone(Arc::new(InterceptedMicrophoneFactory::new(
            Arc::clone(&interceptor),
        )));
    }

    let rollover_requested = Arc::new(AtomicBool::new(false));
    let rollover_flag = Arc::clone(&rollover_requested);
    let rollover: Arc<dyn RolloverListener> = Arc::new(move || {
        rollover_flag.store(true, Ordering::SeqCst);
    });

    let recorder = Arc::new(MediaRecorder::new(true, config.clone(), backends, Some(rollover)));

    let first_path = match options.output {
        Some(path) => std::path::absolute(path)?,
        None => storage::default_video_dir().join(storage::timestamped_file_name()),
    };

    println!("Output: {}", first_path.display());
    println!("Duration: {} seconds", options.duration);
    println!(
        "Video: {}x{} @ {}fps",
        options.width, options.height, options.fps
    );
    match (config.audio.enabled, options.tone) {
        (false, _) => println!("Audio: disabled"),
        (true, true) => println!("Audio: generated tone"),
        (true, false) => println!("Audio: microphone"),
    }

    let source = TestPatternSource::new(options.width, options.height, options.fps)?;
    recorder.start(&first_path)?;

    let frame_recorder = Arc::clone(&recorder);
    let frame_timeout = Duration::from_millis(500);
    let mut frames = FrameLoopController::start("test-pattern", move || {
        let Some(frame) = source.next_frame(frame_timeout) else {
            return LoopAction::Continue;
        };
        match frame_recorder.on_frame(frame) {
            Ok(()) => LoopAction::Continue,
            // Between segments
            Err(RecordingError::NotRecording) => LoopAction::Continue,
            Err(e) => {
                warn!(error = %e, "Recording failed");
                LoopAction::Stop
            }
        }
    });

    let tone_stop = Arc::new(AtomicBool::new(false));
    let tone_thread = options.tone.then(|| {
        spawn_tone(
            Arc::clone(&interceptor),
            config.audio.sample_rate,
            config.audio.channels,
            Arc::clone(&tone_stop),
        )
    });

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");

    let start = Instant::now();
    let target_duration = Duration::from_secs(options.duration);
    let finalize_timeout = config.timing.finalize_timeout() * 2;

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if !frames.is_running() {
            println!();
            println!("Frame source stopped");
            break;
        }

        if rollover_requested.swap(false, Ordering::SeqCst) {
            let next = next_segment_path(&first_path);
            println!();
            println!("Starting new segment: {}", next.display());
            if let Some(handle) = recorder.stop() {
                report_outcome(handle, finalize_timeout);
            }
            recorder.start(&next)?;
        }

        let elapsed = start.elapsed().as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;

        thread::sleep(Duration::from_millis(100));
    }
    println!();

    // Frames already queued are still encoded
    let handle = recorder.stop();
    frames.stop();
    tone_stop.store(true, Ordering::SeqCst);
    if let Some(thread) = tone_thread {
        let _ = thread.join();
    }

    match handle {
        Some(handle) => report_outcome(handle, finalize_timeout),
        None => println!("Recording was not running"),
    }

    Ok(())
}

fn report_outcome(handle: ReleaseHandle, timeout: Duration) {
    match handle.wait(timeout) {
        Some(FinalizeOutcome::Saved(path)) => println!("Video saved: {}", path.display()),
        Some(FinalizeOutcome::Discarded) => println!("Recording discarded (no usable tracks)"),
        None => println!("Timed out waiting for the recording to finish"),
    }
}

/// `video_X.mp4` → `video_X_<timestamp>.mp4` next to the first segment
fn next_segment_path(first: &Path) -> PathBuf {
    let stem = first
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let suffix = chrono::Local::now().format("%Y%m%d_%H%M%S");
    first.with_file_name(format!(
        "{}_{}.{}",
        stem,
        suffix,
        constants::container::EXTENSION
    ))
}

/// Feed a 440 Hz sine tone into the interceptor in 20 ms batches
fn spawn_tone(
    interceptor: Arc<AudioSamplesInterceptor>,
    sample_rate: u32,
    channels: u32,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        const FREQUENCY: f32 = 440.0;
        const BATCH: Duration = Duration::from_millis(20);

        let frames_per_batch = (sample_rate as u64 * BATCH.as_millis() as u64 / 1000) as usize;
        let mut phase = 0.0f32;
        let step = TAU * FREQUENCY / sample_rate as f32;
        let mut next = Instant::now();

        while !stop.load(Ordering::SeqCst) {
            let mut data = Vec::with_capacity(
                frames_per_batch * channels as usize * constants::audio::BYTES_PER_SAMPLE,
            );
            for _ in 0..frames_per_batch {
                let value = (phase.sin() * i16::MAX as f32 * 0.25) as i16;
                for _ in 0..channels {
                    data.extend_from_slice(&value.to_le_bytes());
                }
                phase = (phase + step) % TAU;
            }

            interceptor.on_samples_ready(&AudioSamples {
                sample_rate,
                channels,
                data,
            });

            next += BATCH;
            if let Some(wait) = next.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }
        debug!("Tone generator stopped");
    })
}

/// Print the encoders and muxer this system provides
pub fn list_encoders() -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let report = detect_encoders();

    println!("H.264 encoders:");
    if report.video.is_empty() {
        println!("  (none)");
    }
    for encoder in &report.video {
        println!(
            "  {:<16} {}{}",
            encoder.element_name,
            encoder.display_name,
            if encoder.is_hardware { " [hardware]" } else { "" }
        );
    }

    println!();
    println!("AAC encoders:");
    if report.audio.is_empty() {
        println!("  (none)");
    }
    for (element, name) in &report.audio {
        println!("  {:<16} {}", element, name);
    }

    println!();
    println!(
        "Muxer ({}): {}",
        constants::container::MUXER_ELEMENT,
        if report.muxer { "available" } else { "missing" }
    );
    println!();
    println!(
        "Recording: {}  Audio: {}",
        if report.can_record() { "yes" } else { "no" },
        if report.can_record_audio() { "yes" } else { "no" }
    );

    Ok(())
}

/// Print the PipeWire audio sources
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = enumerate_audio_devices();

    if devices.is_empty() {
        println!("No audio sources found.");
        return Ok(());
    }

    println!("Audio sources:");
    for device in devices {
        println!(
            "  {} {} ({})",
            if device.is_default { "*" } else { " " },
            device.name,
            device.node_name
        );
    }

    Ok(())
}
