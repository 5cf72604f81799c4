// SPDX-License-Identifier: GPL-3.0-only

//! Render stage of a recording session
//!
//! [`VideoFileRenderer`] accepts frames from any thread and queues them onto
//! its render executor, which draws each one into the encoder surface, drains
//! the encoder, and submits the picture. The first frame fixes the encoded
//! size. The encoder is created on the caller's thread so configuration
//! errors surface immediately.
//!
//! Teardown is queued behind the pending draws, so every frame submitted
//! before [`VideoFileRenderer::release`] is still encoded:
//!
//! 1. stop and release the microphone
//! 2. signal end of stream to the audio encoder
//! 3. end the video input and drain to end of stream
//! 4. stop and release the video encoder and its surface
//! 5. mark the video side finished
//! 6. wait for the audio side to finalize the container, forcing it on timeout

use super::audio_path::AudioPath;
use super::drain::VideoPipeline;
use super::executor::RenderExecutor;
use super::factories::MediaBackends;
use super::rollover::{RolloverListener, SegmentRollover};
use super::state::{FinalizeOutcome, SessionShared, SessionState};
use crate::backends::audio::{MicrophoneFactory, MicrophoneSettings};
use crate::backends::camera::types::VideoFrame;
use crate::config::RecorderConfig;
use crate::constants;
use crate::errors::RecordingError;
use crate::media::encoders::{
    AudioEncoderFactory, AudioEncoderSettings, VideoEncoder, VideoEncoderFactory,
    VideoEncoderSettings,
};
use crate::media::sample::TrackFormat;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Brings microphone capture and audio encoding online
struct AudioBringUp {
    encoders: Arc<dyn AudioEncoderFactory>,
    microphones: Arc<dyn MicrophoneFactory>,
    encoder_settings: AudioEncoderSettings,
    microphone_settings: MicrophoneSettings,
}

impl AudioBringUp {
    fn bring_online(&self, shared: &Arc<SessionShared>) {
        if !shared.session.is_recording() {
            debug!("Session stopping, audio stays offline");
            return;
        }

        match self.try_bring_online(shared) {
            Ok(()) => info!("Audio capture online"),
            Err(e) => {
                warn!(error = %e, "Audio unavailable");
                if let Some(mut microphone) = shared.take_microphone() {
                    microphone.release();
                }
                if let Some(encoder) = shared.take_audio_encoder() {
                    encoder.release();
                }
                if let Err(e) = shared.disable_audio() {
                    error!(error = %e, "Failed to start video-only muxer");
                }
            }
        }
    }

    fn try_bring_online(&self, shared: &Arc<SessionShared>) -> Result<(), RecordingError> {
        let mut microphone = self.microphones.create(&self.microphone_settings)?;
        let encoder = self.encoders.create(&self.encoder_settings)?;

        if let Err(e) = microphone.start() {
            microphone.release();
            encoder.release();
            return Err(e);
        }
        shared.set_microphone(microphone);
        shared.set_audio_encoder(Arc::clone(&encoder));

        encoder.start(Arc::new(AudioPath::new(Arc::clone(shared))))
    }
}

/// State owned by the render thread
struct RenderContext {
    shared: Arc<SessionShared>,
    pipeline: Option<VideoPipeline>,
    audio: Option<AudioBringUp>,
    rollover: SegmentRollover,
    poll_timeout: Duration,
    finalize_timeout: Duration,
    size: (u32, u32),
    frames: u64,
}

impl RenderContext {
    fn install(&mut self, encoder: Box<dyn VideoEncoder>, size: (u32, u32)) {
        self.size = size;
        match VideoPipeline::new(encoder, self.poll_timeout) {
            Ok(pipeline) => self.pipeline = Some(pipeline),
            Err(e) => error!(error = %e, "Failed to create encoder input surface"),
        }
    }

    /// Registers the video track, then brings audio online
    fn format_handler<'a>(
        shared: &'a Arc<SessionShared>,
        audio: &'a Option<AudioBringUp>,
    ) -> impl FnMut(&TrackFormat) + 'a {
        move |format: &TrackFormat| {
            if let Err(e) = shared.register_video_track(format) {
                error!(error = %e, "Failed to register video track");
                return;
            }
            match audio {
                Some(audio) if shared.audio_expected() => audio.bring_online(shared),
                _ => {}
            }
        }
    }

    fn render(&mut self, frame: VideoFrame) {
        self.rollover.check_at(Instant::now());

        let Some(pipeline) = self.pipeline.as_mut() else {
            debug!("No encoder surface, dropping frame");
            return;
        };

        let (width, height) = self.size;
        let drawn = pipeline.draw(&frame, width, height);
        drop(frame);
        if let Err(e) = drawn {
            warn!(error = %e, "Failed to draw frame");
            return;
        }

        let mut on_format = Self::format_handler(&self.shared, &self.audio);
        pipeline.drain(&self.shared, &mut on_format);

        if let Err(e) = pipeline.swap_buffers() {
            warn!(error = %e, "Failed to submit frame to encoder");
            return;
        }
        self.frames += 1;
    }

    fn teardown(&mut self) {
        info!(frames = self.frames, "Tearing down recording session");

        match self.shared.take_microphone() {
            Some(mut microphone) => {
                microphone.stop();
                microphone.release();
            }
            None => debug!("Audio capture never started"),
        }

        match self.shared.audio_encoder() {
            Some(encoder) => encoder.signal_end_of_stream(),
            // Nothing will report the audio side finished
            None => self.shared.mark_audio_done(),
        }

        if let Some(mut pipeline) = self.pipeline.take() {
            let deadline = Instant::now() + self.finalize_timeout;
            let mut on_format = Self::format_handler(&self.shared, &self.audio);
            pipeline.finish(&self.shared, deadline, &mut on_format);
            pipeline.release();
        }

        self.shared.mark_video_done();

        if self.shared.wait_finalized(self.finalize_timeout).is_none() {
            warn!("Audio side did not finish in time, forcing finalization");
            self.shared.finish_audio();
        }

        self.shared.set_stopped();
        info!("Recording session stopped");
    }
}

/// Waits for a released session to finish
pub struct ReleaseHandle {
    shared: Arc<SessionShared>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ReleaseHandle {
    /// Wait up to `timeout` for the output to be finalized or discarded
    pub fn wait(mut self, timeout: Duration) -> Option<FinalizeOutcome> {
        let outcome = self.shared.wait_finalized(timeout)?;
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Render thread panicked during teardown");
            }
        }
        Some(outcome)
    }

    pub fn state(&self) -> SessionState {
        self.shared.session.get()
    }
}

/// Render stage and owner of one recording session
pub struct VideoFileRenderer {
    shared: Arc<SessionShared>,
    executor: RenderExecutor<RenderContext>,
    video_encoders: Arc<dyn VideoEncoderFactory>,
    config: RecorderConfig,
    size: Option<(u32, u32)>,
}

impl VideoFileRenderer {
    pub fn new(
        output_path: &Path,
        config: &RecorderConfig,
        backends: &MediaBackends,
        rollover: Option<Arc<dyn RolloverListener>>,
    ) -> Result<Self, RecordingError> {
        let audio_enabled = config.audio.enabled;
        let shared = Arc::new(SessionShared::new(
            output_path,
            Arc::clone(&backends.muxer),
            audio_enabled,
        ));

        let audio = audio_enabled.then(|| AudioBringUp {
            encoders: Arc::clone(&backends.audio_encoder),
            microphones: Arc::clone(&backends.microphone),
            encoder_settings: AudioEncoderSettings {
                sample_rate: config.audio.sample_rate,
                channels: config.audio.channels,
                bitrate_bps: config.audio.bitrate_bps,
                max_input_size: config.audio.max_input_size,
            },
            microphone_settings: MicrophoneSettings {
                sample_rate: config.audio.sample_rate,
                channels: config.audio.channels,
                device: config.audio.device.clone(),
            },
        });

        let context = RenderContext {
            shared: Arc::clone(&shared),
            pipeline: None,
            audio,
            rollover: SegmentRollover::new(
                Instant::now(),
                config.timing.rollover_ceiling(),
                constants::timing::PROGRESS_LOG_INTERVAL,
                rollover,
            ),
            poll_timeout: config.timing.drain_poll_timeout(),
            finalize_timeout: config.timing.finalize_timeout(),
            size: (0, 0),
            frames: 0,
        };

        let executor = RenderExecutor::spawn("video-renderer", context)?;
        shared
            .session
            .transition(SessionState::NotStarted, SessionState::Running);

        info!(path = %output_path.display(), audio = audio_enabled, "Recording session started");

        Ok(Self {
            shared,
            executor,
            video_encoders: Arc::clone(&backends.video_encoder),
            config: config.clone(),
            size: None,
        })
    }

    pub fn output_path(&self) -> &Path {
        self.shared.output_path()
    }

    pub fn state(&self) -> SessionState {
        self.shared.session.get()
    }

    pub fn is_running(&self) -> bool {
        self.shared.session.is_recording()
    }

    /// Queue a retained frame for drawing
    ///
    /// The first frame fixes the encoded size; later frames of another size
    /// are rejected with [`RecordingError::ResolutionChanged`].
    pub fn submit_frame(&mut self, frame: VideoFrame) -> Result<(), RecordingError> {
        if !self.is_running() {
            return Err(RecordingError::NotRecording);
        }

        let size = frame.rotated_size();
        match self.size {
            None => {
                let settings = VideoEncoderSettings {
                    width: size.0,
                    height: size.1,
                    bitrate_bps: self.config.video.bitrate_bps,
                    frame_rate: self.config.video.frame_rate,
                    iframe_interval_secs: self.config.video.iframe_interval_secs,
                };
                let encoder = match self.video_encoders.create(&settings) {
                    Ok(encoder) => encoder,
                    Err(e) => {
                        error!(error = %e, "Video encoder configuration failed");
                        let _ = self.release();
                        return Err(e);
                    }
                };
                info!(width = size.0, height = size.1, "Video encoder configured");
                self.size = Some(size);
                self.executor.submit(move |ctx| ctx.install(encoder, size))?;
            }
            Some(expected) if expected != size => {
                return Err(RecordingError::ResolutionChanged {
                    expected,
                    actual: size,
                });
            }
            Some(_) => {}
        }

        self.executor.submit(move |ctx| ctx.render(frame))
    }

    /// Stop recording; queued frames are still encoded before teardown
    ///
    /// Returns immediately. Use the handle to wait for the output file.
    pub fn release(&mut self) -> ReleaseHandle {
        if self
            .shared
            .session
            .transition(SessionState::Running, SessionState::Stopping)
        {
            info!("Stopping recording session");
            if self.executor.submit(|ctx| ctx.teardown()).is_err() {
                warn!("Render executor already gone");
            }
        }

        ReleaseHandle {
            shared: Arc::clone(&self.shared),
            thread_handle: self.executor.quit(),
        }
    }
}

impl Drop for VideoFileRenderer {
    fn drop(&mut self) {
        if self.is_running() {
            // Teardown continues on the render thread
            let _ = self.release();
        }
    }
}
