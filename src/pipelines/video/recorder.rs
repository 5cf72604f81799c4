// SPDX-License-Identifier: GPL-3.0-only

//! Recording session control
//!
//! [`MediaRecorder`] is the front door used by a video source: `start` opens a
//! session at an output path, `on_frame` feeds it, and `stop` releases it.
//! All methods take `&self`, so one recorder can be shared between the
//! thread producing frames and the thread controlling the session.

use super::factories::MediaBackends;
use super::renderer::{ReleaseHandle, VideoFileRenderer};
use super::rollover::RolloverListener;
use crate::backends::camera::types::VideoFrame;
use crate::config::RecorderConfig;
use crate::errors::RecordingError;
use crate::storage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Starts and stops recording sessions
pub struct MediaRecorder {
    has_video_source: bool,
    config: RecorderConfig,
    backends: MediaBackends,
    rollover: Option<Arc<dyn RolloverListener>>,
    renderer: Mutex<Option<VideoFileRenderer>>,
    record_file: Mutex<Option<PathBuf>>,
}

impl MediaRecorder {
    pub fn new(
        has_video_source: bool,
        config: RecorderConfig,
        backends: MediaBackends,
        rollover: Option<Arc<dyn RolloverListener>>,
    ) -> Self {
        Self {
            has_video_source,
            config,
            backends,
            rollover,
            renderer: Mutex::new(None),
            record_file: Mutex::new(None),
        }
    }

    fn renderer(&self) -> Result<MutexGuard<'_, Option<VideoFileRenderer>>, RecordingError> {
        self.renderer
            .lock()
            .map_err(|_| RecordingError::Pipeline("Recorder state poisoned".to_string()))
    }

    /// Begin recording to `output_path`
    ///
    /// `output_path` always becomes [`record_file`](Self::record_file), even
    /// when a session is already running and the call is otherwise a no-op.
    /// The path must be absolute; its parent directories are created.
    pub fn start(&self, output_path: &Path) -> Result<(), RecordingError> {
        if let Ok(mut file) = self.record_file.lock() {
            *file = Some(output_path.to_path_buf());
        }

        let mut renderer = self.renderer()?;
        if let Some(current) = renderer.as_ref() {
            if current.is_running() {
                info!(path = %current.output_path().display(), "Already recording");
                return Ok(());
            }
        }

        storage::prepare_output_path(output_path)?;

        if !self.has_video_source {
            warn!("No video source attached, nothing will be recorded");
            return Ok(());
        }

        self.backends.video_encoder.probe()?;

        *renderer = Some(VideoFileRenderer::new(
            output_path,
            &self.config,
            &self.backends,
            self.rollover.clone(),
        )?);
        Ok(())
    }

    /// Hand a frame to the running session
    pub fn on_frame(&self, frame: VideoFrame) -> Result<(), RecordingError> {
        match self.renderer()?.as_mut() {
            Some(renderer) => renderer.submit_frame(frame),
            None => Err(RecordingError::NotRecording),
        }
    }

    /// Stop the running session
    ///
    /// Returns `None` when nothing was recording.
    pub fn stop(&self) -> Option<ReleaseHandle> {
        let mut renderer = self.renderer().ok()?.take()?;
        info!(path = %renderer.output_path().display(), "Stopping recording");
        Some(renderer.release())
    }

    pub fn is_recording(&self) -> bool {
        self.renderer()
            .map(|r| r.as_ref().is_some_and(VideoFileRenderer::is_running))
            .unwrap_or(false)
    }

    /// Path passed to the most recent [`start`](Self::start)
    pub fn record_file(&self) -> Option<PathBuf> {
        self.record_file.lock().ok().and_then(|file| file.clone())
    }
}
