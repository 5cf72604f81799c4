// SPDX-License-Identifier: GPL-3.0-only

//! Audio/video muxing
//!
//! [`ContainerMuxer`] enforces the container lifecycle on top of a
//! [`MuxerBackend`]:
//!
//! ```text
//! Configuring ──start()──▶ Started ──stop()──▶ Stopped
//!      │                      │
//!      └──── any misuse ──────┴──▶ Failed
//! ```
//!
//! Tracks are registered while configuring, samples are written only while
//! started. A rejected operation poisons the muxer; nothing is written after.
//! A muxer that failed after starting can still be stopped, which finalizes
//! the file up to the last sample written.
//!
//! [`GstMp4Muxer`] is the shipped backend:
//! `appsrc (per track) → mp4mux → filesink`.

use crate::constants;
use crate::errors::MuxerError;
use crate::media::sample::{SampleInfo, TrackFormat, TrackKind};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Container-assigned index of a registered track
pub type TrackIndex = usize;

/// Container writer primitives
pub trait MuxerBackend: Send {
    fn add_track(&mut self, format: &TrackFormat) -> Result<TrackIndex, MuxerError>;
    fn start(&mut self) -> Result<(), MuxerError>;
    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &SampleInfo,
    ) -> Result<(), MuxerError>;
    /// Finalize the file (trailer, indexes)
    fn stop(&mut self) -> Result<(), MuxerError>;
}

/// Opens container writers at an output path
pub trait MuxerFactory: Send + Sync {
    fn create(&self, path: &Path) -> Result<Box<dyn MuxerBackend>, MuxerError>;
}

/// Lifecycle state of a [`ContainerMuxer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    Configuring,
    Started,
    Stopped,
    Failed,
}

impl MuxerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MuxerState::Configuring => "configuring",
            MuxerState::Started => "started",
            MuxerState::Stopped => "stopped",
            MuxerState::Failed => "failed",
        }
    }
}

/// Serialization point for both tracks
pub struct ContainerMuxer {
    backend: Box<dyn MuxerBackend>,
    path: PathBuf,
    state: MuxerState,
    tracks: Vec<TrackKind>,
    expects_audio: bool,
    /// Set once `start()` succeeded, survives a later failure
    started: bool,
    samples_written: u64,
}

impl ContainerMuxer {
    pub fn new(backend: Box<dyn MuxerBackend>, path: &Path, expects_audio: bool) -> Self {
        Self {
            backend,
            path: path.to_path_buf(),
            state: MuxerState::Configuring,
            tracks: Vec::new(),
            expects_audio,
            started: false,
            samples_written: 0,
        }
    }

    pub fn state(&self) -> MuxerState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == MuxerState::Started
    }

    /// Whether the backend ever accepted `start()`
    pub fn was_started(&self) -> bool {
        self.started
    }

    /// Whether `stop()` can still finalize the file
    pub fn can_finalize(&self) -> bool {
        self.started && matches!(self.state, MuxerState::Started | MuxerState::Failed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Start without waiting for an audio track
    pub fn set_expects_audio(&mut self, expects_audio: bool) {
        self.expects_audio = expects_audio;
    }

    fn has_track(&self, label: &str) -> bool {
        self.tracks.iter().any(|kind| kind.label() == label)
    }

    fn reject(&mut self, operation: &'static str) -> MuxerError {
        let err = MuxerError::InvalidState {
            operation,
            state: self.state.as_str(),
        };
        error!(error = %err, "Muxer misuse, no further samples will be written");
        self.state = MuxerState::Failed;
        err
    }

    fn fail(&mut self, err: MuxerError) -> MuxerError {
        error!(error = %err, "Muxer backend failed");
        self.state = MuxerState::Failed;
        err
    }

    pub fn add_track(&mut self, format: &TrackFormat) -> Result<TrackIndex, MuxerError> {
        if self.state != MuxerState::Configuring {
            return Err(self.reject("add_track"));
        }
        let index = self.backend.add_track(format).map_err(|e| self.fail(e))?;
        self.tracks.push(format.kind);
        info!(track = index, kind = format.kind.label(), mime = %format.mime, "Track registered");
        Ok(index)
    }

    /// Start muxing; every expected track must be registered
    pub fn start(&mut self) -> Result<(), MuxerError> {
        if self.state != MuxerState::Configuring {
            return Err(self.reject("start"));
        }
        if !self.has_track("video") {
            self.state = MuxerState::Failed;
            return Err(MuxerError::MissingTrack("video"));
        }
        if self.expects_audio && !self.has_track("audio") {
            self.state = MuxerState::Failed;
            return Err(MuxerError::MissingTrack("audio"));
        }
        self.backend.start().map_err(|e| self.fail(e))?;
        self.state = MuxerState::Started;
        self.started = true;
        info!(path = %self.path.display(), tracks = self.tracks.len(), "Muxer started");
        Ok(())
    }

    pub fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &SampleInfo,
    ) -> Result<(), MuxerError> {
        if self.state != MuxerState::Started {
            return Err(self.reject("write_sample"));
        }
        if track >= self.tracks.len() {
            return Err(self.fail(MuxerError::UnknownTrack(track)));
        }
        self.backend
            .write_sample(track, data, info)
            .map_err(|e| self.fail(e))?;
        self.samples_written += 1;
        Ok(())
    }

    /// Finalize the container
    ///
    /// Allowed from `Started` and from a `Failed` muxer that had started.
    pub fn stop(&mut self) -> Result<(), MuxerError> {
        if !self.can_finalize() {
            return Err(self.reject("stop"));
        }
        if self.state == MuxerState::Failed {
            warn!(samples = self.samples_written, "Finalizing muxer after a failure");
        }
        self.state = MuxerState::Stopped;
        self.backend.stop()?;
        info!(
            path = %self.path.display(),
            samples = self.samples_written,
            "Muxer stopped"
        );
        Ok(())
    }

    /// Give up on the container without finalizing it
    pub fn abandon(&mut self) {
        if self.can_finalize() {
            if let Err(e) = self.backend.stop() {
                debug!(error = %e, "Abandoned muxer did not stop cleanly");
            }
        }
        self.state = MuxerState::Stopped;
    }
}

/// Creates [`GstMp4Muxer`] writers
#[derive(Debug, Clone, Default)]
pub struct GstMuxerFactory;

impl MuxerFactory for GstMuxerFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn MuxerBackend>, MuxerError> {
        Ok(Box::new(GstMp4Muxer::new(path)?))
    }
}

/// Caps for an appsrc feeding the muxer
fn track_caps(format: &TrackFormat) -> Result<gst::Caps, MuxerError> {
    if let Some(caps) = &format.caps {
        return gst::Caps::from_str(caps)
            .map_err(|e| MuxerError::Backend(format!("Invalid track caps {}: {}", caps, e)));
    }

    let caps = match format.kind {
        TrackKind::Video { width, height } => gst::Caps::builder("video/x-h264")
            .field("stream-format", "avc")
            .field("alignment", "au")
            .field("width", width as i32)
            .field("height", height as i32)
            .build(),
        TrackKind::Audio {
            sample_rate,
            channels,
        } => gst::Caps::builder("audio/mpeg")
            .field("mpegversion", 4i32)
            .field("stream-format", "raw")
            .field("rate", sample_rate as i32)
            .field("channels", channels as i32)
            .build(),
    };
    Ok(caps)
}

/// MP4 writer: one appsrc per track into mp4mux into a filesink
pub struct GstMp4Muxer {
    pipeline: gst::Pipeline,
    muxer: gst::Element,
    sources: Vec<(gst_app::AppSrc, bool)>,
    path: PathBuf,
}

impl GstMp4Muxer {
    pub fn new(path: &Path) -> Result<Self, MuxerError> {
        gst::init().map_err(|e| MuxerError::Backend(format!("GStreamer init failed: {}", e)))?;

        info!(path = %path.display(), "Creating muxer");

        let pipeline = gst::Pipeline::with_name("container-muxer");

        let muxer = gst::ElementFactory::make(constants::container::MUXER_ELEMENT)
            .build()
            .map_err(|e| MuxerError::Backend(format!("Failed to create muxer: {}", e)))?;
        // Seekable output with the index at the front
        muxer.set_property("faststart", true);

        let location = path
            .to_str()
            .ok_or_else(|| MuxerError::Backend(format!("Non UTF-8 path {}", path.display())))?;
        let filesink = gst::ElementFactory::make("filesink")
            .property("location", location)
            .property("async", false)
            .build()
            .map_err(|e| MuxerError::Backend(format!("Failed to create filesink: {}", e)))?;

        pipeline
            .add_many([&muxer, &filesink])
            .map_err(|e| MuxerError::Backend(format!("Failed to add elements: {}", e)))?;
        muxer
            .link(&filesink)
            .map_err(|_| MuxerError::Backend("Failed to link muxer to filesink".to_string()))?;

        Ok(Self {
            pipeline,
            muxer,
            sources: Vec::new(),
            path: path.to_path_buf(),
        })
    }

    fn wait_for_eos(&self) -> Result<(), MuxerError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        let timeout = gst::ClockTime::from_mseconds(
            constants::timing::MUXER_EOS_TIMEOUT.as_millis() as u64,
        );
        for msg in bus.iter_timed(timeout) {
            match msg.view() {
                gst::MessageView::Eos(..) => return Ok(()),
                gst::MessageView::Error(err) => {
                    return Err(MuxerError::Backend(format!(
                        "Muxer error: {} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                _ => {}
            }
        }
        warn!(path = %self.path.display(), "Timed out waiting for muxer end of stream");
        Ok(())
    }
}

impl MuxerBackend for GstMp4Muxer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<TrackIndex, MuxerError> {
        let index = self.sources.len();
        let appsrc = gst_app::AppSrc::builder()
            .name(format!("{}-{}", format.kind.label(), index))
            .caps(&track_caps(format)?)
            .format(gst::Format::Time)
            .build();

        self.pipeline
            .add(&appsrc)
            .map_err(|e| MuxerError::Backend(format!("Failed to add track source: {}", e)))?;
        appsrc.link(&self.muxer).map_err(|_| {
            MuxerError::Backend(format!("Muxer rejected {} track", format.kind.label()))
        })?;

        debug!(track = index, caps = ?format.caps, "Muxer track linked");
        self.sources.push((appsrc, format.is_video()));
        Ok(index)
    }

    fn start(&mut self) -> Result<(), MuxerError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| MuxerError::Backend(format!("Failed to start muxer: {}", e)))?;
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &SampleInfo,
    ) -> Result<(), MuxerError> {
        let (appsrc, is_video) = self
            .sources
            .get(track)
            .ok_or(MuxerError::UnknownTrack(track))?;

        let mut buffer = gst::Buffer::from_slice(data.to_vec());
        if let Some(buffer_ref) = buffer.get_mut() {
            let pts = gst::ClockTime::from_useconds(info.presentation_time_us.max(0) as u64);
            buffer_ref.set_pts(pts);
            if *is_video {
                buffer_ref.set_dts(pts);
                if !info.flags.is_key_frame() {
                    buffer_ref.set_flags(gst::BufferFlags::DELTA_UNIT);
                }
            }
        }

        appsrc
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| MuxerError::Backend(format!("Failed to push sample: {:?}", e)))
    }

    fn stop(&mut self) -> Result<(), MuxerError> {
        for (appsrc, _) in &self.sources {
            if let Err(e) = appsrc.end_of_stream() {
                warn!(?e, "Failed to send end of stream to muxer track");
            }
        }
        let result = self.wait_for_eos();
        let _ = self.pipeline.set_state(gst::State::Null);
        result
    }
}

impl Drop for GstMp4Muxer {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
