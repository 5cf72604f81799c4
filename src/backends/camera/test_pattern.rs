// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic live video source
//!
//! `videotestsrc is-live=true → videoconvert → RGBA caps → appsink`. Frames are
//! handed out zero-copy as mapped GStreamer buffers.

use super::types::{FrameData, VideoFrame};
use crate::errors::RecordingError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Moving SMPTE bars at a fixed size and rate
pub struct TestPatternSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    width: u32,
    height: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Result<Self, RecordingError> {
        gst::init()?;

        info!(width, height, fps, "Creating test pattern source");

        let pipeline_str = format!(
            "videotestsrc is-live=true pattern=smpte horizontal-speed=4 ! \
             videoconvert ! video/x-raw,format=RGBA,width={},height={},framerate={}/1 ! \
             appsink name=frames max-buffers=2 drop=true sync=false",
            width, height, fps
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| RecordingError::Pipeline(format!("Failed to create test pattern: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| RecordingError::Pipeline("Failed to downcast to Pipeline".into()))?;

        let appsink = pipeline
            .by_name("frames")
            .ok_or_else(|| RecordingError::Pipeline("Failed to find appsink".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| RecordingError::Pipeline("Failed to downcast to AppSink".into()))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| RecordingError::Pipeline(format!("Failed to start test pattern: {}", e)))?;

        Ok(Self {
            pipeline,
            appsink,
            width,
            height,
        })
    }

    /// Wait up to `timeout` for the next frame
    pub fn next_frame(&self, timeout: Duration) -> Option<VideoFrame> {
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(timeout.as_millis() as u64))?;
        let stride = sample
            .caps()
            .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok())
            .map(|info| info.stride()[0] as u32);
        let buffer = sample.buffer_owned()?;
        let timestamp_ns = buffer.pts().map(|t| t.nseconds()).unwrap_or(0);

        match buffer.into_mapped_buffer_readable() {
            Ok(mapped) => {
                let mut frame = VideoFrame::new(
                    FrameData::from_mapped_buffer(mapped),
                    self.width,
                    self.height,
                    timestamp_ns,
                );
                if let Some(stride) = stride {
                    frame.stride = stride;
                }
                Some(frame)
            }
            Err(_) => {
                warn!("Failed to map test pattern buffer");
                None
            }
        }
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        debug!("Stopping test pattern source");
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
