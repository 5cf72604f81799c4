// SPDX-License-Identifier: GPL-3.0-only

//! Video encoder and its drain loop
//!
//! Owned by the render thread. After every draw the encoder's output queue is
//! polled with a bounded wait until it runs dry; each completed unit is
//! handed to the session, which buffers or muxes it.

use super::state::SessionShared;
use crate::backends::camera::types::VideoFrame;
use crate::constants;
use crate::errors::RecordingError;
use crate::media::encoders::{DequeueResult, InputSurface, VideoEncoder};
use crate::media::sample::TrackFormat;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// How one drain cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The encoder was started by this call
    Started,
    /// No more output was ready
    Idle,
    /// The encoder emitted its end-of-stream unit
    EndOfStream,
    /// Writing failed; remaining output waits for the next cycle
    Aborted,
}

/// Video encoder plus the surface frames are drawn into
pub struct VideoPipeline {
    encoder: Box<dyn VideoEncoder>,
    surface: Box<dyn InputSurface>,
    started: bool,
    ended: bool,
    poll_timeout: Duration,
    samples: u64,
}

impl VideoPipeline {
    /// Take ownership of a configured encoder and create its input surface
    pub fn new(mut encoder: Box<dyn VideoEncoder>, poll_timeout: Duration) -> Result<Self, RecordingError> {
        let surface = encoder.create_input_surface()?;
        debug!("Encoder input surface created");
        Ok(Self {
            encoder,
            surface,
            started: false,
            ended: false,
            poll_timeout,
            samples: 0,
        })
    }

    pub fn draw(&mut self, frame: &VideoFrame, width: u32, height: u32) -> Result<(), RecordingError> {
        self.surface.draw_frame(frame, width, height)
    }

    /// Submit the drawn picture to the encoder
    pub fn swap_buffers(&mut self) -> Result<(), RecordingError> {
        self.surface.swap_buffers()
    }

    /// Encoded samples handed to the session so far
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Poll the encoder until no output is ready
    ///
    /// The first call only starts the encoder. `on_format` runs when the
    /// output format becomes known while the video track is unregistered.
    pub fn drain(&mut self, shared: &SessionShared, on_format: &mut dyn FnMut(&TrackFormat)) -> DrainOutcome {
        if !self.started {
            if let Err(e) = self.encoder.start() {
                error!(error = %e, "Failed to start video encoder");
                return DrainOutcome::Aborted;
            }
            self.started = true;
            return DrainOutcome::Started;
        }
        if self.ended {
            return DrainOutcome::EndOfStream;
        }

        let mut invalid_polls = 0;
        loop {
            match self.encoder.dequeue_output(self.poll_timeout) {
                DequeueResult::TryAgainLater => return DrainOutcome::Idle,
                DequeueResult::OutputBuffersChanged => {
                    debug!("Video encoder output buffers changed");
                }
                DequeueResult::OutputFormatChanged => {
                    if shared.has_video_track() {
                        warn!("Video format changed after track registration, ignoring");
                        continue;
                    }
                    match self.encoder.output_format() {
                        Some(format) => on_format(&format),
                        None => warn!("Video encoder reported a format change without a format"),
                    }
                }
                DequeueResult::Invalid(code) => {
                    warn!(code, "Unexpected video encoder status");
                    invalid_polls += 1;
                    if invalid_polls >= constants::timing::MAX_INVALID_POLLS {
                        return DrainOutcome::Idle;
                    }
                }
                DequeueResult::Sample(sample) => {
                    let flags = sample.info.flags;
                    let has_media = sample.info.size > 0 && !flags.is_codec_config();

                    if has_media {
                        trace!(pts = sample.info.presentation_time_us, size = sample.info.size, "Video sample");
                        if let Err(e) = shared.write_video(&sample) {
                            warn!(error = %e, "Failed to write video sample, aborting drain cycle");
                            return DrainOutcome::Aborted;
                        }
                        self.samples += 1;
                    }
                    drop(sample);

                    if flags.is_end_of_stream() {
                        debug!(samples = self.samples, "Video encoder end of stream");
                        self.ended = true;
                        return DrainOutcome::EndOfStream;
                    }
                }
            }
        }
    }

    /// Signal end of input and drain until end of stream or `deadline`
    pub fn finish(
        &mut self,
        shared: &SessionShared,
        deadline: Instant,
        on_format: &mut dyn FnMut(&TrackFormat),
    ) -> bool {
        if !self.started {
            debug!("Video encoder never started, nothing to drain");
            return true;
        }

        if let Err(e) = self.encoder.signal_end_of_input() {
            warn!(error = %e, "Failed to signal end of video input");
            return false;
        }

        while Instant::now() < deadline {
            if self.drain(shared, on_format) == DrainOutcome::EndOfStream {
                return true;
            }
        }
        warn!("Video encoder did not reach end of stream in time");
        false
    }

    /// Stop the encoder, then release it and the surface
    pub fn release(mut self) {
        self.encoder.stop();
        self.encoder.release();
        self.surface.release();
        info!(samples = self.samples, "Video encoder released");
    }
}
