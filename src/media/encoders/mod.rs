// SPDX-License-Identifier: GPL-3.0-only

//! Video and audio encoder abstraction
//!
//! The two encoders have different delivery models:
//! - **Video** is drained by synchronous polling ([`VideoEncoder::dequeue_output`])
//!   from the render thread, after every drawn frame.
//! - **Audio** is callback driven: once started, the encoder asks its
//!   [`AudioEncoderListener`] for PCM input and hands it encoded output from
//!   its own notification thread.
//!
//! The GStreamer implementations live in [`video`] and [`audio`]; encoder
//! availability probing is in [`detection`].

pub mod audio;
pub mod detection;
pub mod video;

use crate::backends::camera::types::VideoFrame;
use crate::errors::RecordingError;
use crate::media::sample::{EncodedSample, TrackFormat};
use std::sync::Arc;
use std::time::Duration;

pub use audio::GstAudioEncoderFactory;
pub use detection::{EncoderReport, detect_encoders, log_available_encoders};
pub use video::GstVideoEncoderFactory;

/// Result of one bounded poll of the video encoder's output queue
#[derive(Debug)]
pub enum DequeueResult {
    /// Nothing completed within the timeout
    TryAgainLater,
    /// The encoder replaced its output buffer set
    OutputBuffersChanged,
    /// The output format is now known (see [`VideoEncoder::output_format`])
    OutputFormatChanged,
    /// A completed output unit; dropping it releases the buffer
    Sample(EncodedSample),
    /// Unexpected status code reported by the encoder
    Invalid(i32),
}

/// Drawing target feeding the video encoder
///
/// Owned by the render thread. `draw_frame` renders into the back buffer,
/// `swap_buffers` submits it to the encoder.
pub trait InputSurface: Send {
    fn draw_frame(&mut self, frame: &VideoFrame, width: u32, height: u32)
    -> Result<(), RecordingError>;
    fn swap_buffers(&mut self) -> Result<(), RecordingError>;
    fn release(&mut self);
}

/// Poll-driven video encoder
pub trait VideoEncoder: Send {
    /// Create the surface frames are drawn into. Called once, before `start`.
    fn create_input_surface(&mut self) -> Result<Box<dyn InputSurface>, RecordingError>;
    fn start(&mut self) -> Result<(), RecordingError>;
    /// Wait at most `timeout` for the next output event
    fn dequeue_output(&mut self, timeout: Duration) -> DequeueResult;
    /// Output format, available after [`DequeueResult::OutputFormatChanged`]
    fn output_format(&self) -> Option<TrackFormat>;
    /// No more input will arrive; the encoder emits an end-of-stream sample
    fn signal_end_of_input(&mut self) -> Result<(), RecordingError>;
    fn stop(&mut self);
    fn release(&mut self);
}

/// Parameters the video encoder is configured with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderSettings {
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
    pub frame_rate: u32,
    pub iframe_interval_secs: u32,
}

/// Creates configured video encoders
pub trait VideoEncoderFactory: Send + Sync {
    /// Check that an encoder can be created at all, without configuring one
    fn probe(&self) -> Result<(), RecordingError>;
    fn create(&self, settings: &VideoEncoderSettings)
    -> Result<Box<dyn VideoEncoder>, RecordingError>;
}

/// A chunk of interleaved S16LE PCM submitted to the audio encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    pub data: Vec<u8>,
    /// Capture timestamp in microseconds
    pub presentation_time_us: i64,
}

/// Receiver of audio encoder notifications
///
/// Methods may be called on any thread, concurrently with the render thread.
pub trait AudioEncoderListener: Send + Sync {
    /// The encoder can accept up to `capacity` bytes; `None` submits nothing
    fn on_input_available(&self, capacity: usize) -> Option<PcmChunk>;
    fn on_output_format_changed(&self, format: TrackFormat);
    /// An encoded unit is ready; dropping the sample releases its buffer
    fn on_output_available(&self, sample: EncodedSample);
    fn on_error(&self, message: &str);
}

/// Callback-driven audio encoder
///
/// Every method takes `&self` so the encoder can be stopped from inside one
/// of its own notifications.
pub trait AudioEncoder: Send + Sync {
    fn start(&self, listener: Arc<dyn AudioEncoderListener>) -> Result<(), RecordingError>;
    /// No more input will be submitted; a final end-of-stream output follows
    fn signal_end_of_stream(&self);
    fn stop(&self);
    /// Drop the listener and free encoder resources. Idempotent.
    fn release(&self);
}

/// Parameters the audio encoder is configured with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderSettings {
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate_bps: u32,
    pub max_input_size: usize,
}

/// Creates configured audio encoders
pub trait AudioEncoderFactory: Send + Sync {
    fn create(&self, settings: &AudioEncoderSettings)
    -> Result<Arc<dyn AudioEncoder>, RecordingError>;
}
