// SPDX-License-Identifier: GPL-3.0-only

//! Camera Recorder - capture-to-file recording of live video and audio
//!
//! Frames from a live video source and PCM from a microphone are encoded to
//! H.264 and AAC and multiplexed into a single MP4 file.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Video frame sources and microphone capture
//! - [`media`]: Encoder abstractions and their GStreamer implementations
//! - [`pipelines`]: Recording sessions, draining and muxing
//! - [`config`]: User configuration handling
//! - [`storage`]: Output file locations
//!
//! # Example
//!
//! ```ignore
//! let config = RecorderConfig::load(None)?;
//! let recorder = MediaRecorder::new(true, config.clone(), MediaBackends::gstreamer(&config), None);
//! recorder.start(Path::new("/home/user/Videos/clip.mp4"))?;
//! recorder.on_frame(frame)?;
//! if let Some(handle) = recorder.stop() {
//!     handle.wait(Duration::from_secs(5));
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::types::VideoFrame;
pub use config::RecorderConfig;
pub use errors::{AppError, AppResult, MuxerError, RecordingError};
pub use pipelines::video::{FinalizeOutcome, MediaBackends, MediaRecorder, SessionState};
