// SPDX-License-Identifier: GPL-3.0-only

//! Media encoding primitives used by the recording pipeline
//!
//! # Encoding
//!
//! The [`encoders`] module handles video and audio encoding for recording:
//! - **Video**: H.264 with hardware acceleration priority (VA-API, NVENC, QSV)
//! - **Audio**: AAC at 44.1 kHz mono
//!
//! # Samples
//!
//! The [`sample`] module defines the encoded units and track formats that flow
//! from the encoders to the container muxer.

pub mod encoders;
pub mod sample;

// Re-export commonly used types
pub use encoders::{
    AudioEncoder, AudioEncoderFactory, AudioEncoderListener, DequeueResult, InputSurface,
    VideoEncoder, VideoEncoderFactory,
};
pub use sample::{BufferedSample, EncodedSample, SampleFlags, SampleInfo, TrackFormat, TrackKind};
