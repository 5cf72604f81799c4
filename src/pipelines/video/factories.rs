// SPDX-License-Identifier: GPL-3.0-only

//! Hardware bindings used by a recording session

use super::muxer::{GstMuxerFactory, MuxerFactory};
use crate::backends::audio::{GstMicrophoneFactory, MicrophoneFactory};
use crate::config::RecorderConfig;
use crate::media::encoders::{
    AudioEncoderFactory, GstAudioEncoderFactory, GstVideoEncoderFactory, VideoEncoderFactory,
};
use std::sync::Arc;

/// Factories for every device a session opens
#[derive(Clone)]
pub struct MediaBackends {
    pub video_encoder: Arc<dyn VideoEncoderFactory>,
    pub audio_encoder: Arc<dyn AudioEncoderFactory>,
    pub microphone: Arc<dyn MicrophoneFactory>,
    pub muxer: Arc<dyn MuxerFactory>,
}

impl MediaBackends {
    /// GStreamer encoders, PipeWire microphone and mp4mux
    pub fn gstreamer(config: &RecorderConfig) -> Self {
        Self {
            video_encoder: Arc::new(GstVideoEncoderFactory::new(config.video.encoder.clone())),
            audio_encoder: Arc::new(GstAudioEncoderFactory),
            microphone: Arc::new(GstMicrophoneFactory),
            muxer: Arc::new(GstMuxerFactory),
        }
    }

    /// Replace the microphone source, keeping everything else
    pub fn with_microphone(mut self, microphone: Arc<dyn MicrophoneFactory>) -> Self {
        self.microphone = microphone;
        self
    }
}
