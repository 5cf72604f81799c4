// SPDX-License-Identifier: GPL-3.0-only

//! Microphone capture
//!
//! A [`MicrophoneSource`] yields interleaved S16LE PCM. Two sources exist:
//!
//! - [`GstMicrophone`]: captures from PipeWire (or the platform default source)
//! - [`InterceptedMicrophone`]: fed by an [`AudioSamplesInterceptor`], for
//!   producers that already own the capture device
//!
//! Input devices can be listed with [`enumerate_audio_devices`].

mod devices;
mod interceptor;
mod microphone;

pub use devices::{AudioDevice, enumerate_audio_devices};
pub use interceptor::{
    AudioSamples, AudioSamplesInterceptor, InterceptedMicrophone, InterceptedMicrophoneFactory,
    SamplesReadyCallback,
};
pub use microphone::{GstMicrophone, GstMicrophoneFactory};

use crate::errors::RecordingError;

/// PCM capture parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrophoneSettings {
    pub sample_rate: u32,
    pub channels: u32,
    /// PipeWire node name or serial; `None` uses the default source
    pub device: Option<String>,
}

/// A source of interleaved S16LE PCM
pub trait MicrophoneSource: Send {
    fn start(&mut self) -> Result<(), RecordingError>;

    /// Fill `buf` with up to `buf.len()` bytes of PCM
    ///
    /// Waits a bounded time for data and returns the number of bytes written;
    /// 0 means nothing was captured in that window.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    fn stop(&mut self);

    fn release(&mut self);
}

/// Creates microphone sources
pub trait MicrophoneFactory: Send + Sync {
    fn create(&self, settings: &MicrophoneSettings)
    -> Result<Box<dyn MicrophoneSource>, RecordingError>;
}
