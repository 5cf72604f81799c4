// SPDX-License-Identifier: GPL-3.0-only

//! Encoded samples and track formats exchanged between encoders and the muxer

use gstreamer::buffer::{MappedBuffer, Readable};
use std::fmt;

/// Per-sample flags reported by an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SampleFlags(u32);

impl SampleFlags {
    pub const NONE: SampleFlags = SampleFlags(0);
    /// Sample is a sync point (IDR / key frame)
    pub const KEY_FRAME: SampleFlags = SampleFlags(1);
    /// Codec configuration data only; carries no media
    pub const CODEC_CONFIG: SampleFlags = SampleFlags(1 << 1);
    /// Last sample the encoder will produce
    pub const END_OF_STREAM: SampleFlags = SampleFlags(1 << 2);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: SampleFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_key_frame(self) -> bool {
        self.contains(Self::KEY_FRAME)
    }

    pub fn is_codec_config(self) -> bool {
        self.contains(Self::CODEC_CONFIG)
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

impl std::ops::BitOr for SampleFlags {
    type Output = SampleFlags;

    fn bitor(self, rhs: SampleFlags) -> SampleFlags {
        SampleFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SampleFlags {
    fn bitor_assign(&mut self, rhs: SampleFlags) {
        self.0 |= rhs.0;
    }
}

/// Metadata of one encoded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleInfo {
    /// Payload length in bytes
    pub size: usize,
    /// Presentation timestamp in microseconds
    pub presentation_time_us: i64,
    pub flags: SampleFlags,
}

impl SampleInfo {
    pub fn new(size: usize, presentation_time_us: i64, flags: SampleFlags) -> Self {
        Self {
            size,
            presentation_time_us,
            flags,
        }
    }
}

/// Storage behind an encoded sample
///
/// Dropping a `Mapped` payload unmaps and returns the buffer to the encoder.
pub enum SampleData {
    Owned(Vec<u8>),
    Mapped(MappedBuffer<Readable>),
}

impl AsRef<[u8]> for SampleData {
    fn as_ref(&self) -> &[u8] {
        match self {
            SampleData::Owned(data) => data,
            SampleData::Mapped(buf) => buf.as_slice(),
        }
    }
}

/// One encoded access unit as handed out by an encoder
///
/// The sample owns the encoder's output buffer; dropping it releases the
/// buffer back to the encoder.
pub struct EncodedSample {
    data: SampleData,
    pub info: SampleInfo,
}

impl EncodedSample {
    pub fn new(data: SampleData, presentation_time_us: i64, flags: SampleFlags) -> Self {
        let size = data.as_ref().len();
        Self {
            data,
            info: SampleInfo::new(size, presentation_time_us, flags),
        }
    }

    /// Sample carrying no payload, only flags (e.g. end of stream)
    pub fn empty(presentation_time_us: i64, flags: SampleFlags) -> Self {
        Self::new(SampleData::Owned(Vec::new()), presentation_time_us, flags)
    }

    /// Payload bytes (`info.size` long)
    pub fn data(&self) -> &[u8] {
        let data = self.data.as_ref();
        &data[..self.info.size.min(data.len())]
    }
}

impl fmt::Debug for EncodedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedSample")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// An encoded sample whose bytes were copied out of the encoder's buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedSample {
    pub data: Vec<u8>,
    pub info: SampleInfo,
}

impl BufferedSample {
    /// Copy the payload and snapshot the metadata of `sample`
    pub fn copy_from(sample: &EncodedSample) -> Self {
        let data = sample.data().to_vec();
        let info = SampleInfo {
            size: data.len(),
            ..sample.info
        };
        Self { data, info }
    }
}

/// Media kind of a track and its defining parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video { width: u32, height: u32 },
    Audio { sample_rate: u32, channels: u32 },
}

impl TrackKind {
    pub fn label(&self) -> &'static str {
        match self {
            TrackKind::Video { .. } => "video",
            TrackKind::Audio { .. } => "audio",
        }
    }
}

/// Format description handed to the muxer when a track is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    pub kind: TrackKind,
    /// MIME type, e.g. "video/avc"
    pub mime: String,
    /// Backend caps describing the stream (codec data included), if known
    pub caps: Option<String>,
}

impl TrackFormat {
    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            kind: TrackKind::Video { width, height },
            mime: mime.into(),
            caps: None,
        }
    }

    pub fn audio(mime: impl Into<String>, sample_rate: u32, channels: u32) -> Self {
        Self {
            kind: TrackKind::Audio {
                sample_rate,
                channels,
            },
            mime: mime.into(),
            caps: None,
        }
    }

    pub fn with_caps(mut self, caps: impl Into<String>) -> Self {
        self.caps = Some(caps.into());
        self
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video { .. })
    }
}
