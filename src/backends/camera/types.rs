// SPDX-License-Identifier: GPL-3.0-only
// Shared types for video frame ingress

//! Raw video frame types

use gstreamer::buffer::{MappedBuffer, Readable};
use std::sync::Arc;

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// Cloning is a reference-count increment; the pixels are freed when the last
/// clone is dropped.
#[derive(Clone)]
pub enum FrameData {
    /// Pre-copied bytes (synthetic sources, tests, external producers)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live references to the pixel storage
    pub fn ref_count(&self) -> usize {
        match self {
            FrameData::Copied(data) => Arc::strong_count(data),
            FrameData::Mapped(buf) => Arc::strong_count(buf),
        }
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Copied(data.into())
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// Frame rotation in degrees (clockwise)
///
/// Applied when the frame is drawn into the encoder surface, so the encoded
/// picture has the rotated dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorRotation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// Create rotation from an integer degree value (normalised to 0-360).
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => SensorRotation::Rotate90,
            180 => SensorRotation::Rotate180,
            270 => SensorRotation::Rotate270,
            _ => SensorRotation::None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, SensorRotation::Rotate90 | SensorRotation::Rotate270)
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// A raw RGBA video frame pushed by an external video source
///
/// Cloning retains the frame, dropping releases it.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Pixel data, tightly packed RGBA unless `stride` says otherwise
    pub data: FrameData,
    /// Width in pixels before rotation
    pub width: u32,
    /// Height in pixels before rotation
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Rotation to apply when drawing
    pub rotation: SensorRotation,
    /// Capture timestamp in nanoseconds (monotonic, arbitrary origin)
    pub timestamp_ns: u64,
}

impl VideoFrame {
    /// Create a tightly packed RGBA frame
    pub fn new(data: impl Into<FrameData>, width: u32, height: u32, timestamp_ns: u64) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            stride: width * crate::constants::video::INPUT_BYTES_PER_PIXEL as u32,
            rotation: SensorRotation::None,
            timestamp_ns,
        }
    }

    /// Set the rotation applied at draw time
    pub fn with_rotation(mut self, rotation: SensorRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Take an additional reference to this frame
    pub fn retain(&self) -> Self {
        self.clone()
    }

    /// Width after rotation is applied
    pub fn rotated_width(&self) -> u32 {
        if self.rotation.swaps_dimensions() {
            self.height
        } else {
            self.width
        }
    }

    /// Height after rotation is applied
    pub fn rotated_height(&self) -> u32 {
        if self.rotation.swaps_dimensions() {
            self.width
        } else {
            self.height
        }
    }

    /// Rotated (width, height)
    pub fn rotated_size(&self) -> (u32, u32) {
        (self.rotated_width(), self.rotated_height())
    }
}
