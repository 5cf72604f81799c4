// SPDX-License-Identifier: GPL-3.0-only

//! H.264 video encoder with hardware acceleration priority
//!
//! The encoder is a small GStreamer pipeline:
//!
//! ```text
//! appsrc (RGBA) → videoconvert → <h264 encoder> → h264parse → capsfilter (avc/au) → appsink
//! ```
//!
//! Frames enter through [`GstInputSurface`]; encoded access units are pulled
//! from the appsink with a bounded wait, which gives the poll-driven model the
//! drain loop expects.

use super::{DequeueResult, InputSurface, VideoEncoder, VideoEncoderFactory, VideoEncoderSettings};
use crate::backends::camera::types::{SensorRotation, VideoFrame};
use crate::constants;
use crate::errors::RecordingError;
use crate::media::sample::{EncodedSample, SampleData, SampleFlags, TrackFormat};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Information about an available H.264 encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    /// GStreamer element name
    pub element_name: String,
    /// Display name
    pub display_name: String,
    /// Whether this is hardware accelerated
    pub is_hardware: bool,
    /// Priority (lower = higher priority)
    pub priority: u32,
}

/// H.264 encoders in priority order: (element, display name, hardware, priority)
const H264_ENCODERS: &[(&str, &str, bool, u32)] = &[
    ("vaapih264enc", "VA-API H.264 (HW)", true, 40),
    ("vah264enc", "VA-API H.264 (HW)", true, 41),
    ("nvh264enc", "NVIDIA H.264 (HW)", true, 42),
    ("qsvh264enc", "Intel QSV H.264 (HW)", true, 43),
    ("amfh264enc", "AMD AMF H.264 (HW)", true, 44),
    ("v4l2h264enc", "V4L2 H.264 (HW)", true, 45),
    ("x264enc", "x264 H.264 (SW)", false, 50),
    ("openh264enc", "OpenH264 H.264 (SW)", false, 51),
];

/// Names of every H.264 encoder element this crate knows how to configure
pub fn known_encoder_names() -> impl Iterator<Item = &'static str> {
    H264_ENCODERS.iter().map(|(name, ..)| *name)
}

/// Enumerate all available H.264 encoders, sorted by priority
pub fn enumerate_video_encoders() -> Vec<EncoderInfo> {
    let _ = gst::init();

    let mut available: Vec<EncoderInfo> = H264_ENCODERS
        .iter()
        .filter(|(name, ..)| gst::ElementFactory::find(name).is_some())
        .map(|(name, display, is_hardware, priority)| EncoderInfo {
            element_name: name.to_string(),
            display_name: display.to_string(),
            is_hardware: *is_hardware,
            priority: *priority,
        })
        .collect();

    available.sort_by_key(|e| e.priority);
    available
}

/// Pick the encoder element to use, honouring an explicit override
fn select_encoder_name(encoder_override: Option<&str>) -> Result<String, RecordingError> {
    gst::init()?;

    if let Some(name) = encoder_override {
        return if gst::ElementFactory::find(name).is_some() {
            Ok(name.to_string())
        } else {
            Err(RecordingError::EncoderNotAvailable(format!(
                "Requested video encoder {} is not installed",
                name
            )))
        };
    }

    enumerate_video_encoders()
        .into_iter()
        .next()
        .map(|info| info.element_name)
        .ok_or_else(|| {
            RecordingError::EncoderNotAvailable(
                "No H.264 encoder available. Please install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264".to_string(),
            )
        })
}

/// Configure encoder based on element type
fn configure_video_encoder(
    encoder: &gst::Element,
    encoder_name: &str,
    settings: &VideoEncoderSettings,
) {
    let bitrate_kbps = (settings.bitrate_bps / 1000).max(1);
    let key_interval = settings.frame_rate * settings.iframe_interval_secs;

    match encoder_name {
        "x264enc" => {
            encoder.set_property_from_str("speed-preset", "veryfast");
            encoder.set_property_from_str("tune", "zerolatency");
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("key-int-max", key_interval);
            debug!(bitrate_kbps, key_interval, "Configured x264enc");
        }

        "vaapih264enc" => {
            encoder.set_property_from_str("rate-control", "cbr");
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("keyframe-period", key_interval);
            debug!(bitrate_kbps, "Configured VA-API encoder");
        }

        "vah264enc" => {
            encoder.set_property_from_str("rate-control", "cbr");
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("key-int-max", key_interval);
            debug!(bitrate_kbps, "Configured VA encoder");
        }

        "nvh264enc" => {
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property_from_str("rc-mode", "cbr");
            encoder.set_property("gop-size", key_interval as i32);
            debug!(bitrate_kbps, "Configured NVIDIA encoder");
        }

        "amfh264enc" => {
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property_from_str("rate-control", "cbr");
            debug!(bitrate_kbps, "Configured AMD AMF encoder");
        }

        "qsvh264enc" => {
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("gop-size", key_interval);
            debug!(bitrate_kbps, "Configured Intel QSV encoder");
        }

        "openh264enc" => {
            encoder.set_property_from_str("rate-control", "bitrate");
            encoder.set_property("bitrate", settings.bitrate_bps);
            encoder.set_property("gop-size", key_interval);
            encoder.set_property_from_str("usage-type", "camera");
            debug!(bitrate_bps = settings.bitrate_bps, "Configured openh264enc");
        }

        // V4L2 encoders expose controls through extra-controls; defaults are fine
        _ => {
            debug!(encoder = %encoder_name, "Using encoder default configuration");
        }
    }
}

/// Build `video/x-raw` caps for the encoder input
fn raw_input_caps(settings: &VideoEncoderSettings) -> Result<gst::Caps, RecordingError> {
    let info = gst_video::VideoInfo::builder(
        gst_video::VideoFormat::Rgba,
        settings.width,
        settings.height,
    )
    .fps(gst::Fraction::new(settings.frame_rate as i32, 1))
    .build()
    .map_err(|e| RecordingError::EncoderConfiguration(format!("Invalid input format: {}", e)))?;

    info.to_caps()
        .map_err(|e| RecordingError::EncoderConfiguration(format!("Invalid input caps: {}", e)))
}

/// Creates GStreamer H.264 encoders
#[derive(Debug, Clone, Default)]
pub struct GstVideoEncoderFactory {
    /// Force a specific encoder element
    pub encoder_override: Option<String>,
}

impl GstVideoEncoderFactory {
    pub fn new(encoder_override: Option<String>) -> Self {
        Self { encoder_override }
    }
}

impl VideoEncoderFactory for GstVideoEncoderFactory {
    fn probe(&self) -> Result<(), RecordingError> {
        let name = select_encoder_name(self.encoder_override.as_deref())?;
        debug!(encoder = %name, "Video encoder available");
        Ok(())
    }

    fn create(
        &self,
        settings: &VideoEncoderSettings,
    ) -> Result<Box<dyn VideoEncoder>, RecordingError> {
        let encoder_name = select_encoder_name(self.encoder_override.as_deref())?;
        let encoder = GstVideoEncoder::new(&encoder_name, settings)?;
        Ok(Box::new(encoder))
    }
}

/// GStreamer-backed H.264 encoder drained by polling
pub struct GstVideoEncoder {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    settings: VideoEncoderSettings,
    output_format: Option<TrackFormat>,
    /// Sample pulled while reporting the format change, handed out next poll
    pending: Option<gst::Sample>,
    last_pts_us: i64,
    eos_delivered: bool,
}

impl GstVideoEncoder {
    pub fn new(encoder_name: &str, settings: &VideoEncoderSettings) -> Result<Self, RecordingError> {
        info!(
            encoder = %encoder_name,
            width = settings.width,
            height = settings.height,
            bitrate = settings.bitrate_bps,
            fps = settings.frame_rate,
            "Creating video encoder"
        );

        let config_err =
            |what: &str, e: gst::glib::BoolError| RecordingError::EncoderConfiguration(format!("Failed to create {}: {}", what, e));

        let pipeline = gst::Pipeline::with_name("video-encoder");

        let appsrc = gst_app::AppSrc::builder()
            .name("frames")
            .caps(&raw_input_caps(settings)?)
            .format(gst::Format::Time)
            .is_live(true)
            .build();

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| config_err("videoconvert", e))?;

        let encoder = gst::ElementFactory::make(encoder_name)
            .build()
            .map_err(|e| config_err(encoder_name, e))?;
        configure_video_encoder(&encoder, encoder_name, settings);

        let parser = gst::ElementFactory::make("h264parse")
            .build()
            .map_err(|e| config_err("h264parse", e))?;

        let output_caps = gst::Caps::builder("video/x-h264")
            .field("stream-format", "avc")
            .field("alignment", "au")
            .build();
        let capsfilter = gst::ElementFactory::make("capsfilter")
            .property("caps", &output_caps)
            .build()
            .map_err(|e| config_err("capsfilter", e))?;

        let appsink = gst_app::AppSink::builder()
            .name("encoded")
            .sync(false)
            .build();

        pipeline
            .add_many([
                appsrc.upcast_ref(),
                &convert,
                &encoder,
                &parser,
                &capsfilter,
                appsink.upcast_ref(),
            ])
            .map_err(|e| RecordingError::EncoderConfiguration(format!("Failed to add elements: {}", e)))?;

        gst::Element::link_many([
            appsrc.upcast_ref(),
            &convert,
            &encoder,
            &parser,
            &capsfilter,
            appsink.upcast_ref(),
        ])
        .map_err(|e| RecordingError::EncoderConfiguration(format!("Failed to link encoder: {}", e)))?;

        pipeline
            .set_state(gst::State::Ready)
            .map_err(|e| RecordingError::EncoderConfiguration(format!("Encoder rejected configuration: {}", e)))?;

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            settings: settings.clone(),
            output_format: None,
            pending: None,
            last_pts_us: 0,
            eos_delivered: false,
        })
    }

    fn format_from_caps(&self, caps: &gst::CapsRef) -> TrackFormat {
        let (width, height) = caps
            .structure(0)
            .and_then(|s| Some((s.get::<i32>("width").ok()?, s.get::<i32>("height").ok()?)))
            .map(|(w, h)| (w as u32, h as u32))
            .unwrap_or((self.settings.width, self.settings.height));

        TrackFormat::video(constants::video::MIME_TYPE, width, height).with_caps(caps.to_string())
    }

    fn sample_to_encoded(&mut self, sample: gst::Sample) -> DequeueResult {
        let Some(buffer) = sample.buffer_owned() else {
            return DequeueResult::Invalid(-1);
        };

        let pts_us = buffer
            .pts()
            .map(|t| t.useconds() as i64)
            .unwrap_or(self.last_pts_us);
        self.last_pts_us = pts_us;

        let mut flags = SampleFlags::NONE;
        if !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT) {
            flags |= SampleFlags::KEY_FRAME;
        }
        if buffer.flags().contains(gst::BufferFlags::HEADER) && buffer.size() > 0 && self.output_format.is_none() {
            flags |= SampleFlags::CODEC_CONFIG;
        }

        match buffer.into_mapped_buffer_readable() {
            Ok(mapped) => DequeueResult::Sample(EncodedSample::new(SampleData::Mapped(mapped), pts_us, flags)),
            Err(_) => {
                warn!("Failed to map encoded video buffer");
                DequeueResult::Invalid(-2)
            }
        }
    }

    fn check_bus(&self) -> Option<DequeueResult> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        if let gst::MessageView::Error(err) = msg.view() {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "Video encoder error"
            );
        }
        Some(DequeueResult::Invalid(-3))
    }
}

impl VideoEncoder for GstVideoEncoder {
    fn create_input_surface(&mut self) -> Result<Box<dyn InputSurface>, RecordingError> {
        Ok(Box::new(GstInputSurface::new(self.appsrc.clone(), &self.settings)))
    }

    fn start(&mut self) -> Result<(), RecordingError> {
        info!("Starting video encoder");
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| RecordingError::EncoderConfiguration(format!("Failed to start video encoder: {}", e)))?;
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> DequeueResult {
        if let Some(sample) = self.pending.take() {
            return self.sample_to_encoded(sample);
        }

        if let Some(result) = self.check_bus() {
            return result;
        }

        let timeout = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        match self.appsink.try_pull_sample(timeout) {
            Some(sample) => {
                if self.output_format.is_none() {
                    if let Some(caps) = sample.caps() {
                        let format = self.format_from_caps(caps);
                        debug!(caps = ?format.caps, "Video encoder output format known");
                        self.output_format = Some(format);
                        self.pending = Some(sample);
                        return DequeueResult::OutputFormatChanged;
                    }
                }
                self.sample_to_encoded(sample)
            }
            None if self.appsink.is_eos() && !self.eos_delivered => {
                self.eos_delivered = true;
                DequeueResult::Sample(EncodedSample::empty(
                    self.last_pts_us,
                    SampleFlags::END_OF_STREAM,
                ))
            }
            None => DequeueResult::TryAgainLater,
        }
    }

    fn output_format(&self) -> Option<TrackFormat> {
        self.output_format.clone()
    }

    fn signal_end_of_input(&mut self) -> Result<(), RecordingError> {
        self.appsrc
            .end_of_stream()
            .map(|_| ())
            .map_err(|e| RecordingError::Pipeline(format!("Failed to signal end of video input: {:?}", e)))
    }

    fn stop(&mut self) {
        info!("Stopping video encoder");
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to stop video encoder");
        }
    }

    fn release(&mut self) {
        self.pending = None;
        let _ = self.pipeline.set_state(gst::State::Null);
        debug!("Video encoder released");
    }
}

impl Drop for GstVideoEncoder {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Encoder input surface backed by the encoder's appsrc
pub struct GstInputSurface {
    appsrc: Option<gst_app::AppSrc>,
    frame_duration: gst::ClockTime,
    back_buffer: Option<gst::Buffer>,
}

impl GstInputSurface {
    fn new(appsrc: gst_app::AppSrc, settings: &VideoEncoderSettings) -> Self {
        let fps = settings.frame_rate.max(1) as u64;
        Self {
            appsrc: Some(appsrc),
            frame_duration: gst::ClockTime::from_nseconds(1_000_000_000 / fps),
            back_buffer: None,
        }
    }
}

impl InputSurface for GstInputSurface {
    fn draw_frame(
        &mut self,
        frame: &VideoFrame,
        width: u32,
        height: u32,
    ) -> Result<(), RecordingError> {
        let pixels = draw_rotated_rgba(frame, width, height);
        let mut buffer = gst::Buffer::from_mut_slice(pixels);
        if let Some(buffer_ref) = buffer.get_mut() {
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(frame.timestamp_ns));
            buffer_ref.set_duration(self.frame_duration);
        }
        self.back_buffer = Some(buffer);
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), RecordingError> {
        let (Some(appsrc), Some(buffer)) = (self.appsrc.as_ref(), self.back_buffer.take()) else {
            return Ok(());
        };
        appsrc
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| RecordingError::Pipeline(format!("Failed to submit frame: {:?}", e)))
    }

    fn release(&mut self) {
        self.back_buffer = None;
        self.appsrc = None;
    }
}

/// Render `frame` into a tightly packed `width`×`height` RGBA picture
///
/// Applies the frame rotation; pixels outside the source are left black.
pub fn draw_rotated_rgba(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    const BPP: usize = constants::video::INPUT_BYTES_PER_PIXEL;
    let (src_w, src_h) = (frame.width as usize, frame.height as usize);
    let (dst_w, dst_h) = (width as usize, height as usize);
    let stride = frame.stride as usize;
    let src = frame.data.as_ref();
    let mut out = vec![0u8; dst_w * dst_h * BPP];

    if frame.rotation == SensorRotation::None && src_w == dst_w && stride == dst_w * BPP {
        let len = out.len().min(src.len());
        out[..len].copy_from_slice(&src[..len]);
        return out;
    }

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let (sx, sy) = match frame.rotation {
                SensorRotation::None => (dx, dy),
                SensorRotation::Rotate90 => (dy, src_h.wrapping_sub(1 + dx)),
                SensorRotation::Rotate180 => (src_w.wrapping_sub(1 + dx), src_h.wrapping_sub(1 + dy)),
                SensorRotation::Rotate270 => (src_w.wrapping_sub(1 + dy), dx),
            };
            if sx >= src_w || sy >= src_h {
                continue;
            }
            let s = sy * stride + sx * BPP;
            let d = (dy * dst_w + dx) * BPP;
            if let Some(px) = src.get(s..s + BPP) {
                out[d..d + BPP].copy_from_slice(px);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_2x1() -> VideoFrame {
        // Two pixels: red then blue
        VideoFrame::new(vec![255, 0, 0, 255, 0, 0, 255, 255], 2, 1, 0)
    }

    #[test]
    fn test_draw_identity_copies_pixels() {
        let out = draw_rotated_rgba(&frame_2x1(), 2, 1);
        assert_eq!(out, vec![255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn test_draw_rotate_90_clockwise() {
        let frame = frame_2x1().with_rotation(SensorRotation::Rotate90);
        let out = draw_rotated_rgba(&frame, 1, 2);
        // Left pixel ends up on top after a clockwise quarter turn
        assert_eq!(&out[0..4], &[255, 0, 0, 255]);
        assert_eq!(&out[4..8], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_draw_rotate_180() {
        let frame = frame_2x1().with_rotation(SensorRotation::Rotate180);
        let out = draw_rotated_rgba(&frame, 2, 1);
        assert_eq!(out, vec![0, 0, 255, 255, 255, 0, 0, 255]);
    }

    #[test]
    fn test_draw_rotate_270() {
        let frame = frame_2x1().with_rotation(SensorRotation::Rotate270);
        let out = draw_rotated_rgba(&frame, 1, 2);
        assert_eq!(&out[0..4], &[0, 0, 255, 255]);
        assert_eq!(&out[4..8], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_known_encoders_prefer_hardware() {
        let first = H264_ENCODERS.first().unwrap();
        assert!(first.2);
        assert!(known_encoder_names().any(|name| name == "x264enc"));
    }
}
