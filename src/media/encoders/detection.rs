// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer encoder detection
//!
//! Reports which H.264 and AAC encoders, and which container muxer, the
//! local GStreamer installation provides.

use super::audio::enumerate_audio_encoders;
use super::video::{EncoderInfo, enumerate_video_encoders};
use crate::constants;
use gstreamer as gst;
use tracing::{debug, info, warn};

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::init().ok();
    gst::ElementFactory::find(element_name).is_some()
}

/// What a recording session could use on this machine
#[derive(Debug, Clone, Default)]
pub struct EncoderReport {
    /// H.264 encoders, best first
    pub video: Vec<EncoderInfo>,
    /// AAC encoders as (element, display name), best first
    pub audio: Vec<(&'static str, &'static str)>,
    /// Whether the container muxer element is installed
    pub muxer: bool,
}

impl EncoderReport {
    /// A recording needs at least a video encoder and the muxer
    pub fn can_record(&self) -> bool {
        !self.video.is_empty() && self.muxer
    }

    /// Audio tracks need an AAC encoder
    pub fn can_record_audio(&self) -> bool {
        !self.audio.is_empty()
    }
}

/// Probe the installation for encoders and the muxer
pub fn detect_encoders() -> EncoderReport {
    let report = EncoderReport {
        video: enumerate_video_encoders(),
        audio: enumerate_audio_encoders(),
        muxer: is_element_available(constants::container::MUXER_ELEMENT),
    };
    debug!(
        video = report.video.len(),
        audio = report.audio.len(),
        muxer = report.muxer,
        "Encoder detection finished"
    );
    report
}

/// Log all available encoders (for debugging)
pub fn log_available_encoders() {
    let report = detect_encoders();

    info!("=== GStreamer Encoder Detection ===");

    info!("Video encoders:");
    for encoder in &report.video {
        info!("  ✓ {} ({})", encoder.display_name, encoder.element_name);
    }

    info!("Audio encoders:");
    for (name, display_name) in &report.audio {
        info!("  ✓ {} ({})", display_name, name);
    }

    if !report.muxer {
        warn!(muxer = constants::container::MUXER_ELEMENT, "Container muxer not available");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_runs() {
        // Just ensure detection doesn't panic
        let _ = detect_encoders();
    }

    #[test]
    fn test_empty_report_cannot_record() {
        let report = EncoderReport::default();
        assert!(!report.can_record());
        assert!(!report.can_record_audio());
    }
}
