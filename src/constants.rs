// SPDX-License-Identifier: GPL-3.0-only

//! Recorder-wide constants

use std::time::Duration;

/// Video encoding defaults
pub mod video {
    /// Output MIME type (H.264 Advanced Video Coding)
    pub const MIME_TYPE: &str = "video/avc";

    /// Target bitrate in bits per second
    pub const BIT_RATE: u32 = 6_000_000;

    /// Nominal frame rate used for encoder configuration
    pub const FRAME_RATE: u32 = 30;

    /// Seconds between key frames
    pub const IFRAME_INTERVAL_SECS: u32 = 5;

    /// Bytes per pixel of the RGBA frames drawn into the encoder
    pub const INPUT_BYTES_PER_PIXEL: usize = 4;

    /// Encoded video held while waiting for the audio track (about 90 s at
    /// the default bitrate)
    pub const PREMUX_MAX_BYTES: usize = 64 * 1024 * 1024;
}

/// Audio capture and encoding defaults (AAC-LC, mono, 16-bit PCM input)
pub mod audio {
    /// Output MIME type
    pub const MIME_TYPE: &str = "audio/mp4a-latm";

    /// Capture sample rate in Hz
    pub const SAMPLE_RATE: u32 = 44_100;

    /// Capture channel count
    pub const CHANNELS: u32 = 1;

    /// Bytes per PCM sample (S16LE)
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Target bitrate in bits per second
    pub const BIT_RATE: u32 = 64_000;

    /// Largest PCM chunk handed to the encoder per input request
    pub const MAX_INPUT_SIZE: usize = 16_384;

    /// Bytes retained by an intercepted microphone before old data is dropped
    pub const INTERCEPT_QUEUE_BYTES: usize = 1 << 20;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Bounded wait for one video encoder output poll
    pub const DRAIN_POLL_TIMEOUT: Duration = Duration::from_millis(10);

    /// Recording length after which a segment rollover is signalled
    pub const SEGMENT_CEILING: Duration = Duration::from_secs(3600);

    /// Interval between "recording for N secs" log lines
    pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(30);

    /// Upper bound for end-of-stream draining and muxer finalization at release
    pub const FINALIZE_TIMEOUT: Duration = Duration::from_secs(3);

    /// Wait for the container writer to flush its trailer
    pub const MUXER_EOS_TIMEOUT: Duration = Duration::from_secs(5);

    /// Wait for a microphone buffer while serving an encoder input request
    pub const MIC_READ_TIMEOUT: Duration = Duration::from_millis(100);

    /// Poll results that are neither data nor status tolerated per drain cycle
    pub const MAX_INVALID_POLLS: u32 = 16;
}

/// Container defaults
pub mod container {
    /// File extension of the produced container
    pub const EXTENSION: &str = "mp4";

    /// GStreamer muxer element
    pub const MUXER_ELEMENT: &str = "mp4mux";
}
