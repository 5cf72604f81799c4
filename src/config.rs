// SPDX-License-Identifier: GPL-3.0-only

//! Recorder configuration
//!
//! Settings are stored as JSON. A missing file yields the defaults from
//! [`crate::constants`]; unknown or absent fields fall back per field.

use crate::constants;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the per-user configuration directory
pub const CONFIG_DIR_NAME: &str = "camera-recorder";

/// File name of the configuration inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Video encoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Target bitrate in bits per second
    pub bitrate_bps: u32,
    /// Nominal frame rate
    pub frame_rate: u32,
    /// Seconds between key frames
    pub iframe_interval_secs: u32,
    /// Force a specific GStreamer encoder element (e.g. "x264enc")
    pub encoder: Option<String>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            bitrate_bps: constants::video::BIT_RATE,
            frame_rate: constants::video::FRAME_RATE,
            iframe_interval_secs: constants::video::IFRAME_INTERVAL_SECS,
            encoder: None,
        }
    }
}

/// Microphone and audio encoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Record microphone audio alongside video
    pub enabled: bool,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Capture channel count
    pub channels: u32,
    /// Target bitrate in bits per second
    pub bitrate_bps: u32,
    /// Largest PCM chunk handed to the encoder per input request
    pub max_input_size: usize,
    /// PipeWire node name or serial ("pipewire-serial-N"); default source if unset
    pub device: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: constants::audio::SAMPLE_RATE,
            channels: constants::audio::CHANNELS,
            bitrate_bps: constants::audio::BIT_RATE,
            max_input_size: constants::audio::MAX_INPUT_SIZE,
            device: None,
        }
    }
}

/// Timing knobs of the recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Bounded wait per video encoder output poll
    pub drain_poll_timeout_ms: u64,
    /// Recording length after which a segment rollover is signalled
    pub rollover_secs: u64,
    /// Upper bound for draining and finalizing at release
    pub finalize_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            drain_poll_timeout_ms: constants::timing::DRAIN_POLL_TIMEOUT.as_millis() as u64,
            rollover_secs: constants::timing::SEGMENT_CEILING.as_secs(),
            finalize_timeout_ms: constants::timing::FINALIZE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TimingSettings {
    pub fn drain_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_poll_timeout_ms)
    }

    pub fn rollover_ceiling(&self) -> Duration {
        Duration::from_secs(self.rollover_secs)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }
}

/// Complete recorder configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub video: VideoSettings,
    pub audio: AudioSettings,
    pub timing: TimingSettings,
}

impl RecorderConfig {
    /// Default configuration file location (`~/.config/camera-recorder/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from `path`, or from [`Self::default_path`] when `None`
    ///
    /// A file that does not exist is not an error; defaults are returned.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => {
                debug!("No configuration directory available, using defaults");
                return Ok(Self::default());
            }
        };

        if !path.exists() {
            debug!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config = Self::from_json(&contents)?;
        info!(path = %path.display(), "Loaded recorder configuration");
        Ok(config)
    }

    /// Parse configuration from a JSON document
    pub fn from_json(json: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values the encoders cannot be configured with
    pub fn validate(&self) -> AppResult<()> {
        if self.video.frame_rate == 0 {
            return Err(AppError::Config("video.frame_rate must be positive".into()));
        }
        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return Err(AppError::Config(
                "audio.sample_rate and audio.channels must be positive".into(),
            ));
        }
        if self.audio.max_input_size == 0 {
            return Err(AppError::Config("audio.max_input_size must be positive".into()));
        }
        if self.timing.drain_poll_timeout_ms == 0 {
            return Err(AppError::Config(
                "timing.drain_poll_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RecorderConfig::from_json(r#"{ "audio": { "enabled": false } }"#).unwrap();
        assert!(!config.audio.enabled);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.video, VideoSettings::default());
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let result = RecorderConfig::from_json(r#"{ "video": { "frame_rate": 0 } }"#);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_timing_durations() {
        let timing = TimingSettings::default();
        assert_eq!(timing.drain_poll_timeout(), Duration::from_millis(10));
        assert_eq!(timing.rollover_ceiling(), Duration::from_secs(3600));
    }
}
