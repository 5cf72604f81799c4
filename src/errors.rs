// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the recorder

use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Recording-related errors
    Recording(RecordingError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Recording-specific errors
#[derive(Debug, Clone)]
pub enum RecordingError {
    /// Encoder could not be created or configured (fatal to the session)
    EncoderConfiguration(String),
    /// No usable encoder is installed
    EncoderNotAvailable(String),
    /// Operation requires a running session
    NotRecording,
    /// Output path is not an absolute file path
    InvalidOutputPath(PathBuf),
    /// Frame size differs from the size the encoder was configured with
    ResolutionChanged {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Container muxer rejected an operation
    Muxer(MuxerError),
    /// Backend pipeline error during recording
    Pipeline(String),
    /// Microphone or audio encoder failure
    Audio(String),
}

/// Container muxer errors
///
/// Any of these is fatal for the muxer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxerError {
    /// Operation is not valid in the muxer's current state
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    /// `start()` was called before every expected track was registered
    MissingTrack(&'static str),
    /// Sample was written to a track index the muxer never handed out
    UnknownTrack(usize),
    /// Error reported by the underlying container writer
    Backend(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::EncoderConfiguration(msg) => {
                write!(f, "Encoder configuration failed: {}", msg)
            }
            RecordingError::EncoderNotAvailable(msg) => write!(f, "Encoder not available: {}", msg),
            RecordingError::NotRecording => write!(f, "No recording in progress"),
            RecordingError::InvalidOutputPath(path) => {
                write!(f, "Output path must be absolute: {}", path.display())
            }
            RecordingError::ResolutionChanged { expected, actual } => write!(
                f,
                "Frame size changed mid-session from {}x{} to {}x{} (unsupported)",
                expected.0, expected.1, actual.0, actual.1
            ),
            RecordingError::Muxer(e) => write!(f, "Muxer error: {}", e),
            RecordingError::Pipeline(msg) => write!(f, "Pipeline error: {}", msg),
            RecordingError::Audio(msg) => write!(f, "Audio error: {}", msg),
        }
    }
}

impl fmt::Display for MuxerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxerError::InvalidState { operation, state } => {
                write!(f, "{} is not allowed while the muxer is {}", operation, state)
            }
            MuxerError::MissingTrack(kind) => write!(f, "{} track is not registered", kind),
            MuxerError::UnknownTrack(index) => write!(f, "Unknown track index {}", index),
            MuxerError::Backend(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for RecordingError {}
impl std::error::Error for MuxerError {}

impl From<RecordingError> for AppError {
    fn from(err: RecordingError) -> Self {
        AppError::Recording(err)
    }
}

impl From<MuxerError> for RecordingError {
    fn from(err: MuxerError) -> Self {
        RecordingError::Muxer(err)
    }
}

impl From<MuxerError> for AppError {
    fn from(err: MuxerError) -> Self {
        AppError::Recording(RecordingError::Muxer(err))
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<gstreamer::glib::Error> for RecordingError {
    fn from(err: gstreamer::glib::Error) -> Self {
        RecordingError::Pipeline(err.to_string())
    }
}
