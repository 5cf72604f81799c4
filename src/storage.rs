// SPDX-License-Identifier: GPL-3.0-only

//! Storage utilities for recording output files

use crate::constants;
use crate::errors::RecordingError;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default directory for recordings (`~/Videos/camera-recorder`)
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("camera-recorder")
}

/// Timestamped output file name, e.g. `video_20260101_120000.mp4`
pub fn timestamped_file_name() -> String {
    format!(
        "video_{}.{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        constants::container::EXTENSION
    )
}

/// Validate an output path and create its parent directories
///
/// The path must be absolute; parents that do not exist yet are created.
pub fn prepare_output_path(path: &Path) -> Result<(), RecordingError> {
    if !path.is_absolute() || path.file_name().is_none() {
        return Err(RecordingError::InvalidOutputPath(path.to_path_buf()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            RecordingError::Pipeline(format!(
                "Failed to create output directory {}: {}",
                parent.display(),
                e
            ))
        })?;
        debug!(dir = %parent.display(), "Output directory ready");
    }

    Ok(())
}

/// Delete a partially written output file
///
/// Missing files are fine; other failures are logged and otherwise ignored.
pub fn discard_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "Discarded partial recording"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No partial recording to discard")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to discard partial recording"),
    }
}
