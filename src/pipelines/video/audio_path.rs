// SPDX-License-Identifier: GPL-3.0-only

//! Audio encoder notifications
//!
//! Runs on whatever thread the audio encoder notifies from, concurrently with
//! the render thread. Input comes from the session microphone; output goes
//! into the shared muxer state. Once the session is no longer recording, the
//! first output notification shuts the audio side down.

use super::state::SessionShared;
use crate::media::encoders::{AudioEncoderListener, PcmChunk};
use crate::media::sample::{EncodedSample, TrackFormat};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Listener bridging the audio encoder to the session
pub struct AudioPath {
    shared: Arc<SessionShared>,
    finished: AtomicBool,
    samples_written: AtomicU64,
}

impl AudioPath {
    pub fn new(shared: Arc<SessionShared>) -> Self {
        Self {
            shared,
            finished: AtomicBool::new(false),
            samples_written: AtomicU64::new(0),
        }
    }

    /// Stop and release the encoder and mark the audio side finished, once
    fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            samples = self.samples_written.load(Ordering::SeqCst),
            "Audio path finished"
        );
        self.shared.finish_audio();
    }
}

impl AudioEncoderListener for AudioPath {
    fn on_input_available(&self, capacity: usize) -> Option<PcmChunk> {
        if !self.shared.session.is_recording() {
            return None;
        }

        let mut data = vec![0u8; capacity];
        let read = self.shared.read_microphone(&mut data);
        if read == 0 {
            return None;
        }
        data.truncate(read);

        Some(PcmChunk {
            data,
            presentation_time_us: self.shared.capture_time_us(),
        })
    }

    fn on_output_format_changed(&self, format: TrackFormat) {
        debug!(mime = %format.mime, "Audio encoder output format known");
        if let Err(e) = self.shared.register_audio_track(&format) {
            error!(error = %e, "Failed to register audio track");
        }
    }

    fn on_output_available(&self, sample: EncodedSample) {
        let flags = sample.info.flags;
        let size = if flags.is_codec_config() { 0 } else { sample.info.size };

        if flags.is_end_of_stream() {
            debug!("Audio encoder end of stream");
            drop(sample);
            self.finish();
            return;
        }

        if !self.shared.session.is_recording() {
            drop(sample);
            self.finish();
            return;
        }

        if size == 0 {
            return;
        }

        match self.shared.write_audio(&sample) {
            Ok(()) => {
                self.samples_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(error = %e, "Failed to write audio sample"),
        }
    }

    fn on_error(&self, message: &str) {
        error!(error = %message, "Audio encoder error");
    }
}
