// SPDX-License-Identifier: GPL-3.0-only

//! State shared between the render thread and the audio callbacks
//!
//! Everything either side writes into the container goes through
//! [`SessionShared`], which keeps the muxer, both clocks, the pre-mux buffer
//! and track registration behind one lock. Registering a track, starting the
//! muxer, flushing the pre-mux buffer and writing a sample are each a single
//! critical section, so a buffered flush never interleaves with a direct
//! write.
//!
//! Encoders and the microphone live in separate slots and are only ever
//! called after being cloned or taken out, never with the muxer lock held.

use super::clock::{AudioClock, StreamClock};
use super::muxer::{ContainerMuxer, MuxerFactory, MuxerState, TrackIndex};
use super::premux::PreMuxBuffer;
use crate::backends::audio::MicrophoneSource;
use crate::errors::{MuxerError, RecordingError};
use crate::media::encoders::AudioEncoder;
use crate::media::sample::{EncodedSample, SampleInfo, TrackFormat};
use crate::storage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle of one recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::NotStarted,
            1 => SessionState::Running,
            2 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }
}

/// Atomically readable [`SessionState`]
#[derive(Debug)]
pub struct SessionStateCell(AtomicU8);

impl SessionStateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move `from → to`; false if the session was not in `from`
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let moved = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if moved {
            debug!(?from, ?to, "Session state changed");
        }
        moved
    }

    fn set(&self, to: SessionState) {
        let from = SessionState::from_u8(self.0.swap(to as u8, Ordering::SeqCst));
        if from != to {
            debug!(?from, ?to, "Session state changed");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.get() == SessionState::Running
    }
}

/// How a session's output ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The container was finalized at this path
    Saved(PathBuf),
    /// A required track never registered; the partial file was deleted
    Discarded,
}

/// Everything guarded by the muxer lock
struct MuxState {
    muxer: Option<ContainerMuxer>,
    video_track: Option<TrackIndex>,
    audio_track: Option<TrackIndex>,
    audio_expected: bool,
    pending: PreMuxBuffer,
    video_clock: StreamClock,
    audio_clock: AudioClock,
    video_done: bool,
    audio_done: bool,
    finalizing: bool,
    outcome: Option<FinalizeOutcome>,
    /// Video samples dropped because the pre-mux buffer was full
    overflowed: u64,
    /// Video samples dropped because the muxer had failed
    dropped_after_failure: u64,
}

impl MuxState {
    fn is_writable(&self) -> bool {
        self.muxer.as_ref().is_some_and(ContainerMuxer::is_started)
    }

    fn muxer_state(&self) -> Option<MuxerState> {
        self.muxer.as_ref().map(ContainerMuxer::state)
    }

    /// Both expected tracks registered and the container started at some point
    fn can_finalize(&self) -> bool {
        self.video_track.is_some()
            && (!self.audio_expected || self.audio_track.is_some())
            && self.muxer.as_ref().is_some_and(ContainerMuxer::can_finalize)
    }

    /// Start the muxer once every expected track is registered, then flush
    fn start_if_ready(&mut self) -> Result<(), RecordingError> {
        let ready = self.video_track.is_some() && (!self.audio_expected || self.audio_track.is_some());
        if !ready || self.muxer_state() != Some(MuxerState::Configuring) {
            return Ok(());
        }
        let Some(muxer) = self.muxer.as_mut() else {
            return Ok(());
        };
        muxer.start()?;
        self.flush_pending()
    }

    /// Write every buffered video sample in arrival order
    fn flush_pending(&mut self) -> Result<(), RecordingError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let (Some(muxer), Some(track)) = (self.muxer.as_mut(), self.video_track) else {
            return Ok(());
        };
        let count = self.pending.len();
        for sample in self.pending.drain() {
            muxer.write_sample(track, &sample.data, &sample.info)?;
        }
        debug!(samples = count, "Flushed pre-mux buffer");
        Ok(())
    }
}

/// Session state shared by the render thread and the audio callbacks
pub struct SessionShared {
    pub session: SessionStateCell,
    output_path: PathBuf,
    muxer_factory: Arc<dyn MuxerFactory>,
    mux: Mutex<MuxState>,
    finalized: Condvar,
    audio_encoder: Mutex<Option<Arc<dyn AudioEncoder>>>,
    microphone: Mutex<Option<Box<dyn MicrophoneSource>>>,
    /// Origin of microphone capture timestamps
    epoch: Instant,
}

impl SessionShared {
    pub fn new(output_path: &Path, muxer_factory: Arc<dyn MuxerFactory>, audio_expected: bool) -> Self {
        Self {
            session: SessionStateCell::new(SessionState::NotStarted),
            output_path: output_path.to_path_buf(),
            muxer_factory,
            mux: Mutex::new(MuxState {
                muxer: None,
                video_track: None,
                audio_track: None,
                audio_expected,
                pending: PreMuxBuffer::new(),
                video_clock: StreamClock::new(),
                audio_clock: AudioClock::new(),
                video_done: false,
                audio_done: !audio_expected,
                finalizing: false,
                outcome: None,
                overflowed: 0,
                dropped_after_failure: 0,
            }),
            finalized: Condvar::new(),
            audio_encoder: Mutex::new(None),
            microphone: Mutex::new(None),
            epoch: Instant::now(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, MuxState>, RecordingError> {
        self.mux
            .lock()
            .map_err(|_| RecordingError::Pipeline("Muxer state poisoned".to_string()))
    }

    /// Microseconds since the session was created
    pub fn capture_time_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }

    pub fn has_video_track(&self) -> bool {
        self.lock().is_ok_and(|s| s.video_track.is_some())
    }

    pub fn audio_expected(&self) -> bool {
        self.lock().is_ok_and(|s| s.audio_expected)
    }

    /// Whether the container accepts samples
    pub fn is_writable(&self) -> bool {
        self.lock().is_ok_and(|s| s.is_writable())
    }

    /// Number of video samples waiting for the gate
    pub fn pending_samples(&self) -> usize {
        self.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Open the container and register the video track
    ///
    /// Without an expected audio track the muxer starts right away.
    pub fn register_video_track(&self, format: &TrackFormat) -> Result<(), RecordingError> {
        let mut state = self.lock()?;
        if state.video_track.is_some() {
            return Ok(());
        }

        let backend = self.muxer_factory.create(&self.output_path)?;
        let mut muxer = ContainerMuxer::new(backend, &self.output_path, state.audio_expected);
        let track = muxer.add_track(format)?;
        state.muxer = Some(muxer);
        state.video_track = Some(track);

        state.start_if_ready()
    }

    /// Register the audio track and open the gate
    pub fn register_audio_track(&self, format: &TrackFormat) -> Result<(), RecordingError> {
        let mut state = self.lock()?;
        if state.audio_track.is_some() {
            debug!("Audio track already registered");
            return Ok(());
        }
        if !state.audio_expected {
            warn!("Audio format arrived for a video-only session");
            return Ok(());
        }
        let Some(muxer) = state.muxer.as_mut() else {
            return Err(MuxerError::MissingTrack("video").into());
        };
        let track = muxer.add_track(format)?;
        state.audio_track = Some(track);

        state.start_if_ready()
    }

    /// Continue without audio
    pub fn disable_audio(&self) -> Result<(), RecordingError> {
        let mut state = self.lock()?;
        if state.audio_track.is_some() {
            return Ok(());
        }
        state.audio_expected = false;
        state.audio_done = true;
        if let Some(muxer) = state.muxer.as_mut() {
            muxer.set_expects_audio(false);
        }
        info!("Recording video only");
        state.start_if_ready()
    }

    /// Buffer or write one encoded video sample
    ///
    /// Samples are buffered only while the container is still configuring.
    /// Once it has failed or stopped they are dropped.
    pub fn write_video(&self, sample: &EncodedSample) -> Result<(), RecordingError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let pts = state.video_clock.normalize(sample.info.presentation_time_us);

        match state.muxer_state() {
            None | Some(MuxerState::Configuring) => {
                if !state.pending.push(sample, pts) {
                    state.overflowed += 1;
                    if state.overflowed == 1 {
                        warn!(
                            bytes = state.pending.bytes(),
                            "Pre-mux buffer full, dropping video until the audio track registers"
                        );
                    }
                }
                return Ok(());
            }
            Some(MuxerState::Failed) | Some(MuxerState::Stopped) => {
                state.dropped_after_failure += 1;
                if state.dropped_after_failure == 1 {
                    warn!("Muxer no longer accepts samples, dropping video");
                }
                return Ok(());
            }
            Some(MuxerState::Started) => {}
        }

        state.flush_pending()?;
        let info = SampleInfo {
            presentation_time_us: pts,
            ..sample.info
        };
        let (Some(muxer), Some(track)) = (state.muxer.as_mut(), state.video_track) else {
            return Err(MuxerError::MissingTrack("video").into());
        };
        muxer.write_sample(track, sample.data(), &info)?;
        Ok(())
    }

    /// Write one encoded audio sample
    pub fn write_audio(&self, sample: &EncodedSample) -> Result<(), RecordingError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if !state.is_writable() {
            debug!("Dropping audio sample, muxer not writable");
            return Ok(());
        }

        let pts = state.audio_clock.normalize(sample.info.presentation_time_us);
        let info = SampleInfo {
            presentation_time_us: pts,
            ..sample.info
        };
        let (Some(muxer), Some(track)) = (state.muxer.as_mut(), state.audio_track) else {
            return Err(MuxerError::MissingTrack("audio").into());
        };
        muxer.write_sample(track, sample.data(), &info)?;
        Ok(())
    }

    pub fn set_audio_encoder(&self, encoder: Arc<dyn AudioEncoder>) {
        if let Ok(mut slot) = self.audio_encoder.lock() {
            *slot = Some(encoder);
        }
    }

    pub fn audio_encoder(&self) -> Option<Arc<dyn AudioEncoder>> {
        self.audio_encoder.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn take_audio_encoder(&self) -> Option<Arc<dyn AudioEncoder>> {
        self.audio_encoder.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn set_microphone(&self, microphone: Box<dyn MicrophoneSource>) {
        if let Ok(mut slot) = self.microphone.lock() {
            *slot = Some(microphone);
        }
    }

    pub fn take_microphone(&self) -> Option<Box<dyn MicrophoneSource>> {
        self.microphone.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Read PCM from the microphone, if one is attached
    pub fn read_microphone(&self, buf: &mut [u8]) -> usize {
        match self.microphone.lock() {
            Ok(mut slot) => slot.as_mut().map_or(0, |mic| mic.read(buf)),
            Err(_) => 0,
        }
    }

    pub fn mark_video_done(&self) {
        self.mark_done(|state| state.video_done = true);
    }

    pub fn mark_audio_done(&self) {
        self.mark_done(|state| state.audio_done = true);
    }

    /// Stop and release the audio encoder and mark the audio side finished
    pub fn finish_audio(&self) {
        if let Some(encoder) = self.take_audio_encoder() {
            encoder.stop();
            encoder.release();
            debug!("Audio encoder released");
        }
        self.mark_audio_done();
    }

    fn mark_done(&self, update: impl FnOnce(&mut MuxState)) {
        let Ok(mut state) = self.mux.lock() else {
            return;
        };
        update(&mut state);
        if !state.video_done || !state.audio_done || state.finalizing {
            return;
        }
        state.finalizing = true;

        let complete = state.can_finalize();
        if state.overflowed > 0 || state.dropped_after_failure > 0 {
            warn!(
                overflowed = state.overflowed,
                after_failure = state.dropped_after_failure,
                "Video samples were dropped"
            );
        }
        let muxer = state.muxer.take();
        state.pending.clear();
        drop(state);

        // The container writer may block on its trailer; keep the lock free
        let outcome = match (muxer, complete) {
            (Some(mut muxer), true) => {
                if let Err(e) = muxer.stop() {
                    error!(error = %e, "Failed to finalize container");
                }
                info!(path = %self.output_path.display(), samples = muxer.samples_written(), "Recording saved");
                FinalizeOutcome::Saved(self.output_path.clone())
            }
            (muxer, _) => {
                if let Some(mut muxer) = muxer {
                    muxer.abandon();
                }
                warn!("A required track never registered or the container never started, discarding output");
                storage::discard_partial_output(&self.output_path);
                FinalizeOutcome::Discarded
            }
        };

        if let Ok(mut state) = self.mux.lock() {
            state.outcome = Some(outcome);
        }
        self.finalized.notify_all();
    }

    /// Wait up to `timeout` for the container to be finalized or discarded
    pub fn wait_finalized(&self, timeout: Duration) -> Option<FinalizeOutcome> {
        let state = self.mux.lock().ok()?;
        let (state, _) = self
            .finalized
            .wait_timeout_while(state, timeout, |s| s.outcome.is_none())
            .ok()?;
        state.outcome.clone()
    }

    /// Transition to a terminal state
    pub(crate) fn set_stopped(&self) {
        self.session.set(SessionState::Stopped);
    }
}
