// SPDX-License-Identifier: GPL-3.0-only

//! Fan-out of captured PCM to attached listeners
//!
//! A producer that already owns the capture device (a call stack, another
//! recorder) hands its sample batches to [`AudioSamplesInterceptor`]. An
//! [`InterceptedMicrophone`] attaches itself there and serves those samples
//! through the regular [`MicrophoneSource`] interface.

use super::{MicrophoneFactory, MicrophoneSettings, MicrophoneSource};
use crate::constants;
use crate::errors::RecordingError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// One batch of interleaved S16LE PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSamples {
    pub sample_rate: u32,
    pub channels: u32,
    pub data: Vec<u8>,
}

/// Receiver of intercepted sample batches
pub trait SamplesReadyCallback: Send + Sync {
    fn on_samples_ready(&self, samples: &AudioSamples);
}

/// Delivers every captured batch to all attached callbacks
#[derive(Default)]
pub struct AudioSamplesInterceptor {
    callbacks: Mutex<HashMap<u64, Arc<dyn SamplesReadyCallback>>>,
}

impl AudioSamplesInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `callback` under `id`, replacing any previous one
    pub fn attach(&self, id: u64, callback: Arc<dyn SamplesReadyCallback>) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.insert(id, callback);
            debug!(id, "Attached audio samples callback");
        }
    }

    pub fn detach(&self, id: u64) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            if callbacks.remove(&id).is_some() {
                debug!(id, "Detached audio samples callback");
            }
        }
    }

    pub fn attached_count(&self) -> usize {
        self.callbacks.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Hand `samples` to every attached callback
    pub fn on_samples_ready(&self, samples: &AudioSamples) {
        // Callbacks run outside the lock so they may attach or detach
        let callbacks: Vec<_> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback.on_samples_ready(samples);
        }
    }
}

/// Bounded byte queue between the interceptor and a reader
struct SampleQueue {
    bytes: Mutex<VecDeque<u8>>,
    available: Condvar,
    capacity: usize,
}

impl SampleQueue {
    fn new(capacity: usize) -> Self {
        Self {
            bytes: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Copy up to `buf.len()` bytes, waiting at most `timeout` for any
    fn read(&self, buf: &mut [u8], timeout: Duration) -> usize {
        let Ok(guard) = self.bytes.lock() else {
            return 0;
        };
        let Ok((mut bytes, _)) = self
            .available
            .wait_timeout_while(guard, timeout, |bytes| bytes.is_empty())
        else {
            return 0;
        };

        let n = buf.len().min(bytes.len());
        for (dst, src) in buf.iter_mut().zip(bytes.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn clear(&self) {
        if let Ok(mut bytes) = self.bytes.lock() {
            bytes.clear();
        }
    }
}

impl SamplesReadyCallback for SampleQueue {
    fn on_samples_ready(&self, samples: &AudioSamples) {
        let Ok(mut bytes) = self.bytes.lock() else {
            return;
        };
        bytes.extend(samples.data.iter().copied());
        // Oldest bytes go first on overflow; keep sample alignment
        let overflow = bytes.len().saturating_sub(self.capacity);
        if overflow > 0 {
            let aligned = overflow.next_multiple_of(constants::audio::BYTES_PER_SAMPLE);
            let len = bytes.len();
            bytes.drain(..aligned.min(len));
            trace!(dropped = aligned, "Intercepted audio queue overflow");
        }
        drop(bytes);
        self.available.notify_all();
    }
}

static NEXT_INTERCEPT_ID: AtomicU64 = AtomicU64::new(1);

/// Microphone fed from an [`AudioSamplesInterceptor`]
pub struct InterceptedMicrophone {
    interceptor: Arc<AudioSamplesInterceptor>,
    id: u64,
    queue: Arc<SampleQueue>,
    attached: bool,
}

impl InterceptedMicrophone {
    pub fn new(interceptor: Arc<AudioSamplesInterceptor>) -> Self {
        Self::with_capacity(interceptor, constants::audio::INTERCEPT_QUEUE_BYTES)
    }

    pub fn with_capacity(interceptor: Arc<AudioSamplesInterceptor>, capacity: usize) -> Self {
        Self {
            interceptor,
            id: NEXT_INTERCEPT_ID.fetch_add(1, Ordering::Relaxed),
            queue: Arc::new(SampleQueue::new(capacity)),
            attached: false,
        }
    }

    /// Key this microphone is attached under
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl MicrophoneSource for InterceptedMicrophone {
    fn start(&mut self) -> Result<(), RecordingError> {
        if !self.attached {
            self.interceptor.attach(self.id, self.queue.clone());
            self.attached = true;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.queue.read(buf, constants::timing::MIC_READ_TIMEOUT)
    }

    fn stop(&mut self) {
        if self.attached {
            self.interceptor.detach(self.id);
            self.attached = false;
        }
    }

    fn release(&mut self) {
        self.stop();
        self.queue.clear();
    }
}

impl Drop for InterceptedMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Creates microphones that read from a shared interceptor
#[derive(Clone, Default)]
pub struct InterceptedMicrophoneFactory {
    interceptor: Arc<AudioSamplesInterceptor>,
}

impl InterceptedMicrophoneFactory {
    pub fn new(interceptor: Arc<AudioSamplesInterceptor>) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> Arc<AudioSamplesInterceptor> {
        Arc::clone(&self.interceptor)
    }
}

impl MicrophoneFactory for InterceptedMicrophoneFactory {
    fn create(
        &self,
        _settings: &MicrophoneSettings,
    ) -> Result<Box<dyn MicrophoneSource>, RecordingError> {
        Ok(Box::new(InterceptedMicrophone::new(self.interceptor())))
    }
}
