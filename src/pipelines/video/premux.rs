// SPDX-License-Identifier: GPL-3.0-only

//! Encoded video held back until the container is writable

use crate::constants;
use crate::media::sample::{BufferedSample, EncodedSample};
use std::collections::VecDeque;

/// FIFO of copied video samples awaiting the muxer, bounded in payload bytes
#[derive(Debug)]
pub struct PreMuxBuffer {
    samples: VecDeque<BufferedSample>,
    bytes: usize,
    max_bytes: usize,
}

impl Default for PreMuxBuffer {
    fn default() -> Self {
        Self::with_limit(constants::video::PREMUX_MAX_BYTES)
    }
}

impl PreMuxBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            bytes: 0,
            max_bytes,
        }
    }

    /// Copy `sample` with its timestamp replaced by `presentation_time_us`
    ///
    /// Returns false, keeping nothing, when the copy would exceed the limit.
    pub fn push(&mut self, sample: &EncodedSample, presentation_time_us: i64) -> bool {
        if self.bytes + sample.data().len() > self.max_bytes {
            return false;
        }
        let mut buffered = BufferedSample::copy_from(sample);
        buffered.info.presentation_time_us = presentation_time_us;
        self.bytes += buffered.data.len();
        self.samples.push_back(buffered);
        true
    }

    /// Remove every sample in arrival order
    pub fn drain(&mut self) -> impl Iterator<Item = BufferedSample> + '_ {
        self.bytes = 0;
        self.samples.drain(..)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Payload bytes currently held
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.bytes = 0;
    }
}
