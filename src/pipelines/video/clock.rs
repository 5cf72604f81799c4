// SPDX-License-Identifier: GPL-3.0-only

//! Presentation timestamp reconciliation
//!
//! Each stream is zero-based against its own epoch: the first non-zero
//! timestamp it reports. Audio is additionally forced strictly increasing.

/// Zero-bases one stream's timestamps (µs)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamClock {
    anchor: Option<i64>,
}

impl StreamClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a raw timestamp onto the stream's zero-based timeline
    ///
    /// Timestamps before the anchor clamp to 0.
    pub fn normalize(&mut self, raw_us: i64) -> i64 {
        if self.anchor.is_none() && raw_us != 0 {
            self.anchor = Some(raw_us);
        }
        (raw_us - self.anchor.unwrap_or(0)).max(0)
    }

    pub fn anchor(&self) -> Option<i64> {
        self.anchor
    }
}

/// Zero-based and strictly increasing audio timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioClock {
    clock: StreamClock,
    last: Option<i64>,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, raw_us: i64) -> i64 {
        let mut pts = self.clock.normalize(raw_us);
        if let Some(last) = self.last {
            if pts <= last {
                pts = last + 1;
            }
        }
        self.last = Some(pts);
        pts
    }

    /// Last timestamp handed out
    pub fn last(&self) -> Option<i64> {
        self.last
    }
}
