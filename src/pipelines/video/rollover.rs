// SPDX-License-Identifier: GPL-3.0-only

//! Segment rollover signalling
//!
//! Advisory only: the recorder never splits files itself. The listener is
//! expected to stop this session and start a new one.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Notified when a recording crossed the segment ceiling
pub trait RolloverListener: Send + Sync {
    fn on_segment_rollover(&self);
}

impl<F> RolloverListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_segment_rollover(&self) {
        self()
    }
}

/// Elapsed-time tracker for one recording session
pub struct SegmentRollover {
    origin: Instant,
    ceiling: Duration,
    started: Instant,
    last_progress: Instant,
    progress_interval: Duration,
    listener: Option<Arc<dyn RolloverListener>>,
}

impl SegmentRollover {
    pub fn new(
        now: Instant,
        ceiling: Duration,
        progress_interval: Duration,
        listener: Option<Arc<dyn RolloverListener>>,
    ) -> Self {
        Self {
            origin: now,
            ceiling,
            started: now,
            last_progress: now,
            progress_interval,
            listener,
        }
    }

    /// Check the ceiling at `now`, notifying and resetting the origin when crossed
    ///
    /// Returns whether a rollover fired.
    pub fn check_at(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_progress) >= self.progress_interval {
            self.last_progress = now;
            info!(
                elapsed_secs = now.duration_since(self.started).as_secs(),
                "Recording in progress"
            );
        }

        if now.duration_since(self.origin) < self.ceiling {
            return false;
        }

        self.origin = now;
        match &self.listener {
            Some(listener) => {
                info!(ceiling_secs = self.ceiling.as_secs(), "Segment rollover");
                listener.on_segment_rollover();
            }
            None => warn!("Segment ceiling crossed with no rollover listener"),
        }
        true
    }

    /// Instant the current segment started
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tracker(now: Instant, fired: &Arc<AtomicU32>) -> SegmentRollover {
        let fired = Arc::clone(fired);
        let listener: Arc<dyn RolloverListener> = Arc::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        SegmentRollover::new(now, Duration::from_secs(3600), Duration::from_secs(30), Some(listener))
    }

    #[test]
    fn test_fires_once_per_boundary() {
        let fired = Arc::new(AtomicU32::new(0));
        let t0 = Instant::now();
        let mut rollover = tracker(t0, &fired);

        assert!(!rollover.check_at(t0 + Duration::from_secs(3599)));
        assert!(rollover.check_at(t0 + Duration::from_secs(3600)));
        assert!(!rollover.check_at(t0 + Duration::from_secs(3601)));
        assert!(!rollover.check_at(t0 + Duration::from_secs(7199)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_origin_resets_at_firing_instant() {
        let fired = Arc::new(AtomicU32::new(0));
        let t0 = Instant::now();
        let mut rollover = tracker(t0, &fired);

        let fire_at = t0 + Duration::from_secs(3650);
        assert!(rollover.check_at(fire_at));
        assert_eq!(rollover.origin(), fire_at);
        assert!(!rollover.check_at(fire_at + Duration::from_secs(3599)));
        assert!(rollover.check_at(fire_at + Duration::from_secs(3600)));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
