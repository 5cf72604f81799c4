// SPDX-License-Identifier: GPL-3.0-only

//! Video frame ingress
//!
//! Frames are produced by an external source and pushed into the recorder.
//! This module holds the frame types, a synthetic test pattern source, and the
//! thread controller that drives a producer loop.

pub mod frame_loop;
pub mod test_pattern;
pub mod types;

pub use frame_loop::{FrameLoopController, LoopAction};
pub use test_pattern::TestPatternSource;
pub use types::*;
