// SPDX-License-Identifier: GPL-3.0-only

//! Video recording pipeline
//!
//! Video is drawn and drained on a dedicated render thread; audio is driven
//! by encoder callbacks on their own threads. Both meet in one lock-guarded
//! muxer state:
//!
//! ```text
//! on_frame ─▶ render executor ─▶ draw ─▶ video encoder ─▶ drain ─┐
//!                                                               ├─▶ pre-mux buffer / muxer ─▶ MP4
//! microphone ─▶ audio encoder ─▶ output callback ───────────────┘
//! ```
//!
//! The muxer becomes writable once every expected track format is known;
//! video produced before that is buffered and flushed in order.

pub mod audio_path;
pub mod clock;
pub mod drain;
pub mod executor;
pub mod factories;
pub mod muxer;
pub mod premux;
pub mod recorder;
pub mod renderer;
pub mod rollover;
pub mod state;

// Re-export commonly used types
pub use factories::MediaBackends;
pub use muxer::{ContainerMuxer, GstMuxerFactory, MuxerBackend, MuxerFactory, MuxerState, TrackIndex};
pub use recorder::MediaRecorder;
pub use renderer::{ReleaseHandle, VideoFileRenderer};
pub use rollover::{RolloverListener, SegmentRollover};
pub use state::{FinalizeOutcome, SessionState};
