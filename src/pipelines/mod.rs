// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Video frames │ ──▶ │  Video Pipeline   │ ──▶ │   MP4 File   │
//! │    (RGBA)    │     │  - H.264 encode   │     │  H.264 + AAC │
//! │  Microphone  │ ──▶ │  - AAC encode     │     │              │
//! │    (PCM)     │     │  - Muxing         │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`video`]: Recording sessions, encoder draining and muxing

pub mod video;
