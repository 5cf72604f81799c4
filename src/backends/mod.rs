// SPDX-License-Identifier: GPL-3.0-only

//! Capture backends feeding the recorder
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Recording Pipeline             │
//! └──────────┬─────────────────────┬────────────┘
//!            │ frames              │ PCM
//! ┌──────────┴──────────┐ ┌────────┴───────────┐
//! │       Camera        │ │       Audio        │
//! │ (external / test    │ │ (PipeWire or       │
//! │   pattern source)   │ │  interceptor)      │
//! └─────────────────────┘ └────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`audio`]: Microphone sources, device enumeration and the samples interceptor
//! - [`camera`]: Frame types and frame producer loops

pub mod audio;
pub mod camera;
