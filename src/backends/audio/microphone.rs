// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer microphone capture
//!
//! `pipewiresrc → audioconvert → audioresample → capsfilter (S16LE) → appsink`,
//! falling back to `autoaudiosrc` when PipeWire is unavailable.

use super::{MicrophoneFactory, MicrophoneSettings, MicrophoneSource};
use crate::constants;
use crate::errors::RecordingError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info, warn};

/// Creates [`GstMicrophone`] sources
#[derive(Debug, Clone, Default)]
pub struct GstMicrophoneFactory;

impl MicrophoneFactory for GstMicrophoneFactory {
    fn create(
        &self,
        settings: &MicrophoneSettings,
    ) -> Result<Box<dyn MicrophoneSource>, RecordingError> {
        Ok(Box::new(GstMicrophone::new(settings)?))
    }
}

/// Build the capture source element
fn create_source(device: Option<&str>) -> Result<gst::Element, RecordingError> {
    if gst::ElementFactory::find("pipewiresrc").is_none() {
        info!("pipewiresrc not available, using autoaudiosrc");
        return gst::ElementFactory::make("autoaudiosrc")
            .build()
            .map_err(|e| RecordingError::Audio(format!("Failed to create audio source: {}", e)));
    }

    let mut builder = gst::ElementFactory::make("pipewiresrc").property("do-timestamp", true);

    // pipewiresrc target-object expects serial number or node name
    match device {
        Some(device) => {
            let target = device
                .strip_prefix("pipewire-serial-")
                .or_else(|| device.strip_prefix("pipewire-"))
                .unwrap_or(device);
            info!(target = %target, "Using PipeWire audio source");
            builder = builder.property("target-object", target);
        }
        None => info!("Using default PipeWire audio source"),
    }

    builder
        .build()
        .map_err(|e| RecordingError::Audio(format!("Failed to create pipewiresrc: {}", e)))
}

/// Microphone read through an appsink
pub struct GstMicrophone {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    /// Captured bytes not yet handed out by `read`
    leftover: Vec<u8>,
    started: bool,
}

impl GstMicrophone {
    pub fn new(settings: &MicrophoneSettings) -> Result<Self, RecordingError> {
        gst::init()?;

        let make = |name: &str| {
            gst::ElementFactory::make(name)
                .build()
                .map_err(|e| RecordingError::Audio(format!("Failed to create {}: {}", name, e)))
        };

        let pipeline = gst::Pipeline::with_name("microphone");
        let source = create_source(settings.device.as_deref())?;
        let convert = make("audioconvert")?;
        let resample = make("audioresample")?;

        let caps = gst::Caps::builder("audio/x-raw")
            .field("format", "S16LE")
            .field("layout", "interleaved")
            .field("rate", settings.sample_rate as i32)
            .field("channels", settings.channels as i32)
            .build();

        let appsink = gst_app::AppSink::builder()
            .name("pcm")
            .caps(&caps)
            .sync(false)
            .max_buffers(64)
            .drop(true)
            .build();

        pipeline
            .add_many([&source, &convert, &resample, appsink.upcast_ref()])
            .map_err(|e| RecordingError::Audio(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many([&source, &convert, &resample, appsink.upcast_ref()])
            .map_err(|e| RecordingError::Audio(format!("Failed to link microphone: {}", e)))?;

        debug!(
            sample_rate = settings.sample_rate,
            channels = settings.channels,
            "Microphone pipeline created"
        );

        Ok(Self {
            pipeline,
            appsink,
            leftover: Vec::new(),
            started: false,
        })
    }
}

impl MicrophoneSource for GstMicrophone {
    fn start(&mut self) -> Result<(), RecordingError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| RecordingError::Audio(format!("Failed to start microphone: {}", e)))?;
        self.started = true;
        info!("Microphone capture started");
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.started {
            return 0;
        }

        if self.leftover.is_empty() {
            let timeout = gst::ClockTime::from_mseconds(
                constants::timing::MIC_READ_TIMEOUT.as_millis() as u64,
            );
            let Some(sample) = self.appsink.try_pull_sample(timeout) else {
                return 0;
            };
            let Some(buffer) = sample.buffer() else {
                return 0;
            };
            match buffer.map_readable() {
                Ok(map) => self.leftover.extend_from_slice(map.as_slice()),
                Err(e) => {
                    warn!(error = %e, "Failed to map microphone buffer");
                    return 0;
                }
            }
        }

        let n = buf.len().min(self.leftover.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        n
    }

    fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to stop microphone");
        }
        info!("Microphone capture stopped");
    }

    fn release(&mut self) {
        self.stop();
        self.leftover = Vec::new();
    }
}

impl Drop for GstMicrophone {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
