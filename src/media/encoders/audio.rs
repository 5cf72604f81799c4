// SPDX-License-Identifier: GPL-3.0-only

//! Callback-driven AAC audio encoder
//!
//! ```text
//! appsrc (S16LE PCM, need-data) → audioconvert → <aac encoder> → aacparse → appsink (new-sample, eos)
//! ```
//!
//! The appsrc asks for input from its streaming thread; encoded units are
//! delivered from the appsink's streaming thread. Both end up on the
//! [`AudioEncoderListener`] registered in [`AudioEncoder::start`].

use super::{AudioEncoder, AudioEncoderFactory, AudioEncoderListener, AudioEncoderSettings};
use crate::constants;
use crate::errors::RecordingError;
use crate::media::sample::{EncodedSample, SampleData, SampleFlags, TrackFormat};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// AAC encoders in priority order: (element, display name)
const AAC_ENCODERS: &[(&str, &str)] = &[
    ("fdkaacenc", "FDK AAC"),
    ("avenc_aac", "FFmpeg AAC"),
    ("faac", "FAAC"),
    ("voaacenc", "VisualOn AAC"),
];

/// Back-off when the listener had no PCM to hand out
const IDLE_INPUT_BACKOFF: Duration = Duration::from_millis(5);

/// Available AAC encoder elements as (element, display name), in priority order
pub fn enumerate_audio_encoders() -> Vec<(&'static str, &'static str)> {
    let _ = gst::init();
    AAC_ENCODERS
        .iter()
        .copied()
        .filter(|(name, _)| gst::ElementFactory::find(name).is_some())
        .collect()
}

/// Configure AAC encoder
fn configure_aac_encoder(encoder: &gst::Element, encoder_name: &str, bitrate_bps: u32) {
    // Property types differ between plugin versions; let GStreamer parse the value
    match encoder_name {
        "fdkaacenc" | "avenc_aac" | "voaacenc" => {
            encoder.set_property_from_str("bitrate", &bitrate_bps.to_string());
            debug!(encoder = %encoder_name, bitrate_bps, "Configured AAC encoder");
        }

        "faac" => {
            // faac uses bitrate in kbps
            encoder.set_property_from_str("bitrate", &(bitrate_bps / 1000).to_string());
            debug!(bitrate_kbps = bitrate_bps / 1000, "Configured faac");
        }

        _ => {
            debug!("Unknown AAC encoder type, using default configuration");
        }
    }
}

/// Creates GStreamer AAC encoders
#[derive(Debug, Clone, Default)]
pub struct GstAudioEncoderFactory;

impl AudioEncoderFactory for GstAudioEncoderFactory {
    fn create(
        &self,
        settings: &AudioEncoderSettings,
    ) -> Result<Arc<dyn AudioEncoder>, RecordingError> {
        gst::init()?;

        let name = enumerate_audio_encoders()
            .first()
            .map(|(name, _)| *name)
            .ok_or_else(|| {
                RecordingError::EncoderNotAvailable(
                    "No AAC encoder available. Please install gstreamer1-plugins-bad (fdkaacenc) or gstreamer1-libav (avenc_aac)".to_string(),
                )
            })?;

        Ok(Arc::new(GstAudioEncoder::new(name, settings)?))
    }
}

type ListenerSlot = Arc<Mutex<Option<Arc<dyn AudioEncoderListener>>>>;

fn current_listener(slot: &ListenerSlot) -> Option<Arc<dyn AudioEncoderListener>> {
    slot.lock().ok().and_then(|guard| guard.clone())
}

/// GStreamer-backed AAC encoder
pub struct GstAudioEncoder {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    settings: AudioEncoderSettings,
    listener: ListenerSlot,
    /// Set once no more input will be requested
    input_closed: Arc<AtomicBool>,
}

impl GstAudioEncoder {
    pub fn new(encoder_name: &str, settings: &AudioEncoderSettings) -> Result<Self, RecordingError> {
        info!(
            encoder = %encoder_name,
            sample_rate = settings.sample_rate,
            channels = settings.channels,
            bitrate = settings.bitrate_bps,
            "Creating audio encoder"
        );

        let config_err = |what: &str, e: gst::glib::BoolError| {
            RecordingError::EncoderConfiguration(format!("Failed to create {}: {}", what, e))
        };

        let pipeline = gst::Pipeline::with_name("audio-encoder");

        let input_caps = gst::Caps::builder("audio/x-raw")
            .field("format", "S16LE")
            .field("layout", "interleaved")
            .field("rate", settings.sample_rate as i32)
            .field("channels", settings.channels as i32)
            .build();

        let appsrc = gst_app::AppSrc::builder()
            .name("pcm")
            .caps(&input_caps)
            .format(gst::Format::Time)
            .max_bytes(settings.max_input_size as u64)
            .build();

        let convert = gst::ElementFactory::make("audioconvert")
            .build()
            .map_err(|e| config_err("audioconvert", e))?;

        let encoder = gst::ElementFactory::make(encoder_name)
            .build()
            .map_err(|e| config_err(encoder_name, e))?;
        configure_aac_encoder(&encoder, encoder_name, settings.bitrate_bps);

        let parser = gst::ElementFactory::make("aacparse")
            .build()
            .map_err(|e| config_err("aacparse", e))?;

        let output_caps = gst::Caps::builder("audio/mpeg")
            .field("mpegversion", 4i32)
            .field("stream-format", "raw")
            .build();
        let appsink = gst_app::AppSink::builder()
            .name("encoded")
            .caps(&output_caps)
            .sync(false)
            .build();

        pipeline
            .add_many([appsrc.upcast_ref(), &convert, &encoder, &parser, appsink.upcast_ref()])
            .map_err(|e| RecordingError::EncoderConfiguration(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many([appsrc.upcast_ref(), &convert, &encoder, &parser, appsink.upcast_ref()])
            .map_err(|e| RecordingError::EncoderConfiguration(format!("Failed to link encoder: {}", e)))?;

        pipeline
            .set_state(gst::State::Ready)
            .map_err(|e| RecordingError::EncoderConfiguration(format!("Encoder rejected configuration: {}", e)))?;

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            settings: settings.clone(),
            listener: Arc::new(Mutex::new(None)),
            input_closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn install_input_callback(&self) {
        let slot = Arc::clone(&self.listener);
        let closed = Arc::clone(&self.input_closed);
        let capacity = self.settings.max_input_size;

        self.appsrc.set_callbacks(
            gst_app::AppSrcCallbacks::builder()
                .need_data(move |appsrc, _length| {
                    while !closed.load(Ordering::SeqCst) {
                        let Some(listener) = current_listener(&slot) else {
                            return;
                        };
                        let Some(chunk) = listener.on_input_available(capacity) else {
                            std::thread::sleep(IDLE_INPUT_BACKOFF);
                            continue;
                        };

                        let mut buffer = gst::Buffer::from_mut_slice(chunk.data);
                        if let Some(buffer_ref) = buffer.get_mut() {
                            let pts_us = chunk.presentation_time_us.max(0) as u64;
                            buffer_ref.set_pts(gst::ClockTime::from_useconds(pts_us));
                        }
                        if let Err(e) = appsrc.push_buffer(buffer) {
                            debug!(?e, "Audio input rejected");
                        }
                        return;
                    }
                })
                .build(),
        );
    }

    fn install_output_callbacks(&self) {
        let format_slot = Arc::clone(&self.listener);
        let sample_slot = Arc::clone(&self.listener);
        let eos_slot = Arc::clone(&self.listener);
        let last_pts = Arc::new(AtomicI64::new(0));
        let eos_pts = Arc::clone(&last_pts);
        let format_sent = Arc::new(AtomicBool::new(false));
        let (rate, channels) = (self.settings.sample_rate, self.settings.channels);

        self.appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;

                    if !format_sent.swap(true, Ordering::SeqCst) {
                        let mut format = TrackFormat::audio(constants::audio::MIME_TYPE, rate, channels);
                        if let Some(caps) = sample.caps() {
                            format = format.with_caps(caps.to_string());
                        }
                        if let Some(listener) = current_listener(&format_slot) {
                            listener.on_output_format_changed(format);
                        }
                    }

                    let buffer = sample.buffer_owned().ok_or(gst::FlowError::Error)?;
                    let pts_us = buffer
                        .pts()
                        .map(|t| t.useconds() as i64)
                        .unwrap_or_else(|| last_pts.load(Ordering::SeqCst));
                    last_pts.store(pts_us, Ordering::SeqCst);

                    let mapped = buffer
                        .into_mapped_buffer_readable()
                        .map_err(|_| gst::FlowError::Error)?;
                    let encoded = EncodedSample::new(SampleData::Mapped(mapped), pts_us, SampleFlags::NONE);

                    match current_listener(&sample_slot) {
                        Some(listener) => {
                            listener.on_output_available(encoded);
                            Ok(gst::FlowSuccess::Ok)
                        }
                        None => Err(gst::FlowError::Flushing),
                    }
                })
                .eos(move |_sink| {
                    debug!("Audio encoder reached end of stream");
                    if let Some(listener) = current_listener(&eos_slot) {
                        let pts = eos_pts.load(Ordering::SeqCst);
                        listener.on_output_available(EncodedSample::empty(pts, SampleFlags::END_OF_STREAM));
                    }
                })
                .build(),
        );
    }

    fn install_error_handler(&self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        let slot = Arc::clone(&self.listener);
        bus.set_sync_handler(move |_bus, msg| {
            if let gst::MessageView::Error(err) = msg.view() {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    "Audio encoder error"
                );
                if let Some(listener) = current_listener(&slot) {
                    listener.on_error(&err.error().to_string());
                }
            }
            gst::BusSyncReply::Drop
        });
    }
}

impl AudioEncoder for GstAudioEncoder {
    fn start(&self, listener: Arc<dyn AudioEncoderListener>) -> Result<(), RecordingError> {
        if let Ok(mut guard) = self.listener.lock() {
            *guard = Some(listener);
        }
        self.input_closed.store(false, Ordering::SeqCst);

        self.install_error_handler();
        self.install_output_callbacks();
        self.install_input_callback();

        info!("Starting audio encoder");
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| RecordingError::Audio(format!("Failed to start audio encoder: {}", e)))?;
        Ok(())
    }

    fn signal_end_of_stream(&self) {
        self.input_closed.store(true, Ordering::SeqCst);
        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(?e, "Failed to signal end of audio input");
        }
    }

    fn stop(&self) {
        info!("Stopping audio encoder");
        self.input_closed.store(true, Ordering::SeqCst);
        // May run on one of the pipeline's own streaming threads
        self.pipeline.call_async(|pipeline| {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                warn!(error = %e, "Failed to stop audio encoder");
            }
        });
    }

    fn release(&self) {
        self.input_closed.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.listener.lock() {
            guard.take();
        }
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        debug!("Audio encoder released");
    }
}
