// SPDX-License-Identifier: GPL-3.0-only

//! UDP/MPEG-TS receive pipeline
//!
//! The streaming helper multicasts nothing: it sends MPEG-TS over UDP to
//! 127.0.0.1 on this instance's derived port. Reception is attempted with a
//! fixed list of transport variants because binding behavior differs across
//! network configurations; each variant gets a uniform build → start →
//! confirm → teardown cycle and a bounded startup window before the next
//! one is tried.

use super::{FpsCounter, PreviewEvent, PreviewEventSender, PreviewFrame};
use crate::constants::{pipeline as pipeline_consts, timing};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// One receive transport configuration, tried in fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportVariant {
    pub label: &'static str,
    /// Bind udpsrc to 127.0.0.1 instead of all interfaces
    pub bind_localhost: bool,
    /// Demux explicitly with tsdemux ahead of decodebin
    pub explicit_demux: bool,
}

/// The fallback order: explicit localhost binding first, then the
/// permissive all-interfaces form for setups where the localhost bind
/// does not see the helper's packets.
pub const TRANSPORT_VARIANTS: [TransportVariant; 2] = [
    TransportVariant {
        label: "localhost",
        bind_localhost: true,
        explicit_demux: true,
    },
    TransportVariant {
        label: "any-interface",
        bind_localhost: false,
        explicit_demux: false,
    },
];

impl TransportVariant {
    /// Build the gst-launch description for this variant
    pub fn pipeline_description(&self, udp_port: u16) -> String {
        let address = if self.bind_localhost {
            " address=127.0.0.1"
        } else {
            ""
        };
        let demux = if self.explicit_demux { "tsdemux ! " } else { "" };

        format!(
            "udpsrc port={port}{address} caps=\"video/mpegts,packetsize=(int){packet}\" ! \
             queue max-size-bytes={queue_bytes} ! \
             {demux}decodebin ! \
             videoconvert ! \
             video/x-raw,format={format} ! \
             appsink name=sink sync=false",
            port = udp_port,
            address = address,
            packet = pipeline_consts::TS_PACKET_SIZE,
            queue_bytes = pipeline_consts::QUEUE_MAX_BYTES,
            demux = demux,
            format = pipeline_consts::OUTPUT_FORMAT,
        )
    }
}

/// A running receive pipeline with its bus watch thread
pub struct ReceivePipeline {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    variant: TransportVariant,
    bus_stop: Arc<AtomicBool>,
    bus_thread: Option<std::thread::JoinHandle<()>>,
}

impl ReceivePipeline {
    /// Try every transport variant in order; `None` when all of them fail.
    ///
    /// Each failed variant is torn down completely (NULL state, callbacks
    /// cleared) before the next one is built, so a half-started pipeline
    /// never lingers on the port.
    pub fn attach(udp_port: u16, events: PreviewEventSender) -> Option<Self> {
        if let Err(e) = gstreamer::init() {
            warn!(error = %e, "GStreamer initialization failed");
            return None;
        }

        for variant in TRANSPORT_VARIANTS {
            debug!(variant = variant.label, "Trying preview transport");
            match Self::try_variant(variant, udp_port, events.clone()) {
                Ok(pipeline) => return Some(pipeline),
                Err(e) => {
                    debug!(variant = variant.label, error = %e, "Transport variant failed");
                }
            }
        }

        None
    }

    /// The label of the variant that won
    pub fn variant_label(&self) -> &'static str {
        self.variant.label
    }

    fn try_variant(
        variant: TransportVariant,
        udp_port: u16,
        events: PreviewEventSender,
    ) -> Result<Self, String> {
        let description = variant.pipeline_description(udp_port);
        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| format!("parse failed: {}", e))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| "not a pipeline".to_string())?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| "appsink not found".to_string())?
            .dynamic_cast::<AppSink>()
            .map_err(|_| "failed to cast appsink".to_string())?;

        appsink.set_property("max-buffers", pipeline_consts::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        let mut fps = FpsCounter::new();
        let frame_events = events.clone();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;

                    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
                    let video_info =
                        VideoInfo::from_caps(caps).map_err(|_| gstreamer::FlowError::Error)?;
                    let map = buffer
                        .map_readable()
                        .map_err(|_| gstreamer::FlowError::Error)?;

                    // Copy the pixels out of the GStreamer buffer; the frame
                    // crosses to the session loop and outlives this sample.
                    let frame = PreviewFrame {
                        width: video_info.width(),
                        height: video_info.height(),
                        data: Arc::from(map.as_slice()),
                    };

                    // Non-blocking send; a slow consumer just loses frames
                    let mut sender = frame_events.clone();
                    let _ = sender.try_send(PreviewEvent::Frame(frame));

                    if let Some(rate) = fps.tick() {
                        let mut sender = frame_events.clone();
                        let _ = sender.try_send(PreviewEvent::Fps(rate));
                    }

                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if pipeline.set_state(gstreamer::State::Playing).is_err() {
            Self::teardown(&pipeline, &appsink);
            return Err("refused to start".to_string());
        }

        // Bounded startup confirmation: PLAYING or an async transition in
        // progress counts as success, an error or timeout does not.
        let (result, state, _pending) = pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::PREVIEW_STATE_TIMEOUT_SECS,
        ));
        let started = match result {
            Ok(_) => true,
            Err(_) => state == gstreamer::State::Playing,
        };
        if !started {
            Self::teardown(&pipeline, &appsink);
            return Err(format!("did not reach PLAYING (state {:?})", state));
        }

        info!(variant = variant.label, udp_port, "Receive pipeline playing");

        // Watch the bus for transport errors on a dedicated thread; an
        // error is reported once and the session loop decides what to do.
        let bus_stop = Arc::new(AtomicBool::new(false));
        let bus_thread = pipeline.bus().map(|bus| {
            let stop = Arc::clone(&bus_stop);
            let mut error_events = events;
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let message = bus.timed_pop_filtered(
                        gstreamer::ClockTime::from_mseconds(500),
                        &[gstreamer::MessageType::Error],
                    );
                    if let Some(message) = message
                        && let gstreamer::MessageView::Error(err) = message.view()
                    {
                        warn!(error = %err.error(), "Preview transport error");
                        let _ = error_events
                            .try_send(PreviewEvent::TransportError(err.error().to_string()));
                        break;
                    }
                }
            })
        });

        Ok(Self {
            pipeline,
            appsink,
            variant,
            bus_stop,
            bus_thread,
        })
    }

    fn teardown(pipeline: &gstreamer::Pipeline, appsink: &AppSink) {
        appsink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        let _ = pipeline.set_state(gstreamer::State::Null);
    }

    /// Stop the pipeline and release the port
    pub fn shutdown(mut self) {
        debug!(variant = self.variant.label, "Shutting down receive pipeline");

        self.bus_stop.store(true, Ordering::SeqCst);

        Self::teardown(&self.pipeline, &self.appsink);
        let (_, state, _) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        debug!(state = ?state, "Receive pipeline stopped");

        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceivePipeline {
    fn drop(&mut self) {
        self.bus_stop.store(true, Ordering::SeqCst);
        Self::teardown(&self.pipeline, &self.appsink);
        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_are_tried_localhost_first() {
        assert_eq!(TRANSPORT_VARIANTS.len(), 2);
        assert!(TRANSPORT_VARIANTS[0].bind_localhost);
        assert!(!TRANSPORT_VARIANTS[1].bind_localhost);
    }

    #[test]
    fn localhost_description_binds_and_demuxes() {
        let desc = TRANSPORT_VARIANTS[0].pipeline_description(5123);
        assert!(desc.contains("udpsrc port=5123 address=127.0.0.1"));
        assert!(desc.contains("packetsize=(int)1316"));
        assert!(desc.contains("tsdemux ! decodebin"));
        assert!(desc.contains("format=RGB"));
        assert!(desc.contains("appsink name=sink"));
    }

    #[test]
    fn fallback_description_binds_all_interfaces() {
        let desc = TRANSPORT_VARIANTS[1].pipeline_description(5123);
        assert!(desc.contains("udpsrc port=5123 caps="));
        assert!(!desc.contains("address="));
        assert!(!desc.contains("tsdemux"));
    }
}
