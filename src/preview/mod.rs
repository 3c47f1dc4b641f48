// SPDX-License-Identifier: GPL-3.0-only

//! Live preview decoding
//!
//! The preview taps the same UDP/MPEG-TS stream the loopback device is fed
//! from, so it never competes with external consumers (OBS, a browser) for
//! the virtual camera. Reception goes through an ordered list of transport
//! variants; only when the whole chain is dead does the decoder fall back
//! to opening the loopback device itself, an exclusive-access path of last
//! resort. A preview that cannot be established is a notice, not a failure:
//! the underlying stream keeps running either way.

pub mod fallback;
pub mod transport;

use crate::errors::{SessionError, SessionResult};
use fallback::FallbackCapture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use transport::ReceivePipeline;

/// One decoded preview frame, RGB, ready for display
#[derive(Clone)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB pixel data (3 bytes per pixel)
    pub data: Arc<[u8]>,
}

impl std::fmt::Debug for PreviewFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PreviewFrame({}x{}, {} bytes)",
            self.width,
            self.height,
            self.data.len()
        )
    }
}

/// Events emitted by whichever preview backend is active.
///
/// These originate on the decoder's own threads and are marshalled to the
/// session loop through a channel; backends never touch session state.
#[derive(Debug)]
pub enum PreviewEvent {
    Frame(PreviewFrame),
    /// Observed frames per second over the last one-second window
    Fps(u32),
    /// The transport pipeline reported a fatal error; the session loop
    /// decides whether to fall back to exclusive capture
    TransportError(String),
}

/// Sender for preview events (frame callbacks use non-blocking try_send)
pub type PreviewEventSender = futures::channel::mpsc::Sender<PreviewEvent>;

/// Receiver side, consumed by the session loop
pub type PreviewEventReceiver = futures::channel::mpsc::Receiver<PreviewEvent>;

/// One-second rolling frame counter
pub(crate) struct FpsCounter {
    count: u32,
    window_start: Instant,
}

impl FpsCounter {
    pub(crate) fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// Count one frame; returns the rate once per elapsed second
    pub(crate) fn tick(&mut self) -> Option<u32> {
        self.count += 1;
        if self.window_start.elapsed().as_secs_f64() >= 1.0 {
            let fps = self.count;
            self.count = 0;
            self.window_start = Instant::now();
            Some(fps)
        } else {
            None
        }
    }
}

enum ActiveBackend {
    None,
    Transport(ReceivePipeline),
    Exclusive(FallbackCapture),
}

/// Preview decoder: owns whichever receive backend is currently active
pub struct PreviewDecoder {
    backend: ActiveBackend,
    /// Loopback device assigned to this session, used by the fallback path
    device: Option<PathBuf>,
    events: PreviewEventSender,
}

impl PreviewDecoder {
    pub fn new(events: PreviewEventSender) -> Self {
        Self {
            backend: ActiveBackend::None,
            device: None,
            events,
        }
    }

    /// Whether any backend is currently delivering frames
    pub fn is_attached(&self) -> bool {
        !matches!(self.backend, ActiveBackend::None)
    }

    /// A sender for the decoder's event channel, for backends built on a
    /// worker (the session loop attaches transports off-thread)
    pub fn event_sender(&self) -> PreviewEventSender {
        self.events.clone()
    }

    /// Adopt a transport pipeline that was attached on a worker thread.
    /// Any previously active backend is torn down first.
    pub fn install_transport(&mut self, device: Option<PathBuf>, pipeline: ReceivePipeline) {
        self.detach_backend();
        self.device = device;
        info!(variant = pipeline.variant_label(), "Preview transport installed");
        self.backend = ActiveBackend::Transport(pipeline);
    }

    /// Attach to the stream on `udp_port`, trying each transport variant in
    /// order. `device` is remembered for the exclusive fallback.
    ///
    /// All variants failing yields `PreviewUnavailable`; the caller must
    /// treat that as a degraded state, not as a stream failure.
    pub fn attach(&mut self, device: Option<PathBuf>, udp_port: u16) -> SessionResult<()> {
        self.detach();
        self.device = device;

        match ReceivePipeline::attach(udp_port, self.events.clone()) {
            Some(pipeline) => {
                info!(udp_port, variant = pipeline.variant_label(), "Preview attached");
                self.backend = ActiveBackend::Transport(pipeline);
                Ok(())
            }
            None => {
                warn!(udp_port, "All preview transport variants failed");
                Err(SessionError::PreviewUnavailable)
            }
        }
    }

    /// Switch to the exclusive-access capture path after a transport error.
    ///
    /// The transport pipeline is torn down completely first; the fallback
    /// opens the loopback device directly and competes with any external
    /// consumer for it, which is why it is last resort only.
    pub fn fall_back(&mut self) -> SessionResult<()> {
        let Some(device) = self.device.clone() else {
            return Err(SessionError::PreviewUnavailable);
        };

        self.detach_backend();

        match FallbackCapture::start(&device, self.events.clone()) {
            Ok(capture) => {
                info!(device = ?device, "Preview fell back to exclusive capture");
                self.backend = ActiveBackend::Exclusive(capture);
                Ok(())
            }
            Err(e) => {
                warn!(device = ?device, error = %e, "Exclusive fallback failed");
                Err(SessionError::PreviewUnavailable)
            }
        }
    }

    /// Stop whichever backend is active and release the device handle.
    /// Safe to call when nothing is attached.
    pub fn detach(&mut self) {
        self.detach_backend();
        self.device = None;
    }

    fn detach_backend(&mut self) {
        match std::mem::replace(&mut self.backend, ActiveBackend::None) {
            ActiveBackend::None => {}
            ActiveBackend::Transport(pipeline) => pipeline.shutdown(),
            ActiveBackend::Exclusive(capture) => capture.stop(),
        }
    }
}

impl Drop for PreviewDecoder {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_counter_reports_once_per_window() {
        let mut counter = FpsCounter::new();
        // Within the same instant no report is due
        for _ in 0..10 {
            assert!(counter.tick().is_none());
        }
        // Force the window to look expired
        counter.window_start = Instant::now() - std::time::Duration::from_secs(2);
        assert_eq!(counter.tick(), Some(11));
        assert!(counter.tick().is_none());
    }

    #[test]
    fn detach_without_attach_is_a_no_op() {
        let (sender, _receiver) = futures::channel::mpsc::channel(4);
        let mut decoder = PreviewDecoder::new(sender);
        decoder.detach();
        decoder.detach();
        assert!(!decoder.is_attached());
    }

    #[test]
    fn fallback_without_device_reports_unavailable() {
        let (sender, _receiver) = futures::channel::mpsc::channel(4);
        let mut decoder = PreviewDecoder::new(sender);
        assert!(matches!(
            decoder.fall_back(),
            Err(SessionError::PreviewUnavailable)
        ));
    }
}
