// SPDX-License-Identifier: GPL-3.0-only

//! The session orchestrator actor
//!
//! All mutable session state lives here, on one task: the camera registry,
//! the state machine, the detection guard, and the preview decoder. The
//! loop multiplexes user commands, background completions, preview events,
//! and the hot-plug tick; everything blocking runs in a spawned task and
//! reports back with exactly one completion message.

use super::events::{Command, Completion, DetectOrigin, SessionEvent};
use super::{Session, SessionPhase, SessionState};
use crate::camera::{self, CameraRegistry};
use crate::config::Config;
use crate::constants::{timing, tools};
use crate::errors::SessionError;
use crate::preview::transport::ReceivePipeline;
use crate::preview::{PreviewDecoder, PreviewEvent, PreviewEventReceiver};
use crate::{process, storage};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bound on in-flight preview events; frames beyond it are dropped at the
/// producer, never buffered without limit
const PREVIEW_CHANNEL_CAPACITY: usize = 8;

/// Presentation-side handle to a running orchestrator
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Send a command; returns false when the loop has already exited
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// The orchestrator actor. Create with [`Orchestrator::new`], then drive
/// with [`Orchestrator::run`] while the presentation layer consumes the
/// returned event receiver.
pub struct Orchestrator {
    registry: CameraRegistry,
    state: SessionState,
    session: Session,
    config: Config,
    /// Detection guard: set and cleared only on this loop, so the
    /// check-then-set has no race window
    detecting: bool,
    decoder: PreviewDecoder,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    preview_rx: PreviewEventReceiver,
}

impl Orchestrator {
    /// Build an orchestrator plus its presentation-side endpoints
    pub fn new(
        config: Config,
    ) -> (
        Self,
        SessionHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (preview_tx, preview_rx) = futures::channel::mpsc::channel(PREVIEW_CHANNEL_CAPACITY);

        let session = Session::new();
        info!(udp_port = session.udp_port, "Session created");

        let orchestrator = Self {
            registry: CameraRegistry::new(),
            state: SessionState::new(),
            session,
            config,
            detecting: false,
            decoder: PreviewDecoder::new(preview_tx),
            events: events_tx,
            commands_rx,
            completions_tx,
            completions_rx,
            preview_rx,
        };
        let handle = SessionHandle {
            commands: commands_tx,
        };

        (orchestrator, handle, events_rx)
    }

    /// Run the loop until a `Shutdown` command (or all handles dropped),
    /// then tear the session down.
    pub async fn run(mut self) {
        self.start_detection(DetectOrigin::Startup);

        let hotplug_period = Duration::from_secs(self.config.hotplug_interval_secs.max(1));
        let mut hotplug = tokio::time::interval_at(
            tokio::time::Instant::now() + hotplug_period,
            hotplug_period,
        );

        loop {
            tokio::select! {
                command = self.commands_rx.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion).await;
                }
                Some(event) = self.preview_rx.next() => {
                    self.handle_preview_event(event);
                }
                _ = hotplug.tick() => {
                    self.poll_for_changes().await;
                }
            }
        }

        self.teardown().await;
    }

    // ===== Commands =====

    async fn handle_command(&mut self, command: Command) {
        debug!(?command, phase = %self.state.phase(), "Handling command");
        match command {
            Command::RefreshCameras => self.start_detection(DetectOrigin::Manual),
            Command::SelectCamera(index) => {
                if self.registry.select(index).is_some() {
                    self.emit_cameras();
                }
            }
            Command::SetMode(mode) => match self.state.set_mode(mode) {
                Ok(()) => self.emit_phase(),
                Err(e) => self.emit(SessionEvent::Error(e)),
            },
            Command::CapturePhoto => self.start_photo_capture(),
            Command::StartStream => self.start_stream(),
            Command::StopStream => self.stop_stream().await,
            Command::Shutdown => unreachable!("handled by the loop"),
        }
    }

    fn start_photo_capture(&mut self) {
        let generation = match self.state.begin_photo_capture() {
            Ok(generation) => generation,
            Err(e) => {
                self.emit(SessionEvent::Error(e));
                return;
            }
        };
        self.emit_phase();

        let camera = self.registry.selected_camera().cloned();
        let photo_dir = self.config.resolve_photo_dir();
        let udp_port = self.session.udp_port;
        let completions = self.completions_tx.clone();

        tokio::spawn(async move {
            let result = async {
                let dir = photo_dir.clone();
                let target = tokio::task::spawn_blocking(move || storage::next_filename(&dir))
                    .await
                    .map_err(|e| SessionError::Io(e.to_string()))?;

                process::capture_still(camera.as_ref(), &target, &photo_dir, udp_port).await
            }
            .await;

            let _ = completions.send(Completion::Photo { generation, result });
        });
    }

    fn start_stream(&mut self) {
        let generation = match self.state.begin_stream() {
            Ok(generation) => generation,
            Err(e) => {
                self.emit(SessionEvent::Error(e));
                return;
            }
        };
        self.emit_phase();

        let script = self.config.resolve_helper_script();
        let camera_port = self.registry.selected_camera().map(|c| c.port.clone());
        let udp_port = self.session.udp_port;
        let completions = self.completions_tx.clone();

        tokio::spawn(async move {
            let result =
                process::start_stream(&script, camera_port.as_deref(), udp_port).await;
            let _ = completions.send(Completion::Stream { generation, result });
        });
    }

    async fn stop_stream(&mut self) {
        match self.state.begin_stop() {
            Ok(true) => {}
            Ok(false) => {
                debug!("Stop requested with nothing to stop");
                return;
            }
            Err(e) => {
                self.emit(SessionEvent::Error(e));
                return;
            }
        }
        self.emit_phase();

        self.decoder.detach();
        self.emit(SessionEvent::PreviewCleared);

        if let Some(pgid) = self.session.process_group.take() {
            process::terminate_group(pgid);
        }
        let port = self.registry.selected_camera().map(|c| c.port.clone());
        process::sweep_session(port.as_deref(), self.session.udp_port).await;

        self.session.clear_stream();
        self.state.stop_complete();
        self.emit(SessionEvent::StreamStopped);
        self.emit_phase();
    }

    // ===== Detection =====

    /// Single entry point for startup, manual refresh, and hot-plug.
    ///
    /// When a detection is already in flight the request short-circuits,
    /// but the completion still fires so callers always see detection
    /// finish.
    fn start_detection(&mut self, origin: DetectOrigin) {
        if self.detecting {
            debug!(?origin, "Detection already in progress");
            let _ = self.completions_tx.send(Completion::Detection {
                origin,
                result: None,
            });
            return;
        }

        self.detecting = true;
        self.emit(SessionEvent::Detecting(true));

        let completions = self.completions_tx.clone();
        let retry = origin.retry_budget();
        tokio::spawn(async move {
            let result = camera::detect_cameras(retry).await;
            let _ = completions.send(Completion::Detection {
                origin,
                result: Some(result),
            });
        });
    }

    /// Hot-plug tick. Must never race an active operation: the busy state,
    /// the detection guard, and a running capture-tool process each veto
    /// the probe outright.
    async fn poll_for_changes(&mut self) {
        if self.state.phase().is_busy() {
            debug!("Hot-plug poll skipped: session busy");
            return;
        }
        if self.detecting {
            debug!("Hot-plug poll skipped: detection in flight");
            return;
        }
        if process::helper_running(tools::CAPTURE_TOOL).await {
            debug!("Hot-plug poll skipped: capture tool running");
            return;
        }

        self.start_detection(DetectOrigin::Hotplug);
    }

    // ===== Completions =====

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Detection { origin, result } => {
                self.finish_detection(origin, result).await;
            }
            Completion::Photo { generation, result } => {
                if !self.state.complete_photo_capture(generation) {
                    debug!(generation, "Dropping stale photo completion");
                    return;
                }
                self.emit_phase();
                match result {
                    Ok(path) => {
                        self.emit(SessionEvent::PhotoSaved(path));
                        self.load_thumbnail();
                    }
                    Err(e) => self.emit(SessionEvent::Error(e)),
                }
            }
            Completion::Stream { generation, result } => match result {
                Ok(start) => {
                    if !self.state.stream_started(generation) {
                        // Stopped (or superseded) while the helper was
                        // starting; reap what it left behind.
                        debug!(generation, "Stream start superseded, reaping helper");
                        process::terminate_group(start.pgid);
                        let port = self.registry.selected_camera().map(|c| c.port.clone());
                        process::sweep_session(port.as_deref(), self.session.udp_port).await;
                        return;
                    }
                    self.session.process_group = Some(start.pgid);
                    self.session.assigned_device = start.device.clone();
                    self.emit(SessionEvent::StreamStarted {
                        device: start.device,
                    });
                    self.emit_phase();
                    if self.config.preview_enabled {
                        self.attach_preview(generation);
                    }
                }
                Err(e) => {
                    if self.state.stream_failed(generation) {
                        self.emit(SessionEvent::Error(e));
                        self.emit_phase();
                    }
                }
            },
            Completion::PreviewReady {
                generation,
                pipeline,
            } => self.finish_preview_attach(generation, pipeline),
            Completion::ThumbnailLoaded(thumbnail) => {
                if let Some(thumbnail) = thumbnail {
                    self.emit(SessionEvent::Thumbnail(thumbnail));
                }
            }
        }
    }

    async fn finish_detection(
        &mut self,
        origin: DetectOrigin,
        result: Option<Result<Vec<camera::CameraRecord>, SessionError>>,
    ) {
        let Some(result) = result else {
            // Short-circuited request: detection "finished" without fresh
            // data; callers must tolerate this.
            self.emit(SessionEvent::Detecting(false));
            return;
        };

        self.detecting = false;
        self.emit(SessionEvent::Detecting(false));

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                self.emit(SessionEvent::Error(e));
                return;
            }
        };

        let changed = self.registry.differs_from(&records);
        if records.is_empty() && origin != DetectOrigin::Hotplug {
            self.emit(SessionEvent::Error(SessionError::CameraNotDetected));
        }

        // Hot-plug only refreshes on an actual set difference; direct
        // requests always report back.
        if changed || origin != DetectOrigin::Hotplug {
            self.registry.replace(records);
            self.emit_cameras();
        }

        if origin == DetectOrigin::Startup {
            self.restore_existing_session().await;
            self.load_thumbnail();
        }
    }

    /// Adopt a streaming session left behind by a previous run: the helper
    /// is still feeding the loopback device, so the session becomes active
    /// without a new start and without grabbing the preview (the device
    /// stays free for external consumers).
    async fn restore_existing_session(&mut self) {
        let Some(port) = self.registry.selected_camera().map(|c| c.port.clone()) else {
            return;
        };

        let pattern = format!("{}.*{}", tools::CAPTURE_TOOL, port);
        if !process::helper_running(&pattern).await {
            return;
        }

        match self.state.restore_stream() {
            Ok(_) => {
                info!(port = %port, "Restored streaming session from previous run");
                self.emit(SessionEvent::SessionRestored);
                self.emit_phase();
            }
            Err(e) => debug!(error = %e, "Session restore skipped"),
        }
    }

    // ===== Preview =====

    fn attach_preview(&mut self, generation: u64) {
        let udp_port = self.session.udp_port;
        let completions = self.completions_tx.clone();
        let preview_events = self.decoder.event_sender();

        tokio::spawn(async move {
            // Give the helper's pipeline a moment to produce packets
            tokio::time::sleep(timing::PREVIEW_WARMUP).await;

            let pipeline = tokio::task::spawn_blocking(move || {
                ReceivePipeline::attach(udp_port, preview_events)
            })
            .await
            .ok()
            .flatten();

            let _ = completions.send(Completion::PreviewReady {
                generation,
                pipeline,
            });
        });
    }

    fn finish_preview_attach(&mut self, generation: u64, pipeline: Option<ReceivePipeline>) {
        let current = self.state.phase() == SessionPhase::StreamActive
            && generation == self.state.generation();

        match (current, pipeline) {
            (true, Some(pipeline)) => {
                self.decoder
                    .install_transport(self.session.assigned_device.clone(), pipeline);
            }
            (true, None) => {
                // Preview is a notice, not a failure: the stream stays up
                warn!("Preview unavailable; stream unaffected");
                self.emit(SessionEvent::Error(SessionError::PreviewUnavailable));
            }
            (false, Some(pipeline)) => {
                debug!(generation, "Discarding preview for superseded stream");
                pipeline.shutdown();
            }
            (false, None) => {}
        }
    }

    fn handle_preview_event(&mut self, event: PreviewEvent) {
        match event {
            PreviewEvent::Frame(frame) => self.emit(SessionEvent::PreviewFrame(frame)),
            PreviewEvent::Fps(rate) => self.emit(SessionEvent::PreviewFps(rate)),
            PreviewEvent::TransportError(message) => {
                warn!(message = %message, "Preview transport failed, trying exclusive fallback");
                if self.decoder.fall_back().is_err() {
                    self.emit(SessionEvent::Error(SessionError::PreviewUnavailable));
                    self.emit(SessionEvent::PreviewCleared);
                }
            }
        }
    }

    fn load_thumbnail(&self) {
        let dir = self.config.resolve_photo_dir();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let thumbnail = storage::load_latest_thumbnail(dir).await;
            let _ = completions.send(Completion::ThumbnailLoaded(thumbnail));
        });
    }

    // ===== Teardown =====

    /// Exit cleanup: tracked-handle kill plus the broad sweep, because a
    /// previous crashed run may have left orphans the handle knows nothing
    /// about.
    async fn teardown(&mut self) {
        info!("Tearing down session");

        self.decoder.detach();
        self.emit(SessionEvent::PreviewCleared);

        if let Some(pgid) = self.session.process_group.take() {
            process::terminate_group(pgid);
        }
        let port = self.registry.selected_camera().map(|c| c.port.clone());
        process::sweep_session(port.as_deref(), self.session.udp_port).await;
        self.session.clear_stream();
    }

    // ===== Event helpers =====

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn emit_phase(&self) {
        self.emit(SessionEvent::PhaseChanged(self.state.phase()));
    }

    fn emit_cameras(&self) {
        self.emit(SessionEvent::CamerasChanged {
            cameras: self.registry.cameras().to_vec(),
            selected: self.registry.selected_index(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_command_ends_the_loop() {
        let (orchestrator, handle, mut events) = Orchestrator::new(Config {
            // Detached from the real config dir; no helper, no preview
            preview_enabled: false,
            ..Config::default()
        });

        let task = tokio::spawn(orchestrator.run());
        assert!(handle.send(Command::Shutdown));

        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("loop did not exit")
            .unwrap();

        // The loop emitted teardown events before exiting
        let mut saw_cleared = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::PreviewCleared) {
                saw_cleared = true;
            }
        }
        assert!(saw_cleared);
    }

    #[tokio::test]
    async fn handle_reports_closed_loop() {
        let (orchestrator, handle, _events) = Orchestrator::new(Config::default());
        drop(orchestrator);
        // The receiving side is gone; sends must fail, not panic
        assert!(!handle.send(Command::RefreshCameras));
    }
}
