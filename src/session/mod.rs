// SPDX-License-Identifier: GPL-3.0-only

//! Session state machine
//!
//! One explicit state machine gates every long-running operation. The
//! hot-plug monitor, a second user action, and a stale completion from a
//! superseded attempt all funnel through it: an operation may only be
//! entered by an accepted transition on the session loop, and only exited
//! by posting its completion back through the same loop. Scattered boolean
//! flags are deliberately absent.

pub mod events;
pub mod orchestrator;

use crate::constants::net;
use crate::errors::{SessionError, SessionResult};
use std::path::PathBuf;

/// Capture mode selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Photo,
    Video,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Photo => write!(f, "photo"),
            Mode::Video => write!(f, "video"),
        }
    }
}

/// Where the session currently is.
///
/// Busy phases are mutually exclusive: a photo capture and a stream start
/// can never overlap within one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle(Mode),
    CapturingPhoto,
    StartingStream,
    StreamActive,
    Stopping,
}

impl SessionPhase {
    /// Whether a long-running operation owns the session right now.
    /// `StreamActive` counts: the camera is busy feeding the stream.
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionPhase::Idle(_))
    }

    /// The mode this phase belongs to
    pub fn mode(&self) -> Mode {
        match self {
            SessionPhase::Idle(mode) => *mode,
            SessionPhase::CapturingPhoto => Mode::Photo,
            SessionPhase::StartingStream | SessionPhase::StreamActive | SessionPhase::Stopping => {
                Mode::Video
            }
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle(mode) => write!(f, "idle ({})", mode),
            SessionPhase::CapturingPhoto => write!(f, "capturing photo"),
            SessionPhase::StartingStream => write!(f, "starting stream"),
            SessionPhase::StreamActive => write!(f, "stream active"),
            SessionPhase::Stopping => write!(f, "stopping"),
        }
    }
}

/// The state machine plus the generation counter used to drop stale
/// completions from superseded attempts.
#[derive(Debug)]
pub struct SessionState {
    phase: SessionPhase,
    generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle(Mode::Photo),
            generation: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Switch modes; only legal while idle
    pub fn set_mode(&mut self, mode: Mode) -> SessionResult<()> {
        match self.phase {
            SessionPhase::Idle(_) => {
                self.phase = SessionPhase::Idle(mode);
                Ok(())
            }
            phase => Err(SessionError::InvalidTransition(format!(
                "cannot switch mode while {}",
                phase
            ))),
        }
    }

    /// Accept a photo capture; returns the generation the completion must
    /// carry to be honored.
    pub fn begin_photo_capture(&mut self) -> SessionResult<u64> {
        match self.phase {
            SessionPhase::Idle(_) => {
                self.phase = SessionPhase::CapturingPhoto;
                self.generation += 1;
                Ok(self.generation)
            }
            phase => Err(SessionError::InvalidTransition(format!(
                "capture rejected while {}",
                phase
            ))),
        }
    }

    /// Photo capture finished (success or failure): back to idle photo mode.
    /// A stale generation is ignored and reported as such.
    pub fn complete_photo_capture(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != SessionPhase::CapturingPhoto {
            return false;
        }
        self.phase = SessionPhase::Idle(Mode::Photo);
        true
    }

    /// Accept a stream start
    pub fn begin_stream(&mut self) -> SessionResult<u64> {
        match self.phase {
            SessionPhase::Idle(_) => {
                self.phase = SessionPhase::StartingStream;
                self.generation += 1;
                Ok(self.generation)
            }
            phase => Err(SessionError::InvalidTransition(format!(
                "stream start rejected while {}",
                phase
            ))),
        }
    }

    /// The streaming helper reported success
    pub fn stream_started(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != SessionPhase::StartingStream {
            return false;
        }
        self.phase = SessionPhase::StreamActive;
        true
    }

    /// The streaming helper failed: back to idle video mode
    pub fn stream_failed(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != SessionPhase::StartingStream {
            return false;
        }
        self.phase = SessionPhase::Idle(Mode::Video);
        true
    }

    /// Request a stop.
    ///
    /// Returns `Ok(true)` when there is a stream to stop (the caller must
    /// then run the kill path and call [`stop_complete`]), `Ok(false)` when
    /// already stopped or stopping (idempotent, no side effects), and an
    /// error only when a photo capture owns the session.
    ///
    /// [`stop_complete`]: SessionState::stop_complete
    pub fn begin_stop(&mut self) -> SessionResult<bool> {
        match self.phase {
            SessionPhase::StartingStream | SessionPhase::StreamActive => {
                self.phase = SessionPhase::Stopping;
                self.generation += 1;
                Ok(true)
            }
            SessionPhase::Idle(_) | SessionPhase::Stopping => Ok(false),
            SessionPhase::CapturingPhoto => Err(SessionError::InvalidTransition(
                "cannot stop stream while capturing a photo".to_string(),
            )),
        }
    }

    /// The kill path finished: back to idle video mode
    pub fn stop_complete(&mut self) {
        if self.phase == SessionPhase::Stopping {
            self.phase = SessionPhase::Idle(Mode::Video);
        }
    }

    /// Adopt a stream left running by a previous run of this binary.
    /// Only legal while idle; the session becomes active without a start.
    pub fn restore_stream(&mut self) -> SessionResult<u64> {
        match self.phase {
            SessionPhase::Idle(_) => {
                self.phase = SessionPhase::StreamActive;
                self.generation += 1;
                Ok(self.generation)
            }
            phase => Err(SessionError::InvalidTransition(format!(
                "cannot restore session while {}",
                phase
            ))),
        }
    }
}

/// Per-instance session resources
#[derive(Debug)]
pub struct Session {
    /// UDP port derived from this process id; disjoint from other
    /// instances except for the documented pid-modulo collision
    pub udp_port: u16,
    /// Loopback device assigned by the streaming helper; populated only
    /// after a successful start, cleared on stop
    pub assigned_device: Option<PathBuf>,
    /// Process group of the running helper, when this run started it
    pub process_group: Option<i32>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            udp_port: net::udp_port_for_pid(std::process::id()),
            assigned_device: None,
            process_group: None,
        }
    }

    /// Drop per-stream resources after a stop
    pub fn clear_stream(&mut self) {
        self.assigned_device = None;
        self.process_group = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_in_photo_mode() {
        let state = SessionState::new();
        assert_eq!(state.phase(), SessionPhase::Idle(Mode::Photo));
        assert!(!state.phase().is_busy());
    }

    #[test]
    fn busy_states_reject_second_operation() {
        let mut state = SessionState::new();
        let generation = state.begin_photo_capture().unwrap();

        assert!(state.begin_photo_capture().is_err());
        assert!(state.begin_stream().is_err());
        assert!(state.set_mode(Mode::Video).is_err());

        assert!(state.complete_photo_capture(generation));
        assert_eq!(state.phase(), SessionPhase::Idle(Mode::Photo));
    }

    #[test]
    fn capture_and_stream_start_are_mutually_exclusive() {
        let mut state = SessionState::new();
        state.set_mode(Mode::Video).unwrap();
        state.begin_stream().unwrap();
        assert!(state.begin_photo_capture().is_err());
    }

    #[test]
    fn stop_is_idempotent_from_idle() {
        let mut state = SessionState::new();
        assert_eq!(state.begin_stop().unwrap(), false);
        assert_eq!(state.phase(), SessionPhase::Idle(Mode::Photo));
    }

    #[test]
    fn stop_path_returns_to_idle_video() {
        let mut state = SessionState::new();
        let generation = state.begin_stream().unwrap();
        assert!(state.stream_started(generation));

        assert!(state.begin_stop().unwrap());
        assert_eq!(state.phase(), SessionPhase::Stopping);
        // Second stop while stopping: accepted but a no-op
        assert_eq!(state.begin_stop().unwrap(), false);

        state.stop_complete();
        assert_eq!(state.phase(), SessionPhase::Idle(Mode::Video));
    }

    #[test]
    fn stop_is_accepted_while_starting() {
        let mut state = SessionState::new();
        let generation = state.begin_stream().unwrap();
        assert!(state.begin_stop().unwrap());
        state.stop_complete();

        // The superseded start completion no longer moves the machine
        assert!(!state.stream_started(generation));
        assert_eq!(state.phase(), SessionPhase::Idle(Mode::Video));
    }

    #[test]
    fn stale_completions_are_dropped() {
        let mut state = SessionState::new();
        let old = state.begin_photo_capture().unwrap();
        assert!(state.complete_photo_capture(old));

        // A replayed completion with the old generation must not fire
        state.begin_photo_capture().unwrap();
        assert!(!state.complete_photo_capture(old));
        assert_eq!(state.phase(), SessionPhase::CapturingPhoto);
    }

    #[test]
    fn stream_failure_returns_to_idle_video() {
        let mut state = SessionState::new();
        let generation = state.begin_stream().unwrap();
        assert!(state.stream_failed(generation));
        assert_eq!(state.phase(), SessionPhase::Idle(Mode::Video));
    }

    #[test]
    fn mode_switch_only_while_idle() {
        let mut state = SessionState::new();
        state.set_mode(Mode::Video).unwrap();
        assert_eq!(state.phase(), SessionPhase::Idle(Mode::Video));

        let generation = state.begin_stream().unwrap();
        state.stream_started(generation);
        assert!(state.set_mode(Mode::Photo).is_err());
    }

    #[test]
    fn restored_stream_behaves_like_active() {
        let mut state = SessionState::new();
        state.restore_stream().unwrap();
        assert_eq!(state.phase(), SessionPhase::StreamActive);
        assert!(state.begin_stop().unwrap());
    }

    #[test]
    fn preview_failure_does_not_touch_stream_state() {
        // PreviewUnavailable is reported out-of-band; the machine has no
        // transition for it, so an active stream stays active.
        let mut state = SessionState::new();
        let generation = state.begin_stream().unwrap();
        state.stream_started(generation);
        assert_eq!(state.phase(), SessionPhase::StreamActive);
    }

    #[test]
    fn session_port_follows_pid_derivation() {
        let session = Session::new();
        assert_eq!(
            session.udp_port,
            5000 + (std::process::id() % 1000) as u16
        );
    }
}
