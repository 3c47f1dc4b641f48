// SPDX-License-Identifier: GPL-3.0-only

//! Messages crossing the session loop boundary
//!
//! Presentation code talks to the orchestrator exclusively through
//! [`Command`] and hears back exclusively through [`SessionEvent`].
//! Background workers report through [`Completion`]; every spawned task
//! posts exactly one.

use crate::camera::CameraRecord;
use crate::errors::SessionError;
use crate::preview::PreviewFrame;
use crate::process::StreamStart;
use crate::session::{Mode, SessionPhase};
use crate::storage::Thumbnail;
use std::path::PathBuf;

/// User intent, sent by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Re-run camera detection now (no automatic retry on empty)
    RefreshCameras,
    /// Select a camera by dropdown index
    SelectCamera(usize),
    /// Switch between photo and video mode (only honored while idle)
    SetMode(Mode),
    /// Take a still photo with the selected camera
    CapturePhoto,
    /// Start webcam streaming with the selected camera
    StartStream,
    /// Stop the running stream (no-op when already stopped)
    StopStream,
    /// Tear everything down and exit the loop
    Shutdown,
}

/// What the presentation layer renders
#[derive(Debug)]
pub enum SessionEvent {
    /// Detection started or finished
    Detecting(bool),
    /// Fresh camera list (wholesale rebuild) plus the preserved selection
    CamerasChanged {
        cameras: Vec<CameraRecord>,
        selected: usize,
    },
    /// The state machine moved
    PhaseChanged(SessionPhase),
    /// A still was captured; the path is the authoritative target name
    PhotoSaved(PathBuf),
    /// Decoded thumbnail of the latest capture
    Thumbnail(Thumbnail),
    /// The stream is up, with the loopback device when the helper named one
    StreamStarted { device: Option<PathBuf> },
    /// The stream was stopped and its processes reaped
    StreamStopped,
    /// A stream from a previous run of this binary was adopted
    SessionRestored,
    /// One decoded preview frame
    PreviewFrame(PreviewFrame),
    /// Observed preview frame rate over the last second
    PreviewFps(u32),
    /// Preview output should be cleared (detach or stop)
    PreviewCleared,
    /// A reported, non-fatal failure
    Error(SessionError),
}

/// Which path asked for a detection pass; decides the retry budget and
/// whether an unchanged camera set is worth an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectOrigin {
    Startup,
    Manual,
    Hotplug,
}

impl DetectOrigin {
    /// Automatic callers get one silent re-probe on an empty result;
    /// a manual refresh does not.
    pub fn retry_budget(&self) -> u32 {
        match self {
            DetectOrigin::Manual => 0,
            DetectOrigin::Startup | DetectOrigin::Hotplug => 1,
        }
    }
}

/// Completion messages posted by background tasks into the session loop
pub(crate) enum Completion {
    /// Detection finished. `result` is `None` when the request
    /// short-circuited because a detection was already in flight; the
    /// callback still fires, without fresh data.
    Detection {
        origin: DetectOrigin,
        result: Option<Result<Vec<CameraRecord>, SessionError>>,
    },
    /// Still capture finished
    Photo {
        generation: u64,
        result: Result<PathBuf, SessionError>,
    },
    /// Streaming helper exited
    Stream {
        generation: u64,
        result: Result<StreamStart, SessionError>,
    },
    /// Preview transport attach finished (pipeline present on success)
    PreviewReady {
        generation: u64,
        pipeline: Option<crate::preview::transport::ReceivePipeline>,
    },
    /// Latest-capture thumbnail decoded
    ThumbnailLoaded(Option<Thumbnail>),
}
