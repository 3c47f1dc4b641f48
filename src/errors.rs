// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera session orchestrator

use std::fmt;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors reported by the orchestrator and its components.
///
/// Background failures never cross a thread boundary uncaught: every worker
/// converts its outcome into one of these and posts it back to the session
/// loop as an event. None of them terminate the process; the worst case is a
/// reported error plus best-effort cleanup.
#[derive(Debug, Clone)]
pub enum SessionError {
    /// Detection found zero devices, including the internal retry
    CameraNotDetected,
    /// A still-capture attempt exceeded its deadline
    CaptureTimeout,
    /// Still capture failed after exhausting the retry budget;
    /// carries the last diagnostic text from the capture tool
    CaptureFailed(String),
    /// The streaming helper exited non-zero; carries its combined output
    StreamStartFailed(String),
    /// Every preview transport variant failed. The underlying stream is not
    /// affected and may still be consumed by external programs.
    PreviewUnavailable,
    /// An external binary or script is absent; carries its name.
    /// Distinct from a busy-camera failure so the user can act on it.
    ToolMissing(String),
    /// A state-machine transition was rejected (operation already in
    /// progress, or mode switch while busy)
    InvalidTransition(String),
    /// I/O error talking to the filesystem or a child process
    Io(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::CameraNotDetected => write!(f, "No camera detected"),
            SessionError::CaptureTimeout => write!(f, "Capture timed out"),
            SessionError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            SessionError::StreamStartFailed(msg) => write!(f, "Stream start failed: {}", msg),
            SessionError::PreviewUnavailable => {
                write!(f, "Preview unavailable (stream itself unaffected)")
            }
            SessionError::ToolMissing(name) => write!(f, "Required tool not installed: {}", name),
            SessionError::InvalidTransition(msg) => write!(f, "Operation rejected: {}", msg),
            SessionError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err.to_string())
    }
}

impl SessionError {
    /// Whether this error leaves the session usable (degraded) rather than
    /// aborting the current operation's result entirely
    pub fn is_degraded_only(&self) -> bool {
        matches!(self, SessionError::PreviewUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_missing_is_distinct_from_capture_failure() {
        let missing = SessionError::ToolMissing("gphoto2".to_string());
        let failed = SessionError::CaptureFailed("busy".to_string());
        assert!(missing.to_string().contains("not installed"));
        assert!(!failed.to_string().contains("not installed"));
    }

    #[test]
    fn preview_unavailable_is_degraded_only() {
        assert!(SessionError::PreviewUnavailable.is_degraded_only());
        assert!(!SessionError::CameraNotDetected.is_degraded_only());
    }
}
