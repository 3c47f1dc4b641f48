// SPDX-License-Identifier: GPL-3.0-only

//! Streaming helper launch
//!
//! The helper script owns the actual capture pipeline (capture tool piped
//! into an encoder feeding a loopback device) and is treated as an opaque
//! process with a narrow contract: it takes `(camera_port, udp_port)` as
//! positional arguments, waits until its own pipeline is ready, prints
//! `SUCCESS: <device-path>` on stdout and exits 0, or exits non-zero with
//! diagnostics on its combined output.

use crate::constants::tools;
use crate::errors::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{info, warn};

/// Result of a successful helper run
#[derive(Debug, Clone)]
pub struct StreamStart {
    /// Virtual device path announced by the helper, when it printed one
    pub device: Option<PathBuf>,
    /// Process group id of the helper; the pipeline's descendants stay in
    /// this group, so one `killpg` stops the whole tree
    pub pgid: i32,
}

/// Extract the device path from the helper's stdout.
///
/// The helper may log freely before the marker line; only a line beginning
/// with the success marker counts.
pub fn parse_success_line(stdout: &str) -> Option<PathBuf> {
    stdout.lines().find_map(|line| {
        line.strip_prefix(tools::STREAM_SUCCESS_MARKER)
            .map(|rest| PathBuf::from(rest.trim()))
    })
}

/// Launch the streaming helper and wait for it to finish starting up.
///
/// Blocks the calling task until the helper exits; the helper is
/// responsible for waiting until its pipeline is ready before returning.
/// The child is spawned as a new process group so the returned pgid covers
/// every descendant it leaves running.
pub async fn start_stream(
    script: &Path,
    camera_port: Option<&str>,
    udp_port: u16,
) -> SessionResult<StreamStart> {
    if !script.exists() {
        return Err(SessionError::ToolMissing(script.display().to_string()));
    }

    info!(script = ?script, camera_port, udp_port, "Launching streaming helper");

    let mut cmd = std::process::Command::new(script);
    cmd.arg(camera_port.unwrap_or(""))
        .arg(udp_port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = match tokio::process::Command::from(cmd).spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SessionError::ToolMissing(script.display().to_string()));
        }
        Err(e) => return Err(SessionError::Io(e.to_string())),
    };

    // With process_group(0) the child leads its own group, so pgid == pid
    let pgid = child.id().map(|pid| pid as i32).unwrap_or(0);

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        // The helper logs to stdout (it redirects stderr into it), so
        // prefer stdout for diagnostics and fall back to stderr.
        let mut diagnostic = stdout.trim().to_string();
        if diagnostic.is_empty() {
            diagnostic = stderr.trim().to_string();
        }
        if diagnostic.is_empty() {
            diagnostic = "unknown error (no output)".to_string();
        }
        warn!(status = ?output.status, "Streaming helper failed");
        return Err(SessionError::StreamStartFailed(diagnostic));
    }

    let device = parse_success_line(&stdout);
    info!(device = ?device, pgid, "Streaming helper ready");

    Ok(StreamStart { device, pgid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_from_success_line() {
        let stdout = "loading modules\nwaiting for stream\nSUCCESS: /dev/video9\n";
        assert_eq!(
            parse_success_line(stdout),
            Some(PathBuf::from("/dev/video9"))
        );
    }

    #[test]
    fn no_marker_means_no_device() {
        assert_eq!(parse_success_line("all good, probably\n"), None);
        assert_eq!(parse_success_line(""), None);
    }

    #[test]
    fn marker_must_start_the_line() {
        assert_eq!(parse_success_line("note: SUCCESS: /dev/video0\n"), None);
    }

    #[tokio::test]
    async fn missing_script_is_tool_missing() {
        let result = start_stream(Path::new("/nonexistent/run_webcam.sh"), None, 5000).await;
        assert!(matches!(result, Err(SessionError::ToolMissing(_))));
    }
}
