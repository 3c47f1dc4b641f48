// SPDX-License-Identifier: GPL-3.0-only

//! Pattern-based process sweep
//!
//! Cleanup locates helper processes by command-line substring rather than by
//! tracked pid: a previous run of this binary may have crashed and left an
//! unsupervised pipeline behind, and those orphans still match on the
//! capture tool name plus camera port, or the streaming tool plus UDP port.
//! Patterns are scoped to this instance wherever a port is known so that
//! concurrent instances driving other cameras are left alone.

use crate::constants::tools;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Check whether any process matching `pattern` is currently running
pub async fn helper_running(pattern: &str) -> bool {
    Command::new("pgrep")
        .args(["-f", pattern])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Kill every process whose command line matches `pattern`.
/// No match is not an error.
pub async fn kill_matching(pattern: &str) {
    debug!(pattern, "Sweeping processes");
    let _ = Command::new("pkill")
        .args(["-f", pattern])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}

/// Build the sweep patterns for one instance's session.
///
/// With a known camera port the capture tool is matched against it; without
/// one only the streaming invocation form is matched, since an unscoped
/// `gphoto2` pattern would also hit another instance's capture.
pub fn session_patterns(camera_port: Option<&str>, udp_port: u16) -> Vec<String> {
    let mut patterns = Vec::with_capacity(3);

    match camera_port {
        Some(port) => patterns.push(format!("{}.*{}", tools::CAPTURE_TOOL, port)),
        None => patterns.push(tools::CAPTURE_STREAM_PATTERN.to_string()),
    }
    patterns.push(format!("ffmpeg.*udp://127.0.0.1:{}", udp_port));
    patterns.push(format!("{}.*{}", tools::STREAM_HELPER, udp_port));

    patterns
}

/// Sweep every helper belonging to this instance's session.
///
/// Used after the tracked group kill on stop, and on exit; idempotent.
pub async fn sweep_session(camera_port: Option<&str>, udp_port: u16) {
    for pattern in session_patterns(camera_port, udp_port) {
        kill_matching(&pattern).await;
    }
}

/// Force the automount helper off the USB bus before talking to the camera.
///
/// Run twice because the helper can respawn quickly enough to regrab the
/// endpoint between the kill and the capture.
pub async fn release_automount_helper() {
    for _ in 0..2 {
        let _ = Command::new("pkill")
            .args(["-9", "-f", tools::AUTOMOUNT_HELPER])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        let _ = Command::new("gio")
            .args(["mount", "-u", "gphoto2://*"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}
