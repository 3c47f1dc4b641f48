// SPDX-License-Identifier: GPL-3.0-only

//! Still-photo capture through the external capture tool
//!
//! A tethered DSLR is a temperamental subprocess target: the bus may be held
//! by an automount helper, a previous streaming session may still own the
//! device, and some camera families wedge outright when asked to capture
//! while busy. The retry plan below encodes the recovery rules that have
//! proven to work per family; the plan itself is pure so it can be tested
//! without a camera attached.

use super::sweep;
use crate::camera::CameraRecord;
use crate::constants::{timing, tools};
use crate::errors::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Per-family capture attempt plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPlan {
    /// Total capture attempts, including the first
    pub attempts: u32,
    /// Set-config command issued before every attempt (an interactive
    /// viewfinder left on interferes with capture)
    pub viewfinder_off: bool,
    /// Issue a hardware bus reset between failed attempts
    pub reset_between_attempts: bool,
    /// Settle delay between attempts
    pub settle: Duration,
}

/// Build the attempt plan for a camera model.
///
/// Canon bodies wedge on busy-bus conditions and recover from a `--reset`;
/// other vendors' bodies can freeze on reset, so they only get the shorter
/// plain wait.
pub fn attempt_plan(model: Option<&str>) -> AttemptPlan {
    let is_reset_family = model.is_some_and(|m| m.contains(tools::RESET_FAMILY));

    AttemptPlan {
        attempts: 2,
        viewfinder_off: is_reset_family,
        reset_between_attempts: is_reset_family,
        settle: if is_reset_family {
            timing::RESET_SETTLE
        } else {
            timing::RETRY_SETTLE
        },
    }
}

/// Capture one still photo into `photo_dir/target_filename`.
///
/// Preconditions handled here: a conflicting streaming session for this
/// instance is stopped and the device given time to release, and the
/// automount helper is forced off the bus. On success the caller-chosen
/// target filename is authoritative; the tool's own filename-rewriting
/// output is not consulted.
pub async fn capture_still(
    camera: Option<&CameraRecord>,
    target_filename: &str,
    photo_dir: &Path,
    udp_port: u16,
) -> SessionResult<PathBuf> {
    // A live stream holds the camera in movie mode; stop it and wait for
    // the mirror to come back down before asking for a still.
    if sweep::helper_running(tools::CAPTURE_STREAM_PATTERN).await {
        info!("Streaming session active, stopping it before capture");
        sweep::sweep_session(camera.map(|c| c.port.as_str()), udp_port).await;
        tokio::time::sleep(timing::DEVICE_RELEASE_WAIT).await;
    }

    sweep::release_automount_helper().await;

    let model = camera.map(|c| c.name.as_str());
    let plan = attempt_plan(model);

    // Select by model name when known (ports shift across replug);
    // otherwise let the tool auto-detect.
    let camera_args: Vec<String> = match model {
        Some(name) => vec!["--camera".to_string(), name.to_string()],
        None => Vec::new(),
    };

    let mut last_diagnostic = String::new();

    for attempt in 1..=plan.attempts {
        if plan.viewfinder_off {
            run_tool_quietly(&camera_args, &["--set-config", "viewfinder=0"], photo_dir).await?;
        }

        debug!(attempt, target = target_filename, "Running capture attempt");

        let capture = Command::new(tools::CAPTURE_TOOL)
            .args(&camera_args)
            .args([
                "--capture-image-and-download",
                "--filename",
                target_filename,
                "--force-overwrite",
                "--keep",
            ])
            .current_dir(photo_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timing::CAPTURE_TIMEOUT, capture).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::ToolMissing(tools::CAPTURE_TOOL.to_string()));
            }
            Ok(Err(e)) => return Err(SessionError::Io(e.to_string())),
            Err(_) => {
                warn!(attempt, "Capture attempt exceeded deadline");
                return Err(SessionError::CaptureTimeout);
            }
        };

        if output.status.success() {
            info!(target = target_filename, "Capture succeeded");
            return Ok(photo_dir.join(target_filename));
        }

        last_diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if last_diagnostic.is_empty() {
            last_diagnostic = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        warn!(attempt, diagnostic = %last_diagnostic, "Capture attempt failed");

        if attempt < plan.attempts {
            if plan.reset_between_attempts {
                info!("Resetting camera USB connection before retry");
                run_tool_quietly(&camera_args, &["--reset"], photo_dir).await?;
            }
            tokio::time::sleep(plan.settle).await;
        }
    }

    Err(SessionError::CaptureFailed(last_diagnostic))
}

/// Run a side-effect-only capture-tool command, ignoring its output.
/// Only a missing binary is surfaced.
async fn run_tool_quietly(
    camera_args: &[String],
    args: &[&str],
    dir: &Path,
) -> SessionResult<()> {
    let result = Command::new(tools::CAPTURE_TOOL)
        .args(camera_args)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SessionError::ToolMissing(tools::CAPTURE_TOOL.to_string()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canon_family_gets_reset_plan() {
        let plan = attempt_plan(Some("Canon EOS 1100D"));
        assert_eq!(plan.attempts, 2);
        assert!(plan.viewfinder_off);
        assert!(plan.reset_between_attempts);
        assert_eq!(plan.settle, timing::RESET_SETTLE);
    }

    #[test]
    fn other_vendors_get_plain_wait() {
        let plan = attempt_plan(Some("Nikon DSC D3200"));
        assert_eq!(plan.attempts, 2);
        assert!(!plan.viewfinder_off);
        assert!(!plan.reset_between_attempts);
        assert_eq!(plan.settle, timing::RETRY_SETTLE);
    }

    #[test]
    fn unknown_model_gets_plain_wait() {
        let plan = attempt_plan(None);
        assert!(!plan.reset_between_attempts);
    }

    #[test]
    fn reset_happens_exactly_once_between_two_attempts() {
        // The plan allows one reset: between attempt 1 and attempt 2
        let plan = attempt_plan(Some("Canon EOS 1100D"));
        let resets = (1..plan.attempts).count();
        assert_eq!(resets, 1);
    }
}
