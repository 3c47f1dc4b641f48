// SPDX-License-Identifier: GPL-3.0-only

//! Device auto-detection
//!
//! Detection shells out to `gphoto2 --auto-detect`, but only after forcing
//! the desktop automount helper off the camera's USB endpoint; a mounted
//! camera filesystem makes the probe (and every later capture) fail with a
//! busy bus. The sequence is: kill the automount helper, unmount any
//! auto-mounted camera filesystem, give the kernel a settle delay, then
//! probe with a bounded timeout.

use super::CameraRecord;
use crate::constants::{timing, tools};
use crate::errors::{SessionError, SessionResult};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Placeholder model name for detect output lines with an empty name column
const GENERIC_CAMERA: &str = "Generic camera";

/// Parse `gphoto2 --auto-detect` output into camera records.
///
/// The output is a fixed two-line header followed by one line per device,
/// `<model>  usb:<bus>,<device>`. Lines without a `usb:` marker (including
/// the header itself) are skipped; a malformed line is never fatal.
pub fn parse_auto_detect(output: &str) -> Vec<CameraRecord> {
    let mut records = Vec::new();

    for line in output.lines().skip(2) {
        let line = line.trim();
        let Some((name_part, port_part)) = line.split_once("usb:") else {
            continue;
        };

        let name = name_part.trim();
        let name = if name.is_empty() {
            GENERIC_CAMERA.to_string()
        } else {
            name.to_string()
        };

        records.push(CameraRecord {
            name,
            port: format!("usb:{}", port_part.trim()),
        });
    }

    records
}

/// Run the full detection sequence.
///
/// `retry` is the automatic-retry budget applied when the probe finds zero
/// cameras: background-initiated detection (startup, hot-plug) passes 1 and
/// gets one silent re-probe; a manual refresh passes 0. An empty result is
/// not an error here; the caller decides whether zero cameras after the
/// budget means `CameraNotDetected`.
///
/// Returns `ToolMissing` only when the capture tool itself is absent.
pub async fn detect_cameras(retry: u32) -> SessionResult<Vec<CameraRecord>> {
    let mut remaining = retry;

    loop {
        let records = run_probe().await?;
        if !records.is_empty() || remaining == 0 {
            return Ok(records);
        }
        remaining -= 1;
        debug!("Zero cameras found, retrying detection");
    }
}

/// One pass of the detection sequence: release the bus, settle, probe
async fn run_probe() -> SessionResult<Vec<CameraRecord>> {
    release_usb_bus().await;
    tokio::time::sleep(timing::DETECT_SETTLE).await;

    let probe = Command::new(tools::CAPTURE_TOOL)
        .arg("--auto-detect")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timing::DETECT_TIMEOUT, probe).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SessionError::ToolMissing(tools::CAPTURE_TOOL.to_string()));
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Auto-detect failed to run");
            return Ok(Vec::new());
        }
        Err(_) => {
            warn!("Auto-detect timed out");
            return Ok(Vec::new());
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let records = parse_auto_detect(&stdout);
    info!(count = records.len(), "Detection pass complete");
    Ok(records)
}

/// Force-release the camera's USB endpoint.
///
/// The automount helper reopens the device aggressively, so both the kill
/// and the unmount are best-effort and their failures are ignored.
async fn release_usb_bus() {
    let _ = Command::new("pkill")
        .args(["-f", tools::AUTOMOUNT_HELPER])
        .status()
        .await;

    let _ = Command::new("gio")
        .args(["mount", "-u", "gphoto2://*"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Model                          Port
----------------------------------------------------------
Canon EOS 1100D                usb:001,004
Nikon DSC D3200                usb:001,007
";

    #[test]
    fn parses_devices_after_header() {
        let records = parse_auto_detect(SAMPLE);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Canon EOS 1100D");
        assert_eq!(records[0].port, "usb:001,004");
        assert_eq!(records[1].name, "Nikon DSC D3200");
        assert_eq!(records[1].port, "usb:001,007");
    }

    #[test]
    fn skips_lines_without_usb_marker() {
        let output = "\
Model                          Port
----------------------------------------------------------
Canon EOS 1100D                usb:001,004
some unrelated noise
Nikon DSC D3200                usb:001,007
";
        let records = parse_auto_detect(output);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn header_only_output_yields_nothing() {
        let output = "\
Model                          Port
----------------------------------------------------------
";
        assert!(parse_auto_detect(output).is_empty());
    }

    #[test]
    fn empty_model_becomes_generic_placeholder() {
        let output = "h1\nh2\n   usb:002,003\n";
        let records = parse_auto_detect(output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, GENERIC_CAMERA);
        assert_eq!(records[0].port, "usb:002,003");
    }

    #[test]
    fn header_usb_lines_are_not_misparsed() {
        // The two-line header is skipped positionally even if a model name
        // were to contain the marker further down
        let records = parse_auto_detect("usb: in header\nusb: again\nCam  usb:001,001\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].port, "usb:001,001");
    }
}
