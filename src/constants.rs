// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Settle delay after forcing the automount helper off the USB bus,
    /// before probing the camera again
    pub const DETECT_SETTLE: Duration = Duration::from_secs(1);

    /// Timeout for one `gphoto2 --auto-detect` invocation
    pub const DETECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Hot-plug poll interval
    pub const HOTPLUG_INTERVAL: Duration = Duration::from_secs(15);

    /// Timeout for one still-capture attempt
    pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Settle delay after a USB bus reset (camera re-registers with the kernel)
    pub const RESET_SETTLE: Duration = Duration::from_secs(4);

    /// Settle delay between capture attempts when no reset was issued
    pub const RETRY_SETTLE: Duration = Duration::from_secs(2);

    /// Wait for the DSLR to release the device (mirror down) after a
    /// streaming session is stopped, before a still capture may start
    pub const DEVICE_RELEASE_WAIT: Duration = Duration::from_secs(3);

    /// Warmup delay before the first preview attach attempt; the streaming
    /// pipeline needs a moment before packets arrive on the UDP port
    pub const PREVIEW_WARMUP: Duration = Duration::from_millis(1500);

    /// Deadline for a preview pipeline to reach PLAYING before the next
    /// transport variant is tried
    pub const PREVIEW_STATE_TIMEOUT_SECS: u64 = 2;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;
}

/// GStreamer receive pipeline constants
pub mod pipeline {
    /// Maximum appsink buffer queue size (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Queue element byte limit ahead of the demuxer
    pub const QUEUE_MAX_BYTES: u32 = 2_097_152;

    /// MPEG-TS packet size emitted by the streaming helper
    pub const TS_PACKET_SIZE: u32 = 1316;

    /// Output pixel format for the appsink
    pub const OUTPUT_FORMAT: &str = "RGB";
}

/// External tools and the command-line patterns used to find their processes
pub mod tools {
    /// The tethered-capture tool
    pub const CAPTURE_TOOL: &str = "gphoto2";

    /// Streaming helper script launched for webcam mode
    pub const STREAM_HELPER: &str = "run_webcam.sh";

    /// Desktop automount helper that holds the camera's USB endpoint
    pub const AUTOMOUNT_HELPER: &str = "gvfs-gphoto2-volume-monitor";

    /// Success marker printed by the streaming helper before the device path
    pub const STREAM_SUCCESS_MARKER: &str = "SUCCESS:";

    /// Pattern matching the capture tool when it runs in streaming mode
    /// without a known port to scope by
    pub const CAPTURE_STREAM_PATTERN: &str = "gphoto2 --stdout";

    /// Model substring identifying the camera family that wedges on a busy
    /// bus and needs a hardware reset between capture attempts (other
    /// vendors' bodies freeze when reset, so the match stays narrow)
    pub const RESET_FAMILY: &str = "Canon";
}

/// Network constants
pub mod net {
    /// Base of the per-instance UDP port range
    pub const UDP_PORT_BASE: u16 = 5000;

    /// Derive the preview UDP port for a process id.
    ///
    /// Multiple independent instances (multi-camera, multi-window) each get
    /// their own port so their streams never collide. Two instances whose
    /// pids are congruent mod 1000 share a port; that collision is a known
    /// limitation of the scheme, kept for compatibility with the streaming
    /// helper.
    pub fn udp_port_for_pid(pid: u32) -> u16 {
        UDP_PORT_BASE + (pid % 1000) as u16
    }
}

/// Filesystem convention for captured stills
pub mod files {
    /// Prefix of captured still filenames in the working directory
    pub const CAPTURE_PREFIX: &str = "capt";

    /// Extension of captured still filenames
    pub const CAPTURE_EXT: &str = "jpg";

    /// Width of the zero-padded sequence number
    pub const CAPTURE_SEQ_DIGITS: usize = 4;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_port_is_deterministic() {
        assert_eq!(net::udp_port_for_pid(0), 5000);
        assert_eq!(net::udp_port_for_pid(123), 5123);
        assert_eq!(net::udp_port_for_pid(1000), 5000);
        assert_eq!(net::udp_port_for_pid(54321), 5321);
    }

    #[test]
    fn udp_port_collides_for_congruent_pids() {
        // Two instances with pid % 1000 equal share a port by design
        assert_eq!(net::udp_port_for_pid(42), net::udp_port_for_pid(2042));
    }
}
