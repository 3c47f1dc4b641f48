// SPDX-License-Identifier: GPL-3.0-only

//! Process-group termination
//!
//! Helpers are spawned with `process_group(0)`, making the child the leader
//! of a fresh group whose id equals its pid. Signalling that group reaps the
//! entire pipeline tree (script, capture tool, encoder) in one call even
//! though only the direct child was spawned by us.

use tracing::{debug, warn};

/// Send SIGTERM to an entire process group.
///
/// Idempotent: a group that no longer exists is not an error, so this is
/// safe to call from both the stop path and exit cleanup.
pub fn terminate_group(pgid: i32) {
    if pgid <= 0 {
        return;
    }

    // Safety: killpg with SIGTERM; an invalid pgid yields ESRCH, handled below.
    let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
    if rc == 0 {
        debug!(pgid, "Terminated process group");
        return;
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => debug!(pgid, "Process group already gone"),
        _ => warn!(pgid, error = %err, "Failed to terminate process group"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminating_missing_group_does_not_panic() {
        // Near-maximal pid, very unlikely to exist
        terminate_group(i32::MAX - 1);
    }

    #[test]
    fn non_positive_pgid_is_ignored() {
        // 0 and negative would address our own group / all processes
        terminate_group(0);
        terminate_group(-1);
    }
}
