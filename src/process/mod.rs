// SPDX-License-Identifier: GPL-3.0-only

//! External process supervision
//!
//! Everything the orchestrator runs outside its own process goes through
//! this module: the still-capture tool, the streaming helper script, and the
//! cleanup commands that reap them. Two complementary kill mechanisms are
//! used, and both are required:
//!
//! - tracked-handle termination: helpers are spawned as their own process
//!   group so one `killpg` reaps the whole descendant tree;
//! - pattern-matched sweep: `pkill -f` against command-line substrings,
//!   scoped to this instance's camera port and UDP port, catches processes
//!   that survived a group kill or were orphaned by a previous crashed run.

pub mod capture;
pub mod group;
pub mod stream;
pub mod sweep;

pub use capture::capture_still;
pub use group::terminate_group;
pub use stream::{StreamStart, start_stream};
pub use sweep::{helper_running, sweep_session};
