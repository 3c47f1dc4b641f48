// SPDX-License-Identifier: GPL-3.0-only

//! Camera registry: detection results and selection tracking
//!
//! Records are rebuilt wholesale on every detection pass; the registry's job
//! is to keep the user's selection stable across rebuilds and to tell the
//! hot-plug monitor whether the set of attached cameras actually changed.

pub mod detect;

pub use detect::{detect_cameras, parse_auto_detect};

use std::collections::BTreeSet;

/// One detected camera.
///
/// `port` is the driver-assigned bus address (`usb:<bus>,<device>`), unique
/// within a detection pass but not stable across replug. `name` is the model
/// string; two identical bodies share a name, so commands that need a unique
/// selector must use the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraRecord {
    pub name: String,
    pub port: String,
}

/// Detection results plus the user-facing selection
#[derive(Debug, Default)]
pub struct CameraRegistry {
    cameras: Vec<CameraRecord>,
    selected: usize,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All cameras from the latest detection pass
    pub fn cameras(&self) -> &[CameraRecord] {
        &self.cameras
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Index of the current selection
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    /// The currently selected camera, if any
    pub fn selected_camera(&self) -> Option<&CameraRecord> {
        self.cameras.get(self.selected)
    }

    /// Select by index; `None` when out of range or no cameras are present
    pub fn select(&mut self, index: usize) -> Option<&CameraRecord> {
        if index < self.cameras.len() {
            self.selected = index;
            self.cameras.get(index)
        } else {
            None
        }
    }

    /// Replace the camera list with a fresh detection pass.
    ///
    /// The selection follows the previously selected camera's port when it
    /// is still present, and falls back to index 0 otherwise.
    pub fn replace(&mut self, cameras: Vec<CameraRecord>) {
        let old_port = self.selected_camera().map(|c| c.port.clone());

        self.cameras = cameras;
        self.selected = old_port
            .and_then(|port| self.cameras.iter().position(|c| c.port == port))
            .unwrap_or(0);
    }

    /// The set of ports in the current list, for hot-plug diffing
    pub fn port_set(&self) -> BTreeSet<String> {
        self.cameras.iter().map(|c| c.port.clone()).collect()
    }

    /// Whether a fresh detection pass differs from the current list.
    /// Compared as port sets; a rename without replug is not a change.
    pub fn differs_from(&self, fresh: &[CameraRecord]) -> bool {
        let fresh_ports: BTreeSet<&str> = fresh.iter().map(|c| c.port.as_str()).collect();
        let current: BTreeSet<&str> = self.cameras.iter().map(|c| c.port.as_str()).collect();
        fresh_ports != current
    }
}
