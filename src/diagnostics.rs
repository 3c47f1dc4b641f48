// SPDX-License-Identifier: GPL-3.0-only

//! Diagnostics report generation
//!
//! Collects the system information needed to debug a misbehaving tethered
//! setup: external tool availability, video devices, kernel/distro, and any
//! helper processes still running from this or a previous session.

use crate::config::Config;
use crate::constants::{app_info, tools};
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// Diagnostics report generator
pub struct DiagnosticsReport;

impl DiagnosticsReport {
    /// Generate a report and save it next to the captured photos.
    ///
    /// Returns the path to the generated file.
    pub async fn generate(config: &Config) -> Result<PathBuf, String> {
        info!("Generating diagnostics report");

        let mut report = String::new();

        report.push_str("# digicam diagnostics report\n\n");
        report.push_str(&format!(
            "Generated: {}\n\n",
            chrono::Local::now().to_rfc3339()
        ));

        report.push_str("## Application\n\n");
        report.push_str(&format!("**Version:** {}\n\n", app_info::version()));

        report.push_str(&Self::system_section());
        report.push_str(&Self::tools_section(config));
        report.push_str(&Self::video_devices_section());
        report.push_str(&Self::processes_section());

        let output_path = Self::report_path(config);
        tokio::fs::write(&output_path, report)
            .await
            .map_err(|e| format!("Failed to write report: {}", e))?;

        info!(path = ?output_path, "Diagnostics report written");
        Ok(output_path)
    }

    fn report_path(config: &Config) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        config
            .resolve_photo_dir()
            .join(format!("digicam-diagnostics-{}.md", timestamp))
    }

    fn system_section() -> String {
        let mut section = String::from("## System\n\n");

        if let Ok(output) = Command::new("uname").arg("-r").output()
            && let Ok(kernel) = String::from_utf8(output.stdout)
        {
            section.push_str(&format!("**Kernel:** {}\n", kernel.trim()));
        }

        if let Ok(os_release) = std::fs::read_to_string("/etc/os-release") {
            for line in os_release.lines() {
                if let Some(distro) = line.strip_prefix("PRETTY_NAME=") {
                    section.push_str(&format!(
                        "**Distribution:** {}\n",
                        distro.trim_matches('"')
                    ));
                    break;
                }
            }
        }

        section.push('\n');
        section
    }

    fn tools_section(config: &Config) -> String {
        let mut section = String::from("## External tools\n\n");

        for tool in [tools::CAPTURE_TOOL, "ffmpeg", "gio", "pkill"] {
            let version = Command::new(tool)
                .arg("--version")
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| {
                    String::from_utf8_lossy(&o.stdout)
                        .lines()
                        .next()
                        .unwrap_or("")
                        .to_string()
                });
            match version {
                Some(v) => section.push_str(&format!("- {}: {}\n", tool, v)),
                None => section.push_str(&format!("- {}: **not found**\n", tool)),
            }
        }

        let script = config.resolve_helper_script();
        if script.exists() {
            section.push_str(&format!("- streaming helper: {}\n", script.display()));
        } else {
            section.push_str(&format!(
                "- streaming helper: **missing** (expected {})\n",
                script.display()
            ));
        }

        section.push('\n');
        section
    }

    fn video_devices_section() -> String {
        let mut section = String::from("## Video devices\n\n");
        let mut found = false;

        if let Ok(entries) = std::fs::read_dir("/sys/class/video4linux") {
            let mut devices: Vec<_> = entries.flatten().collect();
            devices.sort_by_key(|e| e.file_name());

            for entry in devices {
                let name = std::fs::read_to_string(entry.path().join("name"))
                    .map(|n| n.trim().to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                section.push_str(&format!(
                    "- /dev/{}: {}\n",
                    entry.file_name().to_string_lossy(),
                    name
                ));
                found = true;
            }
        }

        if !found {
            section.push_str("(none)\n");
        }
        section.push('\n');
        section
    }

    fn processes_section() -> String {
        let mut section = String::from("## Helper processes\n\n");

        let output = Command::new("pgrep")
            .args(["-af", tools::CAPTURE_TOOL])
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .filter(|s| !s.is_empty());

        match output {
            Some(processes) => {
                section.push_str("```\n");
                section.push_str(&processes);
                section.push_str("\n```\n");
            }
            None => section.push_str("(no capture-tool processes running)\n"),
        }

        section.push('\n');
        section
    }
}
