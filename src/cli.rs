// SPDX-License-Identifier: GPL-3.0-only

//! CLI drivers built on the library
//!
//! These stand in for the out-of-scope GUI: each one talks to the
//! orchestrator (or the supervisor directly, for one-shot actions) through
//! the same command/event interface a graphical shell would use, and
//! renders events as terminal output.

use digicam::constants::{net, tools};
use digicam::session::Mode;
use digicam::session::events::{Command, SessionEvent};
use digicam::session::orchestrator::Orchestrator;
use digicam::{Config, camera, process, storage};
use std::path::PathBuf;

/// List all detected cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let cameras = rt.block_on(camera::detect_cameras(1))?;

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {} ({})", index, camera.name, camera.port);
    }

    Ok(())
}

/// Take one still photo with the selected camera
pub fn take_photo(camera_index: usize, open_after: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let cameras = camera::detect_cameras(1).await?;
        if cameras.is_empty() {
            return Err("No cameras found".into());
        }
        if camera_index >= cameras.len() {
            return Err(format!(
                "Camera index {} out of range (0-{})",
                camera_index,
                cameras.len() - 1
            )
            .into());
        }

        let camera = &cameras[camera_index];
        println!("Using camera: {}", camera.name);

        let photo_dir = config.resolve_photo_dir();
        std::fs::create_dir_all(&photo_dir)?;

        let target = storage::next_filename(&photo_dir);
        let udp_port = net::udp_port_for_pid(std::process::id());

        println!("Capturing {} ...", target);
        let path = process::capture_still(Some(camera), &target, &photo_dir, udp_port).await?;

        match image::image_dimensions(&path) {
            Ok((width, height)) => {
                println!("Photo saved: {} ({}x{})", path.display(), width, height)
            }
            Err(_) => println!("Photo saved: {}", path.display()),
        }

        if open_after {
            open::that(&path)?;
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Run the orchestrator session until Ctrl+C.
///
/// With `start_stream` the selected camera is put into webcam mode as soon
/// as detection reports it; without it the session just monitors hot-plug
/// changes.
pub fn run_session(
    camera_index: Option<usize>,
    script: Option<PathBuf>,
    start_stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load();
    if let Some(script) = script {
        config.helper_script = Some(script);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (orchestrator, handle, mut events) = Orchestrator::new(config);
        let loop_task = tokio::spawn(orchestrator.run());

        let ctrl_handle = handle.clone();
        ctrlc::set_handler(move || {
            let _ = ctrl_handle.send(Command::Shutdown);
        })?;

        println!("Session running (Ctrl+C to stop)");

        let mut stream_requested = false;
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Detecting(true) => println!("Detecting cameras..."),
                SessionEvent::Detecting(false) => {}
                SessionEvent::CamerasChanged { cameras, selected } => {
                    if cameras.is_empty() {
                        println!("No cameras attached.");
                        continue;
                    }
                    for (index, camera) in cameras.iter().enumerate() {
                        let marker = if index == selected { "*" } else { " " };
                        println!(" {}[{}] {} ({})", marker, index, camera.name, camera.port);
                    }

                    if start_stream && !stream_requested {
                        stream_requested = true;
                        if let Some(index) = camera_index {
                            handle.send(Command::SelectCamera(index));
                        }
                        handle.send(Command::SetMode(Mode::Video));
                        handle.send(Command::StartStream);
                    }
                }
                SessionEvent::PhaseChanged(phase) => println!("Session: {}", phase),
                SessionEvent::PhotoSaved(path) => println!("Photo saved: {}", path.display()),
                SessionEvent::Thumbnail(thumbnail) => {
                    println!(
                        "Latest capture: {} ({}x{})",
                        thumbnail.path.display(),
                        thumbnail.width,
                        thumbnail.height
                    );
                }
                SessionEvent::StreamStarted { device } => match device {
                    Some(device) => println!("Webcam ready on {}", device.display()),
                    None => println!("Webcam ready"),
                },
                SessionEvent::StreamStopped => println!("Webcam stopped"),
                SessionEvent::SessionRestored => {
                    println!("Restored a streaming session from a previous run")
                }
                SessionEvent::PreviewFrame(_) => {
                    // Frames are for a rendering shell; the CLI reports rate only
                }
                SessionEvent::PreviewFps(fps) => println!("Preview: {} fps", fps),
                SessionEvent::PreviewCleared => {}
                SessionEvent::Error(e) => eprintln!("Error: {}", e),
            }
        }

        loop_task.await?;
        println!("Session ended.");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Kill helper processes left behind by earlier runs.
///
/// Unscoped recovery sweep: matches the streaming invocation forms of the
/// capture tool and the helper script regardless of which instance (or
/// crashed run) started them.
pub fn stop_orphans() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        process::sweep::kill_matching(tools::CAPTURE_STREAM_PATTERN).await;
        process::sweep::kill_matching(tools::STREAM_HELPER).await;
        process::sweep::kill_matching("ffmpeg.*udp://127.0.0.1:5").await;
    });
    println!("Swept leftover helper processes.");
    Ok(())
}

/// Write a diagnostics report
pub fn diagnose() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let rt = tokio::runtime::Runtime::new()?;
    let path = rt.block_on(digicam::diagnostics::DiagnosticsReport::generate(&config))?;
    println!("Diagnostics report: {}", path.display());
    Ok(())
}
