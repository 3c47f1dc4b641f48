// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "digicam")]
#[command(about = "Turn a tethered digital camera into a capture and webcam streaming device")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List detected cameras
    List,

    /// Take a still photo
    Photo {
        /// Camera index to use (from 'digicam list')
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Open the photo with the system handler after capture
        #[arg(long)]
        open: bool,
    },

    /// Start webcam streaming and keep the session running
    Webcam {
        /// Camera index to use (from 'digicam list')
        #[arg(short, long)]
        camera: Option<usize>,

        /// Path to the streaming helper script
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// Kill helper processes left behind by earlier runs
    Stop,

    /// Write a system diagnostics report
    Diagnose,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=digicam=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List) => cli::list_cameras(),
        Some(Commands::Photo { camera, open }) => cli::take_photo(camera, open),
        Some(Commands::Webcam { camera, script }) => cli::run_session(camera, script, true),
        Some(Commands::Stop) => cli::stop_orphans(),
        Some(Commands::Diagnose) => cli::diagnose(),
        None => cli::run_session(None, None, false),
    }
}
