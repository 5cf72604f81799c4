// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-recorder")]
#[command(about = "Record live video and microphone audio to MP4")]
#[command(version, long_version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the live test pattern
    Record {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output file path (default: ~/Videos/camera-recorder/video_TIMESTAMP.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration file (default: ~/.config/camera-recorder/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Record video only
        #[arg(long)]
        no_audio: bool,

        /// Record a generated tone instead of the microphone
        #[arg(long, conflicts_with = "no_audio")]
        tone: bool,

        /// Frame width
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "720")]
        height: u32,

        /// Frame rate
        #[arg(long, default_value = "30")]
        fps: u32,
    },

    /// List available encoders
    Encoders,

    /// List audio input devices
    Devices,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_recorder=debug, RUST_LOG=info
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
        Commands::Record {
            duration,
            output,
            config,
            no_audio,
            tone,
            width,
            height,
            fps,
        } => cli::record(cli::RecordOptions {
            duration,
            output,
            config,
            no_audio,
            tone,
            width,
            height,
            fps,
        }),
        Commands::Encoders => cli::list_encoders(),
        Commands::Devices => cli::list_devices(),
    }
}
