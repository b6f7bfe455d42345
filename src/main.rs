// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "depthsense")]
#[command(about = "Depth sensor streaming and skeleton tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available devices
    List,

    /// Stream depth (and optionally IR/color) frames
    Stream {
        /// Device index to use (from 'depthsense list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Recorded session to replay instead of a live device
        #[arg(short, long)]
        session: Option<PathBuf>,

        /// Streaming duration in seconds
        #[arg(long, default_value = "10")]
        duration: u64,

        /// Also stream the IR sensor
        #[arg(long)]
        ir: bool,

        /// Also stream the color sensor
        #[arg(long)]
        color: bool,
    },

    /// Track users and print lifecycle events
    Track {
        /// Device index to use (from 'depthsense list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Recorded session to replay instead of a live device
        #[arg(short, long)]
        session: Option<PathBuf>,

        /// Tracking duration in seconds
        #[arg(long, default_value = "10")]
        duration: u64,
    },

    /// Record a session for later replay
    Record {
        /// Device index to use (from 'depthsense list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Recorded session to replay instead of a live device
        #[arg(short, long)]
        session: Option<PathBuf>,

        /// Recording duration in seconds
        #[arg(long, default_value = "10")]
        duration: u64,

        /// Output file path (default: TIMESTAMP.session.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=depthsense=debug, RUST_LOG=info
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
        Commands::List => cli::list_devices(),
        Commands::Stream {
            device,
            session,
            duration,
            ir,
            color,
        } => cli::stream(session, device, duration, ir, color),
        Commands::Track {
            device,
            session,
            duration,
        } => cli::track(session, device, duration),
        Commands::Record {
            device,
            session,
            duration,
            output,
        } => cli::record(session, device, duration, output),
    }
}
