//! CLI command definitions
//!
//! Defines the clap commands for the layaudio CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the application with https enforcement and hardening headers
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(long, short)]
        port: Option<u16>,

        /// Directory to serve (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Run the end-to-end mix workflow in each browser engine
    Smoke {
        /// Engine to run: chromium, firefox or webkit
        /// Can be specified multiple times; all engines when omitted
        #[arg(long = "engine", short = 'e')]
        engines: Vec<String>,

        /// Application URL (default: http://localhost:8000/index.html)
        #[arg(long)]
        url: Option<String>,

        /// Show browser windows
        #[arg(long)]
        headed: bool,
    },

    /// Write the synthetic test tone used as upload fixture
    Fixture {
        /// Output path (default: the configured fixture path)
        path: Option<PathBuf>,
    },
}
