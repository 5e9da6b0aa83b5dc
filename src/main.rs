//! LayerAudio CLI
//!
//! `serve` hosts the application, `smoke` runs the cross-engine browser test
//! against it and `fixture` writes the upload tone.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use layaudio::common::{config::Config, logging};
use layaudio::{cli, commands};

#[derive(Parser)]
#[command(name = "layaudio", about = "LayerAudio server and smoke harness")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Keep the file writer alive until the run finishes
    let guard = match cli.command {
        Commands::Smoke { .. } => {
            let (log_path, guard) = logging::init_smoke();
            if let Some(path) = log_path {
                tracing::debug!(path = %path.display(), "Logging smoke run to file");
            }
            guard
        }
        _ => {
            logging::init_cli();
            None
        }
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        drop(guard);
        std::process::exit(1);
    }
}
