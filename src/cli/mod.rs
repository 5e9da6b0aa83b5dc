//! CLI command handling
//!
//! Applies command-line overrides to the configuration and runs the command.

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::harness::{self, engine, fixture};
use crate::server;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Serve { port, root } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = root {
                config.server.root = root;
            }
            server::run(&config.server).await
        }

        Commands::Smoke {
            engines,
            url,
            headed,
        } => {
            let engines = engine::select(&engines)?;
            if let Some(url) = url {
                config.harness.url = url;
            }
            if headed {
                config.harness.headless = false;
            }

            let report = harness::run_smoke(&config, &engines).await?;
            report.print_summary();

            if report.has_uncaught_errors() {
                let failed = report
                    .engines
                    .iter()
                    .filter(|r| matches!(r.outcome, harness::Outcome::Failed { .. }))
                    .count();
                return Err(Error::EnginesFailed {
                    failed,
                    total: report.engines.len(),
                });
            }
            Ok(())
        }

        Commands::Fixture { path } => {
            let path = path.unwrap_or(config.harness.fixture);
            fixture::write_fixture(&path, &fixture::ToneSpec::default())?;
            println!("{} Wrote {}", "✓".green(), path.display());
            Ok(())
        }
    }
}
