//! Cross-engine smoke harness
//!
//! Drives the LayerAudio workflow in chromium, firefox and webkit, one
//! engine after another, and writes each engine's mix to disk.

pub mod artifact;
pub mod console;
pub mod engine;
pub mod fixture;
pub mod page;
pub mod runner;
pub mod session;

pub use engine::Engine;
pub use page::{BrowserLauncher, BrowserPage, ReadinessSnapshot};
pub use runner::{Harness, HarnessSettings, Outcome, RunReport, Step};
pub use session::WebDriverLauncher;

use crate::common::{config::Config, Result};

/// Run the smoke test for `engines` against real browsers
///
/// Generates the upload fixture first if it is missing.
pub async fn run_smoke(config: &Config, engines: &[Engine]) -> Result<RunReport> {
    let settings = HarnessSettings::from_config(config);
    if fixture::ensure_fixture(&settings.fixture)? {
        println!("Generated test fixture {}", settings.fixture.display());
    }

    tracing::info!(
        url = %settings.url,
        engines = ?engines.iter().map(|e| e.name()).collect::<Vec<_>>(),
        "Starting smoke run"
    );

    let harness = Harness::new(WebDriverLauncher::new(config), settings);
    let report = harness.run(engines).await;

    for engine in &report.engines {
        tracing::info!(
            engine = %engine.engine,
            passed = engine.passed(),
            console_messages = engine.console_messages,
            elapsed_ms = engine.elapsed_ms(),
            "Engine run finished"
        );
    }
    Ok(report)
}
