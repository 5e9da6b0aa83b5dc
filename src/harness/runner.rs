//! Smoke run implementation
//!
//! Runs the LayerAudio workflow once per engine, strictly in sequence. Each
//! engine run is its own unit of work: it acquires a session, walks the
//! workflow, releases the session on every exit path, and yields one
//! [`EngineReport`]. Nothing an engine does can stop the next one from running.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use tokio::time::Instant;

use crate::common::config::{Config, StepTimeouts};
use crate::common::{Error, Result};

use super::artifact::{self, Container};
use super::console::ConsoleRelay;
use super::engine::Engine;
use super::page::{
    BridgePayload, BrowserLauncher, BrowserPage, ReadinessSnapshot, EXTENSION_SCRIPT,
    GENERATE_BUTTON, MIX_BASE64_SCRIPT, READINESS_SCRIPT, SONG_INPUT, START_BUTTON,
    VENDOR_STATUS,
};

/// Bound on the best-effort state read after a timeout
const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(10);

/// Application log lines shown in a diagnostic
const DIAGNOSTIC_LOG_TAIL: usize = 20;

/// Bound on the console flush before a session is released
const RELAY_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Inputs of a smoke run
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    pub url: String,
    pub fixture: PathBuf,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub timeouts: StepTimeouts,
}

impl HarnessSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.harness.url.clone(),
            fixture: config.harness.fixture.clone(),
            output_dir: config.harness.output_dir.clone(),
            output_prefix: config.harness.output_prefix.clone(),
            timeouts: config.step_timeouts(),
        }
    }
}

/// Workflow steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Launch,
    Navigate,
    VendorStatus,
    UploadFixture,
    Start,
    BuffersDecoded,
    Generate,
    MixReady,
    Extract,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Launch => "launch browser",
            Self::Navigate => "navigate",
            Self::VendorStatus => "read vendor status",
            Self::UploadFixture => "upload fixture",
            Self::Start => "click start",
            Self::BuffersDecoded => "wait for decoded buffers",
            Self::Generate => "click generate",
            Self::MixReady => "wait for mix",
            Self::Extract => "extract artifact",
        };
        f.write_str(text)
    }
}

/// An error tagged with the step it interrupted
#[derive(Debug)]
pub struct StepError {
    pub step: Step,
    pub error: Error,
}

trait AtStep<T> {
    fn at(self, step: Step) -> std::result::Result<T, StepError>;
}

impl<T> AtStep<T> for Result<T> {
    fn at(self, step: Step) -> std::result::Result<T, StepError> {
        self.map_err(|error| StepError { step, error })
    }
}

/// The file written for a successful run
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub bytes: usize,
    pub container: Option<Container>,
}

/// Best-effort state read taken when a wait times out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The readiness signals at the time of the timeout
    Snapshot(ReadinessSnapshot),
    /// The page never created its state object
    NoState,
    /// The state could not be read
    Unavailable(String),
}

/// How one engine run ended
#[derive(Debug)]
pub enum Outcome {
    /// Artifact written
    Passed {
        vendor_status: String,
        artifact: Artifact,
    },
    /// A bounded wait ran out; diagnostic captured
    TimedOut {
        step: Step,
        error: String,
        diagnostic: Diagnostic,
    },
    /// Uncaught error for this engine
    Failed { step: Step, error: String },
}

/// Result of one engine run
#[derive(Debug)]
pub struct EngineReport {
    pub engine: Engine,
    pub outcome: Outcome,
    pub console_messages: usize,
    pub elapsed: Duration,
}

impl EngineReport {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed { .. })
    }

    /// Wall time in milliseconds, saturating
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Aggregate of a smoke run
#[derive(Debug, Default)]
pub struct RunReport {
    pub engines: Vec<EngineReport>,
}

impl RunReport {
    /// Whether any engine ended with an uncaught error
    ///
    /// Diagnosed timeouts do not count.
    pub fn has_uncaught_errors(&self) -> bool {
        self.engines
            .iter()
            .any(|r| matches!(r.outcome, Outcome::Failed { .. }))
    }

    pub fn passed(&self) -> usize {
        self.engines.iter().filter(|r| r.passed()).count()
    }

    pub fn print_summary(&self) {
        println!("\n{}", "Summary:".cyan());
        for report in &self.engines {
            let line = match &report.outcome {
                Outcome::Passed { artifact, .. } => format!(
                    "  {} {:<9} {} ({} bytes)",
                    "✓".green(),
                    report.engine.name(),
                    artifact.path.display(),
                    artifact.bytes
                ),
                Outcome::TimedOut { step, .. } => format!(
                    "  {} {:<9} timed out: {}",
                    "⏱".yellow(),
                    report.engine.name(),
                    step
                ),
                Outcome::Failed { step, error } => format!(
                    "  {} {:<9} {}: {}",
                    "✗".red(),
                    report.engine.name(),
                    step,
                    error
                ),
            };
            println!("{}", line);
        }
        println!(
            "\n{} of {} engines passed\n",
            self.passed(),
            self.engines.len()
        );
    }
}

/// Runs the workflow against sessions from a launcher
pub struct Harness<L> {
    launcher: L,
    settings: HarnessSettings,
}

impl<L: BrowserLauncher> Harness<L> {
    pub fn new(launcher: L, settings: HarnessSettings) -> Self {
        Self { launcher, settings }
    }

    /// Run every engine in order; never stops early
    pub async fn run(&self, engines: &[Engine]) -> RunReport {
        let mut report = RunReport::default();
        for &engine in engines {
            report.engines.push(self.run_engine(engine).await);
        }
        report
    }

    /// One engine run with guaranteed session release
    pub async fn run_engine(&self, engine: Engine) -> EngineReport {
        let started = Instant::now();
        println!(
            "\n{} {}",
            "Running smoke test on".blue().bold(),
            engine.name().white().bold()
        );

        let mut page = match self.launcher.launch(engine).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(%engine, "Failed to launch browser: {}", e);
                println!("  {} ERROR on {}: {}", "✗".red(), engine, e);
                return EngineReport {
                    engine,
                    outcome: Outcome::Failed {
                        step: Step::Launch,
                        error: e.to_string(),
                    },
                    console_messages: 0,
                    elapsed: started.elapsed(),
                };
            }
        };

        let mut relay = ConsoleRelay::new(engine);
        let result = self.workflow(engine, page.as_mut(), &mut relay).await;
        relay.pump_within(page.as_mut(), RELAY_FLUSH_TIMEOUT).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(StepError { step, error }) if error.is_timeout() && step != Step::Extract => {
                println!("  {} Timeout at '{}': {}", "⏱".yellow(), step, error);
                tracing::warn!(%engine, %step, "Timed out: {}", error);
                let diagnostic = capture_diagnostic(page.as_mut()).await;
                print_diagnostic(engine, &diagnostic);
                Outcome::TimedOut {
                    step,
                    error: error.to_string(),
                    diagnostic,
                }
            }
            Err(StepError { step, error }) => {
                println!("  {} ERROR on {} at '{}': {}", "✗".red(), engine, step, error);
                tracing::error!(%engine, %step, "Engine run failed: {}", error);
                Outcome::Failed {
                    step,
                    error: error.to_string(),
                }
            }
        };

        if let Err(e) = page.close().await {
            tracing::warn!(%engine, "Failed to release browser session cleanly: {}", e);
        }

        EngineReport {
            engine,
            outcome,
            console_messages: relay.forwarded(),
            elapsed: started.elapsed(),
        }
    }

    async fn workflow(
        &self,
        engine: Engine,
        page: &mut dyn BrowserPage,
        relay: &mut ConsoleRelay,
    ) -> std::result::Result<Outcome, StepError> {
        let t = self.settings.timeouts;

        step_line(&format!("Navigating to {}", self.settings.url));
        bounded("navigation", t.navigation, page.goto(&self.settings.url, t.navigation))
            .await
            .at(Step::Navigate)?;

        wait_attached(page, relay, VENDOR_STATUS, t.status_element, t.poll_interval)
            .await
            .at(Step::VendorStatus)?;
        let vendor_status = bounded(VENDOR_STATUS, t.status_element, page.inner_text(VENDOR_STATUS))
            .await
            .at(Step::VendorStatus)?;
        step_line(&format!("vendorStatus: {}", vendor_status));

        // Interactions share the status element bound
        step_line("Uploading local test WAV to file input...");
        bounded(
            SONG_INPUT,
            t.status_element,
            page.set_input_file(SONG_INPUT, &self.settings.fixture),
        )
        .await
        .at(Step::UploadFixture)?;

        step_line("Clicking start...");
        bounded(START_BUTTON, t.status_element, page.click(START_BUTTON))
            .await
            .at(Step::Start)?;

        wait_for_readiness(
            page,
            relay,
            "audio buffers decoded",
            t.buffers_decoded,
            t.poll_interval,
            |s| s.buffers_decoded > 0,
        )
        .await
        .at(Step::BuffersDecoded)?;
        step_line("Audio buffers decoded");

        step_line("Generating mix...");
        bounded(GENERATE_BUTTON, t.status_element, page.click(GENERATE_BUTTON))
            .await
            .at(Step::Generate)?;

        let ready = wait_for_readiness(page, relay, "mix ready", t.mix_ready, t.poll_interval, |s| {
            s.mix_ready
        })
        .await
        .at(Step::MixReady)?;
        step_line("Mix generation complete");

        let artifact = self.extract(engine, page, &ready).await.at(Step::Extract)?;
        println!(
            "  {} Saved {} size {}",
            "✓".green(),
            artifact.path.display(),
            artifact.bytes
        );

        Ok(Outcome::Passed {
            vendor_status,
            artifact,
        })
    }

    /// Pull the mix out through the base64 bridge and write it
    async fn extract(
        &self,
        engine: Engine,
        page: &mut dyn BrowserPage,
        ready: &ReadinessSnapshot,
    ) -> Result<Artifact> {
        let t = self.settings.timeouts;
        if !ready.has_mix_blob {
            return Err(Error::Artifact(
                "mixReady is set but mixBlob is missing".to_string(),
            ));
        }
        tracing::debug!(
            %engine,
            filename = ready.mix_filename.as_deref().unwrap_or("out.wav"),
            "Extracting mix"
        );

        let raw_ext = bounded("output extension", t.status_element, page.evaluate(EXTENSION_SCRIPT))
            .await?;
        let ext = artifact::sanitize_extension(raw_ext.as_str().unwrap_or_default());

        let value = bounded(
            "mix blob",
            t.mix_ready,
            page.evaluate_async(MIX_BASE64_SCRIPT, t.mix_ready),
        )
        .await?;
        let payload: BridgePayload = serde_json::from_value(value)
            .map_err(|e| Error::Artifact(format!("unexpected bridge result: {}", e)))?;
        let bytes = artifact::decode_payload(payload)?;

        let path = artifact::output_path(
            &self.settings.output_dir,
            &self.settings.output_prefix,
            engine,
            &ext,
        );
        artifact::persist(&path, &bytes).await?;

        let container = Container::sniff(&bytes);
        match container {
            Some(found) if !found.matches_extension(&ext) => tracing::warn!(
                %engine,
                "Artifact is {} but was saved as .{}",
                found,
                ext
            ),
            None => tracing::warn!(%engine, "Artifact container not recognized"),
            Some(_) => {}
        }

        Ok(Artifact {
            path,
            bytes: bytes.len(),
            container,
        })
    }
}

fn step_line(text: &str) {
    println!("  {} {}", "→".cyan(), text);
}

/// Await `fut` for at most `limit`
async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(what, limit)),
    }
}

/// Poll until an element matching `selector` is attached
///
/// Waits relay console output on every tick, within the same deadline.
async fn wait_attached(
    page: &mut dyn BrowserPage,
    relay: &mut ConsoleRelay,
    selector: &str,
    limit: Duration,
    poll: Duration,
) -> Result<()> {
    let deadline = Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::timeout(selector, limit));
        }
        let attached = bounded(selector, remaining, page.is_attached(selector)).await?;
        relay
            .pump_within(page, deadline.saturating_duration_since(Instant::now()))
            .await;
        if attached {
            return Ok(());
        }
        tokio::time::sleep(poll.min(deadline.saturating_duration_since(Instant::now()))).await;
    }
}

/// Poll the readiness snapshot until `ready` holds
async fn wait_for_readiness<F>(
    page: &mut dyn BrowserPage,
    relay: &mut ConsoleRelay,
    what: &str,
    limit: Duration,
    poll: Duration,
    ready: F,
) -> Result<ReadinessSnapshot>
where
    F: Fn(&ReadinessSnapshot) -> bool,
{
    let deadline = Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::timeout(what, limit));
        }

        let value = bounded(what, remaining, page.evaluate(READINESS_SCRIPT))
            .await
            .map_err(|e| match e {
                Error::Timeout { .. } => Error::timeout(what, limit),
                other => other,
            })?;
        relay
            .pump_within(page, deadline.saturating_duration_since(Instant::now()))
            .await;

        if let Some(snapshot) = ReadinessSnapshot::from_value(value)? {
            tracing::trace!(%snapshot, "Readiness poll");
            if ready(&snapshot) {
                return Ok(snapshot);
            }
        }

        tokio::time::sleep(poll.min(deadline.saturating_duration_since(Instant::now()))).await;
    }
}

async fn capture_diagnostic(page: &mut dyn BrowserPage) -> Diagnostic {
    let read = bounded(
        "diagnostic snapshot",
        DIAGNOSTIC_TIMEOUT,
        page.evaluate(READINESS_SCRIPT),
    )
    .await
    .and_then(ReadinessSnapshot::from_value);

    match read {
        Ok(Some(snapshot)) => Diagnostic::Snapshot(snapshot),
        Ok(None) => Diagnostic::NoState,
        Err(e) => Diagnostic::Unavailable(e.to_string()),
    }
}

fn print_diagnostic(engine: Engine, diagnostic: &Diagnostic) {
    match diagnostic {
        Diagnostic::Snapshot(snapshot) => {
            println!("  layai snapshot: {}", snapshot.to_string().dimmed());
            tracing::warn!(%engine, %snapshot, "Readiness at timeout");
            if let Some(logs) = &snapshot.logs {
                let skip = logs.len().saturating_sub(DIAGNOSTIC_LOG_TAIL);
                for line in &logs[skip..] {
                    println!("    {}", line.dimmed());
                }
            }
        }
        Diagnostic::NoState => println!("  layai snapshot: {}", "window.layai is not defined".dimmed()),
        Diagnostic::Unavailable(e) => {
            println!("  Failed to capture snapshot: {}", e);
            tracing::warn!(%engine, "Failed to capture snapshot: {}", e);
        }
    }
}
