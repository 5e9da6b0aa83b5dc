//! Configuration file handling

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Delivery server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Smoke harness settings
    #[serde(default)]
    pub harness: HarnessConfig,

    /// Per-step timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// WebDriver server overrides keyed by engine name
    #[serde(default)]
    pub engines: HashMap<String, EngineConfig>,
}

/// Delivery server settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interface to bind
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory served as the document root
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            root: default_root(),
        }
    }
}

fn default_port() -> u16 {
    8000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// Smoke harness settings
#[derive(Debug, Deserialize, Clone)]
pub struct HarnessConfig {
    /// Entry document of the application under test
    #[serde(default = "default_url")]
    pub url: String,

    /// Audio file handed to the page's file input
    #[serde(default = "default_fixture")]
    pub fixture: PathBuf,

    /// Prefix of the per-engine output files
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Directory receiving the per-engine output files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Delay between two readiness polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Run browsers without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Relay console output over WebDriver BiDi where the driver offers it
    #[serde(default = "default_bidi_console")]
    pub bidi_console: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            fixture: default_fixture(),
            output_prefix: default_output_prefix(),
            output_dir: default_output_dir(),
            poll_interval_ms: default_poll_interval(),
            headless: default_headless(),
            bidi_console: default_bidi_console(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:8000/index.html".to_string()
}
fn default_fixture() -> PathBuf {
    PathBuf::from("test_local.wav")
}
fn default_output_prefix() -> String {
    "test_output".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_poll_interval() -> u64 {
    100
}
fn default_headless() -> bool {
    true
}
fn default_bidi_console() -> bool {
    true
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Navigation and initial script evaluation
    #[serde(default = "default_navigation")]
    pub navigation_secs: u64,

    /// Status element attachment
    #[serde(default = "default_status_element")]
    pub status_element_secs: u64,

    /// Audio buffers decoded
    #[serde(default = "default_buffers_decoded")]
    pub buffers_decoded_secs: u64,

    /// Mix generation; must exceed every other step timeout
    #[serde(default = "default_mix_ready")]
    pub mix_ready_secs: u64,

    /// WebDriver server startup
    #[serde(default = "default_driver_start")]
    pub driver_start_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_secs: default_navigation(),
            status_element_secs: default_status_element(),
            buffers_decoded_secs: default_buffers_decoded(),
            mix_ready_secs: default_mix_ready(),
            driver_start_secs: default_driver_start(),
        }
    }
}

fn default_navigation() -> u64 {
    60
}
fn default_status_element() -> u64 {
    30
}
fn default_buffers_decoded() -> u64 {
    60
}
fn default_mix_ready() -> u64 {
    180
}
fn default_driver_start() -> u64 {
    20
}

/// Per-step timeouts of one engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    pub navigation: Duration,
    pub status_element: Duration,
    pub buffers_decoded: Duration,
    pub mix_ready: Duration,
    pub poll_interval: Duration,
}

impl Timeouts {
    /// Convert to the durations the harness waits on
    pub fn steps(&self, poll_interval_ms: u64) -> StepTimeouts {
        StepTimeouts {
            navigation: Duration::from_secs(self.navigation_secs),
            status_element: Duration::from_secs(self.status_element_secs),
            buffers_decoded: Duration::from_secs(self.buffers_decoded_secs),
            mix_ready: Duration::from_secs(self.mix_ready_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }
}

/// Configuration for an engine's WebDriver server
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    /// Path or name of the WebDriver server executable
    pub driver: Option<PathBuf>,

    /// Browser binary the driver should launch
    pub binary: Option<PathBuf>,

    /// Extra browser command-line arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the timeout escalation and other cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        let named = [
            ("navigation_secs", t.navigation_secs),
            ("status_element_secs", t.status_element_secs),
            ("buffers_decoded_secs", t.buffers_decoded_secs),
            ("mix_ready_secs", t.mix_ready_secs),
            ("driver_start_secs", t.driver_start_secs),
        ];
        for (name, secs) in named {
            if secs == 0 {
                return Err(Error::Config(format!("timeouts.{} must be positive", name)));
            }
        }

        let longest_step = t
            .navigation_secs
            .max(t.status_element_secs)
            .max(t.buffers_decoded_secs);
        if t.mix_ready_secs <= longest_step {
            return Err(Error::Config(format!(
                "timeouts.mix_ready_secs ({}) must exceed every other step timeout (longest is {})",
                t.mix_ready_secs, longest_step
            )));
        }

        if self.harness.poll_interval_ms == 0 {
            return Err(Error::Config(
                "harness.poll_interval_ms must be positive".to_string(),
            ));
        }

        if self.harness.output_prefix.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "harness.output_prefix '{}' must not contain path separators",
                self.harness.output_prefix
            )));
        }

        Ok(())
    }

    /// Get the engine's override block, empty if not configured
    pub fn engine(&self, name: &str) -> EngineConfig {
        self.engines.get(name).cloned().unwrap_or_default()
    }

    /// Step timeouts for the harness
    pub fn step_timeouts(&self) -> StepTimeouts {
        self.timeouts.steps(self.harness.poll_interval_ms)
    }
}
