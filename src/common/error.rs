//! Error types for the delivery server and the smoke harness
//!
//! Messages are written to be read in a terminal next to the per-engine
//! progress output, so they name the engine, selector or step involved.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    // === Server Errors ===
    #[error("Failed to bind server to {addr}: {source}")]
    ServerBind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Static root '{0}' is not a directory")]
    InvalidRoot(String),

    // === Driver/Session Errors ===
    #[error("WebDriver server '{name}' not found. Searched: {searched}")]
    DriverNotFound { name: String, searched: String },

    #[error("WebDriver server failed to start: {0}")]
    DriverStartFailed(String),

    #[error("WebDriver server did not become ready within {0} seconds")]
    DriverStartTimeout(u64),

    #[error("Failed to create browser session: {0}")]
    SessionCreateFailed(String),

    // === WebDriver Protocol Errors ===
    #[error("WebDriver request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebDriver command '{command}' failed: {error}: {message}")]
    WebDriver {
        command: String,
        error: String,
        message: String,
    },

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),

    // === Page Contract Errors ===
    #[error("Element '{0}' not found")]
    ElementNotFound(String),

    #[error("Page script error: {0}")]
    Script(String),

    // === Timeout Errors ===
    #[error("Timed out after {secs:.1}s waiting for {what}")]
    Timeout { what: String, secs: f64 },

    // === Artifact Errors ===
    #[error("Artifact extraction failed: {0}")]
    Artifact(String),

    #[error("Invalid base64 artifact payload: {0}")]
    Base64(#[from] base64::DecodeError),

    // === Smoke Run Errors ===
    #[error("{failed} of {total} engines failed")]
    EnginesFailed { failed: usize, total: usize },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to write file '{path}': {error}")]
    FileWrite { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a driver not found error with search paths
    pub fn driver_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::DriverNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a WebDriver command failure
    pub fn webdriver(command: &str, error: &str, message: &str) -> Self {
        Self::WebDriver {
            command: command.to_string(),
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a timeout error for a named wait
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            secs: after.as_secs_f64(),
        }
    }

    /// Whether this error is a bounded wait running out.
    ///
    /// WebDriver reports its own page-load and script timeouts as error codes,
    /// those count too.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::WebDriver { error, .. } => error == "timeout" || error == "script timeout",
            _ => false,
        }
    }
}
