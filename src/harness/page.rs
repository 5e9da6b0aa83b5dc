//! Page contract of the LayerAudio application and the browser seam
//!
//! The application exposes its progress on `window.layai`. The harness reads
//! that object only through [`READINESS_SCRIPT`], which projects it onto the
//! fields of [`ReadinessSnapshot`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::common::Result;

use super::console::ConsoleMessage;
use super::engine::Engine;

/// Element showing the audio vendor / readiness status
pub const VENDOR_STATUS: &str = "#vendorStatus";
/// File input receiving the song
pub const SONG_INPUT: &str = "#songInput";
/// Button decoding the selected songs
pub const START_BUTTON: &str = "#startBtn";
/// Button rendering the mix
pub const GENERATE_BUTTON: &str = "#generateBtn";

/// Project `window.layai` onto the readiness fields, or `null` when absent
pub const READINESS_SCRIPT: &str = r#"
const s = window.layai;
if (!s) { return null; }
const logs = s._logs == null ? null
  : (Array.isArray(s._logs) ? s._logs.map(String) : [String(s._logs)]);
return {
  buffersDecoded: Array.isArray(s.audioBuffers) ? s.audioBuffers.length : 0,
  mixReady: s.mixReady === true,
  mixError: s.mixError == null ? null : String(s.mixError),
  logs: logs,
  mixFilename: s.mixFilename ? String(s.mixFilename) : null,
  hasMixBlob: !!s.mixBlob
};
"#;

/// Extension of the suggested output file name
pub const EXTENSION_SCRIPT: &str =
    "return (window.layai.mixFilename || 'out.wav').split('.').pop();";

/// Read `mixBlob` through a data URL and hand back its base64 payload
///
/// Async script: the completion callback is the last argument.
pub const MIX_BASE64_SCRIPT: &str = r#"
const done = arguments[arguments.length - 1];
const blob = window.layai && window.layai.mixBlob;
if (!blob) { done({ error: 'mixBlob is not set' }); return; }
const reader = new FileReader();
reader.onload = () => done({ data: String(reader.result).split(',')[1] || '' });
reader.onerror = () => done({ error: String(reader.error) });
reader.readAsDataURL(blob);
"#;

/// Text of the first element matching `arguments[0]`, `null` when absent
pub const INNER_TEXT_SCRIPT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { return null; }
return el.innerText || el.textContent || '';
"#;

/// Typed view of the page's readiness signals
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessSnapshot {
    /// Number of decoded audio buffers
    #[serde(default)]
    pub buffers_decoded: u64,
    /// Whether the mix has been rendered
    #[serde(default)]
    pub mix_ready: bool,
    /// Error reported by the mixer
    pub mix_error: Option<String>,
    /// Rolling application log
    pub logs: Option<Vec<String>>,
    /// Suggested output file name
    pub mix_filename: Option<String>,
    /// Whether a mix blob is held in memory
    #[serde(default)]
    pub has_mix_blob: bool,
}

impl ReadinessSnapshot {
    /// Parse the result of [`READINESS_SCRIPT`]
    ///
    /// `Ok(None)` means the page has not created its state object yet.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

impl fmt::Display for ReadinessSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffers={} mixReady={} mixError={}",
            self.buffers_decoded,
            self.mix_ready,
            self.mix_error.as_deref().unwrap_or("none")
        )?;
        if let Some(logs) = &self.logs {
            write!(f, " logs={}", logs.len())?;
        }
        Ok(())
    }
}

/// Result shape of [`MIX_BASE64_SCRIPT`]
#[derive(Debug, Deserialize)]
pub struct BridgePayload {
    pub data: Option<String>,
    pub error: Option<String>,
}

/// One page in an isolated browser session
///
/// Scripts are function bodies: they `return` their result, and async scripts
/// receive a completion callback as their last argument.
#[async_trait]
pub trait BrowserPage: Send {
    /// Navigate and wait for the load to finish
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Whether an element matching `selector` is attached to the DOM
    async fn is_attached(&mut self, selector: &str) -> Result<bool>;

    /// Rendered text of an element
    async fn inner_text(&mut self, selector: &str) -> Result<String>;

    /// Hand a local file to a file input
    async fn set_input_file(&mut self, selector: &str, file: &Path) -> Result<()>;

    /// Click an element
    async fn click(&mut self, selector: &str) -> Result<()>;

    /// Run a synchronous script
    async fn evaluate(&mut self, script: &str) -> Result<Value>;

    /// Run an asynchronous script
    async fn evaluate_async(&mut self, script: &str, timeout: Duration) -> Result<Value>;

    /// Take the console messages logged since the last call
    async fn drain_console(&mut self) -> Result<Vec<ConsoleMessage>>;

    /// Tear the session down; the page is unusable afterwards
    async fn close(&mut self) -> Result<()>;
}

/// Creates one fresh session per engine run
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, engine: Engine) -> Result<Box<dyn BrowserPage>>;
}
