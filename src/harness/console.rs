//! Console relay
//!
//! Sessions on drivers that speak BiDi receive `log.entryAdded` events from
//! page load onwards. Elsewhere a shim wraps the page's `console` methods and
//! queues messages on `window.__layaudioConsole`. The relay drains whichever
//! source the page has on every readiness poll and prints each message
//! tagged with the engine name.

use std::time::Duration;

use colored::Colorize;
use serde::Deserialize;

use super::engine::Engine;
use super::page::BrowserPage;

/// Install the console shim once per document, then drain its queue
///
/// Messages logged before the shim is installed on a fresh document are not
/// captured.
pub const CONSOLE_DRAIN_SCRIPT: &str = r#"
if (!window.__layaudioConsole) {
  window.__layaudioConsole = [];
  ['log', 'info', 'warn', 'error', 'debug'].forEach((level) => {
    const original = console[level].bind(console);
    console[level] = (...args) => {
      try {
        const text = args.map((a) => {
          if (typeof a === 'string') { return a; }
          try { return JSON.stringify(a); } catch (e) { return String(a); }
        }).join(' ');
        const queue = window.__layaudioConsole;
        queue.push({ level: level, text: text });
        if (queue.length > 1000) { queue.shift(); }
      } catch (e) {}
      original(...args);
    };
  });
  window.addEventListener('error', (ev) => {
    window.__layaudioConsole.push({ level: 'error', text: String(ev.message) });
  });
}
const drained = window.__layaudioConsole;
window.__layaudioConsole = [];
return drained;
"#;

/// One console message from the page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsoleMessage {
    /// `log`, `info`, `warn`, `error` or `debug`
    #[serde(default = "default_level")]
    pub level: String,
    /// Arguments joined with spaces
    #[serde(default)]
    pub text: String,
}

fn default_level() -> String {
    "log".to_string()
}

impl ConsoleMessage {
    pub fn new(level: &str, text: &str) -> Self {
        Self {
            level: level.to_string(),
            text: text.to_string(),
        }
    }
}

/// Forwards page console output to the harness output for one engine run
pub struct ConsoleRelay {
    engine: Engine,
    forwarded: usize,
}

impl ConsoleRelay {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            forwarded: 0,
        }
    }

    /// Number of messages forwarded so far
    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    /// Drain the page's queue and print what it held
    ///
    /// Best effort: a page that cannot be drained is logged and skipped.
    pub async fn pump(&mut self, page: &mut dyn BrowserPage) {
        match page.drain_console().await {
            Ok(messages) => {
                for message in &messages {
                    self.forward(message);
                }
            }
            Err(e) => tracing::debug!(engine = %self.engine, "Console drain failed: {}", e),
        }
    }

    /// [`pump`](Self::pump), abandoned once `limit` runs out
    pub async fn pump_within(&mut self, page: &mut dyn BrowserPage, limit: Duration) {
        if limit.is_zero() {
            return;
        }
        if tokio::time::timeout(limit, self.pump(page)).await.is_err() {
            tracing::debug!(engine = %self.engine, "Console drain abandoned after {:?}", limit);
        }
    }

    fn forward(&mut self, message: &ConsoleMessage) {
        self.forwarded += 1;
        let line = format_message(self.engine, message);
        let styled = match message.level.as_str() {
            "error" => line.red(),
            "warn" => line.yellow(),
            _ => line.dimmed(),
        };
        println!("{}", styled);
        tracing::debug!(engine = %self.engine, level = %message.level, "console: {}", message.text);
    }
}

/// `CONSOLE[engine] text`, with the level for anything other than `log`
pub fn format_message(engine: Engine, message: &ConsoleMessage) -> String {
    if message.level == "log" {
        format!("CONSOLE[{}] {}", engine, message.text)
    } else {
        format!("CONSOLE[{}] [{}] {}", engine, message.level, message.text)
    }
}
