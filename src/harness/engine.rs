//! The three browser engines and how to ask their drivers for a session

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::common::{config::EngineConfig, Error, Result};

/// A browser engine driven by the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Engine {
    Chromium,
    Firefox,
    Webkit,
}

impl Engine {
    /// All engines, in run order
    pub const ALL: [Engine; 3] = [Engine::Chromium, Engine::Firefox, Engine::Webkit];

    /// Lowercase name used in output tags and file names
    pub fn name(self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }

    /// Executable name of the engine's WebDriver server
    pub fn default_driver(self) -> &'static str {
        match self {
            Self::Chromium => "chromedriver",
            Self::Firefox => "geckodriver",
            #[cfg(target_os = "macos")]
            Self::Webkit => "safaridriver",
            #[cfg(not(target_os = "macos"))]
            Self::Webkit => "WebKitWebDriver",
        }
    }

    /// Whether the engine's driver can hand out a BiDi WebSocket
    pub fn speaks_bidi(self) -> bool {
        matches!(self, Self::Chromium | Self::Firefox)
    }

    /// `alwaysMatch` capabilities for a new session
    pub fn capabilities(self, headless: bool, overrides: &EngineConfig) -> Value {
        let binary = overrides
            .binary
            .as_ref()
            .map(|path| path.display().to_string());

        match self {
            Self::Chromium => {
                let mut args: Vec<String> = vec![
                    "--no-sandbox".into(),
                    "--autoplay-policy=no-user-gesture-required".into(),
                ];
                if headless {
                    args.push("--headless=new".into());
                }
                args.extend(overrides.args.iter().cloned());

                let mut options = json!({ "args": args });
                if let Some(binary) = binary {
                    options["binary"] = json!(binary);
                }
                json!({ "browserName": "chrome", "goog:chromeOptions": options })
            }
            Self::Firefox => {
                let mut args: Vec<String> = Vec::new();
                if headless {
                    args.push("-headless".into());
                }
                args.extend(overrides.args.iter().cloned());

                let mut options = json!({
                    "args": args,
                    "prefs": { "media.autoplay.default": 0 }
                });
                if let Some(binary) = binary {
                    options["binary"] = json!(binary);
                }
                json!({ "browserName": "firefox", "moz:firefoxOptions": options })
            }
            Self::Webkit => webkit_capabilities(headless, binary, &overrides.args),
        }
    }
}

#[cfg(target_os = "macos")]
fn webkit_capabilities(_headless: bool, _binary: Option<String>, _args: &[String]) -> Value {
    // safaridriver has no headless mode and no browser arguments
    json!({ "browserName": "safari" })
}

#[cfg(not(target_os = "macos"))]
fn webkit_capabilities(headless: bool, binary: Option<String>, extra: &[String]) -> Value {
    let mut args: Vec<String> = vec!["--automation".into()];
    if headless {
        args.push("--headless".into());
    }
    args.extend(extra.iter().cloned());

    let mut options = json!({ "args": args });
    if let Some(binary) = binary {
        options["binary"] = json!(binary);
    }
    json!({ "webkitgtk:browserOptions": options })
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" | "safari" => Ok(Self::Webkit),
            other => Err(Error::Config(format!(
                "Unknown engine '{}'. Supported engines: chromium, firefox, webkit",
                other
            ))),
        }
    }
}

/// Resolve engine names to the engines to run, in fixed run order
///
/// An empty selection means every engine. Duplicates collapse.
pub fn select(names: &[String]) -> Result<Vec<Engine>> {
    if names.is_empty() {
        return Ok(Engine::ALL.to_vec());
    }

    let mut engines = names
        .iter()
        .map(|name| name.parse::<Engine>())
        .collect::<Result<Vec<_>>>()?;
    engines.sort();
    engines.dedup();
    Ok(engines)
}
