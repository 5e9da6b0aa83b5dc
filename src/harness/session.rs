//! WebDriver-backed browser sessions
//!
//! A session owns its driver process and its WebDriver session. Closing it
//! deletes the session and kills the driver; dropping it without closing
//! still kills the driver.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::common::config::{Config, StepTimeouts};
use crate::common::{Error, Result};
use crate::webdriver::{
    resolve_driver, DriverProcess, ElementRef, LogEntry, LogSubscription, WebDriverClient,
};

use super::console::{ConsoleMessage, CONSOLE_DRAIN_SCRIPT};
use super::engine::Engine;
use super::page::{BrowserLauncher, BrowserPage, INNER_TEXT_SCRIPT};

/// Errors from element click that a script click can work around
const CLICK_FALLBACK_ERRORS: [&str; 2] = ["element not interactable", "element click intercepted"];

/// Click through the DOM instead of synthesized input
pub const SCRIPT_CLICK: &str = "arguments[0].click();";

/// Launches a WebDriver session per engine
pub struct WebDriverLauncher {
    config: Config,
    timeouts: StepTimeouts,
    driver_start: Duration,
}

impl WebDriverLauncher {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            timeouts: config.step_timeouts(),
            driver_start: Duration::from_secs(config.timeouts.driver_start_secs),
        }
    }

    async fn open_session(&self, engine: Engine, base_url: &str) -> Result<WebDriverClient> {
        let overrides = self.config.engine(engine.name());
        let mut client = WebDriverClient::new(base_url)?;
        let mut capabilities = engine.capabilities(self.config.harness.headless, &overrides);
        if self.config.harness.bidi_console && engine.speaks_bidi() {
            capabilities["webSocketUrl"] = json!(true);
        }
        client.new_session(capabilities, self.driver_start).await?;

        if let Err(e) = client
            .set_timeouts(self.timeouts.navigation, self.timeouts.mix_ready)
            .await
        {
            let _ = client.delete_session().await;
            return Err(e);
        }
        Ok(client)
    }

    /// Subscribe to BiDi log events when the driver granted a socket
    async fn console_source(&self, engine: Engine, client: &WebDriverClient) -> ConsoleSource {
        let Some(ws_url) = client.capabilities["webSocketUrl"].as_str() else {
            return ConsoleSource::Shim;
        };
        match LogSubscription::connect(ws_url, self.driver_start).await {
            Ok(subscription) => {
                tracing::debug!(%engine, "Console relay subscribed over BiDi");
                ConsoleSource::Bidi(subscription)
            }
            Err(e) => {
                tracing::warn!(%engine, "BiDi log subscription failed, using console shim: {}", e);
                ConsoleSource::Shim
            }
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, engine: Engine) -> Result<Box<dyn BrowserPage>> {
        let overrides = self.config.engine(engine.name());
        let driver_path = resolve_driver(overrides.driver.as_deref(), engine.default_driver())?;
        tracing::debug!(%engine, driver = %driver_path.display(), "Launching browser session");

        let mut driver = DriverProcess::spawn(&driver_path, self.driver_start).await?;

        match self.open_session(engine, &driver.base_url()).await {
            Ok(client) => {
                let caps = &client.capabilities;
                tracing::info!(
                    %engine,
                    session = client.session_id().unwrap_or("unknown"),
                    browser = caps["browserName"].as_str().unwrap_or("unknown"),
                    version = caps["browserVersion"].as_str().unwrap_or("unknown"),
                    browser_pid = ?caps["moz:processID"].as_u64(),
                    driver_pid = ?driver.pid(),
                    "Browser session ready"
                );
                let console = self.console_source(engine, &client).await;
                Ok(Box::new(WebDriverPage {
                    engine,
                    client,
                    driver: Some(driver),
                    console,
                }))
            }
            Err(e) => {
                driver.stop().await;
                Err(e)
            }
        }
    }
}

/// Where console output comes from
enum ConsoleSource {
    /// `log.entryAdded` events, live from session start
    Bidi(LogSubscription),
    /// In-page queue installed by [`CONSOLE_DRAIN_SCRIPT`]
    Shim,
}

/// One isolated browsing context behind a WebDriver session
pub struct WebDriverPage {
    engine: Engine,
    client: WebDriverClient,
    driver: Option<DriverProcess>,
    console: ConsoleSource,
}

impl WebDriverPage {
    /// Wrap a session whose driver is managed elsewhere
    ///
    /// Console output is read through the in-page shim.
    pub fn attach(engine: Engine, client: WebDriverClient) -> Self {
        Self {
            engine,
            client,
            driver: None,
            console: ConsoleSource::Shim,
        }
    }

    async fn element(&self, selector: &str) -> Result<ElementRef> {
        self.client.require_element(selector).await
    }
}

impl From<LogEntry> for ConsoleMessage {
    fn from(entry: LogEntry) -> Self {
        Self {
            level: entry.level,
            text: entry.text,
        }
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.client.navigate(url, timeout).await
    }

    async fn is_attached(&mut self, selector: &str) -> Result<bool> {
        Ok(self.client.find_element(selector).await?.is_some())
    }

    async fn inner_text(&mut self, selector: &str) -> Result<String> {
        let value = self
            .client
            .execute(INNER_TEXT_SCRIPT, vec![json!(selector)])
            .await?;
        match value {
            Value::String(text) => Ok(text),
            Value::Null => Err(Error::ElementNotFound(selector.to_string())),
            other => Err(Error::Script(format!(
                "text of '{}' is not a string: {}",
                selector, other
            ))),
        }
    }

    async fn set_input_file(&mut self, selector: &str, file: &Path) -> Result<()> {
        let absolute = file.canonicalize().map_err(|e| Error::FileRead {
            path: file.display().to_string(),
            error: e.to_string(),
        })?;
        let input = self.element(selector).await?;
        self.client
            .send_keys(&input, &absolute.display().to_string())
            .await
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.element(selector).await?;
        match self.client.click(&target).await {
            Err(Error::WebDriver { ref error, .. })
                if CLICK_FALLBACK_ERRORS.contains(&error.as_str()) =>
            {
                tracing::debug!(engine = %self.engine, selector, "Native click refused ({}), using script click", error);
                self.client
                    .execute(SCRIPT_CLICK, vec![target.to_value()])
                    .await
                    .map(|_| ())
            }
            other => other,
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        self.client.execute(script, Vec::new()).await
    }

    async fn evaluate_async(&mut self, script: &str, timeout: Duration) -> Result<Value> {
        self.client.execute_async(script, Vec::new(), timeout).await
    }

    async fn drain_console(&mut self) -> Result<Vec<ConsoleMessage>> {
        match &mut self.console {
            ConsoleSource::Bidi(subscription) => Ok(subscription
                .drain()
                .into_iter()
                .map(ConsoleMessage::from)
                .collect()),
            ConsoleSource::Shim => {
                let value = self.client.execute(CONSOLE_DRAIN_SCRIPT, Vec::new()).await?;
                if value.is_null() {
                    return Ok(Vec::new());
                }
                serde_json::from_value(value)
                    .map_err(|e| Error::Script(format!("malformed console queue: {}", e)))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let result = self.client.delete_session().await;
        self.console = ConsoleSource::Shim;
        if let Some(driver) = self.driver.as_mut() {
            driver.stop().await;
        }
        tracing::debug!(engine = %self.engine, "Browser session released");
        result
    }
}
