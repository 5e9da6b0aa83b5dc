//! WebDriver client for communicating with a driver server
//!
//! Speaks the W3C classic protocol (HTTP + JSON) to chromedriver,
//! geckodriver or WebKitWebDriver. One client owns at most one session.

use std::time::Duration;

use reqwest::{Client, Method, Url};
use serde_json::Value;

use crate::common::{Error, Result};

use super::types::*;

/// Fallback bound for commands that have no step-specific timeout
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Error code drivers use when a lookup matches nothing
const NO_SUCH_ELEMENT: &str = "no such element";

/// Client for one WebDriver session
pub struct WebDriverClient {
    /// HTTP client
    http: Client,
    /// Driver base URL, e.g. `http://127.0.0.1:9515`
    base_url: Url,
    /// Active session ID
    session_id: Option<String>,
    /// Capabilities the driver granted
    pub capabilities: Value,
}

impl WebDriverClient {
    /// Create a client for a driver listening at `base_url`
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid WebDriver URL '{}': {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid WebDriver URL '{}'", raw)));
        }
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            session_id: None,
            capabilities: Value::Null,
        })
    }

    /// Driver base URL
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Active session ID, if any
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Endpoint URL with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Endpoint under the active session, `/session/{id}/...`
    fn session_endpoint(&self, segments: &[&str]) -> Result<Url> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| Error::Protocol("No WebDriver session".to_string()))?;
        let mut all = vec!["session", id];
        all.extend_from_slice(segments);
        Ok(self.endpoint(&all))
    }

    /// Send a command and return the `value` of the response
    async fn command(
        &self,
        name: &str,
        method: Method,
        url: Url,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        tracing::trace!(command = name, %url, "WebDriver request");

        let mut request = self.http.request(method, url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("WebDriver command '{}'", name), timeout)
            } else {
                Error::Transport(e)
            }
        })?;
        let status = response.status();
        let text = response.text().await?;

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<WireResponse>(&text)
                .map_err(|e| {
                    Error::Protocol(format!("Invalid {} response ({}): {}", name, status, e))
                })?
                .value
        };

        if let Some(err) = wire_error(&value) {
            return Err(Error::webdriver(name, &err.error, &err.message));
        }
        if !status.is_success() {
            return Err(Error::webdriver(name, "unknown error", &format!("HTTP {}", status)));
        }

        tracing::trace!(command = name, "WebDriver response: {}", value);
        Ok(value)
    }

    /// Whether the driver reports itself ready to create sessions
    pub async fn is_ready(&self) -> Result<bool> {
        let value = self
            .command(
                "status",
                Method::GET,
                self.endpoint(&["status"]),
                None,
                Duration::from_secs(2),
            )
            .await?;
        let status: StatusValue = serde_json::from_value(value)?;
        if !status.ready {
            tracing::debug!("Driver not ready: {}", status.message);
        }
        Ok(status.ready)
    }

    /// Create a new session with the given `alwaysMatch` capabilities
    pub async fn new_session(&mut self, always_match: Value, timeout: Duration) -> Result<()> {
        let body = serde_json::to_value(NewSessionRequest {
            capabilities: CapabilitiesRequest { always_match },
        })?;
        let value = self
            .command(
                "new session",
                Method::POST,
                self.endpoint(&["session"]),
                Some(body),
                timeout,
            )
            .await
            .map_err(|e| Error::SessionCreateFailed(e.to_string()))?;
        let session: NewSessionValue = serde_json::from_value(value)
            .map_err(|e| Error::SessionCreateFailed(format!("Unexpected response: {}", e)))?;

        tracing::debug!(session = %session.session_id, "WebDriver session created");
        self.session_id = Some(session.session_id);
        self.capabilities = session.capabilities;
        Ok(())
    }

    /// Set page-load and script timeouts
    pub async fn set_timeouts(&self, page_load: Duration, script: Duration) -> Result<()> {
        let body = serde_json::to_value(TimeoutsRequest {
            page_load: duration_ms(page_load),
            script: duration_ms(script),
            implicit: 0,
        })?;
        let url = self.session_endpoint(&["timeouts"])?;
        self.command("timeouts", Method::POST, url, Some(body), COMMAND_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Navigate the current top-level browsing context
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let endpoint = self.session_endpoint(&["url"])?;
        self.command(
            "navigate",
            Method::POST,
            endpoint,
            Some(serde_json::json!({ "url": url })),
            timeout,
        )
        .await?;
        Ok(())
    }

    /// Find the first element matching a CSS selector
    ///
    /// Returns `None` when nothing matches rather than an error.
    pub async fn find_element(&self, selector: &str) -> Result<Option<ElementRef>> {
        let url = self.session_endpoint(&["element"])?;
        let body = serde_json::to_value(FindElementRequest::css(selector))?;
        match self
            .command("find element", Method::POST, url, Some(body), COMMAND_TIMEOUT)
            .await
        {
            Ok(value) => ElementRef::from_value(&value)
                .map(Some)
                .ok_or_else(|| Error::Protocol(format!("Malformed element reference: {}", value))),
            Err(Error::WebDriver { error, .. }) if error == NO_SUCH_ELEMENT => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Find an element that must exist
    pub async fn require_element(&self, selector: &str) -> Result<ElementRef> {
        self.find_element(selector)
            .await?
            .ok_or_else(|| Error::ElementNotFound(selector.to_string()))
    }

    /// Type text into an element; for file inputs the text is a local path
    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        let url = self.session_endpoint(&["element", &element.0, "value"])?;
        self.command(
            "element send keys",
            Method::POST,
            url,
            Some(serde_json::json!({ "text": text })),
            COMMAND_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    /// Click an element
    pub async fn click(&self, element: &ElementRef) -> Result<()> {
        let url = self.session_endpoint(&["element", &element.0, "click"])?;
        self.command(
            "element click",
            Method::POST,
            url,
            Some(serde_json::json!({})),
            COMMAND_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    /// Run a synchronous script body and return its result
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let url = self.session_endpoint(&["execute", "sync"])?;
        let body = serde_json::to_value(ExecuteRequest { script, args })?;
        self.command("execute script", Method::POST, url, Some(body), COMMAND_TIMEOUT)
            .await
    }

    /// Run an asynchronous script body
    ///
    /// The body receives its completion callback as the last argument.
    pub async fn execute_async(
        &self,
        script: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let url = self.session_endpoint(&["execute", "async"])?;
        let body = serde_json::to_value(ExecuteRequest { script, args })?;
        self.command("execute async script", Method::POST, url, Some(body), timeout)
            .await
    }

    /// Delete the session; the client can no longer issue session commands
    pub async fn delete_session(&mut self) -> Result<()> {
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };
        let url = self.endpoint(&["session", &id]);
        self.command("delete session", Method::DELETE, url, None, COMMAND_TIMEOUT)
            .await?;
        tracing::debug!(session = %id, "WebDriver session deleted");
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
