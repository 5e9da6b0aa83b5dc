//! W3C WebDriver wire types
//!
//! Only the subset of the classic protocol the harness drives.
//! See <https://www.w3.org/TR/webdriver2/>.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which the protocol serializes web element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Envelope of every WebDriver response body
#[derive(Debug, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub value: Value,
}

/// Error payload carried in `value` of a failed response
#[derive(Debug, Deserialize, Clone)]
pub struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// `GET /status` payload
#[derive(Debug, Deserialize)]
pub struct StatusValue {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub message: String,
}

/// `POST /session` request body
#[derive(Debug, Serialize)]
pub struct NewSessionRequest {
    pub capabilities: CapabilitiesRequest,
}

/// Capability negotiation block
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesRequest {
    pub always_match: Value,
}

/// `POST /session` response payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionValue {
    pub session_id: String,
    #[serde(default)]
    pub capabilities: Value,
}

/// `POST /session/{id}/timeouts` body, in milliseconds
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsRequest {
    pub page_load: u64,
    pub script: u64,
    pub implicit: u64,
}

/// Script execution body for both sync and async execution
#[derive(Debug, Serialize)]
pub struct ExecuteRequest<'a> {
    pub script: &'a str,
    pub args: Vec<Value>,
}

/// Element locator body
#[derive(Debug, Serialize)]
pub struct FindElementRequest<'a> {
    pub using: &'static str,
    pub value: &'a str,
}

impl<'a> FindElementRequest<'a> {
    pub fn css(selector: &'a str) -> Self {
        Self {
            using: "css selector",
            value: selector,
        }
    }
}

/// Opaque element reference returned by element lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Extract the reference from a lookup result
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| Self(id.to_string()))
    }

    /// Serialize for use as a script argument
    pub fn to_value(&self) -> Value {
        serde_json::json!({ ELEMENT_KEY: self.0 })
    }
}

/// Parse a failed response's `value` into a wire error, if it is one
pub fn wire_error(value: &Value) -> Option<WireError> {
    if value.get("error").is_some() {
        serde_json::from_value(value.clone()).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_ref_round_trip() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        let element = ElementRef::from_value(&value).unwrap();
        assert_eq!(element, ElementRef("abc-123".to_string()));
        assert_eq!(element.to_value(), value);
        assert!(ElementRef::from_value(&json!({"ELEMENT": "legacy"})).is_none());
    }

    #[test]
    fn test_wire_error_detection() {
        let err = wire_error(&json!({
            "error": "no such element",
            "message": "Unable to locate element: #vendorStatus",
            "stacktrace": ""
        }))
        .unwrap();
        assert_eq!(err.error, "no such element");
        assert!(err.message.contains("#vendorStatus"));

        assert!(wire_error(&json!(null)).is_none());
        assert!(wire_error(&json!({"ready": true})).is_none());
    }

    #[test]
    fn test_timeouts_serialize_camel_case() {
        let body = serde_json::to_value(TimeoutsRequest {
            page_load: 60_000,
            script: 180_000,
            implicit: 0,
        })
        .unwrap();
        assert_eq!(body, json!({"pageLoad": 60000, "script": 180000, "implicit": 0}));
    }

    #[test]
    fn test_new_session_value_parses() {
        let value: NewSessionValue = serde_json::from_value(json!({
            "sessionId": "f00",
            "capabilities": {"browserName": "firefox"}
        }))
        .unwrap();
        assert_eq!(value.session_id, "f00");
        assert_eq!(value.capabilities["browserName"], "firefox");
    }
}
