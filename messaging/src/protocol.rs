//! JSON-RPC 2.0 wire messages for the messaging socket.
//!
//! One JSON object per line, in both directions. Two message kinds travel on
//! the wire: requests carry an `id` and expect a response, notifications
//! carry none and expect nothing. Responses echo the request `id` and hold
//! either `result` or `error`.

use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

/// A single framed message, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub jsonrpc: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RpcError>,
}

/// Decoded view of a [`WireMessage`], classified by kind.
#[derive(Debug)]
pub enum Payload {
    Request {
        id: String,
        method: String,
        params: serde_json::Value,
    },
    Notification {
        method: String,
        params: serde_json::Value,
    },
    Response {
        id: String,
        result: Result<serde_json::Value, RpcError>,
    },
}

impl WireMessage {
    pub fn request(id: String, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn notification(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn response_ok(id: String, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn response_err(id: Option<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// Classify the message. `None` means the frame carries neither a method
    /// nor a usable response id and can only be dropped.
    pub fn into_payload(self) -> Option<Payload> {
        match (self.method, self.id) {
            (Some(method), Some(id)) => Some(Payload::Request {
                id,
                method,
                params: self.params.unwrap_or(serde_json::Value::Null),
            }),
            (Some(method), None) => Some(Payload::Notification {
                method,
                params: self.params.unwrap_or(serde_json::Value::Null),
            }),
            (None, Some(id)) => {
                let result = match self.error {
                    Some(error) => Err(error),
                    None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
                };
                Some(Payload::Response { id, result })
            }
            (None, None) => None,
        }
    }
}

/// Protocol-level error, as carried in a response's `error` field.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self {
            code: -32602,
            message: format!("Invalid params: {detail}"),
            data: None,
        }
    }

    pub fn internal_error(detail: impl std::fmt::Display) -> Self {
        Self {
            code: -32603,
            message: detail.to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_omits_id_on_the_wire() {
        let message = WireMessage::notification("ide/focusProject", Some(json!({"p": 1})));
        let raw = serde_json::to_value(&message).unwrap();
        assert!(raw.get("id").is_none());
        assert_eq!(raw["method"], "ide/focusProject");
    }

    #[test]
    fn classification_covers_all_three_kinds() {
        let request = WireMessage::request("1".into(), "m", None);
        assert!(matches!(
            request.into_payload(),
            Some(Payload::Request { .. })
        ));

        let notification = WireMessage::notification("m", None);
        assert!(matches!(
            notification.into_payload(),
            Some(Payload::Notification { .. })
        ));

        let response = WireMessage::response_ok("1".into(), json!(null));
        match response.into_payload() {
            Some(Payload::Response { id, result }) => {
                assert_eq!(id, "1");
                assert_eq!(result.unwrap(), json!(null));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn error_response_round_trips() {
        let message =
            WireMessage::response_err(Some("9".to_string()), RpcError::method_not_found("x/y"));
        let raw = serde_json::to_string(&message).unwrap();
        let parsed: WireMessage = serde_json::from_str(&raw).unwrap();
        match parsed.into_payload() {
            Some(Payload::Response { result: Err(e), .. }) => {
                assert_eq!(e.code, -32601);
                assert!(e.message.contains("x/y"));
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }
}
