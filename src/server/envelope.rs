// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request/response envelope for the context protocol.
//!
//! Messages are newline-delimited JSON. Requests carry a string correlation
//! id which every response echoes:
//!
//! ```text
//! -> {"method":"call_tool","params":{"name":"echo","args":{"text":"hi"}},"id":"7"}
//! <- {"id":"7","result":"hi"}
//! <- {"id":"8","error":"Unknown tool: nope"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol version reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Generate a unique correlation id.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Methods understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    ListTools,
    CallTool,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ListTools => "list_tools",
            Self::CallTool => "call_tool",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialize" => Ok(Self::Initialize),
            "list_tools" => Ok(Self::ListTools),
            "call_tool" => Ok(Self::CallTool),
            other => Err(format!("Unknown method: {other}")),
        }
    }
}

/// A request sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
    pub id: String,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl Request {
    /// Create a request with a fresh correlation id.
    pub fn new(method: Method, params: serde_json::Value) -> Self {
        Self::with_id(method, params, generate_request_id())
    }

    /// Create a request with a caller-chosen id.
    pub fn with_id(method: Method, params: serde_json::Value, id: impl Into<String>) -> Self {
        Self {
            method: method.as_str().to_string(),
            params,
            id: id.into(),
        }
    }

    /// Build a `call_tool` request.
    pub fn call_tool(name: &str, args: serde_json::Value) -> Self {
        Self::new(
            Method::CallTool,
            serde_json::json!({ "name": name, "args": args }),
        )
    }
}

/// A response from the server. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into a `Result`, treating a missing result as `null`.
    pub fn into_result(self) -> Result<serde_json::Value, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// Encode a message to a JSON line.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string(msg)?;
    json.push('\n');
    Ok(json)
}

/// Decode a message from a JSON string.
pub fn decode<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(json.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_is_single_line() {
        let request = Request::with_id(Method::ListTools, json!({}), "1");
        let line = encode(&request).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_decode_request_without_params() {
        let request: Request = decode(r#"{"method":"initialize","id":"1"}"#).unwrap();
        assert_eq!(request.method, "initialize");
        assert_eq!(request.params, json!({}));
    }

    #[test]
    fn test_response_wire_shape() {
        let ok = serde_json::to_value(Response::ok("7", json!("hi"))).unwrap();
        assert_eq!(ok, json!({"id": "7", "result": "hi"}));

        let err = serde_json::to_value(Response::err("8", "boom")).unwrap();
        assert_eq!(err, json!({"id": "8", "error": "boom"}));
    }

    #[test]
    fn test_response_into_result() {
        assert_eq!(Response::ok("1", json!(3)).into_result(), Ok(json!(3)));
        assert_eq!(
            Response::err("1", "nope").into_result(),
            Err("nope".to_string())
        );
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("call_tool".parse::<Method>().unwrap(), Method::CallTool);
        assert!("shutdown".parse::<Method>().is_err());
    }

    #[test]
    fn test_decode_tolerates_trailing_newline() {
        let response: Response = decode("{\"id\":\"2\",\"error\":\"x\"}\n").unwrap();
        assert_eq!(response.id, "2");
        assert_eq!(response.error.as_deref(), Some("x"));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::call_tool("echo", json!({}));
        let b = Request::call_tool("echo", json!({}));
        assert_ne!(a.id, b.id);
    }
}
