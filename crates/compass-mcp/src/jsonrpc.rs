//! JSON-RPC 2.0 types and the newline-delimited message codec.

use crate::error::CodecError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// The only JSON-RPC version we speak.
pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const SERVER_NOT_INITIALIZED: i64 = -32002;

/// Correlation id linking a request to its response.
///
/// Any JSON number is accepted, including negative and fractional ones, and
/// is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(Number),
    Text(String),
}

impl RequestId {
    /// The id as an unsigned integer, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RequestId::Number(n) => n.as_u64(),
            RequestId::Text(_) => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id.into())
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id.into())
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::Text(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
///
/// `id` is `None` only for errors raised before the request id could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<RequestId>,
    /// `Some(Value::Null)` is a present `"result": null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any message that can travel on the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl From<JsonRpcRequest> for Message {
    fn from(req: JsonRpcRequest) -> Self {
        Message::Request(req)
    }
}

impl From<JsonRpcNotification> for Message {
    fn from(notif: JsonRpcNotification) -> Self {
        Message::Notification(notif)
    }
}

impl From<JsonRpcResponse> for Message {
    fn from(resp: JsonRpcResponse) -> Self {
        Message::Response(resp)
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    jsonrpc: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

fn to_line<T: Serialize>(body: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = serde_json::to_vec(&Envelope {
        jsonrpc: JSONRPC_VERSION,
        body,
    })
    .map_err(|e| CodecError::MalformedMessage(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Encode a message as one newline-terminated JSON line.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    match message {
        Message::Request(req) => to_line(req),
        Message::Notification(notif) => to_line(notif),
        Message::Response(resp) => to_line(resp),
    }
}

/// Decode one line (with or without its trailing newline) into a message.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_slice(bytes.trim_ascii())
        .map_err(|e| CodecError::MalformedMessage(e.to_string()))?;

    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(CodecError::UnknownMessageType(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            )));
        }
    };

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(CodecError::MalformedMessage(format!(
                "unsupported jsonrpc version {other}"
            )));
        }
        None => {
            return Err(CodecError::MalformedMessage(
                "missing jsonrpc version".to_string(),
            ));
        }
    }

    let has_method = obj.contains_key("method");
    let has_id = match obj.get("id") {
        None | Some(Value::Null) => false,
        Some(Value::Number(_) | Value::String(_)) => true,
        Some(other) if has_method => {
            return Err(CodecError::UnknownMessageType(format!(
                "request id must be a number or string, got {}",
                kind_of(other)
            )));
        }
        Some(_) => false,
    };
    let is_response = obj.contains_key("result") || obj.contains_key("error");
    let value = Value::Object(obj);

    let message = if has_method && has_id {
        serde_json::from_value(value).map(Message::Request)
    } else if has_method {
        serde_json::from_value(value).map(Message::Notification)
    } else if is_response {
        serde_json::from_value(value).map(Message::Response)
    } else {
        return Err(CodecError::UnknownMessageType(
            "object has neither 'method' nor 'result'/'error'".to_string(),
        ));
    };

    message.map_err(|e| CodecError::MalformedMessage(e.to_string()))
}

/// Read the `id` of a message that failed to decode, if it has a usable one.
pub fn peek_id(bytes: &[u8]) -> Option<RequestId> {
    let value: Value = serde_json::from_slice(bytes.trim_ascii()).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
