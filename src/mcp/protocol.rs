//! JSON-RPC 2.0 message types and the frame codec.
//!
//! This module defines the three message shapes exchanged by a session and
//! converts them to and from single transport frames.
//!
//! # Message Types
//!
//! - **Request**: a message expecting a response (has `id` and `method`)
//! - **Response**: a reply to a request (`id` plus `result` or `error`)
//! - **Notification**: a one-way message (`method`, no `id`)
//!
//! # Constraints
//!
//! - Request IDs are non-negative integers
//! - `params`, `result` and `error` are mutually exclusive per kind
//!
//! The codec performs no semantic validation of method names or parameter
//! contents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mcp::error::CodecError;

/// The MCP protocol version this implementation speaks.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol versions a client accepts in the initialize response.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[MCP_PROTOCOL_VERSION];

/// JSON-RPC version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Reserved method names.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake confirmation notification.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Tool discovery request.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation request.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Liveness check.
    pub const PING: &str = "ping";
}

/// A JSON-RPC request correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request message.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters for the method.
    pub params: Option<Value>,
}

impl Request {
    /// Creates a new request.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// A notification message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// The notification method.
    pub method: String,
    /// Optional parameters for the notification.
    pub params: Option<Value>,
}

impl Notification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error code.
    pub code: i64,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

/// The payload of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Successful result.
    Result(Value),
    /// Error object.
    Error(ErrorObject),
}

/// A response message.
///
/// `id` is `None` only for error responses to frames whose id could not be
/// determined.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The request id this response answers.
    pub id: Option<RequestId>,
    /// Result or error.
    pub payload: ResponsePayload,
}

impl Response {
    /// Creates a success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    /// Creates an error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // ErrorObject contains String
    pub fn error(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::error(
            None,
            ErrorObject::with_message(ErrorCode::ParseError, format!("Parse error: {detail}")),
        )
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(
            Some(id),
            ErrorObject::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::error(
            Some(id),
            ErrorObject::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(
            Some(id),
            ErrorObject::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(
            Some(id),
            ErrorObject::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// Any protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A request expecting a response.
    Request(Request),
    /// A reply to a request.
    Response(Response),
    /// A one-way message.
    Notification(Notification),
}

impl Message {
    /// Returns the method name, if the message has one.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(notif) => Some(&notif.method),
            Self::Response(_) => None,
        }
    }

    /// Returns the correlation id, if the message has one.
    #[must_use]
    pub const fn id(&self) -> Option<RequestId> {
        match self {
            Self::Request(req) => Some(req.id),
            Self::Response(resp) => resp.id,
            Self::Notification(_) => None,
        }
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Self::Request(req)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Self {
        Self::Response(resp)
    }
}

impl From<Notification> for Message {
    fn from(notif: Notification) -> Self {
        Self::Notification(notif)
    }
}

/// Borrowed wire form used for encoding.
#[derive(Serialize)]
struct WireMessage<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorObject>,
}

impl<'a> WireMessage<'a> {
    const fn empty() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    fn from_message(message: &'a Message) -> Self {
        match message {
            Message::Request(req) => Self {
                id: Some(req.id),
                method: Some(&req.method),
                params: req.params.as_ref(),
                ..Self::empty()
            },
            Message::Notification(notif) => Self {
                method: Some(&notif.method),
                params: notif.params.as_ref(),
                ..Self::empty()
            },
            Message::Response(resp) => match &resp.payload {
                ResponsePayload::Result(result) => Self {
                    id: resp.id,
                    result: Some(result),
                    ..Self::empty()
                },
                ResponsePayload::Error(error) => Self {
                    id: resp.id,
                    error: Some(error),
                    ..Self::empty()
                },
            },
        }
    }
}

/// Encodes a message as one frame (without the trailing newline).
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialisation fails.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&WireMessage::from_message(message)).map_err(CodecError::Encode)
}

/// Decodes one frame into a message.
///
/// # Errors
///
/// Returns a [`CodecError`] if the frame is not valid JSON, not an object,
/// lacks a required field, carries an id of the wrong type, or matches no
/// message shape.
pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_slice(frame).map_err(CodecError::InvalidJson)?;

    let Value::Object(mut obj) = value else {
        return Err(CodecError::NotAnObject);
    };

    match obj.get("jsonrpc") {
        None => return Err(CodecError::MissingField("jsonrpc")),
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => return Err(CodecError::BadVersion),
    }

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_id(&v)?),
    };

    if let Some(method) = obj.remove("method") {
        let Value::String(method) = method else {
            return Err(CodecError::InvalidField {
                field: "method",
                expected: "a string",
            });
        };
        let params = take_params(&mut obj)?;

        return Ok(match id {
            Some(id) => Message::Request(Request { id, method, params }),
            None => Message::Notification(Notification { method, params }),
        });
    }

    match (obj.remove("result"), obj.remove("error")) {
        (Some(_), Some(_)) => Err(CodecError::AmbiguousResponse),
        (Some(result), None) => {
            let id = id.ok_or(CodecError::MissingField("id"))?;
            Ok(Message::Response(Response::success(id, result)))
        }
        (None, Some(error)) => {
            let error: ErrorObject =
                serde_json::from_value(error).map_err(|_| CodecError::InvalidField {
                    field: "error",
                    expected: "an object with integer code and string message",
                })?;
            Ok(Message::Response(Response::error(id, error)))
        }
        (None, None) => Err(CodecError::UnknownShape),
    }
}

fn parse_id(value: &Value) -> Result<RequestId, CodecError> {
    value
        .as_u64()
        .map(RequestId)
        .ok_or(CodecError::InvalidField {
            field: "id",
            expected: "a non-negative integer",
        })
}

fn take_params(obj: &mut Map<String, Value>) -> Result<Option<Value>, CodecError> {
    match obj.remove("params") {
        None | Some(Value::Null) => Ok(None),
        Some(p @ (Value::Object(_) | Value::Array(_))) => Ok(Some(p)),
        Some(_) => Err(CodecError::InvalidField {
            field: "params",
            expected: "an object or array",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_valid_request() {
        let json = br#"{"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}"#;
        let msg = decode(json).unwrap();

        let Message::Request(req) = msg else {
            panic!("Expected Request, got {msg:?}");
        };
        assert_eq!(req.id, RequestId(1));
        assert_eq!(req.method, "initialize");
        assert_eq!(req.params, Some(json!({})));
    }

    #[test]
    fn decode_valid_notification() {
        let json = br#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;
        let msg = decode(json).unwrap();

        let Message::Notification(notif) = msg else {
            panic!("Expected Notification, got {msg:?}");
        };
        assert_eq!(notif.method, "notifications/initialized");
        assert!(notif.params.is_none());
    }

    #[test]
    fn decode_success_response() {
        let json = br#"{"jsonrpc": "2.0", "id": 7, "result": {"tools": []}}"#;
        let msg = decode(json).unwrap();
        assert_eq!(
            msg,
            Message::Response(Response::success(RequestId(7), json!({"tools": []})))
        );
    }

    #[test]
    fn decode_error_response_without_id() {
        let json = br#"{"jsonrpc": "2.0", "error": {"code": -32700, "message": "Parse error"}}"#;
        let Message::Response(resp) = decode(json).unwrap() else {
            panic!("Expected Response");
        };
        assert!(resp.id.is_none());
        let ResponsePayload::Error(err) = resp.payload else {
            panic!("Expected error payload");
        };
        assert_eq!(err.code, ErrorCode::ParseError.code());
    }

    #[test]
    fn decode_invalid_json() {
        let err = decode(b"not valid json").unwrap_err();
        assert!(matches!(err, CodecError::InvalidJson(_)));
    }

    #[test]
    fn decode_rejects_non_object() {
        let err = decode(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, CodecError::NotAnObject));
    }

    #[test]
    fn decode_missing_jsonrpc() {
        let err = decode(br#"{"id": 1, "method": "test"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingField("jsonrpc")));
    }

    #[test]
    fn decode_wrong_jsonrpc_version() {
        let err = decode(br#"{"jsonrpc": "1.0", "id": 1, "method": "test"}"#).unwrap_err();
        assert!(matches!(err, CodecError::BadVersion));
    }

    #[test]
    fn decode_string_id_is_type_mismatch() {
        let err = decode(br#"{"jsonrpc": "2.0", "id": "abc", "method": "test"}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { field: "id", .. }));

        let err = decode(br#"{"jsonrpc": "2.0", "id": -4, "result": {}}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { field: "id", .. }));
    }

    #[test]
    fn decode_result_without_id() {
        let err = decode(br#"{"jsonrpc": "2.0", "result": {}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingField("id")));
    }

    #[test]
    fn decode_unknown_shape() {
        let err = decode(br#"{"jsonrpc": "2.0", "id": 3}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownShape));
    }

    #[test]
    fn decode_result_and_error_together() {
        let json = br#"{"jsonrpc": "2.0", "id": 3, "result": {}, "error": {"code": 1, "message": "x"}}"#;
        assert!(matches!(
            decode(json).unwrap_err(),
            CodecError::AmbiguousResponse
        ));
    }

    #[test]
    fn decode_scalar_params() {
        let frame = br#"{"jsonrpc": "2.0", "id": 1, "method": "x", "params": 5}"#;
        let err = decode(frame).unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { field: "params", .. }));
    }

    #[test]
    fn encode_request_shape() {
        let msg = Message::from(Request::new(
            RequestId(1),
            methods::TOOLS_CALL,
            Some(json!({"name": "echo"})),
        ));
        let value: Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "echo"}})
        );
    }

    #[test]
    fn encode_notification_has_no_id() {
        let msg = Message::from(Notification::new(methods::INITIALIZED, None));
        let value: Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );
    }

    #[test]
    fn encode_error_response() {
        let msg = Message::from(Response::method_not_found(RequestId(1), "unknown/method"));
        let json = String::from_utf8(encode(&msg).unwrap()).unwrap();
        assert!(json.contains(r#""jsonrpc":"2.0""#));
        assert!(json.contains(r#""id":1"#));
        assert!(json.contains(r#""code":-32601"#));
        assert!(json.contains("unknown/method"));
        assert!(!json.contains("result"));
    }

    #[test]
    fn encoded_frames_have_no_newlines() {
        let msg = Message::from(Response::success(
            RequestId(1),
            json!({"message": "hello\nworld", "nested": {"key": "value"}}),
        ));
        let frame = encode(&msg).unwrap();
        assert!(!frame.contains(&b'\n'));
        assert_eq!(decode(&frame).unwrap(), msg);
    }

    #[test]
    fn request_id_display() {
        assert_eq!(RequestId(42).to_string(), "42");
    }
}
