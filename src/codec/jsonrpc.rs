//! Newline-delimited JSON-RPC 2.0 framing.
//!
//! One message per line. Blank lines are keep-alives and decode to an empty
//! message rather than an error. Method dispatch is not handled here.

use crate::Result;
use crate::net::stream::ByteStream;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Longest line [`read`] accepts as one message.
pub const MAX_LINE: usize = 1024 * 1024;

/// Request, notification or response envelope. Absent members stay `None`;
/// an `id` or `result` given as `null` is `Some(Value::Null)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Only called for members that appear in the input, so `null` stays distinct from absent.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcMessage {
    pub fn request(id: Value, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(VERSION.to_string()),
            id: Some(id),
            method: Some(method.to_string()),
            params,
            ..Self::default()
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(VERSION.to_string()),
            method: Some(method.to_string()),
            params,
            ..Self::default()
        }
    }

    /// `{jsonrpc, id, result}`
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: Some(VERSION.to_string()),
            id: Some(id),
            result: Some(result),
            ..Self::default()
        }
    }

    /// `{jsonrpc, id, error: {code, message}}`
    pub fn error(id: Value, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: Some(VERSION.to_string()),
            id: Some(id),
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
            ..Self::default()
        }
    }

    /// A keep-alive: no member is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }
}

/// Decodes one line. Whitespace-only input is an empty message.
pub fn decode(line: &[u8]) -> Result<JsonRpcMessage> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonRpcMessage::default());
    }

    Ok(serde_json::from_slice(line)?)
}

/// Encodes `message` as JSON followed by a single newline.
pub fn encode(message: &JsonRpcMessage) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Reads the next message. `Ok(None)` once the stream has ended.
pub async fn read(stream: &ByteStream) -> Result<Option<JsonRpcMessage>> {
    match stream.read_line(MAX_LINE).await? {
        Some(line) => decode(&line).map(Some),
        None => Ok(None),
    }
}

/// Writes `message` and its terminating newline as one buffer.
pub async fn write(stream: &ByteStream, message: &JsonRpcMessage) -> Result<()> {
    stream.write_all(&encode(message)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_lines_decode_to_empty_messages() {
        assert!(decode(b"\n").unwrap().is_empty());
        assert!(decode(b"  \r\n").unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(matches!(decode(b"{not json\n"), Err(crate::Error::Json(_))));
    }

    #[test]
    fn envelopes_only_carry_set_members() {
        let success = serde_json::to_value(JsonRpcMessage::success(json!(1), json!({}))).unwrap();
        assert_eq!(success, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));

        let error = serde_json::to_value(JsonRpcMessage::error(Value::Null, PARSE_ERROR, "Parse error")).unwrap();
        assert_eq!(
            error,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}})
        );
    }

    #[test]
    fn encoded_messages_end_with_one_newline() {
        let line = encode(&JsonRpcMessage::notification("ping", None)).unwrap();

        assert_eq!(line, b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n");
    }

    #[test]
    fn null_ids_survive_a_round_trip() {
        let line = br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#;
        let message = decode(line).unwrap();
        assert_eq!(message.id, Some(Value::Null));

        let encoded = encode(&message).unwrap();
        assert_eq!(encoded, [&line[..], b"\n"].concat());

        let absent = decode(br#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert_eq!(absent.id, None);
        assert!(absent.is_notification());
    }

    #[test]
    fn requests_with_a_null_id_are_not_notifications() {
        let message = decode(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();

        assert!(message.is_request());
        assert!(!message.is_notification());
    }
}
