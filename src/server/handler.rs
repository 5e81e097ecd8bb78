//! Seam between the transports and application logic.

use crate::codec::jsonrpc::{self, JsonRpcMessage};

use serde_json::{Value, json};

/// Application-side consumer of JSON-RPC messages.
///
/// Called from inside a task: implementations must return quickly, as nothing
/// else runs on the loop until they do.
pub trait MessageHandler {
    /// Returns the reply to send back on the same transport, if any.
    fn handle(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage>;
}

impl<F> MessageHandler for F
where
    F: Fn(JsonRpcMessage) -> Option<JsonRpcMessage>,
{
    fn handle(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        self(message)
    }
}

/// Answers `ping` with an empty result and every other request with "method not found".
#[derive(Debug, Clone, Copy, Default)]
pub struct PingResponder;

impl MessageHandler for PingResponder {
    fn handle(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        if !message.is_request() {
            return None;
        }

        let id = message.id.unwrap_or(Value::Null);
        match message.method.as_deref() {
            Some("ping") => Some(JsonRpcMessage::success(id, json!({}))),
            Some(method) => Some(JsonRpcMessage::error(
                id,
                jsonrpc::METHOD_NOT_FOUND,
                &format!("Method not found: {method}"),
            )),
            None => None,
        }
    }
}

/// Filters keep-alives and malformed envelopes before `handler` sees a message.
pub(crate) fn dispatch(handler: &dyn MessageHandler, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
    if message.is_empty() {
        return None;
    }

    let is_response = message.result.is_some() || message.error.is_some();
    if message.method.is_none() && !is_response {
        let id = message.id.unwrap_or(Value::Null);
        return Some(JsonRpcMessage::error(id, jsonrpc::INVALID_REQUEST, "Invalid Request"));
    }

    handler.handle(message)
}

/// Reply to a line that is not JSON: `-32700` with a `null` id.
pub(crate) fn parse_error() -> JsonRpcMessage {
    JsonRpcMessage::error(Value::Null, jsonrpc::PARSE_ERROR, "Parse error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_gets_an_empty_result() {
        let reply = dispatch(&PingResponder, JsonRpcMessage::request(json!(7), "ping", None));

        assert_eq!(reply, Some(JsonRpcMessage::success(json!(7), json!({}))));
    }

    #[test]
    fn notifications_and_keep_alives_get_no_reply() {
        assert_eq!(dispatch(&PingResponder, JsonRpcMessage::notification("ping", None)), None);
        assert_eq!(dispatch(&PingResponder, JsonRpcMessage::default()), None);
    }

    #[test]
    fn unknown_methods_and_bare_ids_are_errors() {
        let reply = dispatch(&PingResponder, JsonRpcMessage::request(json!("a"), "tools/list", None))
            .and_then(|reply| reply.error)
            .map(|error| error.code);
        assert_eq!(reply, Some(jsonrpc::METHOD_NOT_FOUND));

        let bare = JsonRpcMessage {
            id: Some(json!(1)),
            ..JsonRpcMessage::default()
        };
        let reply = dispatch(&PingResponder, bare).and_then(|reply| reply.error).map(|error| error.code);
        assert_eq!(reply, Some(jsonrpc::INVALID_REQUEST));
    }
}
