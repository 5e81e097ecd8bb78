//! Wire codecs layered on [`ByteStream`](crate::ByteStream).
//!
//! - [`http`]: request line + headers, responses, SSE response head
//! - [`websocket`]: RFC 6455 handshake, framing and masking
//! - [`sse`]: Server-Sent Events formatting
//! - [`jsonrpc`]: newline-delimited JSON-RPC envelopes

pub mod http;
pub mod jsonrpc;
pub mod sse;
pub mod websocket;
