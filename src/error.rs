//! Crate-wide error type.

use std::io;

use crate::codec::websocket;
use crate::config;

/// Every failure the runtime, the codecs and the transports report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("Readiness poll failed: {0}")]
    Poll(#[source] io::Error),
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error("Stream already closed")]
    StreamClosed,
    #[error("Event loop went idle before the future completed")]
    Stalled,
    #[error("WebSocket: {0}")]
    WebSocket(#[from] websocket::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config: {0}")]
    Config(#[from] config::Error),
    #[error("Task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;
