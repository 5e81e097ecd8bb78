//! Transport endpoints over the runtime.
//!
//! One HTTP request per connection, routed by shape:
//!
//! - `Upgrade: websocket`: RFC 6455 handshake, then one JSON-RPC message per text frame
//! - `GET <sse.prefix>...`: event stream bound to a new session, announced with an `endpoint` event
//! - `POST ...?sessionId=<id>`: JSON body forwarded to that session as a `message` event, `202 Accepted`
//! - anything else: `404 Not Found`
//!
//! [`stdio`] serves the same JSON-RPC framing over standard input and output.

pub mod handler;
pub mod stdio;

pub use handler::{MessageHandler, PingResponder};

use crate::codec::http::{self, Parsed, Request};
use crate::codec::{jsonrpc, sse, websocket};
use crate::config::Config;
use crate::net::acceptor::Acceptor;
use crate::net::stream::ByteStream;
use crate::runtime::Handle;
use crate::session::{SessionId, SessionRegistry};
use crate::task::TaskId;
use crate::{Error, Result};

use futures::future::{Either, select};
use handler::{dispatch, parse_error};
use std::pin::pin;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// WebSocket close status for protocol violations.
const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// WebSocket close status for text that is not UTF-8.
const CLOSE_INVALID_DATA: u16 = 1007;
/// WebSocket close status for oversized messages.
const CLOSE_TOO_BIG: u16 = 1009;

/// Routes connections to the WebSocket, SSE and POST endpoints.
#[derive(Clone)]
pub struct Server {
    inner: Rc<Inner>,
}

struct Inner {
    handle: Handle,
    config: Config,
    sessions: Rc<SessionRegistry>,
    handler: Rc<dyn MessageHandler>,
}

impl Server {
    pub fn new<H>(handle: &Handle, config: Config, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        Self {
            inner: Rc::new(Inner {
                handle: handle.clone(),
                config,
                sessions: Rc::new(SessionRegistry::new()),
                handler: Rc::new(handler),
            }),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Binds the configured address and starts accepting connections.
    pub fn listen(&self) -> Result<Acceptor> {
        let acceptor = Acceptor::bind(&self.inner.handle, &self.inner.config.address())?;

        let server = self.clone();
        acceptor.start(move |stream| server.clone().serve_connection(stream));

        Ok(acceptor)
    }

    /// Starts the JSON-RPC transport on standard input and output.
    pub fn serve_stdio(&self) -> Result<TaskId> {
        stdio::spawn(&self.inner.handle, self.inner.handler.clone())
    }

    /// Parses one request from `stream` and answers it on the matching endpoint.
    pub async fn serve_connection(self, stream: ByteStream) -> Result<()> {
        let request = match http::parse_request(&stream).await? {
            Parsed::Request(request) => request,
            Parsed::Invalid(reason) => {
                log::debug!("rejecting request: {reason}");
                return http::send_error(&stream, 400, "Bad Request", &reason).await;
            }
            Parsed::Closed => return Ok(()),
        };

        if request.is_websocket_upgrade() {
            return self.websocket(&stream, &request).await;
        }

        match request.method() {
            "GET" if request.path().starts_with(&self.inner.config.sse.prefix) => {
                self.event_stream(&stream).await
            }
            "POST" => self.post_message(&stream, &request).await,
            _ => http::send_error(&stream, 404, "Not Found", "Not Found").await,
        }
    }

    async fn websocket(&self, stream: &ByteStream, request: &Request) -> Result<()> {
        if !websocket::handshake(stream, request).await? {
            return Ok(());
        }

        let limit = self.inner.config.websocket.max_payload_bytes;

        loop {
            let text = match websocket::read_with_limit(stream, limit).await {
                Ok(websocket::Message::Text(text)) => text,
                Ok(websocket::Message::Binary(payload)) => {
                    log::debug!("ignoring {} byte binary message", payload.len());
                    continue;
                }
                Ok(websocket::Message::Close) | Err(Error::ConnectionClosed) => return Ok(()),
                Err(Error::WebSocket(error)) => {
                    let status = match error {
                        websocket::Error::PayloadTooLarge { .. } => CLOSE_TOO_BIG,
                        websocket::Error::InvalidUtf8 => CLOSE_INVALID_DATA,
                        _ => CLOSE_PROTOCOL_ERROR,
                    };
                    if let Err(close_error) = websocket::write_close(stream, &status.to_be_bytes()).await {
                        log::debug!("close frame {status} not sent: {close_error}");
                    }
                    return Err(error.into());
                }
                Err(error) => return Err(error),
            };

            let reply = match jsonrpc::decode(text.as_bytes()) {
                Ok(message) => dispatch(self.inner.handler.as_ref(), message),
                Err(_) => Some(parse_error()),
            };

            if let Some(reply) = reply {
                websocket::write_text(stream, &serde_json::to_string(&reply)?).await?;
            }
        }
    }

    async fn event_stream(&self, stream: &ByteStream) -> Result<()> {
        http::send_sse_headers(stream).await?;

        let id = self.inner.sessions.create(stream.clone());
        let result = self.keep_session_alive(stream, &id).await;
        self.inner.sessions.close(id.as_str());

        result
    }

    /// Announces the message endpoint, then sends keep-alives until the
    /// session's lifetime runs out or the client goes away.
    async fn keep_session_alive(&self, stream: &ByteStream, id: &SessionId) -> Result<()> {
        let sse_config = &self.inner.config.sse;

        let endpoint = format!("{}?sessionId={id}", sse_config.messages_path);
        sse::send_text_event(stream, "endpoint", &endpoint).await?;

        let keep_alive = Duration::from_secs(sse_config.keep_alive_secs.max(1));
        let deadline = Instant::now() + Duration::from_secs(sse_config.max_lifetime_secs);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::debug!("session {id} reached its maximum lifetime");
                return Ok(());
            }

            let outcome = {
                let read = pin!(stream.read_chunk());
                let sleep = self.inner.handle.sleep(keep_alive.min(remaining));

                match select(read, sleep).await {
                    Either::Left((result, _)) => Some(result),
                    Either::Right(_) => None,
                }
            };

            match outcome {
                Some(Ok(Some(_))) => continue,
                Some(Ok(None) | Err(Error::StreamClosed)) => {
                    log::debug!("session {id} disconnected");
                    return Ok(());
                }
                Some(Err(error)) => return Err(error),
                None if remaining > keep_alive => sse::send_keep_alive(stream).await?,
                None => continue,
            }
        }
    }

    async fn post_message(&self, stream: &ByteStream, request: &Request) -> Result<()> {
        let Some(id) = request.query("sessionId") else {
            return http::send_error(stream, 400, "Bad Request", "Missing sessionId parameter").await;
        };

        let Some(target) = self.inner.sessions.get(&id) else {
            return http::send_error(stream, 404, "Not Found", "Session not found").await;
        };

        let limit = self.inner.config.http.max_body_bytes;
        let Some(body) = http::read_body(stream, request, limit).await? else {
            return http::send_error(stream, 400, "Bad Request", "Missing or oversized body").await;
        };

        let payload: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(error) => {
                log::debug!("rejecting body for session {id}: {error}");
                return http::send_error(stream, 400, "Bad Request", "Invalid JSON").await;
            }
        };

        let sessions = self.inner.sessions.clone();
        self.inner.handle.spawn(async move {
            if let Err(error) = sse::send_event(&target, "message", &payload).await {
                log::warn!("session {id} unreachable: {error}");
                sessions.close(&id);
            }
            Ok(())
        });

        http::send_response(
            stream,
            202,
            "Accepted",
            &[("Content-Type", "text/plain; charset=utf-8"), ("Access-Control-Allow-Origin", "*")],
            b"Accepted",
        )
        .await
    }
}
