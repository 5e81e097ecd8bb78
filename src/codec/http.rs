//! HTTP/1.1 request line and header parsing, plus single-write responses.
//!
//! Only what the transports need: the request line, headers, and an optional
//! `Content-Length` body. No chunked encoding, no keep-alive reuse.

use crate::net::stream::ByteStream;
use crate::{Error, Result};

use bytes::Bytes;
use std::collections::HashMap;

const MAX_LINE: usize = 8192;
const MAX_HEADERS: usize = 100;

/// Outcome of [`parse_request`].
#[derive(Debug)]
pub enum Parsed {
    Request(Request),
    /// The peer sent something that is not an HTTP request; answer with a 4xx.
    Invalid(String),
    /// The peer closed the connection before sending a request line.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    uri: String,
    version: String,
    headers: HashMap<String, String>,
}

impl Request {
    pub fn new(method: &str, uri: &str, version: &str) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers: HashMap::new(),
        }
    }

    /// Adds a header. Names are stored lower-cased; a repeated name replaces the previous value.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.trim().to_string());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The URI without its query string.
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// First value of query parameter `name`, percent-decoded.
    pub fn query(&self, name: &str) -> Option<String> {
        let (_, query) = self.uri.split_once('?')?;

        query
            .split('&')
            .filter_map(|pair| match pair.split_once('=') {
                Some((key, value)) => Some((key, value)),
                None if !pair.is_empty() => Some((pair, "")),
                None => None,
            })
            .find(|(key, _)| percent_decode(key) == name)
            .map(|(_, value)| percent_decode(value))
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.parse().ok()
    }
}

/// Reads the request line and headers from `stream`.
///
/// The request line must hold at least three space-separated tokens. Header
/// lines are read until an empty line or the end of the stream; each is split
/// on its first colon. Any line reaching `MAX_LINE` without a newline makes the
/// request invalid. The body is left unread.
pub async fn parse_request(stream: &ByteStream) -> Result<Parsed> {
    let Some(line) = stream.read_line(MAX_LINE).await? else {
        return Ok(Parsed::Closed);
    };

    if !line.ends_with(b"\n") && line.len() >= MAX_LINE {
        return Ok(Parsed::Invalid("request line too long".to_string()));
    }

    let line = String::from_utf8_lossy(&line);
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [method, uri, version, ..] = tokens.as_slice() else {
        return Ok(Parsed::Invalid("malformed request line".to_string()));
    };

    let mut request = Request::new(method, uri, version);

    loop {
        let Some(line) = stream.read_line(MAX_LINE).await? else {
            break;
        };

        if !line.ends_with(b"\n") && line.len() >= MAX_LINE {
            return Ok(Parsed::Invalid("header line too long".to_string()));
        }

        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            break;
        }

        if request.headers.len() >= MAX_HEADERS {
            return Ok(Parsed::Invalid("too many headers".to_string()));
        }

        if let Some((name, value)) = line.split_once(':') {
            request = request.with_header(name.trim(), value);
        }
    }

    log::trace!("{} {}", request.method, request.uri);

    Ok(Parsed::Request(request))
}

/// Reads the body announced by `Content-Length`, refusing anything above `limit`.
///
/// `Ok(None)` when the request carries no (or an unparsable) `Content-Length`
/// or declares more than `limit` bytes.
pub async fn read_body(stream: &ByteStream, request: &Request, limit: usize) -> Result<Option<Bytes>> {
    let Some(length) = request.content_length() else {
        return Ok(None);
    };

    if length > limit {
        return Ok(None);
    }

    if length == 0 {
        return Ok(Some(Bytes::new()));
    }

    match stream.read_exact(length).await {
        Ok(body) => Ok(Some(body)),
        Err(Error::ConnectionClosed) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Renders a complete response. `Content-Length` is always computed from `body`.
pub fn encode_response(status: u16, reason: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    let mut response = head.into_bytes();
    response.extend_from_slice(body);
    response
}

/// Writes the status line, headers, `Content-Length` and body as one buffer.
pub async fn send_response(
    stream: &ByteStream,
    status: u16,
    reason: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Result<()> {
    stream
        .write_all(&encode_response(status, reason, headers, body))
        .await
}

/// Plain-text error response used by the transports for 4xx answers.
pub async fn send_error(stream: &ByteStream, status: u16, reason: &str, message: &str) -> Result<()> {
    send_response(
        stream,
        status,
        reason,
        &[("Content-Type", "text/plain; charset=utf-8"), ("Connection", "close")],
        message.as_bytes(),
    )
    .await
}

/// Opens an event stream: `200 OK` with event-stream content type, no caching, permissive CORS.
pub async fn send_sse_headers(stream: &ByteStream) -> Result<()> {
    let head = "HTTP/1.1 200 OK\r\n\
                Content-Type: text/event-stream\r\n\
                Cache-Control: no-cache\r\n\
                Connection: keep-alive\r\n\
                Access-Control-Allow-Origin: *\r\n\
                Access-Control-Allow-Headers: *\r\n\
                \r\n";

    stream.write_all(head.as_bytes()).await
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'%' if index + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[index + 1..index + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());

                match hex {
                    Some(byte) => {
                        decoded.push(byte);
                        index += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        index += 1;
                    }
                }
            }
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parameters_are_decoded() {
        let request = Request::new("POST", "/messages?sessionId=ab%20cd&x=1+2&flag", "HTTP/1.1");

        assert_eq!(request.path(), "/messages");
        assert_eq!(request.query("sessionId").as_deref(), Some("ab cd"));
        assert_eq!(request.query("x").as_deref(), Some("1 2"));
        assert_eq!(request.query("flag").as_deref(), Some(""));
        assert_eq!(request.query("missing"), None);
    }

    #[test]
    fn malformed_escapes_are_kept_verbatim() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%41"), "A");
    }

    #[test]
    fn headers_are_case_insensitive_and_last_wins() {
        let request = Request::new("GET", "/", "HTTP/1.1")
            .with_header("X-Thing", " one ")
            .with_header("x-thing", "two");

        assert_eq!(request.header("X-THING"), Some("two"));
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn response_carries_computed_content_length() {
        let response = encode_response(404, "Not Found", &[("Content-Type", "text/plain")], b"nope");

        assert_eq!(
            response,
            b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\nnope"
        );
    }
}
