//! Server-Sent Events formatting.

use crate::Result;
use crate::net::stream::ByteStream;

use serde::Serialize;

/// Renders `event: <name>` followed by the payload serialized as single-line JSON.
pub fn encode_event<T>(name: &str, data: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(data)?;
    Ok(format!("event: {name}\ndata: {json}\n\n"))
}

/// Renders a plain-text event; every line of `text` gets its own `data:` field.
pub fn encode_text_event(name: &str, text: &str) -> String {
    let mut event = format!("event: {name}\n");
    for line in text.split('\n') {
        event.push_str("data: ");
        event.push_str(line.trim_end_matches('\r'));
        event.push('\n');
    }
    event.push('\n');
    event
}

pub async fn send_event<T>(stream: &ByteStream, name: &str, data: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    stream.write_all(encode_event(name, data)?.as_bytes()).await
}

pub async fn send_text_event(stream: &ByteStream, name: &str, text: &str) -> Result<()> {
    stream.write_all(encode_text_event(name, text).as_bytes()).await
}

/// A comment line clients ignore; keeps intermediaries from timing the connection out.
pub async fn send_keep_alive(stream: &ByteStream) -> Result<()> {
    stream.write_all(b": keep-alive\n\n").await
}
