//! RFC 6455 WebSocket handshake and framing.
//!
//! Frames sent by the server are unmasked and final. Incoming frames are
//! unmasked when a mask key is present; fragmented messages are reassembled
//! until their final frame. Pings are answered with pongs and a close frame
//! is echoed before [`Message::Close`] is returned.

use crate::codec::http::{self, Request};
use crate::net::stream::ByteStream;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};

/// Appended to the client key before hashing.
pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest message accepted by [`read`].
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

const MAX_CONTROL_PAYLOAD: u64 = 125;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Reserved opcode {0:#x}")]
    ReservedOpcode(u8),
    #[error("Reserved header bits set without a negotiated extension")]
    ReservedBits,
    #[error("Continuation frame without a message to continue")]
    UnexpectedContinuation,
    #[error("New data frame inside a fragmented message")]
    InterleavedMessage,
    #[error("Control frames must not be fragmented")]
    FragmentedControl,
    #[error("Control frame payload of {0} bytes exceeds 125")]
    ControlTooLarge(u64),
    #[error("Payload of {size} bytes exceeds the limit of {limit}")]
    PayloadTooLarge { size: u64, limit: usize },
    #[error("Text message is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    fn from_bits(bits: u8) -> Result<Self, Error> {
        match bits {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::ReservedOpcode(other)),
        }
    }

    fn bits(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// A complete application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed the connection; a close frame has been sent back.
    Close,
}

/// One decoded frame, payload already unmasked.
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Bytes,
}

/// `base64(sha1(key + GUID))`
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());

    STANDARD.encode(hasher.finalize())
}

/// Completes the upgrade of an already-parsed request.
///
/// Without a `Sec-WebSocket-Key` header a `400 Bad Request` is sent and
/// `Ok(false)` returned; otherwise `101 Switching Protocols` is sent.
pub async fn handshake(stream: &ByteStream, request: &Request) -> crate::Result<bool> {
    let key = request
        .header("sec-websocket-key")
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let Some(key) = key else {
        http::send_error(stream, 400, "Bad Request", "Missing Sec-WebSocket-Key header").await?;
        return Ok(false);
    };

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    );
    stream.write_all(response.as_bytes()).await?;

    log::debug!("websocket upgrade completed for {}", request.uri());
    Ok(true)
}

/// XORs `payload` in place with `key`, cycling every four bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (index, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[index % 4];
    }
}

/// Encodes one frame with the minimal length encoding.
///
/// With a mask key the payload is masked and the mask bit set, as a client would send it.
pub fn encode_frame(fin: bool, opcode: OpCode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);

    let fin_bit = if fin { 0x80 } else { 0x00 };
    frame.push(fin_bit | opcode.bits());

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    match payload.len() {
        length @ 0..=125 => frame.push(mask_bit | length as u8),
        length @ 126..=0xFFFF => {
            frame.push(mask_bit | 126);
            frame.extend_from_slice(&(length as u16).to_be_bytes());
        }
        length => {
            frame.push(mask_bit | 127);
            frame.extend_from_slice(&(length as u64).to_be_bytes());
        }
    }

    match mask {
        Some(key) => {
            frame.extend_from_slice(&key);
            let start = frame.len();
            frame.extend_from_slice(payload);
            apply_mask(&mut frame[start..], key);
        }
        None => frame.extend_from_slice(payload),
    }

    frame
}

/// Sends `text` as one final, unmasked text frame.
pub async fn write_text(stream: &ByteStream, text: &str) -> crate::Result<()> {
    stream
        .write_all(&encode_frame(true, OpCode::Text, text.as_bytes(), None))
        .await
}

/// Sends a close frame carrying `payload` (status code and reason, possibly empty).
pub async fn write_close(stream: &ByteStream, payload: &[u8]) -> crate::Result<()> {
    stream
        .write_all(&encode_frame(true, OpCode::Close, payload, None))
        .await
}

/// Reads one frame, enforcing `max_payload` on its declared length.
pub async fn read_frame(stream: &ByteStream, max_payload: usize) -> crate::Result<Frame> {
    let header = stream.read_exact(2).await?;

    if header[0] & 0x70 != 0 {
        return Err(Error::ReservedBits.into());
    }

    let fin = header[0] & 0x80 != 0;
    let opcode = OpCode::from_bits(header[0] & 0x0F)?;
    let masked = header[1] & 0x80 != 0;

    let length = match header[1] & 0x7F {
        126 => {
            let extended = stream.read_exact(2).await?;
            u16::from_be_bytes([extended[0], extended[1]]) as u64
        }
        127 => {
            let extended = stream.read_exact(8).await?;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&extended);
            u64::from_be_bytes(bytes)
        }
        length => length as u64,
    };

    if opcode.is_control() {
        if !fin {
            return Err(Error::FragmentedControl.into());
        }
        if length > MAX_CONTROL_PAYLOAD {
            return Err(Error::ControlTooLarge(length).into());
        }
    }

    if length > max_payload as u64 {
        return Err(Error::PayloadTooLarge {
            size: length,
            limit: max_payload,
        }
        .into());
    }

    let mask = match masked {
        true => {
            let key = stream.read_exact(4).await?;
            Some([key[0], key[1], key[2], key[3]])
        }
        false => None,
    };

    let payload = stream.read_exact(length as usize).await?;
    let payload = match mask {
        Some(key) => {
            let mut payload = BytesMut::from(&payload[..]);
            apply_mask(&mut payload, key);
            payload.freeze()
        }
        None => payload,
    };

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

/// Reads the next message with the default payload limit.
pub async fn read(stream: &ByteStream) -> crate::Result<Message> {
    read_with_limit(stream, DEFAULT_MAX_PAYLOAD).await
}

/// Reads frames until one complete message is available.
///
/// Control frames between fragments are handled in place. A close frame is
/// echoed back before returning [`Message::Close`].
pub async fn read_with_limit(stream: &ByteStream, max_payload: usize) -> crate::Result<Message> {
    let mut fragments: Option<(OpCode, BytesMut)> = None;

    loop {
        let frame = read_frame(stream, max_payload).await?;

        match frame.opcode {
            OpCode::Ping => {
                stream
                    .write_all(&encode_frame(true, OpCode::Pong, &frame.payload, None))
                    .await?;
                continue;
            }
            OpCode::Pong => continue,
            OpCode::Close => {
                // A close body is empty or starts with a two-byte status code.
                let status = match frame.payload.len() {
                    0 | 1 => &[][..],
                    _ => &frame.payload[..2],
                };
                if let Err(error) = write_close(stream, status).await {
                    log::debug!("close frame not echoed: {error}");
                }
                return Ok(Message::Close);
            }
            OpCode::Continuation => {
                let Some((_, buffer)) = fragments.as_mut() else {
                    return Err(Error::UnexpectedContinuation.into());
                };

                let size = (buffer.len() + frame.payload.len()) as u64;
                if size > max_payload as u64 {
                    return Err(Error::PayloadTooLarge {
                        size,
                        limit: max_payload,
                    }
                    .into());
                }
                buffer.extend_from_slice(&frame.payload);
            }
            OpCode::Text | OpCode::Binary => {
                if fragments.is_some() {
                    return Err(Error::InterleavedMessage.into());
                }
                fragments = Some((frame.opcode, BytesMut::from(&frame.payload[..])));
            }
        }

        if frame.fin
            && let Some((opcode, payload)) = fragments.take()
        {
            return message(opcode, payload.freeze());
        }
    }
}

fn message(opcode: OpCode, payload: Bytes) -> crate::Result<Message> {
    match opcode {
        OpCode::Binary => Ok(Message::Binary(payload.to_vec())),
        _ => String::from_utf8(payload.to_vec())
            .map(Message::Text)
            .map_err(|_| Error::InvalidUtf8.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGJRbe6sRhoUs="
        );
    }

    #[test]
    fn header_uses_minimal_length_encoding() {
        assert_eq!(encode_frame(true, OpCode::Text, &[], None), vec![0x81, 0x00]);

        let medium = encode_frame(true, OpCode::Text, &[b'a'; 126], None);
        assert_eq!(&medium[..4], &[0x81, 126, 0x00, 126]);
        assert_eq!(medium.len(), 4 + 126);

        let large = encode_frame(true, OpCode::Text, &vec![b'a'; 65536], None);
        assert_eq!(&large[..2], &[0x81, 127]);
        assert_eq!(&large[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn masked_frame_layout() {
        let frame = encode_frame(true, OpCode::Text, b"Hello World", Some(*b"1234"));

        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 0x80 | 11);
        assert_eq!(&frame[2..6], b"1234");

        let mut payload = frame[6..].to_vec();
        apply_mask(&mut payload, *b"1234");
        assert_eq!(payload, b"Hello World");
    }

    #[test]
    fn fragments_are_not_final() {
        let frame = encode_frame(false, OpCode::Text, b"part", None);
        assert_eq!(frame[0], 0x01);
    }
}
