use relay::codec::http::Request;
use relay::codec::websocket::{self, Message, OpCode};
use relay::{ByteStream, Error, Handle, Runtime};
use std::os::unix::net::UnixStream;

fn pair(handle: &Handle) -> (ByteStream, ByteStream) {
    let (left, right) = UnixStream::pair().expect("socket pair");

    (
        ByteStream::from_std(left, handle).expect("wrap left"),
        ByteStream::from_std(right, handle).expect("wrap right"),
    )
}

fn sample_text(len: usize) -> String {
    (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect()
}

#[test]
fn text_frames_round_trip_across_length_boundaries() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);

            for len in [0, 125, 126, 65535, 65536] {
                let text = sample_text(len);

                let writer = server.clone();
                let sent = text.clone();
                handle.spawn(async move { websocket::write_text(&writer, &sent).await });

                let message = websocket::read(&client).await.expect("read");
                assert_eq!(message, Message::Text(text.clone()), "unmasked, {len} bytes");

                let frame = websocket::encode_frame(true, OpCode::Text, text.as_bytes(), Some([7, 1, 200, 42]));
                let writer = client.clone();
                handle.spawn(async move { writer.write_all(&frame).await });

                let message = websocket::read(&server).await.expect("read");
                assert_eq!(message, Message::Text(text), "masked, {len} bytes");
            }
        })
        .expect("block_on");
}

#[test]
fn masked_hello_world_is_unmasked() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);

            let key = *b"1234";
            let mut frame = vec![0x81, 0x80 | 11];
            frame.extend_from_slice(&key);
            frame.extend(
                b"Hello World"
                    .iter()
                    .enumerate()
                    .map(|(i, byte)| byte ^ key[i % 4]),
            );

            client.write_all(&frame).await.expect("write");

            let message = websocket::read(&server).await.expect("read");
            assert_eq!(message, Message::Text("Hello World".to_string()));
        })
        .expect("block_on");
}

#[test]
fn fragments_are_reassembled_and_pings_answered() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);
            let key = Some(*b"abcd");

            let mut frames = Vec::new();
            frames.extend(websocket::encode_frame(false, OpCode::Text, b"Hel", key));
            frames.extend(websocket::encode_frame(true, OpCode::Ping, b"p", key));
            frames.extend(websocket::encode_frame(false, OpCode::Continuation, b"lo ", key));
            frames.extend(websocket::encode_frame(true, OpCode::Continuation, b"World", key));
            client.write_all(&frames).await.expect("write");

            let message = websocket::read(&server).await.expect("read");
            assert_eq!(message, Message::Text("Hello World".to_string()));

            let pong = websocket::read_frame(&client, 125).await.expect("pong");
            assert_eq!(pong.opcode, OpCode::Pong);
            assert!(pong.fin);
            assert_eq!(&pong.payload[..], b"p");
        })
        .expect("block_on");
}

#[test]
fn close_frames_are_echoed() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);

            let frame = websocket::encode_frame(true, OpCode::Close, &1000u16.to_be_bytes(), Some(*b"wxyz"));
            client.write_all(&frame).await.expect("write");

            assert_eq!(websocket::read(&server).await.expect("read"), Message::Close);

            let echo = websocket::read_frame(&client, 125).await.expect("echo");
            assert_eq!(echo.opcode, OpCode::Close);
            assert_eq!(&echo.payload[..], &1000u16.to_be_bytes());
        })
        .expect("block_on");
}

#[test]
fn protocol_violations_are_errors() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);
            let continuation = websocket::encode_frame(true, OpCode::Continuation, b"orphan", None);
            client.write_all(&continuation).await.expect("write");
            assert!(matches!(
                websocket::read(&server).await,
                Err(Error::WebSocket(websocket::Error::UnexpectedContinuation))
            ));

            let (server, client) = pair(&handle);
            let mut frames = websocket::encode_frame(false, OpCode::Text, b"one", None);
            frames.extend(websocket::encode_frame(true, OpCode::Text, b"two", None));
            client.write_all(&frames).await.expect("write");
            assert!(matches!(
                websocket::read(&server).await,
                Err(Error::WebSocket(websocket::Error::InterleavedMessage))
            ));

            let (server, client) = pair(&handle);
            client.write_all(&[0x83, 0x00]).await.expect("write");
            assert!(matches!(
                websocket::read(&server).await,
                Err(Error::WebSocket(websocket::Error::ReservedOpcode(0x3)))
            ));
        })
        .expect("block_on");
}

#[test]
fn oversized_payloads_are_rejected_before_reading_them() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);

            let frame = websocket::encode_frame(true, OpCode::Binary, &[0u8; 11], None);
            client.write_all(&frame).await.expect("write");

            assert!(matches!(
                websocket::read_with_limit(&server, 10).await,
                Err(Error::WebSocket(websocket::Error::PayloadTooLarge { size: 11, limit: 10 }))
            ));
        })
        .expect("block_on");
}

#[test]
fn truncated_frames_are_connection_loss() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);

            client.write_all(&[0x81, 0x05, b'a']).await.expect("write");
            client.close();

            assert!(matches!(websocket::read(&server).await, Err(Error::ConnectionClosed)));
        })
        .expect("block_on");
}

#[test]
fn handshake_answers_with_the_accept_key() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);

            let request = Request::new("GET", "/ws", "HTTP/1.1")
                .with_header("Upgrade", "websocket")
                .with_header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");

            assert!(websocket::handshake(&server, &request).await.expect("handshake"));

            let mut head = String::new();
            loop {
                let line = client.read_line(1024).await.expect("read").expect("line");
                let line = String::from_utf8(line.to_vec()).expect("utf-8");
                if line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }

            assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
            assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGJRbe6sRhoUs=\r\n"));
        })
        .expect("block_on");
}

#[test]
fn handshake_without_key_is_refused() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);
            let request = Request::new("GET", "/ws", "HTTP/1.1").with_header("Upgrade", "websocket");

            assert!(!websocket::handshake(&server, &request).await.expect("handshake"));

            let status = client.read_line(1024).await.expect("read").expect("line");
            assert_eq!(&status[..], b"HTTP/1.1 400 Bad Request\r\n");
        })
        .expect("block_on");
}

#[test]
fn one_byte_close_bodies_are_echoed_empty() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (server, client) = pair(&handle);

            let frame = websocket::encode_frame(true, OpCode::Close, &[0x03], Some(*b"wxyz"));
            client.write_all(&frame).await.expect("write");

            assert_eq!(websocket::read(&server).await.expect("read"), Message::Close);

            let echo = websocket::read_frame(&client, 125).await.expect("echo");
            assert_eq!(echo.opcode, OpCode::Close);
            assert!(echo.payload.is_empty());
        })
        .expect("block_on");
}
