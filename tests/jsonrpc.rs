use relay::codec::jsonrpc::{self, JsonRpcMessage};
use relay::server::{PingResponder, stdio};
use relay::{ByteStream, Error, Handle, Runtime};
use serde_json::{Value, json};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

fn pair(handle: &Handle) -> (ByteStream, ByteStream) {
    let (left, right) = UnixStream::pair().expect("socket pair");

    (
        ByteStream::from_std(left, handle).expect("wrap left"),
        ByteStream::from_std(right, handle).expect("wrap right"),
    )
}

#[test]
fn lines_decode_to_messages_and_blank_lines_to_empty_ones() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (reader, writer) = pair(&handle);

            writer
                .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n\n")
                .await
                .expect("write");
            writer.close();

            let message = jsonrpc::read(&reader).await.expect("read").expect("message");
            assert_eq!(message.method.as_deref(), Some("ping"));
            assert!(message.is_notification());

            let keep_alive = jsonrpc::read(&reader).await.expect("read").expect("message");
            assert!(keep_alive.is_empty());

            assert!(jsonrpc::read(&reader).await.expect("read").is_none());
        })
        .expect("block_on");
}

#[test]
fn malformed_lines_surface_as_json_errors() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (reader, writer) = pair(&handle);

            writer.write_all(b"{oops\n").await.expect("write");

            assert!(matches!(jsonrpc::read(&reader).await, Err(Error::Json(_))));
        })
        .expect("block_on");
}

#[test]
fn written_messages_are_one_line_each() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (reader, writer) = pair(&handle);

            let reply = JsonRpcMessage::success(json!(3), json!({"text": "multi\nline"}));
            jsonrpc::write(&writer, &reply).await.expect("write");
            jsonrpc::write(&writer, &JsonRpcMessage::error(json!(4), jsonrpc::INTERNAL_ERROR, "nope"))
                .await
                .expect("write");

            let first = jsonrpc::read(&reader).await.expect("read").expect("message");
            assert_eq!(first, reply);

            let second = jsonrpc::read(&reader).await.expect("read").expect("message");
            assert_eq!(second.error.map(|error| error.code), Some(jsonrpc::INTERNAL_ERROR));
        })
        .expect("block_on");
}

#[test]
fn stdio_transport_answers_requests_until_input_ends() {
    let runtime = Runtime::new();
    let handle = runtime.handle();

    runtime
        .block_on(async move {
            let (input, client_input) = pair(&handle);
            let (output, client_output) = pair(&handle);

            handle.spawn(stdio::serve(input, output, Rc::new(PingResponder)));

            client_input
                .write_all(
                    b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\
                      \n\
                      {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\
                      not json\n\
                      {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n",
                )
                .await
                .expect("write");
            client_input.close();

            let mut replies = Vec::new();
            while let Some(line) = client_output.read_line(4096).await.expect("read") {
                let reply: Value = serde_json::from_slice(&line).expect("json reply");
                replies.push(reply);
            }

            assert_eq!(
                replies,
                vec![
                    json!({"jsonrpc": "2.0", "id": 1, "result": {}}),
                    json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}}),
                    json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32601, "message": "Method not found: tools/list"}}),
                ]
            );
        })
        .expect("block_on");
}
