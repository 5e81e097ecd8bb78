//! JSON-RPC over the process's standard input and output.

use crate::codec::jsonrpc;
use crate::net::stream::ByteStream;
use crate::runtime::Handle;
use crate::server::handler::{MessageHandler, dispatch, parse_error};
use crate::task::TaskId;
use crate::{Error, Result};

use std::rc::Rc;

/// Spawns the stdio transport on `handle`.
pub fn spawn(handle: &Handle, handler: Rc<dyn MessageHandler>) -> Result<TaskId> {
    let input = ByteStream::stdin(handle)?;
    let output = ByteStream::stdout(handle)?;

    log::info!("serving JSON-RPC on stdio");
    Ok(handle.spawn(serve(input, output, handler)))
}

/// Reads messages from `input` until it ends, writing each reply to `output`.
///
/// A line that is not valid JSON gets a parse-error response with a null id.
pub async fn serve(input: ByteStream, output: ByteStream, handler: Rc<dyn MessageHandler>) -> Result<()> {
    loop {
        let reply = match jsonrpc::read(&input).await {
            Ok(Some(message)) => dispatch(handler.as_ref(), message),
            Ok(None) => break,
            Err(Error::Json(error)) => {
                log::debug!("unparsable stdio message: {error}");
                Some(parse_error())
            }
            Err(error) => return Err(error),
        };

        if let Some(reply) = reply {
            jsonrpc::write(&output, &reply).await?;
        }
    }

    log::info!("stdio input closed");
    input.close();
    output.close();

    Ok(())
}
