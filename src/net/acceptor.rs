//! Connection acceptor: one long-lived accept task plus one task per connection.

use crate::net::stream::ByteStream;
use crate::net::tcp_listener::TcpListener;
use crate::reactor::core::Direction;
use crate::runtime::Handle;
use crate::task::TaskId;
use crate::Result;

use std::cell::Cell;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

/// Accepts connections on a [`TcpListener`] and hands each one to a handler task.
///
/// ```ignore
/// let acceptor = Acceptor::bind(&handle, "0.0.0.0:8081")?;
/// acceptor.start(|stream| async move {
///     stream.write_all(b"hello\n").await
/// });
/// runtime.run()?;
/// ```
pub struct Acceptor {
    handle: Handle,
    listener: Rc<TcpListener>,
    local_addr: SocketAddr,
    stopped: Rc<Cell<bool>>,
}

impl Acceptor {
    pub fn bind(handle: &Handle, address: &str) -> Result<Self> {
        let listener = TcpListener::bind(handle, address)?;
        let local_addr = listener.local_addr()?;

        log::info!("listening on {local_addr}");

        Ok(Self {
            handle: handle.clone(),
            listener: Rc::new(listener),
            local_addr,
            stopped: Rc::new(Cell::new(false)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the accept loop.
    ///
    /// Every accepted connection runs `handler` in its own task. Handler errors
    /// are logged; the stream is closed once the handler returns either way.
    pub fn start<H, F>(&self, handler: H) -> TaskId
    where
        H: Fn(ByteStream) -> F + 'static,
        F: Future<Output = Result<()>> + 'static,
    {
        let handle = self.handle.clone();
        let listener = self.listener.clone();
        let stopped = self.stopped.clone();
        let local_addr = self.local_addr;

        self.handle.spawn(async move {
            while !stopped.get() {
                listener.readable().await;
                if stopped.get() {
                    break;
                }

                let (stream, peer) = match listener.try_accept() {
                    Ok(Some(accepted)) => accepted,
                    Ok(None) => continue,
                    Err(crate::Error::Io(error)) if is_transient(&error) => {
                        log::warn!("accept failed: {error}");
                        continue;
                    }
                    Err(error) => return Err(error),
                };

                log::debug!("accepted connection from {peer}");

                let connection = handler(stream.clone());
                handle.spawn(async move {
                    if let Err(error) = connection.await {
                        log::warn!("connection {peer} failed: {error}");
                    }
                    stream.close();
                    log::debug!("connection {peer} closed");
                    Ok(())
                });
            }

            log::info!("acceptor on {local_addr} stopped");
            Ok(())
        })
    }

    /// Asks the accept loop to stop awaiting new connections.
    ///
    /// Cooperative: the loop observes the flag on its next wake-up, which this
    /// call triggers. Connections already accepted keep running.
    pub fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }

        self.handle.notify(Direction::Read, self.listener.raw_fd());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

// Descriptor exhaustion and aborted handshakes only affect the connection being accepted.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM | libc::ECONNABORTED)
    )
}
