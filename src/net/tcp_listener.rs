//! TCP listener for accepting incoming connections.
//!
//! # Usage
//!
//! ```ignore
//! let listener = TcpListener::bind(&handle, "0.0.0.0:8081")?;
//! println!("Listening on {}", listener.local_addr()?);
//!
//! while let Some((stream, peer)) = listener.accept().await? {
//!     println!("New connection from {}", peer);
//! }
//! ```

use crate::net::stream::ByteStream;
use crate::net::utils::{is_retryable, parse_sockaddr, sockaddr_to_socketaddr};
use crate::reactor::event::Event;
use crate::runtime::Handle;
use crate::{Error, Result};

use libc::{
    AF_INET, SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET, accept, bind, c_int, c_void, getsockname, listen,
    setsockopt, sockaddr, sockaddr_in, socket, socklen_t,
};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

const BACKLOG: c_int = 128;

/// A non-blocking TCP listener with address and port reuse enabled.
///
/// [`TcpListener::accept`] suspends the calling task until the listening
/// descriptor is readable instead of blocking the thread.
pub struct TcpListener {
    file_descriptor: OwnedFd,
    handle: Handle,
}

impl TcpListener {
    /// Binds a listener to `address` (`"ip:port"`, IPv4).
    ///
    /// This method performs the following:
    /// 1. Creates a new socket
    /// 2. Enables `SO_REUSEADDR` and `SO_REUSEPORT`
    /// 3. Sets it to non-blocking mode
    /// 4. Binds to the specified address
    /// 5. Starts listening with a backlog of 128
    pub fn bind(handle: &Handle, address: &str) -> Result<Self> {
        Self::bind_socket(address).map(|file_descriptor| Self {
            file_descriptor,
            handle: handle.clone(),
        })
        .map_err(|source| Error::Bind {
            address: address.to_string(),
            source,
        })
    }

    fn bind_socket(address: &str) -> io::Result<OwnedFd> {
        let raw_address = parse_sockaddr(address)?;

        let raw = unsafe { socket(AF_INET, SOCK_STREAM, 0) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let file_descriptor = unsafe { OwnedFd::from_raw_fd(raw) };

        enable_option(raw, SO_REUSEADDR)?;
        enable_option(raw, libc::SO_REUSEPORT)?;
        Event::set_nonblocking(raw)?;

        let result = unsafe {
            bind(
                raw,
                &raw_address as *const sockaddr_in as *const sockaddr,
                mem::size_of::<sockaddr_in>() as socklen_t,
            )
        };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        if unsafe { listen(raw, BACKLOG) } < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(file_descriptor)
    }

    /// Accepts one incoming connection.
    ///
    /// Suspends until the listener is readable, then attempts a non-blocking
    /// accept, retrying on spurious readiness. The accepted descriptor is made
    /// non-blocking and wrapped in a [`ByteStream`].
    pub async fn accept(&self) -> Result<(ByteStream, SocketAddr)> {
        loop {
            self.readable().await;

            match self.try_accept() {
                Ok(Some(accepted)) => return Ok(accepted),
                Ok(None) => continue,
                Err(error) => return Err(error),
            }
        }
    }

    /// Suspends until the listening descriptor is reported readable.
    pub(crate) async fn readable(&self) {
        self.handle.readable(self.file_descriptor.as_raw_fd()).await;
    }

    /// One non-blocking accept. `Ok(None)` when no connection is pending.
    pub(crate) fn try_accept(&self) -> Result<Option<(ByteStream, SocketAddr)>> {
        let mut address: sockaddr_in = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_in>() as socklen_t;

        let raw = unsafe {
            accept(
                self.file_descriptor.as_raw_fd(),
                &mut address as *mut sockaddr_in as *mut sockaddr,
                &mut length,
            )
        };

        if raw < 0 {
            let error = io::Error::last_os_error();
            if is_retryable(&error) {
                return Ok(None);
            }
            return Err(error.into());
        }

        let file_descriptor = unsafe { OwnedFd::from_raw_fd(raw) };
        let stream = ByteStream::new(file_descriptor, &self.handle)?;

        Ok(Some((stream, sockaddr_to_socketaddr(&address))))
    }

    pub(crate) fn raw_fd(&self) -> i32 {
        self.file_descriptor.as_raw_fd()
    }

    /// Returns the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let mut address: sockaddr_in = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_in>() as socklen_t;

        let result = unsafe {
            getsockname(
                self.file_descriptor.as_raw_fd(),
                &mut address as *mut sockaddr_in as *mut sockaddr,
                &mut length,
            )
        };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(sockaddr_to_socketaddr(&address))
    }
}

fn enable_option(file_descriptor: c_int, option: c_int) -> io::Result<()> {
    let value: c_int = 1;

    let result = unsafe {
        setsockopt(
            file_descriptor,
            SOL_SOCKET,
            option,
            &value as *const c_int as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
