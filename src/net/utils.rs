//! Raw socket helpers shared by the listener and the byte stream.

use libc::{AF_INET, in_addr, sockaddr_in};

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::RawFd;

/// Parses `ip:port` into a raw IPv4 socket address.
///
/// # Arguments
///
/// * `address` - An IPv4 address with a port, like `127.0.0.1:8080`
///
/// # Returns
///
/// `InvalidInput` for hostnames, IPv6 addresses and missing ports.
pub(crate) fn parse_sockaddr(address: &str) -> io::Result<sockaddr_in> {
    let address: SocketAddrV4 = address.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid IPv4 socket address: {address}"),
        )
    })?;

    let mut raw: sockaddr_in = unsafe { mem::zeroed() };
    raw.sin_family = AF_INET as libc::sa_family_t;
    raw.sin_port = address.port().to_be();
    raw.sin_addr = in_addr {
        s_addr: u32::from(*address.ip()).to_be(),
    };

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    ))]
    {
        raw.sin_len = mem::size_of::<sockaddr_in>() as u8;
    }

    Ok(raw)
}

/// Converts a raw IPv4 socket address back to its std form.
pub(crate) fn sockaddr_to_socketaddr(address: &sockaddr_in) -> SocketAddr {
    let ip = Ipv4Addr::from(u32::from_be(address.sin_addr.s_addr));
    let port = u16::from_be(address.sin_port);

    SocketAddr::V4(SocketAddrV4::new(ip, port))
}

/// One non-blocking `read(2)`.
pub(crate) fn read(file_descriptor: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let result = unsafe {
        libc::read(
            file_descriptor,
            buffer.as_mut_ptr() as *mut libc::c_void,
            buffer.len(),
        )
    };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(result as usize)
}

/// One non-blocking `write(2)`.
pub(crate) fn write(file_descriptor: RawFd, buffer: &[u8]) -> io::Result<usize> {
    let result = unsafe {
        libc::write(
            file_descriptor,
            buffer.as_ptr() as *const libc::c_void,
            buffer.len(),
        )
    };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(result as usize)
}

/// Errors after which the same syscall should simply be retried on the next readiness.
pub(crate) fn is_retryable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
