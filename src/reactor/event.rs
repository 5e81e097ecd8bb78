//! Thin wrapper over `poll(2)` and descriptor status flags.

use libc::{F_GETFL, F_SETFL, O_NONBLOCK, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, c_int, fcntl, poll, pollfd};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// One entry of a `poll(2)` set.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub(crate) struct Event(pollfd);

impl Event {
    /// Builds an entry asking for the given directions.
    pub(crate) fn new(file_descriptor: RawFd, read: bool, write: bool) -> Self {
        let mut events = 0;
        if read {
            events |= POLLIN;
        }
        if write {
            events |= POLLOUT;
        }

        Self(pollfd {
            fd: file_descriptor,
            events,
            revents: 0,
        })
    }

    pub(crate) fn file_descriptor(&self) -> RawFd {
        self.0.fd
    }

    // Error and hang-up conditions wake both directions so the owner observes them on its next syscall.
    pub(crate) fn is_readable(&self) -> bool {
        self.0.revents & (POLLIN | POLLERR | POLLHUP | POLLNVAL) != 0
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.0.revents & (POLLOUT | POLLERR | POLLHUP | POLLNVAL) != 0
    }

    /// Blocks for at most `timeout` until one of `events` is ready.
    ///
    /// Returns the number of entries with a non-zero `revents`.
    pub(crate) fn wait(events: &mut [Event], timeout: Duration) -> io::Result<usize> {
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        let result = unsafe {
            poll(
                events.as_mut_ptr() as *mut pollfd,
                events.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(result as usize)
    }

    /// Adds `O_NONBLOCK` to the descriptor's status flags.
    ///
    /// # Returns
    ///
    /// The flags as they were before the change, for [`Event::set_flags`].
    pub(crate) fn set_nonblocking(file_descriptor: RawFd) -> io::Result<c_int> {
        let flags = unsafe { fcntl(file_descriptor, F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }

        Self::set_flags(file_descriptor, flags | O_NONBLOCK)?;
        Ok(flags)
    }

    /// Overwrites the descriptor's status flags.
    ///
    /// Status flags live on the open file description, so every duplicate sees the change.
    pub(crate) fn set_flags(file_descriptor: RawFd, flags: c_int) -> io::Result<()> {
        let result = unsafe { fcntl(file_descriptor, F_SETFL, flags) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}
