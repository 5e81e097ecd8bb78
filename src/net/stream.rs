//! Byte stream over one non-blocking descriptor.
//!
//! Every operation suspends the calling task at least once before touching the
//! descriptor: reads and writes wait for readiness from the event loop, and
//! data already buffered is handed out only after a next-tick yield.
//!
//! Raw reads are boundary-unaware and may return short chunks. [`ByteStream::read_line`]
//! and [`ByteStream::read_exact`] accumulate partial data in a per-stream
//! pending buffer across suspensions, so a slow peer never produces a
//! truncated line or frame.
//!
//! # Example
//!
//! ```ignore
//! let stream = ByteStream::from_std(tcp_stream, &handle)?;
//! while let Some(line) = stream.read_line(4096).await? {
//!     stream.write_all(&line).await?;
//! }
//! ```

use crate::net::utils;
use crate::reactor::core::Direction;
use crate::reactor::event::Event;
use crate::runtime::Handle;
use crate::{Error, Result};

use bytes::{Bytes, BytesMut};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Cloneable handle to a non-blocking descriptor.
///
/// Clones share the descriptor and the pending buffer. The descriptor is
/// closed by [`ByteStream::close`] or when the last clone is dropped.
#[derive(Clone)]
pub struct ByteStream {
    inner: Rc<Inner>,
}

struct Inner {
    handle: Handle,
    file_descriptor: RefCell<Option<OwnedFd>>,
    pending: RefCell<BytesMut>,
    read_buffer_size: usize,
    write_gate: Gate,
    restore_flags: Option<libc::c_int>,
}

impl Inner {
    /// Puts back the status flags recorded by [`ByteStream::shared`].
    fn restore(&self, file_descriptor: &OwnedFd) {
        let Some(flags) = self.restore_flags else {
            return;
        };

        if let Err(error) = Event::set_flags(file_descriptor.as_raw_fd(), flags) {
            log::debug!("failed to restore flags on fd {}: {error}", file_descriptor.as_raw_fd());
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(file_descriptor) = self.file_descriptor.get_mut().take() {
            self.restore(&file_descriptor);
        }
    }
}

impl ByteStream {
    /// Wraps an already-connected descriptor and switches it to non-blocking mode.
    pub fn new(file_descriptor: OwnedFd, handle: &Handle) -> io::Result<Self> {
        Self::wrap(file_descriptor, handle, false)
    }

    /// Wraps a duplicate of a descriptor the rest of the process keeps using.
    ///
    /// `O_NONBLOCK` is shared by every duplicate, so the original flags are
    /// put back when the stream is closed or dropped.
    pub fn shared(file_descriptor: BorrowedFd<'_>, handle: &Handle) -> io::Result<Self> {
        Self::wrap(file_descriptor.try_clone_to_owned()?, handle, true)
    }

    fn wrap(file_descriptor: OwnedFd, handle: &Handle, restore: bool) -> io::Result<Self> {
        let original_flags = Event::set_nonblocking(file_descriptor.as_raw_fd())?;

        Ok(Self {
            inner: Rc::new(Inner {
                handle: handle.clone(),
                file_descriptor: RefCell::new(Some(file_descriptor)),
                pending: RefCell::new(BytesMut::new()),
                read_buffer_size: handle.config().read_buffer_size,
                write_gate: Gate::default(),
                restore_flags: restore.then_some(original_flags),
            }),
        })
    }

    /// Wraps any standard I/O object that owns a descriptor (`TcpStream`, `UnixStream`, ...).
    pub fn from_std<T>(io: T, handle: &Handle) -> io::Result<Self>
    where
        T: Into<OwnedFd>,
    {
        Self::new(io.into(), handle)
    }

    /// A stream reading from a duplicate of the process's standard input.
    pub fn stdin(handle: &Handle) -> io::Result<Self> {
        Self::shared(io::stdin().as_fd(), handle)
    }

    /// A stream writing to a duplicate of the process's standard output.
    pub fn stdout(handle: &Handle) -> io::Result<Self> {
        Self::shared(io::stdout().as_fd(), handle)
    }

    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.inner
            .file_descriptor
            .borrow()
            .as_ref()
            .map(|fd| fd.as_raw_fd())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.file_descriptor.borrow().is_none()
    }

    /// Returns `true` if both values refer to the same underlying stream.
    pub fn same_stream(&self, other: &ByteStream) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Reads up to the runtime's default buffer size.
    pub async fn read_chunk(&self) -> Result<Option<Bytes>> {
        self.read(self.inner.read_buffer_size).await
    }

    /// Suspends until readable, then performs one read of up to `max_len` bytes.
    ///
    /// Returns `Ok(None)` once the peer has closed its end.
    pub async fn read(&self, max_len: usize) -> Result<Option<Bytes>> {
        let max_len = max_len.max(1);

        if !self.inner.pending.borrow().is_empty() {
            self.inner.handle.yield_now().await;

            let mut pending = self.inner.pending.borrow_mut();
            if !pending.is_empty() {
                let take = max_len.min(pending.len());
                return Ok(Some(pending.split_to(take).freeze()));
            }
        }

        match self.fill(max_len).await? {
            0 => Ok(None),
            _ => {
                let mut pending = self.inner.pending.borrow_mut();
                let take = max_len.min(pending.len());
                Ok(Some(pending.split_to(take).freeze()))
            }
        }
    }

    /// Reads through the next `\n` (included), or `max_len` bytes, whichever comes first.
    ///
    /// Partial lines are kept across suspensions. At end of stream an
    /// unterminated remainder is returned once, then `Ok(None)`.
    pub async fn read_line(&self, max_len: usize) -> Result<Option<Bytes>> {
        let max_len = max_len.max(1);
        let mut suspended = false;

        loop {
            let end = {
                let pending = self.inner.pending.borrow();
                let window = &pending[..pending.len().min(max_len)];

                match window.iter().position(|byte| *byte == b'\n') {
                    Some(position) => Some(position + 1),
                    None if pending.len() >= max_len => Some(max_len),
                    None => None,
                }
            };

            if let Some(end) = end {
                if !suspended {
                    self.inner.handle.yield_now().await;
                    suspended = true;
                    continue;
                }

                let line = self.inner.pending.borrow_mut().split_to(end).freeze();
                return Ok(Some(line));
            }

            let read = self.fill(self.inner.read_buffer_size).await?;
            suspended = true;

            if read == 0 {
                let mut pending = self.inner.pending.borrow_mut();
                if pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(pending.split().freeze()));
            }
        }
    }

    /// Reads exactly `len` bytes, suspending as often as needed.
    ///
    /// End of stream before `len` bytes is [`Error::ConnectionClosed`].
    pub async fn read_exact(&self, len: usize) -> Result<Bytes> {
        if self.inner.pending.borrow().len() >= len {
            self.inner.handle.yield_now().await;
        }

        loop {
            let buffered = self.inner.pending.borrow().len();
            if buffered >= len {
                return Ok(self.inner.pending.borrow_mut().split_to(len).freeze());
            }

            let wanted = (len - buffered).max(self.inner.read_buffer_size);
            if self.fill(wanted).await? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Suspends until writable, then performs one write.
    ///
    /// Returns the number of bytes written, which may be less than `data.len()`.
    /// Overlapping `write` calls on one stream are not allowed; use
    /// [`ByteStream::write_all`] when several tasks share a stream.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        loop {
            let file_descriptor = self.file_descriptor()?;
            self.inner.handle.writable(file_descriptor).await;

            let file_descriptor = self.file_descriptor()?;
            match utils::write(file_descriptor, data) {
                Ok(written) => return Ok(written),
                Err(error) if utils::is_retryable(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Writes all of `data`, serialized against other `write_all` calls on the same stream.
    pub async fn write_all(&self, mut data: &[u8]) -> Result<()> {
        let _permit = self.inner.write_gate.acquire().await;

        while !data.is_empty() {
            let written = self.write(data).await?;
            if written == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned zero bytes").into());
            }
            data = &data[written..];
        }

        Ok(())
    }

    /// Releases the descriptor. Idempotent.
    ///
    /// Tasks parked on this descriptor are woken and observe [`Error::StreamClosed`].
    pub fn close(&self) {
        let Some(file_descriptor) = self.inner.file_descriptor.borrow_mut().take() else {
            return;
        };

        let raw = file_descriptor.as_raw_fd();
        self.inner.handle.notify(Direction::Read, raw);
        self.inner.handle.notify(Direction::Write, raw);

        self.inner.restore(&file_descriptor);
        drop(file_descriptor);
        log::trace!("fd {raw} closed");
    }

    fn file_descriptor(&self) -> Result<RawFd> {
        self.raw_fd().ok_or(Error::StreamClosed)
    }

    /// Waits for readability and appends one read of up to `max_len` bytes to the pending buffer.
    async fn fill(&self, max_len: usize) -> Result<usize> {
        let mut buffer = vec![0u8; max_len];

        loop {
            let file_descriptor = self.file_descriptor()?;
            self.inner.handle.readable(file_descriptor).await;

            let file_descriptor = self.file_descriptor()?;
            match utils::read(file_descriptor, &mut buffer) {
                Ok(read) => {
                    self.inner
                        .pending
                        .borrow_mut()
                        .extend_from_slice(&buffer[..read]);
                    return Ok(read);
                }
                Err(error) if utils::is_retryable(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("fd", &self.raw_fd())
            .field("pending", &self.inner.pending.borrow().len())
            .finish()
    }
}

/// Single-holder asynchronous lock.
#[derive(Default)]
struct Gate {
    locked: Cell<bool>,
    waiters: RefCell<VecDeque<Waker>>,
}

impl Gate {
    fn acquire(&self) -> Acquire<'_> {
        Acquire { gate: self }
    }
}

struct Acquire<'a> {
    gate: &'a Gate,
}

impl<'a> Future for Acquire<'a> {
    type Output = GatePermit<'a>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.gate.locked.replace(true) {
            return Poll::Ready(GatePermit { gate: self.gate });
        }

        self.gate.waiters.borrow_mut().push_back(cx.waker().clone());
        Poll::Pending
    }
}

struct GatePermit<'a> {
    gate: &'a Gate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.locked.set(false);

        // A parked waiter may since have been dropped; wake them all.
        let waiters = std::mem::take(&mut *self.gate.waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }
}
