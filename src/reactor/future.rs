//! Readiness futures for non-blocking file descriptors.
//!
//! [`Readiness`] is the suspension point every stream operation goes through:
//! the first poll registers a callback with the event loop and returns
//! `Pending`, even when the descriptor is already ready. The callback
//! deregisters itself and wakes the task, and the next poll completes. Only
//! then does the caller perform its read or write syscall.
//!
//! # Examples
//!
//! ```ignore
//! # use relay::Handle;
//! # async fn wait(handle: Handle, fd: std::os::unix::io::RawFd) {
//! handle.readable(fd).await;
//! // the descriptor was reported readable by the last poll
//! # }
//! ```

use crate::reactor::core::{Direction, ReadyCallback};
use crate::runtime::Handle;

use std::cell::Cell;
use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Future resolving once the event loop reports `file_descriptor` ready in `direction`.
pub struct Readiness {
    handle: Handle,
    file_descriptor: RawFd,
    direction: Direction,
    fired: Rc<Cell<bool>>,
    callback: Option<ReadyCallback>,
}

impl Readiness {
    pub(crate) fn new(handle: Handle, file_descriptor: RawFd, direction: Direction) -> Self {
        Self {
            handle,
            file_descriptor,
            direction,
            fired: Rc::new(Cell::new(false)),
            callback: None,
        }
    }
}

impl Future for Readiness {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.fired.get() {
            self.callback = None;
            return Poll::Ready(());
        }

        if self.callback.is_none() {
            let shared = self.handle.downgrade();
            let fired = self.fired.clone();
            let waker = cx.waker().clone();
            let (file_descriptor, direction) = (self.file_descriptor, self.direction);

            let callback: ReadyCallback = Rc::new(move || {
                if let Some(handle) = Handle::upgrade(&shared) {
                    handle.deregister(direction, file_descriptor);
                }
                fired.set(true);
                waker.wake_by_ref();
            });

            self.handle
                .register(direction, file_descriptor, callback.clone());
            self.callback = Some(callback);
        }

        Poll::Pending
    }
}

impl Drop for Readiness {
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };

        if self.fired.get() {
            return;
        }

        // Only withdraw our own registration; a later one for the same descriptor wins.
        let current = self.handle.registered(self.direction, self.file_descriptor);
        if let Some(current) = current
            && Rc::as_ptr(&current) as *const () == Rc::as_ptr(&callback) as *const ()
        {
            self.handle.deregister(self.direction, self.file_descriptor);
        }
    }
}
