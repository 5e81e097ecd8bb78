//! Timers and sleep for the event loop.
//!
//! A [`Sleep`] future registers its deadline with the runtime's [`TimerDriver`]
//! on first poll and is woken explicitly once the deadline passes, so the loop
//! never busy-polls. The loop shortens its readiness-poll timeout to the next
//! deadline, or sleeps until it when no descriptor is registered.

use crate::runtime::Handle;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Manages registered timers and wakes them when their deadline is reached.
#[derive(Default)]
pub(crate) struct TimerDriver {
    timers: HashMap<u64, (Instant, Waker)>,
    next_id: u64,
}

impl TimerDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, deadline: Instant, waker: Waker) -> u64 {
        self.next_id += 1;
        self.timers.insert(self.next_id, (deadline, waker));

        self.next_id
    }

    pub(crate) fn update(&mut self, id: u64, waker: &Waker) {
        if let Some((_, current)) = self.timers.get_mut(&id)
            && !current.will_wake(waker)
        {
            *current = waker.clone();
        }
    }

    pub(crate) fn cancel(&mut self, id: u64) {
        self.timers.remove(&id);
    }

    /// Removes every timer whose deadline has passed and returns their wakers.
    ///
    /// Wakers are returned rather than called so the caller can release its borrow first.
    pub(crate) fn take_expired(&mut self) -> Vec<Waker> {
        let now = Instant::now();
        let mut expired = Vec::new();

        self.timers.retain(|_, (deadline, waker)| {
            if now >= *deadline {
                expired.push(waker.clone());
                false
            } else {
                true
            }
        });

        expired
    }

    /// Returns the time remaining until the next timer deadline, if any.
    pub(crate) fn next_remaining(&self) -> Option<Duration> {
        let now = Instant::now();

        self.timers
            .values()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
            .min()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub(crate) fn clear(&mut self) -> Vec<Waker> {
        self.timers.drain().map(|(_, (_, waker))| waker).collect()
    }
}

/// A future that completes once its deadline has passed.
///
/// Created by [`Handle::sleep`]. Dropping it cancels the timer.
pub struct Sleep {
    handle: Handle,
    deadline: Instant,
    timer: Option<u64>,
}

impl Sleep {
    pub(crate) fn new(handle: Handle, duration: Duration) -> Self {
        Self {
            handle,
            deadline: Instant::now() + duration,
            timer: None,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            if let Some(id) = self.timer.take() {
                self.handle.timers().borrow_mut().cancel(id);
            }
            return Poll::Ready(());
        }

        let timer = self.timer;
        match timer {
            Some(id) => self.handle.timers().borrow_mut().update(id, cx.waker()),
            None => {
                let id = self
                    .handle
                    .timers()
                    .borrow_mut()
                    .register(self.deadline, cx.waker().clone());
                self.timer = Some(id);
            }
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            self.handle.timers().borrow_mut().cancel(id);
        }
    }
}
