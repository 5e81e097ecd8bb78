use crate::runtime::Handle;

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Cooperative scheduler hint: suspends until the next loop tick.
///
/// The first poll defers a callback that wakes the task and returns `Pending`.
/// Deferred callbacks run before the next readiness poll, so every other ready
/// task gets a turn without the caller waiting on I/O.
pub struct YieldNow {
    handle: Handle,
    fired: Option<Rc<Cell<bool>>>,
}

impl YieldNow {
    pub(crate) fn new(handle: Handle) -> Self {
        Self {
            handle,
            fired: None,
        }
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(fired) = &self.fired {
            return match fired.get() {
                true => Poll::Ready(()),
                false => Poll::Pending,
            };
        }

        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        let waker = cx.waker().clone();

        self.handle.defer(move || {
            flag.set(true);
            waker.wake();
        });
        self.fired = Some(fired);

        Poll::Pending
    }
}
