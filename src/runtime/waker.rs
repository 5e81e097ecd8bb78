//! Waker implementation for task wake-up notifications.
//!
//! Waking a task re-appends its id to the ready queue, which is exactly what
//! [`Scheduler::schedule`](crate::runtime::Scheduler::schedule) does for a live
//! task. The waker carries the id only; stale ids are discarded by the
//! scheduler when popped.

use crate::runtime::queue::ReadyQueue;
use crate::task::TaskId;

use std::sync::Arc;
use std::task::{Wake, Waker};

/// Custom waker that re-queues its task when awakened.
pub(crate) struct TaskWaker {
    id: TaskId,
    queue: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.id);
    }
}

/// Creates a [`Waker`] that pushes `id` back onto `queue` when called.
pub(crate) fn make_waker(id: TaskId, queue: Arc<ReadyQueue>) -> Waker {
    Waker::from(Arc::new(TaskWaker { id, queue }))
}
