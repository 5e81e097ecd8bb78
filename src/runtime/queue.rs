//! FIFO ready queue of task ids.
//!
//! The queue is the only scheduler state reachable from a [`Waker`](std::task::Waker),
//! which the standard library requires to be `Send + Sync`, so it sits behind a
//! mutex even though the runtime never leaves its thread.

use crate::task::TaskId;

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    order: VecDeque<TaskId>,
    queued: HashSet<TaskId>,
}

/// Ordered sequence of tasks due to run next. A task appears at most once.
#[derive(Default)]
pub(crate) struct ReadyQueue {
    inner: Mutex<Inner>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends the task unless it is already queued.
    ///
    /// Returns `true` if the task was appended.
    pub(crate) fn push(&self, id: TaskId) -> bool {
        let mut inner = self.lock();

        if !inner.queued.insert(id) {
            return false;
        }

        inner.order.push_back(id);
        true
    }

    pub(crate) fn pop(&self) -> Option<TaskId> {
        let mut inner = self.lock();
        let id = inner.order.pop_front()?;
        inner.queued.remove(&id);

        Some(id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.order.clear();
        inner.queued.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned queue only means a panic happened mid-push; the data is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_fifo_order_without_duplicates() {
        let queue = ReadyQueue::new();

        assert!(queue.push(TaskId(1)));
        assert!(queue.push(TaskId(2)));
        assert!(!queue.push(TaskId(1)));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(), Some(TaskId(1)));
        assert!(queue.push(TaskId(1)));
        assert_eq!(queue.pop(), Some(TaskId(2)));
        assert_eq!(queue.pop(), Some(TaskId(1)));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }
}
