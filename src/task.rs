//! Logical tasks managed by the scheduler.
//!
//! A task wraps a future whose output is a [`Result`]. The future is the task's
//! continuation: it holds the paused execution point and every captured local.
//! The scheduler owns the task entry; nothing else keeps a reference to the
//! future, so a task can only be resumed through its [`TaskId`].
//!
//! # Lifecycle
//!
//! 1. A future is wrapped in a [`Task`] by [`Scheduler::enqueue`] (state [`TaskState::NotStarted`])
//! 2. The scheduler pops its id from the ready queue and polls it once
//! 3. `Poll::Pending` parks it ([`TaskState::Suspended`]) until a waker or
//!    [`Scheduler::schedule`] re-queues it
//! 4. `Poll::Ready` terminates it ([`TaskState::Terminated`]) and the entry is dropped
//!
//! [`Scheduler::enqueue`]: crate::runtime::Scheduler::enqueue
//! [`Scheduler::schedule`]: crate::runtime::Scheduler::schedule

use crate::Result;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Opaque handle identifying a task for the lifetime of its runtime.
///
/// Ids are allocated monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    Suspended,
    Terminated,
}

type BoxedTask = Pin<Box<dyn Future<Output = Result<()>>>>;

/// A spawned unit of work.
pub(crate) struct Task {
    future: BoxedTask,
    pub(crate) state: TaskState,
}

impl Task {
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + 'static,
    {
        Self {
            future: Box::pin(future),
            state: TaskState::NotStarted,
        }
    }

    /// Starts or resumes the task, running it until its next suspension point.
    pub(crate) fn poll(&mut self, context: &mut Context<'_>) -> Poll<Result<()>> {
        let poll = self.future.as_mut().poll(context);

        self.state = match poll {
            Poll::Pending => TaskState::Suspended,
            Poll::Ready(_) => TaskState::Terminated,
        };

        poll
    }
}
