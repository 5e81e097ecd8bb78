//! Cooperative task scheduler.
//!
//! The scheduler owns the live-task table and the FIFO ready queue. [`run`]
//! drains the queue: each popped task is polled once, which starts it or resumes
//! it until its next suspension point. Exactly one task executes at a time and
//! nothing preempts it.
//!
//! A task that returns an error or panics is logged, reported to the failure
//! hook, and dropped. The drain continues with the next task, so one failing
//! connection never stalls the others.
//!
//! [`run`]: Scheduler::run

use crate::Error;
use crate::runtime::queue::ReadyQueue;
use crate::runtime::waker::make_waker;
use crate::task::{Task, TaskId, TaskState};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Why a task was dropped by the scheduler.
#[derive(Debug)]
pub enum TaskFailure {
    /// The task's future resolved to an error.
    Error(Error),
    /// The task panicked while being polled.
    Panic(String),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(error) => write!(f, "{error}"),
            TaskFailure::Panic(message) => write!(f, "panicked: {message}"),
        }
    }
}

type FailureHook = Box<dyn FnMut(TaskId, &TaskFailure)>;

pub struct Scheduler {
    tasks: RefCell<HashMap<TaskId, Task>>,
    queue: Arc<ReadyQueue>,
    next_id: Cell<u64>,
    on_failure: RefCell<Option<FailureHook>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            tasks: RefCell::new(HashMap::new()),
            queue: Arc::new(ReadyQueue::new()),
            next_id: Cell::new(1),
            on_failure: RefCell::new(None),
        }
    }

    /// Wraps `future` as a new task and appends it to the ready queue.
    ///
    /// Nothing runs until the next [`Scheduler::run`].
    pub fn enqueue<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = crate::Result<()>> + 'static,
    {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        self.tasks.borrow_mut().insert(id, Task::new(future));
        self.queue.push(id);

        id
    }

    /// Re-appends a suspended task to the ready queue.
    ///
    /// Scheduling a terminated or unknown task is a no-op and returns `false`.
    pub fn schedule(&self, id: TaskId) -> bool {
        if !self.tasks.borrow().contains_key(&id) {
            log::warn!("ignoring schedule request for stale {id}");
            return false;
        }

        self.queue.push(id);
        true
    }

    /// Drains the ready queue, starting or resuming each task once per pop.
    pub fn run(&self) {
        while let Some(id) = self.queue.pop() {
            // The task leaves the table while it runs so it can spawn or schedule freely.
            let Some(mut task) = self.tasks.borrow_mut().remove(&id) else {
                log::trace!("skipping stale {id}");
                continue;
            };

            let waker = make_waker(id, self.queue.clone());
            let mut context = Context::from_waker(&waker);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.poll(&mut context)));

            match outcome {
                Ok(Poll::Pending) => {
                    self.tasks.borrow_mut().insert(id, task);
                }
                Ok(Poll::Ready(Ok(()))) => {
                    log::trace!("{id} completed");
                }
                Ok(Poll::Ready(Err(error))) => self.fail(id, TaskFailure::Error(error)),
                Err(payload) => self.fail(id, TaskFailure::Panic(panic_message(payload))),
            }
        }
    }

    /// Installs a hook invoked for every task dropped because of an error or panic.
    pub fn on_failure<H>(&self, hook: H)
    where
        H: FnMut(TaskId, &TaskFailure) + 'static,
    {
        *self.on_failure.borrow_mut() = Some(Box::new(hook));
    }

    /// Returns the state of a task. Ids that are no longer live report [`TaskState::Terminated`].
    pub fn state(&self, id: TaskId) -> TaskState {
        self.tasks
            .borrow()
            .get(&id)
            .map(|task| task.state)
            .unwrap_or(TaskState::Terminated)
    }

    pub fn live_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Number of tasks waiting in the ready queue.
    pub fn ready_tasks(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drops every live task and clears the ready queue.
    pub(crate) fn clear(&self) {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        self.queue.clear();
        drop(tasks);
    }

    fn fail(&self, id: TaskId, failure: TaskFailure) {
        log::error!("{id} dropped: {failure}");

        // Take the hook out so it may call back into the scheduler.
        let hook = self.on_failure.borrow_mut().take();
        if let Some(mut hook) = hook {
            hook(id, &failure);

            let mut slot = self.on_failure.borrow_mut();
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }

    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }

    "unknown panic payload".to_string()
}
