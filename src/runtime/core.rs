//! Single-threaded event loop driving the scheduler and the reactor.
//!
//! The [`Runtime`] owns the scheduler, the readiness registration table, the
//! future-tick queue and the timers. Components never reach it through global
//! state: they receive a cloneable [`Handle`], so several runtimes can coexist
//! in one process.
//!
//! # Loop iteration
//!
//! 1. Take the future-tick queue, enqueue each callback as a task, run the scheduler
//!    (callbacks deferred during this drain wait for the next iteration), then
//!    fire expired timers and run the scheduler again
//! 2. Poll registered descriptors once with a bounded timeout (skipped when nothing is registered)
//! 3. Invoke read callbacks of read-ready descriptors, then write callbacks
//! 4. Run the scheduler
//!
//! [`Runtime::run`] repeats this while anything is left to wait on.

use crate::reactor::core::{Direction, ReadyCallback, Reactor};
use crate::reactor::future::Readiness;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::yield_now::YieldNow;
use crate::task::{TaskId, TaskState};
use crate::timer::{Sleep, TimerDriver};
use crate::{Error, Result};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};
use std::thread;
use std::time::Duration;

type Tick = Box<dyn FnOnce()>;

/// Tunables of one runtime instance.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on a single readiness poll.
    pub poll_timeout: Duration,
    /// Default number of bytes a stream read asks for.
    pub read_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            read_buffer_size: 8192,
        }
    }
}

pub(crate) struct Shared {
    scheduler: Scheduler,
    reactor: RefCell<Reactor>,
    ticks: RefCell<VecDeque<Tick>>,
    timers: RefCell<TimerDriver>,
    config: RuntimeConfig,
}

/// Cloneable reference to a runtime, passed to every component that suspends or spawns.
#[derive(Clone)]
pub struct Handle {
    shared: Rc<Shared>,
}

impl Handle {
    /// Wraps `future` as a new task. It first runs on the next scheduler drain.
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = Result<()>> + 'static,
    {
        self.shared.scheduler.enqueue(future)
    }

    /// Re-queues a suspended task. Stale ids are ignored.
    pub fn schedule(&self, id: TaskId) -> bool {
        self.shared.scheduler.schedule(id)
    }

    /// The scheduler shared by every clone of this handle.
    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    /// Tunables the runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Registers the read callback of `file_descriptor`, replacing any previous one.
    pub fn add_read_stream<F>(&self, file_descriptor: RawFd, callback: F)
    where
        F: Fn() + 'static,
    {
        self.register(Direction::Read, file_descriptor, Rc::new(callback));
    }

    /// Registers the write callback of `file_descriptor`, replacing any previous one.
    pub fn add_write_stream<F>(&self, file_descriptor: RawFd, callback: F)
    where
        F: Fn() + 'static,
    {
        self.register(Direction::Write, file_descriptor, Rc::new(callback));
    }

    /// Forgets the read callback of `file_descriptor`. A no-op when none is registered.
    pub fn remove_read_stream(&self, file_descriptor: RawFd) {
        self.deregister(Direction::Read, file_descriptor);
    }

    /// Forgets the write callback of `file_descriptor`. A no-op when none is registered.
    pub fn remove_write_stream(&self, file_descriptor: RawFd) {
        self.deregister(Direction::Write, file_descriptor);
    }

    /// Runs `callback` once, before the next readiness poll.
    pub fn defer<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.shared.ticks.borrow_mut().push_back(Box::new(callback));
    }

    /// Suspends the calling task until the next loop tick.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow::new(self.clone())
    }

    /// Suspends the calling task for at least `duration`.
    ///
    /// # Arguments
    ///
    /// * `duration` - Time to wait, measured from this call
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.clone(), duration)
    }

    /// Suspends until `file_descriptor` is reported readable.
    pub fn readable(&self, file_descriptor: RawFd) -> Readiness {
        Readiness::new(self.clone(), file_descriptor, Direction::Read)
    }

    /// Suspends until `file_descriptor` is reported writable.
    pub fn writable(&self, file_descriptor: RawFd) -> Readiness {
        Readiness::new(self.clone(), file_descriptor, Direction::Write)
    }

    /// Invokes the pending callback of `file_descriptor` now, as if it had become ready.
    pub(crate) fn notify(&self, direction: Direction, file_descriptor: RawFd) -> bool {
        let callback = self.registered(direction, file_descriptor);

        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub(crate) fn register(
        &self,
        direction: Direction,
        file_descriptor: RawFd,
        callback: ReadyCallback,
    ) {
        let replaced = self
            .shared
            .reactor
            .borrow_mut()
            .register(direction, file_descriptor, callback);

        if replaced.is_some() {
            log::trace!("fd {file_descriptor}: {direction:?} callback replaced");
        }
    }

    pub(crate) fn deregister(&self, direction: Direction, file_descriptor: RawFd) {
        let removed = self
            .shared
            .reactor
            .borrow_mut()
            .deregister(direction, file_descriptor);
        drop(removed);
    }

    pub(crate) fn registered(
        &self,
        direction: Direction,
        file_descriptor: RawFd,
    ) -> Option<ReadyCallback> {
        self.shared
            .reactor
            .borrow()
            .callback(direction, file_descriptor)
    }

    pub(crate) fn timers(&self) -> &RefCell<TimerDriver> {
        &self.shared.timers
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Rc::downgrade(&self.shared)
    }

    pub(crate) fn upgrade(shared: &Weak<Shared>) -> Option<Handle> {
        shared.upgrade().map(|shared| Handle { shared })
    }
}

/// Event loop owning the scheduler, the readiness table, the future-tick queue and the timers.
pub struct Runtime {
    handle: Handle,
}

impl Runtime {
    /// Creates a runtime with the default [`RuntimeConfig`].
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime with explicit tunables.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let shared = Shared {
            scheduler: Scheduler::new(),
            reactor: RefCell::new(Reactor::new()),
            ticks: RefCell::new(VecDeque::new()),
            timers: RefCell::new(TimerDriver::new()),
            config,
        };

        Self {
            handle: Handle {
                shared: Rc::new(shared),
            },
        }
    }

    /// Returns a cloneable handle for spawning, registering and sleeping.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Shortcut for `self.handle().scheduler()`.
    pub fn scheduler(&self) -> &Scheduler {
        self.handle.scheduler()
    }

    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = Result<()>> + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn defer<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.handle.defer(callback)
    }

    /// Runs the loop until nothing is left to wait on.
    ///
    /// Returns `Err(Error::Poll)` if the readiness poll fails for any reason
    /// other than an interrupted call.
    pub fn run(&self) -> Result<()> {
        while self.has_work() {
            self.turn()?;
        }

        Ok(())
    }

    /// Runs the loop until `future` completes and returns its output.
    ///
    /// Other tasks keep whatever state they reached; they resume on the next
    /// `run` or `block_on`, or are dropped with the runtime.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot = output.clone();

        let id = self.spawn(async move {
            let value = future.await;
            *slot.borrow_mut() = Some(value);
            Ok(())
        });

        loop {
            let value = output.borrow_mut().take();
            if let Some(value) = value {
                return Ok(value);
            }

            if self.scheduler().state(id) == TaskState::Terminated {
                return Err(Error::Task(format!("{id} terminated before producing its output")));
            }

            if !self.has_work() {
                return Err(Error::Stalled);
            }

            self.turn()?;
        }
    }

    fn has_work(&self) -> bool {
        let shared = &self.handle.shared;

        shared.scheduler.has_ready()
            || !shared.ticks.borrow().is_empty()
            || !shared.reactor.borrow().is_idle()
            || !shared.timers.borrow().is_empty()
    }

    /// One loop iteration.
    fn turn(&self) -> Result<()> {
        let shared = &self.handle.shared;

        let ticks = std::mem::take(&mut *shared.ticks.borrow_mut());
        for tick in ticks {
            shared.scheduler.enqueue(async move {
                tick();
                Ok(())
            });
        }
        shared.scheduler.run();

        self.fire_timers();
        shared.scheduler.run();

        if shared.reactor.borrow().is_idle() {
            let idle = shared.ticks.borrow().is_empty() && !shared.scheduler.has_ready();
            let next_timer = shared.timers.borrow().next_remaining();

            if idle && let Some(remaining) = next_timer {
                thread::sleep(remaining);
            }

            return Ok(());
        }

        let timeout = if !shared.ticks.borrow().is_empty() || shared.scheduler.has_ready() {
            Duration::ZERO
        } else {
            let next_timer = shared.timers.borrow().next_remaining();
            next_timer.map_or(shared.config.poll_timeout, |remaining| {
                remaining.min(shared.config.poll_timeout)
            })
        };

        let polled = shared.reactor.borrow_mut().poll(timeout);
        let ready = match polled {
            Ok(ready) => ready,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(error) => {
                log::error!("readiness poll failed: {error}");
                return Err(Error::Poll(error));
            }
        };

        for file_descriptor in ready.readable {
            let callback = self.handle.registered(Direction::Read, file_descriptor);
            if let Some(callback) = callback {
                callback();
            }
        }

        for file_descriptor in ready.writable {
            let callback = self.handle.registered(Direction::Write, file_descriptor);
            if let Some(callback) = callback {
                callback();
            }
        }

        shared.scheduler.run();

        Ok(())
    }

    fn fire_timers(&self) {
        let expired = self.handle.shared.timers.borrow_mut().take_expired();
        for waker in expired {
            waker.wake();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let shared = &self.handle.shared;

        // Tasks and callbacks hold handles back to this state; release them outside any borrow.
        shared.scheduler.clear();
        let callbacks = shared.reactor.borrow_mut().clear();
        let ticks = std::mem::take(&mut *shared.ticks.borrow_mut());
        let wakers = shared.timers.borrow_mut().clear();

        drop(callbacks);
        drop(ticks);
        drop(wakers);
    }
}
