//! Readiness table of the event loop.
//!
//! Maps each descriptor to at most one read and one write callback and turns
//! a `poll(2)` pass into the list of callbacks to fire.

use crate::reactor::event::Event;

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

/// Callback fired when a registered descriptor becomes ready.
pub(crate) type ReadyCallback = Rc<dyn Fn()>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// Descriptors reported ready by one poll.
#[derive(Debug, Default)]
pub(crate) struct ReadyEvents {
    pub(crate) readable: Vec<RawFd>,
    pub(crate) writable: Vec<RawFd>,
}

/// Readiness registration table.
///
/// Keyed by descriptor, not by task: each descriptor holds at most one read
/// callback and one write callback. Registering again replaces the previous
/// callback, which is then never invoked.
#[derive(Default)]
pub(crate) struct Reactor {
    reads: HashMap<RawFd, ReadyCallback>,
    writes: HashMap<RawFd, ReadyCallback>,
    events: Vec<Event>,
}

impl Reactor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `callback` for `file_descriptor`, returning the one it replaced.
    pub(crate) fn register(
        &mut self,
        direction: Direction,
        file_descriptor: RawFd,
        callback: ReadyCallback,
    ) -> Option<ReadyCallback> {
        self.table(direction).insert(file_descriptor, callback)
    }

    /// Drops the callback of `file_descriptor` in `direction`, if any.
    pub(crate) fn deregister(
        &mut self,
        direction: Direction,
        file_descriptor: RawFd,
    ) -> Option<ReadyCallback> {
        self.table(direction).remove(&file_descriptor)
    }

    pub(crate) fn callback(
        &self,
        direction: Direction,
        file_descriptor: RawFd,
    ) -> Option<ReadyCallback> {
        let table = match direction {
            Direction::Read => &self.reads,
            Direction::Write => &self.writes,
        };

        table.get(&file_descriptor).cloned()
    }

    /// `true` when no descriptor is registered in either direction.
    pub(crate) fn is_idle(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    pub(crate) fn clear(&mut self) -> Vec<ReadyCallback> {
        self.reads
            .drain()
            .chain(self.writes.drain())
            .map(|(_, callback)| callback)
            .collect()
    }

    /// Performs one readiness poll over every registered descriptor.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Longest time to block when nothing is ready
    ///
    /// # Returns
    ///
    /// The descriptors whose registered direction became ready. An interrupted
    /// call surfaces as `io::ErrorKind::Interrupted`.
    pub(crate) fn poll(&mut self, timeout: Duration) -> io::Result<ReadyEvents> {
        let descriptors: HashSet<RawFd> = self
            .reads
            .keys()
            .chain(self.writes.keys())
            .copied()
            .collect();

        self.events.clear();
        self.events.extend(descriptors.into_iter().map(|file_descriptor| {
            Event::new(
                file_descriptor,
                self.reads.contains_key(&file_descriptor),
                self.writes.contains_key(&file_descriptor),
            )
        }));

        let mut ready = ReadyEvents::default();
        if Event::wait(&mut self.events, timeout)? == 0 {
            return Ok(ready);
        }

        for event in &self.events {
            let file_descriptor = event.file_descriptor();

            if event.is_readable() && self.reads.contains_key(&file_descriptor) {
                ready.readable.push(file_descriptor);
            }
            if event.is_writable() && self.writes.contains_key(&file_descriptor) {
                ready.writable.push(file_descriptor);
            }
        }

        Ok(ready)
    }

    fn table(&mut self, direction: Direction) -> &mut HashMap<RawFd, ReadyCallback> {
        match direction {
            Direction::Read => &mut self.reads,
            Direction::Write => &mut self.writes,
        }
    }
}
