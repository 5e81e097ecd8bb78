//! Session registry: unguessable ids bound to long-lived streams.
//!
//! The registry never closes a stream itself. Whoever created a session
//! closes it (and its stream) on disconnect, timeout, or write failure.

use crate::net::stream::ByteStream;

use rand::RngCore;
use rand::rngs::OsRng;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

const ID_BYTES: usize = 32;
const SEQUENCE_BYTES: usize = 8;

/// A registry sequence number followed by 192 random bits, hex encoded.
///
/// The sequence makes ids unique per registry; the random tail makes them unguessable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn generate(sequence: u64) -> Self {
        let mut bytes = [0u8; ID_BYTES];
        bytes[..SEQUENCE_BYTES].copy_from_slice(&sequence.to_be_bytes());
        OsRng.fill_bytes(&mut bytes[SEQUENCE_BYTES..]);

        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps session ids to the stream each was created for.
///
/// Ids are never handed out twice within one registry, even after the
/// session they named has been closed. Only open sessions are kept.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RefCell<HashMap<SessionId, ByteStream>>,
    next_sequence: Cell<u64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `stream` to a fresh id.
    pub fn create(&self, stream: ByteStream) -> SessionId {
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence.wrapping_add(1));

        let id = SessionId::generate(sequence);
        self.sessions.borrow_mut().insert(id.clone(), stream);
        log::debug!("session {id} created");

        id
    }

    pub fn get(&self, id: &str) -> Option<ByteStream> {
        self.sessions
            .borrow()
            .get(&SessionId(id.to_string()))
            .cloned()
    }

    /// Removes the entry. The stream stays open.
    pub fn close(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .borrow_mut()
            .remove(&SessionId(id.to_string()));

        if removed.is_some() {
            log::debug!("session {id} closed");
        }

        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_long_random_hex() {
        let first = SessionId::generate(0);
        let second = SessionId::generate(0);

        assert_eq!(first.as_str().len(), 64);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn closed_sessions_leave_nothing_behind() {
        let runtime = crate::Runtime::new();
        let handle = runtime.handle();
        let registry = SessionRegistry::new();
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = ByteStream::from_std(left, &handle).unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let id = registry.create(stream.clone());
            assert!(registry.get(id.as_str()).is_some());
            assert!(registry.close(id.as_str()));
            assert!(seen.insert(id));
        }

        assert!(registry.is_empty());
        assert!(registry.sessions.borrow().is_empty());
        assert!(!registry.close("0000"));
    }
}
