//! Readiness reactor.
//!
//! - [`core`]: registration table and the `poll(2)` pass over it
//! - [`event`]: `pollfd` wrapper and descriptor flags
//! - [`future`]: the readiness future every stream operation suspends on

pub(crate) mod core;
pub(crate) mod event;
pub mod future;
