//! Runtime subsystem modules.

mod core;
pub(crate) mod queue;
pub mod scheduler;
pub(crate) mod waker;
pub mod yield_now;

pub use self::core::{Handle, Runtime, RuntimeConfig};
pub use scheduler::{Scheduler, TaskFailure};
pub use yield_now::YieldNow;
