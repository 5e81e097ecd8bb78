//! Single-threaded cooperative network I/O runtime.
//!
//! This crate multiplexes many connections through one `poll(2)` pass per loop
//! iteration, runs logical tasks (futures) from an explicit FIFO ready queue,
//! and layers small wire codecs on top of a suspending byte stream.
//!
//! # Architecture
//!
//! - **Runtime**: Event loop owning the scheduler, the readiness table, the future-tick queue and the timers
//! - **Handle**: Cloneable reference to a runtime, passed to every component that suspends or spawns
//! - **Scheduler**: Ready queue plus live-task table; runs tasks until they suspend
//! - **ByteStream**: Non-blocking descriptor whose reads and writes park the calling task
//! - **Codecs**: HTTP request parsing, WebSocket framing, Server-Sent Events, newline-delimited JSON-RPC
//! - **Acceptor**: Accept loop spawning one task per connection
//! - **SessionRegistry**: Random session ids bound to long-lived streams
//! - **Server**: HTTP endpoints (WebSocket, SSE, POST) and the stdio transport
//!
//! # Example
//!
//! ```no_run
//! use relay::Runtime;
//!
//! let runtime = Runtime::new();
//! let handle = runtime.handle();
//!
//! runtime.spawn(async move {
//!     handle.sleep(std::time::Duration::from_millis(10)).await;
//!     Ok(())
//! });
//!
//! runtime.run().expect("event loop failed");
//! ```

mod builder;
pub mod codec;
pub mod config;
mod error;
pub mod net;
pub mod reactor;
pub mod runtime;
pub mod server;
pub mod session;
mod task;
mod timer;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use error::{Error, Result};
pub use net::{Acceptor, ByteStream, TcpListener};
pub use runtime::{Handle, Runtime, RuntimeConfig, Scheduler, TaskFailure};
pub use session::{SessionId, SessionRegistry};
pub use task::{TaskId, TaskState};
pub use timer::Sleep;
