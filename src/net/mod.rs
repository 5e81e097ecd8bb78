//! Networking primitives.
//!
//! - [`stream`]: [`ByteStream`] for reading/writing one non-blocking descriptor
//! - [`tcp_listener`]: [`TcpListener`] for accepting connections
//! - [`acceptor`]: [`Acceptor`], the accept loop spawning one task per connection
//! - `utils`: Address conversion and raw syscall wrappers
//!
//! # Example
//!
//! ```ignore
//! use relay::net::Acceptor;
//!
//! let acceptor = Acceptor::bind(&runtime.handle(), "127.0.0.1:8080")?;
//! acceptor.start(|stream| async move {
//!     while let Some(line) = stream.read_line(1024).await? {
//!         stream.write_all(&line).await?;
//!     }
//!     Ok(())
//! });
//! runtime.run()?;
//! ```

pub mod acceptor;
pub mod stream;
pub mod tcp_listener;
pub(crate) mod utils;

pub use acceptor::Acceptor;
pub use stream::ByteStream;
pub use tcp_listener::TcpListener;
