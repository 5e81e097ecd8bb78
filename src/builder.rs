//! Fluent builder for Runtime construction.

use crate::runtime::{Runtime, RuntimeConfig};

use std::time::Duration;

/// Builder for constructing Runtime instances with fluent API.
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new()
///     .poll_timeout(Duration::from_millis(50))
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how long a single readiness poll may block.
    ///
    /// Keeps the loop responsive to newly deferred work when no descriptor is active.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    /// Sets the default read size of streams created on this runtime.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size.max(1);
        self
    }

    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}
