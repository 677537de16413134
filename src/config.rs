//! Session tuning parameters.
//!
//! [`SessionConfig`] controls how long the framer waits for more client bytes
//! before closing a burst, how the passthrough relay decides the destination
//! has finished replying, and how much is read per call.

use std::time::Duration;

use serde::Deserialize;

const MIN_WINDOW: Duration = Duration::from_millis(1);
const MAX_WINDOW: Duration = Duration::from_secs(1);
const MIN_READ_BUFFER: usize = 64;
const MAX_READ_BUFFER: usize = 1024 * 1024;

/// Configuration shared by the framer, the relay and the session worker.
///
/// # Default Values
/// - `quiescence_window`: 10 milliseconds
/// - `relay_window`: 10 milliseconds
/// - `relay_first_byte_timeout`: 5 seconds
/// - `read_buffer_size`: 4096 bytes
/// - `max_burst_bytes`: unlimited
///
/// # Invariants
/// - both windows lie between 1 millisecond and 1 second
/// - `read_buffer_size` lies between 64 bytes and 1 MiB
///
/// Values loaded from configuration files are only guaranteed to hold these
/// invariants after [`SessionConfig::normalized`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which the current client burst is considered complete.
    pub quiescence_window: Duration,
    /// Idle time after which the destination's reply is considered complete.
    pub relay_window: Duration,
    /// How long to wait for the first reply byte from the destination.
    pub relay_first_byte_timeout: Duration,
    /// Capacity of the buffer handed to each read call.
    pub read_buffer_size: usize,
    /// Close a burst early once it holds this many bytes.
    pub max_burst_bytes: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quiescence_window: Duration::from_millis(10),
            relay_window: Duration::from_millis(10),
            relay_first_byte_timeout: Duration::from_secs(5),
            read_buffer_size: 4096,
            max_burst_bytes: None,
        }
    }
}

impl SessionConfig {
    /// Set the client quiescence window.
    #[must_use]
    pub fn quiescence_window(mut self, window: Duration) -> Self {
        self.quiescence_window = window;
        self
    }

    /// Set the destination relay window.
    #[must_use]
    pub fn relay_window(mut self, window: Duration) -> Self {
        self.relay_window = window;
        self
    }

    /// Set how long the relay waits for the destination's first byte.
    #[must_use]
    pub fn relay_first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.relay_first_byte_timeout = timeout;
        self
    }

    /// Set the per-read buffer capacity.
    #[must_use]
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Cap the number of bytes a single burst may accumulate.
    #[must_use]
    pub fn max_burst_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_burst_bytes = limit;
        self
    }

    /// Clamp every field to its supported range.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use replayframe::SessionConfig;
    ///
    /// let cfg = SessionConfig::default()
    ///     .quiescence_window(Duration::ZERO)
    ///     .read_buffer_size(1)
    ///     .normalized();
    ///
    /// assert_eq!(cfg.quiescence_window, Duration::from_millis(1));
    /// assert_eq!(cfg.read_buffer_size, 64);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.quiescence_window = self.quiescence_window.clamp(MIN_WINDOW, MAX_WINDOW);
        self.relay_window = self.relay_window.clamp(MIN_WINDOW, MAX_WINDOW);
        self.relay_first_byte_timeout = self.relay_first_byte_timeout.max(self.relay_window);
        self.read_buffer_size = self.read_buffer_size.clamp(MIN_READ_BUFFER, MAX_READ_BUFFER);
        self.max_burst_bytes = self.max_burst_bytes.map(|limit| limit.max(1));
        self
    }
}
