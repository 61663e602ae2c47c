//! Socket connection options.
//!
//! Controls how the event socket connects and reconnects.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use framecast::SocketOptions;
//!
//! let options = SocketOptions::new()
//!     .with_reconnection_attempts(3)
//!     .with_reconnection_delay(Duration::from_secs(1));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::protocol::packet::ENGINE_IO_PATH;

// ============================================================================
// Constants
// ============================================================================

/// Default number of reconnection attempts before giving up.
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 15;

/// Default fixed delay between reconnection attempts.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(5_000);

/// Default handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(20_000);

// ============================================================================
// SocketOptions
// ============================================================================

/// Event socket configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Always start a fresh connection task on open, discarding any
    /// previous one that is still retrying.
    pub force_new: bool,

    /// Use `wss://` instead of `ws://`.
    ///
    /// Requires the `native-tls` feature.
    pub secure: bool,

    /// Reconnect automatically after a lost or failed connection.
    pub reconnection: bool,

    /// Reconnection attempts before reporting final failure.
    pub reconnection_attempts: u32,

    /// Fixed delay between reconnection attempts.
    pub reconnection_delay: Duration,

    /// Time allowed for the WebSocket and namespace handshake.
    pub timeout: Duration,

    /// Server path of the Socket.IO endpoint.
    pub path: String,
}

// ============================================================================
// Constructors
// ============================================================================

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            force_new: true,
            secure: false,
            reconnection: true,
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            path: ENGINE_IO_PATH.to_string(),
        }
    }
}

impl SocketOptions {
    /// Creates options with the default policy.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SocketOptions {
    /// Sets whether `open` always starts a fresh connection task.
    #[inline]
    #[must_use]
    pub fn with_force_new(mut self, force_new: bool) -> Self {
        self.force_new = force_new;
        self
    }

    /// Enables `wss://`.
    #[inline]
    #[must_use]
    pub fn with_secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn with_reconnection(mut self, reconnection: bool) -> Self {
        self.reconnection = reconnection;
        self
    }

    /// Sets the number of reconnection attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    /// Sets the delay between reconnection attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the server path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Returns the URL scheme these options connect with.
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }
}

// ============================================================================
// Tests
// ============================================================================
