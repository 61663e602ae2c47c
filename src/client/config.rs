//! Session configuration.
//!
//! [`SessionConfig`] holds what `initialize` was given; [`FrameRetryPolicy`]
//! bounds how often a video frame re-checks a dropped link.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::packet::ENGINE_IO_VERSION;
use crate::transport::SocketOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default number of connectivity checks per video frame.
pub const DEFAULT_FRAME_ATTEMPTS: u32 = 5;

// ============================================================================
// SessionConfig
// ============================================================================

/// Server address and credentials for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Account name sent with `authenticate`.
    pub username: String,
    /// Account password sent with `authenticate`.
    pub password: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SessionConfig {
    /// Creates a session configuration.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns `host:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Returns `true` if a username is set.
    #[inline]
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    /// Builds the WebSocket endpoint for these options.
    ///
    /// `ws://{host}:{port}/socket.io/?EIO=4&transport=websocket`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if host and port do not form a
    /// usable URL.
    pub fn endpoint(&self, options: &SocketOptions) -> Result<Url> {
        let address = self.address();

        if self.host.trim().is_empty() {
            return Err(Error::invalid_address(address, "host is empty"));
        }
        if self.port == 0 {
            return Err(Error::invalid_address(address, "port must be non-zero"));
        }
        if self.host.contains(['/', '?', '#', '@']) {
            return Err(Error::invalid_address(
                address,
                "host contains URL delimiters",
            ));
        }

        let mut url = Url::parse(&format!("{}://{address}", options.scheme()))
            .map_err(|e| Error::invalid_address(&address, e.to_string()))?;

        if url.port_or_known_default() != Some(self.port) {
            return Err(Error::invalid_address(address, "port was not understood"));
        }

        url.set_path(&options.path);
        url.query_pairs_mut()
            .append_pair("EIO", &ENGINE_IO_VERSION.to_string())
            .append_pair("transport", "websocket");

        Ok(url)
    }
}

// ============================================================================
// FrameRetryPolicy
// ============================================================================

/// How `send_video_frame` treats a dropped link.
///
/// The frame is sent on the first of `attempts` connectivity checks that
/// succeeds. Checks run back to back; the caller is never put to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRetryPolicy {
    /// Connectivity checks before the frame is dropped (at least one).
    pub attempts: u32,
}

impl Default for FrameRetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_ATTEMPTS)
    }
}

impl FrameRetryPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self { attempts }
    }

    /// Returns a policy that checks once.
    #[inline]
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str, port: u16) -> SessionConfig {
        SessionConfig::new("alice", "secret", host, port)
    }

    #[test]
    fn test_endpoint_default_options() {
        let url = config("127.0.0.1", 9000)
            .endpoint(&SocketOptions::default())
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_endpoint_secure_and_custom_path() {
        let options = SocketOptions::default().with_secure().with_path("/io/");
        let url = config("example.com", 443).endpoint(&options).expect("endpoint");
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/io/");
        assert_eq!(url.port_or_known_default(), Some(443));
    }

    #[test]
    fn test_endpoint_ipv6_literal() {
        let url = config("::1", 9000)
            .endpoint(&SocketOptions::default())
            .expect("endpoint");
        assert_eq!(url.host_str(), Some("[::1]"));
    }

    #[test]
    fn test_endpoint_rejects_malformed_addresses() {
        let options = SocketOptions::default();
        for (host, port) in [("", 9000), ("bad host", 9000), ("a/b", 9000), ("x", 0)] {
            let result = config(host, port).endpoint(&options);
            assert!(
                matches!(result, Err(Error::InvalidAddress { .. })),
                "{host:?}:{port} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let printed = format!("{:?}", config("h", 1));
        assert!(printed.contains("alice"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_has_credentials() {
        assert!(config("h", 1).has_credentials());
        assert!(!SessionConfig::new("", "pw", "h", 1).has_credentials());
    }

    #[test]
    fn test_frame_retry_defaults() {
        let policy = FrameRetryPolicy::default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(FrameRetryPolicy::no_retry().attempts, 1);
    }
}
