//! Connection manager and result delivery.
//!
//! | Type | Role |
//! |------|------|
//! | [`ConnectionManager`] | Lifecycle, handshake, outbound API |
//! | [`Dispatcher`] | Calls the consumer from the UI context |
//! | [`ResultConsumer`] | Implemented by the app |
//! | [`SessionConfig`] | Address and credentials |
//! | [`FrameRetryPolicy`] | Video frame wait bound |

/// Session configuration.
pub mod config;

/// Result consumer, deliveries, and the dispatcher.
pub mod consumer;

/// Fixed listener table.
mod handlers;

/// The connection manager.
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{FrameRetryPolicy, SessionConfig};
pub use consumer::{Delivery, Dispatcher, ResultConsumer};
pub use manager::ConnectionManager;
