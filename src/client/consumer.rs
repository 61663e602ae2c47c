//! Result consumer and the delivery channel that feeds it.
//!
//! Listeners run on the transport task, but the consumer must only be
//! called from the application's UI context. Handlers therefore enqueue a
//! [`Delivery`]; the [`Dispatcher`], owned by the UI context, dequeues it
//! and calls whichever consumer is registered at that moment.
//!
//! ```text
//! transport task                     UI context
//! ──────────────                     ──────────
//! handler ──► mpsc<Delivery> ──────► Dispatcher ──► ResultConsumer
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::protocol::ServerResponse;

// ============================================================================
// ResultConsumer
// ============================================================================

/// Receiver of server results, implemented by the UI layer.
///
/// Methods are only ever called by [`Dispatcher`].
pub trait ResultConsumer: Send + Sync {
    /// Authentication finished, or the session was lost for good.
    fn on_connected(&self, success: bool);

    /// A recognition result arrived.
    fn display_response(&self, result: &str, is_gloss: bool);

    /// A transcript arrived.
    fn add_new_transcript(&self, transcript: &str);
}

// ============================================================================
// Delivery
// ============================================================================

/// A result on its way to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Outcome of authentication.
    Connected(bool),
    /// Recognition result.
    Response(ServerResponse),
    /// Transcript text.
    Transcript(String),
}

impl Delivery {
    /// Short name for logs.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Response(_) => "response",
            Self::Transcript(_) => "transcript",
        }
    }

    /// Invokes the matching consumer method.
    pub fn deliver_to(&self, consumer: &dyn ResultConsumer) {
        match self {
            Self::Connected(success) => consumer.on_connected(*success),
            Self::Response(response) => {
                consumer.display_response(&response.result, response.is_gloss);
            }
            Self::Transcript(text) => consumer.add_new_transcript(text),
        }
    }
}

/// Sending half of the delivery channel.
pub(crate) type DeliverySender = mpsc::UnboundedSender<Delivery>;

// ============================================================================
// ConsumerSlot
// ============================================================================

/// The single, optional consumer reference.
///
/// Registering replaces; it never stacks.
#[derive(Clone, Default)]
pub(crate) struct ConsumerSlot {
    inner: Arc<RwLock<Option<Arc<dyn ResultConsumer>>>>,
}

impl fmt::Debug for ConsumerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSlot")
            .field("registered", &self.is_set())
            .finish()
    }
}

impl ConsumerSlot {
    /// Stores `consumer`. Returns `true` if one was replaced.
    pub(crate) fn set(&self, consumer: Arc<dyn ResultConsumer>) -> bool {
        self.inner.write().replace(consumer).is_some()
    }

    /// Clears the slot. Returns `true` if a consumer was registered.
    pub(crate) fn clear(&self) -> bool {
        self.inner.write().take().is_some()
    }

    /// Returns the current consumer.
    pub(crate) fn get(&self) -> Option<Arc<dyn ResultConsumer>> {
        self.inner.read().clone()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Drains deliveries into the registered consumer.
///
/// Run it on the context the consumer expects to be called from. The
/// consumer is looked up per delivery; with none registered the delivery
/// is dropped.
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Delivery>,
    slot: ConsumerSlot,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Delivery>, slot: ConsumerSlot) -> Self {
        Self { rx, slot }
    }

    /// Dispatches everything already queued without waiting.
    ///
    /// Returns how many deliveries reached a consumer.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            if self.dispatch(&delivery) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Waits for the next delivery and dispatches it.
    ///
    /// Returns `None` once the manager and its connection are gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        let delivery = self.rx.recv().await?;
        self.dispatch(&delivery);
        Some(delivery)
    }

    /// Dispatches until the manager and its connection are gone.
    pub async fn run(mut self) {
        while self.next().await.is_some() {}
        debug!("Delivery channel closed, dispatcher stopping");
    }

    fn dispatch(&self, delivery: &Delivery) -> bool {
        // Cloned out so the lock is not held while the consumer runs
        let Some(consumer) = self.slot.get() else {
            debug!(kind = delivery.kind(), "No consumer at dispatch, dropping delivery");
            return false;
        };

        trace!(kind = delivery.kind(), "Dispatching delivery");
        delivery.deliver_to(consumer.as_ref());
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
