//! In-memory transport for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{OutboundEvent, Payload};

use super::{
    Connector, EVENT_CONNECT, EVENT_DISCONNECT, Emitter, SocketOptions, Transport,
};

// ============================================================================
// MockTransport
// ============================================================================

/// Records emissions and lets tests fire events by hand.
#[derive(Debug)]
pub(crate) struct MockTransport {
    id: ConnectionId,
    pub(crate) endpoint: Url,
    emitter: Emitter,
    connected: AtomicBool,
    pub(crate) opens: AtomicUsize,
    pub(crate) closes: AtomicUsize,
    pub(crate) checks: AtomicUsize,
    pub(crate) emitted: Mutex<Vec<OutboundEvent>>,
    /// Emissions fail with this many more `QueueFull` errors.
    pub(crate) fail_emits: AtomicUsize,
}

impl MockTransport {
    fn new(endpoint: Url) -> Self {
        Self {
            id: ConnectionId::next(),
            endpoint,
            emitter: Emitter::new(),
            connected: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
            emitted: Mutex::new(Vec::new()),
            fail_emits: AtomicUsize::new(0),
        }
    }

    /// Fires `event` on the listener table.
    pub(crate) fn fire(&self, event: &str, payload: Payload) -> usize {
        self.emitter.emit(event, &payload)
    }

    /// Marks the link up and fires `connect`.
    pub(crate) fn simulate_connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.fire(EVENT_CONNECT, Payload::empty());
    }

    /// Marks the link down and fires `disconnect`.
    pub(crate) fn simulate_disconnect(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.fire(EVENT_DISCONNECT, Payload::text(reason));
    }

    /// Returns a copy of everything emitted so far.
    pub(crate) fn emitted(&self) -> Vec<OutboundEvent> {
        self.emitted.lock().clone()
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Returns how many times connectivity was checked.
    pub(crate) fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.connected.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn emit(&self, event: OutboundEvent) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::not_connected(event.name()));
        }
        let failing = self
            .fail_emits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::queue_full(1, 1));
        }
        self.emitted.lock().push(event);
        Ok(())
    }

    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

// ============================================================================
// MockConnector
// ============================================================================

/// Hands out [`MockTransport`]s and keeps them for inspection.
#[derive(Debug, Default, Clone)]
pub(crate) struct MockConnector {
    created: Arc<Mutex<Vec<Arc<MockTransport>>>>,
    fail: Arc<AtomicBool>,
}

impl MockConnector {
    /// Makes subsequent `create` calls fail.
    pub(crate) fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the most recently created transport.
    pub(crate) fn last(&self) -> Option<Arc<MockTransport>> {
        self.created.lock().last().cloned()
    }

    /// Returns how many transports were created.
    pub(crate) fn created(&self) -> usize {
        self.created.lock().len()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn create(&self, endpoint: &Url, _options: &SocketOptions) -> Result<Arc<MockTransport>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::config("mock connector refused"));
        }
        let transport = Arc::new(MockTransport::new(endpoint.clone()));
        self.created.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}
