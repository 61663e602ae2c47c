//! Named-event listener table.
//!
//! The transport fires every lifecycle and application event through an
//! [`Emitter`]. Listeners run on the transport's task, in registration
//! order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::ListenerId;
use crate::protocol::Payload;

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
///
/// Called on the transport task for each matching event.
pub type Listener = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Listeners for one event name, in registration order.
type ListenerList = Vec<(ListenerId, Listener)>;

// ============================================================================
// Emitter
// ============================================================================

/// Listener table keyed by event name.
///
/// Several listeners may share one event name; each is removed
/// individually by the [`ListenerId`] returned from [`Emitter::on`].
#[derive(Default)]
pub struct Emitter {
    listeners: RwLock<FxHashMap<String, ListenerList>>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("Emitter")
            .field("events", &listeners.len())
            .field(
                "listeners",
                &listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl Emitter {
    /// Creates an empty emitter.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `event`.
    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.listeners
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        trace!(event, %id, "Listener registered");
        id
    }

    /// Removes one listener. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(listener_id, _)| *listener_id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            listeners.remove(event);
        }

        removed
    }

    /// Removes every listener for every event.
    pub fn off_all(&self) {
        self.listeners.write().clear();
    }

    /// Returns the number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Invokes every listener for `event`. Returns how many ran.
    ///
    /// The listener list is cloned before any listener runs, so listeners
    /// may register or remove listeners without deadlocking.
    pub fn emit(&self, event: &str, payload: &Payload) -> usize {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.read();
            match listeners.get(event) {
                Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => {
                    trace!(event, "No listener for event");
                    return 0;
                }
            }
        };

        for listener in &snapshot {
            listener(payload);
        }

        snapshot.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            count,
            Arc::new(move |_: &Payload| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_emit_reaches_all_listeners_for_event() {
        let emitter = Emitter::new();
        let (a, la) = counter();
        let (b, lb) = counter();
        emitter.on("error", la);
        emitter.on("error", lb);

        assert_eq!(emitter.emit("error", &Payload::text("boom")), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.emit("connect", &Payload::empty()), 0);
    }

    #[test]
    fn test_off_removes_single_listener() {
        let emitter = Emitter::new();
        let (a, la) = counter();
        let (b, lb) = counter();
        let id_a = emitter.on("error", la);
        emitter.on("error", lb);

        assert!(emitter.off("error", id_a));
        assert!(!emitter.off("error", id_a));
        emitter.emit("error", &Payload::empty());

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("error"), 1);
    }

    #[test]
    fn test_off_all_clears_table() {
        let emitter = Emitter::new();
        let (_, l) = counter();
        emitter.on("connect", l);
        emitter.off_all();
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_listener_may_unregister_during_emit() {
        let emitter = Arc::new(Emitter::new());
        let inner = Arc::clone(&emitter);
        emitter.on(
            "disconnect",
            Arc::new(move |_: &Payload| inner.off_all()),
        );

        assert_eq!(emitter.emit("disconnect", &Payload::empty()), 1);
        assert!(emitter.is_empty());
    }
}
