use std::collections::HashMap;
use std::sync::Arc;

use super::message::{BusMessage, ListenerId};

/// A single listener registration. Owned exclusively by the registry entry
/// for its event; created on subscribe, destroyed on explicit removal or
/// automatically after firing when `once` is set.
pub(crate) struct Registration<M> {
    pub(crate) id: ListenerId,
    pub(crate) once: bool,
    pub(crate) callback: Arc<dyn Fn(&M) + Send + Sync>,
}

impl<M> Clone for Registration<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            once: self.once,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Per-event collection of listener registrations, in subscription order.
pub(crate) struct ListenerRegistry<M: BusMessage> {
    entries: HashMap<M::Kind, Vec<Registration<M>>>,
}

impl<M: BusMessage> ListenerRegistry<M> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Panics on a duplicate id: the id source broke its uniqueness contract,
    /// which is a programming error rather than a runtime condition.
    pub(crate) fn insert(&mut self, kind: M::Kind, registration: Registration<M>) {
        let listeners = self.entries.entry(kind).or_default();
        if listeners.iter().any(|existing| existing.id == registration.id) {
            panic!(
                "duplicate listener id {} for event {:?}",
                registration.id, kind
            );
        }
        listeners.push(registration);
    }

    /// Returns false when the id is absent; callers treat that as a no-op.
    pub(crate) fn remove(&mut self, kind: M::Kind, id: &ListenerId) -> bool {
        let Some(listeners) = self.entries.get_mut(&kind) else {
            return false;
        };
        let Some(index) = listeners.iter().position(|reg| reg.id == *id) else {
            return false;
        };
        listeners.remove(index);
        true
    }

    pub(crate) fn clear(&mut self, kind: M::Kind) -> usize {
        self.entries.remove(&kind).map(|l| l.len()).unwrap_or(0)
    }

    pub(crate) fn snapshot(&self, kind: M::Kind) -> Vec<Registration<M>> {
        self.entries.get(&kind).cloned().unwrap_or_default()
    }

    /// Confirms a snapshotted listener is still registered at the moment of
    /// invocation, removing it now when it is a once-listener. Returns false
    /// when a callback earlier in the same dispatch already unsubscribed it.
    pub(crate) fn claim(&mut self, kind: M::Kind, id: &ListenerId, once: bool) -> bool {
        let Some(listeners) = self.entries.get_mut(&kind) else {
            return false;
        };
        let Some(index) = listeners.iter().position(|reg| reg.id == *id) else {
            return false;
        };
        if once {
            listeners.remove(index);
        }
        true
    }

    pub(crate) fn count(&self, kind: M::Kind) -> usize {
        self.entries.get(&kind).map(Vec::len).unwrap_or(0)
    }
}
