use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, trace};

use crate::ids::{IdSource, UuidIdSource};

use super::message::{BusMessage, ListenerId};
use super::registry::{ListenerRegistry, Registration};

/// Typed publish/subscribe bus for one logical channel.
///
/// Each room or client connection owns its own bus; there is no process-wide
/// instance. The registry lock is held only while mutating registrations,
/// never across a callback, so a listener may subscribe, unsubscribe, and
/// publish re-entrantly on the bus that invoked it. Dispatch runs on the
/// publishing task, which makes processing order deterministic in publish
/// order for a given bus.
pub struct EventBus<M: BusMessage> {
    registry: Arc<Mutex<ListenerRegistry<M>>>,
    ids: Arc<dyn IdSource>,
}

impl<M: BusMessage> Clone for EventBus<M> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            ids: Arc::clone(&self.ids),
        }
    }
}

impl<M: BusMessage> EventBus<M> {
    pub fn new() -> Self {
        Self::with_id_source(Arc::new(UuidIdSource))
    }

    /// Bus whose listener ids come from the given source. Tests use this
    /// with a deterministic source.
    pub fn with_id_source(ids: Arc<dyn IdSource>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(ListenerRegistry::new())),
            ids,
        }
    }

    fn registry(&self) -> MutexGuard<'_, ListenerRegistry<M>> {
        // Callbacks run outside the lock, so a poisoned guard can only mean
        // a panic inside a registry operation; the map is still coherent.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a persistent listener for `kind` and returns its id.
    pub fn subscribe<F>(&self, kind: M::Kind, callback: F) -> ListenerId
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(callback))
    }

    /// Registers a listener that is removed immediately before its first
    /// invocation, so even a re-entrant publish of the same event cannot
    /// fire it twice.
    pub fn subscribe_once<F>(&self, kind: M::Kind, callback: F) -> ListenerId
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(callback))
    }

    fn register(
        &self,
        kind: M::Kind,
        once: bool,
        callback: Arc<dyn Fn(&M) + Send + Sync>,
    ) -> ListenerId {
        let id = ListenerId::new(self.ids.next_id());
        trace!(event = %kind, listener_id = %id, once, "registering listener");
        self.registry().insert(
            kind,
            Registration {
                id: id.clone(),
                once,
                callback,
            },
        );
        id
    }

    /// Removes one registration. Unknown or already-removed ids are a no-op,
    /// never an error.
    pub fn unsubscribe(&self, kind: M::Kind, id: &ListenerId) {
        if self.registry().remove(kind, id) {
            trace!(event = %kind, listener_id = %id, "listener removed");
        }
    }

    /// Removes every listener for `kind`.
    pub fn unsubscribe_all(&self, kind: M::Kind) {
        let removed = self.registry().clear(kind);
        debug!(event = %kind, removed, "cleared listeners");
    }

    pub fn listener_count(&self, kind: M::Kind) -> usize {
        self.registry().count(kind)
    }

    /// Invokes every listener registered for the message's event at the
    /// moment this call began.
    ///
    /// Listeners removed by an earlier callback in the same dispatch are not
    /// invoked; listeners added mid-dispatch wait for the next publish. A
    /// panicking callback is caught and logged without disturbing the
    /// registry or the remaining listeners.
    pub fn publish(&self, message: M) {
        let kind = message.kind();
        let snapshot = self.registry().snapshot(kind);
        if snapshot.is_empty() {
            trace!(event = %kind, "published with no listeners");
            return;
        }
        debug!(event = %kind, listeners = snapshot.len(), "dispatching event");
        for registration in snapshot {
            if !self
                .registry()
                .claim(kind, &registration.id, registration.once)
            {
                continue;
            }
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| (registration.callback)(&message)));
            if let Err(payload) = outcome {
                error!(
                    event = %kind,
                    listener_id = %registration.id,
                    reason = panic_reason(payload.as_ref()),
                    "listener panicked; remaining listeners unaffected"
                );
            }
        }
    }
}

impl<M: BusMessage> Default for EventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
