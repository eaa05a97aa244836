use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

use super::bus::EventBus;
use super::message::{BusMessage, ListenerId};

/// Errors surfaced while awaiting a pending reply or gather.
///
/// Everything else in the coordinator degrades gracefully: stale or
/// unexpected responses are ignored, and a gather with a missing responder
/// simply stays pending until the caller times out or cancels.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("operation was cancelled before completing")]
    Cancelled,
}

/// A bus message projected into response form: who answered, under which
/// correlation key, and with what body. Readiness signals carry no key.
pub struct Reply<R> {
    pub correlation: Option<String>,
    pub responder: String,
    pub body: R,
}

struct GatherState<R> {
    seen: HashSet<String>,
    collected: HashMap<String, R>,
    remaining: usize,
    sender: Option<oneshot::Sender<HashMap<String, R>>>,
}

/// Unsubscribes the operation's listener when the pending handle is dropped
/// or cancelled. The completion path empties the slot first, so this is a
/// no-op for operations that resolved normally.
struct ListenerGuard<M: BusMessage> {
    bus: EventBus<M>,
    kind: M::Kind,
    slot: Arc<Mutex<Option<ListenerId>>>,
}

impl<M: BusMessage> Drop for ListenerGuard<M> {
    fn drop(&mut self) {
        let id = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            self.bus.unsubscribe(self.kind, &id);
        }
    }
}

/// An in-flight broadcast-and-gather operation.
///
/// Resolves once all expected responders have answered. The coordinator
/// itself never times out; callers layer one with [`wait_timeout`] or abandon
/// the operation with [`cancel`] (or by dropping the handle), either of which
/// removes the listener.
///
/// [`wait_timeout`]: PendingGather::wait_timeout
/// [`cancel`]: PendingGather::cancel
pub struct PendingGather<R, M: BusMessage> {
    rx: oneshot::Receiver<HashMap<String, R>>,
    guard: ListenerGuard<M>,
}

impl<R, M: BusMessage> PendingGather<R, M> {
    /// Waits indefinitely for the gather to complete.
    pub async fn wait(self) -> Result<HashMap<String, R>, GatherError> {
        let PendingGather { rx, guard } = self;
        let collected = rx.await.map_err(|_| GatherError::Cancelled)?;
        drop(guard);
        Ok(collected)
    }

    /// Waits up to `limit`; on expiry the listener is removed and any
    /// partially collected responses are discarded.
    pub async fn wait_timeout(self, limit: Duration) -> Result<HashMap<String, R>, GatherError> {
        let PendingGather { rx, guard } = self;
        let outcome = timeout(limit, rx).await;
        drop(guard);
        match outcome {
            Ok(Ok(collected)) => Ok(collected),
            Ok(Err(_)) => Err(GatherError::Cancelled),
            Err(_) => Err(GatherError::Timeout(limit)),
        }
    }

    /// Abandons the operation and removes its listener.
    pub fn cancel(self) {}
}

/// A pending one-shot reply to a single command.
pub struct PendingReply<R, M: BusMessage> {
    rx: oneshot::Receiver<R>,
    guard: ListenerGuard<M>,
}

impl<R, M: BusMessage> PendingReply<R, M> {
    pub async fn wait(self) -> Result<R, GatherError> {
        let PendingReply { rx, guard } = self;
        let body = rx.await.map_err(|_| GatherError::Cancelled)?;
        drop(guard);
        Ok(body)
    }

    pub async fn wait_timeout(self, limit: Duration) -> Result<R, GatherError> {
        let PendingReply { rx, guard } = self;
        let outcome = timeout(limit, rx).await;
        drop(guard);
        match outcome {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(GatherError::Cancelled),
            Err(_) => Err(GatherError::Timeout(limit)),
        }
    }

    pub fn cancel(self) {}
}

/// Implements "broadcast to an expected set, await all matching responses,
/// resolve exactly once" on top of an [`EventBus`].
///
/// One pattern backs all three protocol exchanges: a one-shot reply to a
/// command ([`await_reply`]), a correlated gather over a recipient set
/// ([`gather`]), and a readiness acknowledgment from every expected
/// participant ([`await_all`]).
///
/// [`await_reply`]: ResponseCoordinator::await_reply
/// [`gather`]: ResponseCoordinator::gather
/// [`await_all`]: ResponseCoordinator::await_all
pub struct ResponseCoordinator<M: BusMessage> {
    bus: EventBus<M>,
}

impl<M: BusMessage> Clone for ResponseCoordinator<M> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
        }
    }
}

impl<M: BusMessage> ResponseCoordinator<M> {
    pub fn new(bus: EventBus<M>) -> Self {
        Self { bus }
    }

    /// Awaits the first message on `kind`, projected through `extract`.
    ///
    /// Uses a once-listener, so the registration is gone after the first
    /// matching publish regardless of how the caller awaits.
    #[instrument(skip(self, extract), fields(event = %kind))]
    pub fn await_reply<R, F>(&self, kind: M::Kind, extract: F) -> PendingReply<R, M>
    where
        R: Send + 'static,
        F: Fn(&M) -> Option<R> + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let sender = Mutex::new(Some(tx));
        let slot = Arc::new(Mutex::new(None));
        let guard = ListenerGuard {
            bus: self.bus.clone(),
            kind,
            slot: Arc::clone(&slot),
        };

        let id = self.bus.subscribe_once(kind, move |message| {
            match extract(message) {
                Some(body) => {
                    let taken = sender.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(tx) = taken {
                        let _ = tx.send(body);
                    }
                }
                // Cannot happen while event kinds map one-to-one onto
                // payload variants; kept as a guard against drift.
                None => warn!(event = %kind, "reply did not project to the expected payload"),
            }
        });
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);

        PendingReply { rx, guard }
    }

    /// Broadcast-and-gather keyed by `msg_id`: resolves after every id in
    /// `expected` has produced at least one response correlated to `msg_id`.
    ///
    /// A responder's first matching response is counted exactly once; later
    /// duplicates overwrite its collected entry without re-counting.
    /// Responses correlated to other operations and responses from ids
    /// outside `expected` are ignored.
    #[instrument(skip(self, expected, extract), fields(event = %kind, msg_id))]
    pub fn gather<R, F>(
        &self,
        kind: M::Kind,
        msg_id: &str,
        expected: impl IntoIterator<Item = String>,
        extract: F,
    ) -> PendingGather<R, M>
    where
        R: Send + 'static,
        F: Fn(&M) -> Option<Reply<R>> + Send + Sync + 'static,
    {
        self.gather_inner(
            kind,
            Some(msg_id.to_string()),
            expected.into_iter().collect(),
            extract,
        )
    }

    /// Uncorrelated gather: resolves after every expected id has signalled
    /// once on `kind`. Used for readiness acknowledgments, which carry no
    /// message id.
    #[instrument(skip(self, expected, extract), fields(event = %kind))]
    pub fn await_all<R, F>(
        &self,
        kind: M::Kind,
        expected: impl IntoIterator<Item = String>,
        extract: F,
    ) -> PendingGather<R, M>
    where
        R: Send + 'static,
        F: Fn(&M) -> Option<Reply<R>> + Send + Sync + 'static,
    {
        self.gather_inner(kind, None, expected.into_iter().collect(), extract)
    }

    fn gather_inner<R, F>(
        &self,
        kind: M::Kind,
        correlation: Option<String>,
        expected: HashSet<String>,
        extract: F,
    ) -> PendingGather<R, M>
    where
        R: Send + 'static,
        F: Fn(&M) -> Option<Reply<R>> + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(None));
        let guard = ListenerGuard {
            bus: self.bus.clone(),
            kind,
            slot: Arc::clone(&slot),
        };

        if expected.is_empty() {
            debug!(event = %kind, "gather over empty responder set resolves immediately");
            let _ = tx.send(HashMap::new());
            return PendingGather { rx, guard };
        }

        let state = Mutex::new(GatherState {
            seen: HashSet::new(),
            collected: HashMap::new(),
            remaining: expected.len(),
            sender: Some(tx),
        });
        let bus = self.bus.clone();
        let listener_slot = Arc::clone(&slot);

        let id = self.bus.subscribe(kind, move |message| {
            let Some(reply) = extract(message) else {
                return;
            };
            if correlation.is_some() && reply.correlation != correlation {
                trace!(
                    event = %kind,
                    responder = %reply.responder,
                    "response correlates to a different operation; ignoring"
                );
                return;
            }
            if !expected.contains(&reply.responder) {
                debug!(
                    event = %kind,
                    responder = %reply.responder,
                    "response from unexpected responder; ignoring"
                );
                return;
            }

            let completion = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.sender.is_none() {
                    // Already resolved; a straggler slipped in before the
                    // unsubscribe took effect.
                    return;
                }
                if state.seen.insert(reply.responder.clone()) {
                    state.remaining -= 1;
                }
                // Last write wins for duplicate responders.
                state.collected.insert(reply.responder, reply.body);
                if state.remaining == 0 {
                    let collected = mem::take(&mut state.collected);
                    state.sender.take().map(|sender| (sender, collected))
                } else {
                    None
                }
            };

            if let Some((sender, collected)) = completion {
                // Unsubscribe before resolving so a publish triggered by the
                // awaiting task cannot re-enter this defunct listener.
                let taken = listener_slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(id) = taken {
                    bus.unsubscribe(kind, &id);
                }
                debug!(event = %kind, responders = collected.len(), "gather complete");
                let _ = sender.send(collected);
            }
        });
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);

        PendingGather { rx, guard }
    }
}
