// Event-correlation infrastructure
//
// This module provides the typed publish/subscribe core used by every
// logical channel (one bus per room or client connection) and the
// broadcast-then-gather coordinator layered on top of it.

// Public API - what other modules can use
pub use bus::EventBus;
pub use coordinator::{GatherError, PendingGather, PendingReply, Reply, ResponseCoordinator};
pub use message::{BusMessage, ListenerId};

// Internal modules
mod bus;
mod coordinator;
mod message;
mod registry;
