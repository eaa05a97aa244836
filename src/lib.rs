// Library crate for the party game session protocol core
// This file exposes the public API for integration tests

pub mod client;
pub mod event;
pub mod host;
pub mod ids;
pub mod protocol;

// Re-export commonly used types for easier access in tests
pub use client::{Client, ClientError, PacketHandler};
pub use event::{
    BusMessage, EventBus, GatherError, ListenerId, PendingGather, PendingReply, Reply,
    ResponseCoordinator,
};
pub use host::Host;
pub use ids::{IdSource, LobbyCodeSource, SequentialIdSource, UuidIdSource};
pub use protocol::events::{
    FromClient, FromClientEvent, FromHost, FromHostEvent, ToClient, ToClientEvent, ToHost,
    ToHostEvent,
};
