use strum_macros::EnumDiscriminants;

use crate::event::BusMessage;

use super::{
    AvailableGames, ErrorReport, GameContent, JoinLobby, LoadGame, ManagePlayers, NewGame, Packet,
    Player, PlayerStates, PlayerUpdate, ResponsePacket, Room,
};

// Each direction of the session protocol is one payload enum; its strum
// discriminant enum is the event-name type, so the mapping from event name
// to payload shape is checked at compile time instead of at registration.

/// Commands issued by the host application toward the server.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(
    name(FromHostEvent),
    derive(Hash, strum_macros::Display, strum_macros::EnumIter)
)]
pub enum FromHost {
    ListGames,
    StartRoom,
    EndRoom,
    ManagePlayers(ManagePlayers),
    StartGame(NewGame),
    EndGame,
    UpdateState(PlayerStates),
    SendPacket(Packet),
    ForceClear,
}

impl BusMessage for FromHost {
    type Kind = FromHostEvent;

    fn kind(&self) -> FromHostEvent {
        self.into()
    }
}

/// Signals delivered by the server to the host application.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(ToHostEvent), derive(Hash, strum_macros::Display))]
pub enum ToHost {
    AvailableGames(AvailableGames),
    OnRoom(Room),
    GameContent(GameContent),
    PlayerJoinedLobby(Player),
    PlayerUpdated(Player),
    PlayerReady(Player),
    PlayerReturned(ResponsePacket),
    OnError(ErrorReport),
}

impl BusMessage for ToHost {
    type Kind = ToHostEvent;

    fn kind(&self) -> ToHostEvent {
        self.into()
    }
}

/// Signals delivered by the server to a client application.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(ToClientEvent), derive(Hash, strum_macros::Display))]
pub enum ToClient {
    PlayerInfo(Player),
    JoinedRoom(Room),
    RoomClosed,
    LoadGame(LoadGame),
    UnloadGame,
    StateChanged(Option<serde_json::Value>),
    OnPacket(Packet),
    OnClear,
    OnError(ErrorReport),
}

impl BusMessage for ToClient {
    type Kind = ToClientEvent;

    fn kind(&self) -> ToClientEvent {
        self.into()
    }
}

/// Requests issued by a client application toward the server.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(
    name(FromClientEvent),
    derive(Hash, strum_macros::Display, strum_macros::EnumIter)
)]
pub enum FromClient {
    GetPlayerInfo,
    UpdatePlayerInfo(PlayerUpdate),
    JoinLobby(JoinLobby),
    GameReady,
    ReturnResponse(ResponsePacket),
}

impl BusMessage for FromClient {
    type Kind = FromClientEvent;

    fn kind(&self) -> FromClientEvent {
        self.into()
    }
}
