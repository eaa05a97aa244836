use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::event::{
    EventBus, ListenerId, PendingGather, PendingReply, Reply, ResponseCoordinator,
};
use crate::ids::{IdSource, UuidIdSource};
use crate::protocol::events::{FromHost, ToHost, ToHostEvent};
use crate::protocol::{
    AvailableGames, ErrorReport, ManagePlayers, NewGame, Packet, Player, PlayerStates,
    ResponsePacket, Room,
};

/// Host-side facade binding domain operations to their fixed protocol
/// events.
///
/// Every request/response pairing is pre-agreed: `list_games` always answers
/// on `AvailableGames`, `send_packet` always gathers on `PlayerReturned`,
/// and so on. Nothing here infers event names dynamically. Each
/// request-style operation subscribes for its answer *before* publishing the
/// request, so a synchronous in-process transport cannot race the
/// subscription.
pub struct Host {
    outbound: EventBus<FromHost>,
    inbound: EventBus<ToHost>,
    coordinator: ResponseCoordinator<ToHost>,
    ids: Arc<dyn IdSource>,
}

impl Host {
    pub fn new(outbound: EventBus<FromHost>, inbound: EventBus<ToHost>) -> Self {
        Self::with_id_source(outbound, inbound, Arc::new(UuidIdSource))
    }

    pub fn with_id_source(
        outbound: EventBus<FromHost>,
        inbound: EventBus<ToHost>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let coordinator = ResponseCoordinator::new(inbound.clone());
        Self {
            outbound,
            inbound,
            coordinator,
            ids,
        }
    }

    /// The server-to-host bus, for callers that need raw subscriptions.
    pub fn inbound(&self) -> &EventBus<ToHost> {
        &self.inbound
    }

    /// Asks the server for its game catalog.
    #[instrument(skip(self))]
    pub fn list_games(&self) -> PendingReply<AvailableGames, ToHost> {
        let pending = self
            .coordinator
            .await_reply(ToHostEvent::AvailableGames, |message| match message {
                ToHost::AvailableGames(games) => Some(games.clone()),
                _ => None,
            });
        self.outbound.publish(FromHost::ListGames);
        pending
    }

    /// Opens a room and awaits its lobby code.
    #[instrument(skip(self))]
    pub fn start_room(&self) -> PendingReply<Room, ToHost> {
        let pending = self
            .coordinator
            .await_reply(ToHostEvent::OnRoom, |message| match message {
                ToHost::OnRoom(room) => Some(room.clone()),
                _ => None,
            });
        self.outbound.publish(FromHost::StartRoom);
        pending
    }

    pub fn end_room(&self) {
        self.outbound.publish(FromHost::EndRoom);
    }

    pub fn manage_players(&self, players: ManagePlayers) {
        self.outbound.publish(FromHost::ManagePlayers(players));
    }

    pub fn update_state(&self, states: PlayerStates) {
        self.outbound.publish(FromHost::UpdateState(states));
    }

    /// Starts the named game and awaits a ready signal from every player in
    /// it. Readiness carries no correlation id; players are counted by
    /// identity.
    #[instrument(skip(self), fields(gametype = %game.gametype))]
    pub fn start_game(&self, game: NewGame) -> PendingGather<Player, ToHost> {
        let pending = self.coordinator.await_all(
            ToHostEvent::PlayerReady,
            game.player_ids.iter().cloned(),
            |message| match message {
                ToHost::PlayerReady(player) => Some(Reply {
                    correlation: None,
                    responder: player.player_id.clone(),
                    body: player.clone(),
                }),
                _ => None,
            },
        );
        self.outbound.publish(FromHost::StartGame(game));
        pending
    }

    pub fn end_game(&self) {
        self.outbound.publish(FromHost::EndGame);
    }

    /// Broadcasts a packet and gathers one response per recipient, keyed by
    /// the packet's `msg_id`. Duplicate responses from a recipient keep the
    /// latest payload without being re-counted. Expiry never discards a
    /// late response; it only earns a warning.
    #[instrument(skip(self), fields(msg_id = %packet.msg_id, recipients = packet.recipient_ids.len()))]
    pub fn send_packet(&self, packet: Packet) -> PendingGather<ResponsePacket, ToHost> {
        let sent = packet.clone();
        let pending = self.coordinator.gather(
            ToHostEvent::PlayerReturned,
            &packet.msg_id,
            packet.recipient_ids.iter().cloned(),
            move |message| match message {
                ToHost::PlayerReturned(response) => {
                    if response.msg_id == sent.msg_id && sent.is_expired(Utc::now()) {
                        warn!(
                            msg_id = %response.msg_id,
                            responder = %response.responder_id,
                            "response arrived after packet expiry; still counted"
                        );
                    }
                    Some(Reply {
                        correlation: Some(response.msg_id.clone()),
                        responder: response.responder_id.clone(),
                        body: response.clone(),
                    })
                }
                _ => None,
            },
        );
        self.outbound.publish(FromHost::SendPacket(packet));
        pending
    }

    /// Convenience wrapper that mints the correlation id and stamps the
    /// packet before sending.
    pub fn broadcast(
        &self,
        recipient_ids: HashSet<String>,
        payload: Value,
        expires_after: Duration,
        notify: bool,
    ) -> PendingGather<ResponsePacket, ToHost> {
        let packet = Packet::new(
            self.ids.next_id(),
            recipient_ids,
            payload,
            expires_after,
            notify,
        );
        self.send_packet(packet)
    }

    pub fn force_clear(&self) {
        self.outbound.publish(FromHost::ForceClear);
    }

    pub fn on_player_joined<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Player) + Send + Sync + 'static,
    {
        self.inbound
            .subscribe(ToHostEvent::PlayerJoinedLobby, move |message| {
                if let ToHost::PlayerJoinedLobby(player) = message {
                    callback(player);
                }
            })
    }

    pub fn on_error<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ErrorReport) + Send + Sync + 'static,
    {
        self.inbound.subscribe(ToHostEvent::OnError, move |message| {
            if let ToHost::OnError(report) = message {
                callback(report);
            }
        })
    }
}
