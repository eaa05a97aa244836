use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, instrument};

use crate::event::{EventBus, ListenerId, PendingReply, ResponseCoordinator};
use crate::protocol::events::{FromClient, ToClient, ToClientEvent};
use crate::protocol::{JoinLobby, Packet, Player, PlayerUpdate, ResponsePacket};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no handler for payload type: {0}")]
    UnsupportedPayload(String),

    #[error("handler failed: {0}")]
    HandlerFailed(String),
}

/// Produces the response payload for a packet delivered to this client.
///
/// Implementations run on the tokio runtime. A slow handler simply leaves
/// the host's gather pending until it answers; a failing handler stays
/// silent, which leaves the gather waiting for this responder.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, responder: &Player, packet: &Packet) -> Result<Value, ClientError>;
}

/// Client-side facade binding participant operations to their fixed
/// protocol events.
pub struct Client {
    outbound: EventBus<FromClient>,
    inbound: EventBus<ToClient>,
    coordinator: ResponseCoordinator<ToClient>,
}

impl Client {
    pub fn new(outbound: EventBus<FromClient>, inbound: EventBus<ToClient>) -> Self {
        let coordinator = ResponseCoordinator::new(inbound.clone());
        Self {
            outbound,
            inbound,
            coordinator,
        }
    }

    /// The server-to-client bus, for callers that need raw subscriptions.
    pub fn inbound(&self) -> &EventBus<ToClient> {
        &self.inbound
    }

    pub fn join_lobby(&self, request: JoinLobby) {
        self.outbound.publish(FromClient::JoinLobby(request));
    }

    pub fn game_ready(&self) {
        self.outbound.publish(FromClient::GameReady);
    }

    pub fn update_player_info(&self, update: PlayerUpdate) {
        self.outbound.publish(FromClient::UpdatePlayerInfo(update));
    }

    /// Asks the server for this participant's identity.
    #[instrument(skip(self))]
    pub fn get_player_info(&self) -> PendingReply<Player, ToClient> {
        let pending = self
            .coordinator
            .await_reply(ToClientEvent::PlayerInfo, |message| match message {
                ToClient::PlayerInfo(player) => Some(player.clone()),
                _ => None,
            });
        self.outbound.publish(FromClient::GetPlayerInfo);
        pending
    }

    pub fn return_response(&self, response: ResponsePacket) {
        self.outbound.publish(FromClient::ReturnResponse(response));
    }

    /// Answers every incoming packet with the handler's payload.
    ///
    /// The handler runs in its own task so that dispatch on the inbound bus
    /// never blocks on a responder.
    #[instrument(skip(self, handler), fields(player_id = %responder.player_id))]
    pub fn attach_handler(&self, responder: Player, handler: Arc<dyn PacketHandler>) -> ListenerId {
        let outbound = self.outbound.clone();
        self.inbound.subscribe(ToClientEvent::OnPacket, move |message| {
            let ToClient::OnPacket(packet) = message else {
                return;
            };
            let packet = packet.clone();
            let handler = Arc::clone(&handler);
            let responder = responder.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                match handler.handle(&responder, &packet).await {
                    Ok(response) => {
                        outbound.publish(FromClient::ReturnResponse(ResponsePacket {
                            msg_id: packet.msg_id.clone(),
                            responder_id: responder.player_id.clone(),
                            response,
                        }));
                    }
                    Err(e) => {
                        error!(
                            msg_id = %packet.msg_id,
                            player_id = %responder.player_id,
                            error = %e,
                            "packet handler failed; no response returned"
                        );
                    }
                }
            });
        })
    }
}
