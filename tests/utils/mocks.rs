use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use gameshow::protocol::events::{
    FromClient, FromClientEvent, FromHost, FromHostEvent, ToClient, ToClientEvent, ToHost,
};
use gameshow::protocol::{
    AvailableGames, ContentPack, ErrorReport, GameContent, GameLoader, GameMetadata, LoadGame,
    Packet, Player, PlayerAction, Room,
};
use gameshow::{Client, ClientError, EventBus, LobbyCodeSource, PacketHandler};

// ============================================================================
// In-process server standing in for the real transport
// ============================================================================

struct ServerState {
    room: Option<Room>,
    players: HashMap<String, Player>,
    endpoints: HashMap<String, EventBus<ToClient>>,
}

/// Wires a host channel to N client channels entirely in process, so the
/// protocol exchanges run over real buses without any network.
///
/// Domain failures (unknown recipient, unknown lobby) come back on the
/// dedicated error events. `force_clear` is intentionally unimplemented and
/// panics inside its listener; the bus isolates that from other listeners.
pub struct LoopbackServer {
    host_tx: EventBus<ToHost>,
    state: Arc<Mutex<ServerState>>,
}

impl LoopbackServer {
    pub fn new(host_rx: EventBus<FromHost>, host_tx: EventBus<ToHost>) -> Self {
        let state = Arc::new(Mutex::new(ServerState {
            room: None,
            players: HashMap::new(),
            endpoints: HashMap::new(),
        }));

        {
            let host_tx = host_tx.clone();
            host_rx.subscribe(FromHostEvent::ListGames, move |_| {
                host_tx.publish(ToHost::AvailableGames(canned_catalog()));
            });
        }
        {
            let host_tx = host_tx.clone();
            let state = Arc::clone(&state);
            host_rx.subscribe(FromHostEvent::StartRoom, move |_| {
                let room = Room {
                    room_id: Uuid::new_v4().to_string(),
                    lobby_code: LobbyCodeSource::new().generate(),
                };
                state.lock().unwrap().room = Some(room.clone());
                host_tx.publish(ToHost::OnRoom(room));
            });
        }
        {
            let state = Arc::clone(&state);
            host_rx.subscribe(FromHostEvent::EndRoom, move |_| {
                let endpoints: Vec<_> = {
                    let mut state = state.lock().unwrap();
                    state.room = None;
                    state.endpoints.values().cloned().collect()
                };
                for endpoint in endpoints {
                    endpoint.publish(ToClient::RoomClosed);
                }
            });
        }
        {
            let host_tx = host_tx.clone();
            let state = Arc::clone(&state);
            host_rx.subscribe(FromHostEvent::ManagePlayers, move |message| {
                let FromHost::ManagePlayers(players) = message else {
                    return;
                };
                for (player_id, action) in players {
                    let (room, endpoint) = {
                        let mut state = state.lock().unwrap();
                        if matches!(action, PlayerAction::Kick | PlayerAction::Ban) {
                            state.players.remove(player_id);
                            let removed = state.endpoints.remove(player_id);
                            if let Some(removed) = removed {
                                removed.publish(ToClient::RoomClosed);
                            }
                            continue;
                        }
                        (state.room.clone(), state.endpoints.get(player_id).cloned())
                    };
                    match (room, endpoint) {
                        (Some(room), Some(endpoint)) => {
                            endpoint.publish(ToClient::JoinedRoom(room));
                        }
                        _ => host_tx.publish(ToHost::OnError(ErrorReport::new(
                            "unknown_player",
                            format!("cannot manage unknown player {player_id}"),
                        ))),
                    }
                }
            });
        }
        {
            let host_tx = host_tx.clone();
            let state = Arc::clone(&state);
            host_rx.subscribe(FromHostEvent::StartGame, move |message| {
                let FromHost::StartGame(game) = message else {
                    return;
                };
                for player_id in &game.player_ids {
                    let endpoint = state.lock().unwrap().endpoints.get(player_id).cloned();
                    match endpoint {
                        Some(endpoint) => endpoint.publish(ToClient::LoadGame(LoadGame {
                            gametype: game.gametype.clone(),
                            player_ids: game.player_ids.clone(),
                            reload: false,
                        })),
                        None => host_tx.publish(ToHost::OnError(ErrorReport::new(
                            "unknown_player",
                            format!("cannot start game for unknown player {player_id}"),
                        ))),
                    }
                }
                host_tx.publish(ToHost::GameContent(canned_content(&game.gametype)));
            });
        }
        {
            let state = Arc::clone(&state);
            host_rx.subscribe(FromHostEvent::EndGame, move |_| {
                let endpoints: Vec<_> =
                    state.lock().unwrap().endpoints.values().cloned().collect();
                for endpoint in endpoints {
                    endpoint.publish(ToClient::UnloadGame);
                }
            });
        }
        {
            let state = Arc::clone(&state);
            host_rx.subscribe(FromHostEvent::UpdateState, move |message| {
                let FromHost::UpdateState(states) = message else {
                    return;
                };
                for (player_id, player_state) in states {
                    let endpoint = state.lock().unwrap().endpoints.get(player_id).cloned();
                    if let Some(endpoint) = endpoint {
                        endpoint.publish(ToClient::StateChanged(player_state.clone()));
                    }
                }
            });
        }
        {
            let host_tx = host_tx.clone();
            let state = Arc::clone(&state);
            host_rx.subscribe(FromHostEvent::SendPacket, move |message| {
                let FromHost::SendPacket(packet) = message else {
                    return;
                };
                for recipient_id in &packet.recipient_ids {
                    let endpoint = state.lock().unwrap().endpoints.get(recipient_id).cloned();
                    match endpoint {
                        Some(endpoint) => endpoint.publish(ToClient::OnPacket(packet.clone())),
                        None => host_tx.publish(ToHost::OnError(ErrorReport::new(
                            "unknown_recipient",
                            format!(
                                "packet {} addressed to unknown recipient {recipient_id}",
                                packet.msg_id
                            ),
                        ))),
                    }
                }
            });
        }
        host_rx.subscribe(FromHostEvent::ForceClear, |_| {
            panic!("force_clear is not implemented in the loopback server");
        });

        Self { host_tx, state }
    }

    /// Connects a new client endpoint and wires its request events.
    pub fn connect(&self, player_id: &str) -> ClientHandle {
        let from_client: EventBus<FromClient> = EventBus::new();
        let to_client: EventBus<ToClient> = EventBus::new();

        {
            let host_tx = self.host_tx.clone();
            let state = Arc::clone(&self.state);
            let to_client = to_client.clone();
            from_client.subscribe(FromClientEvent::JoinLobby, move |message| {
                let FromClient::JoinLobby(request) = message else {
                    return;
                };
                let joined = {
                    let mut state = state.lock().unwrap();
                    match &state.room {
                        Some(room) if room.lobby_code == request.lobby_code => {
                            let player = Player {
                                player_id: request.player_id.clone(),
                                display_name: request.player_id.clone(),
                                color: "#000000".to_string(),
                            };
                            state
                                .players
                                .insert(request.player_id.clone(), player.clone());
                            state
                                .endpoints
                                .insert(request.player_id.clone(), to_client.clone());
                            Some(player)
                        }
                        _ => None,
                    }
                };
                match joined {
                    Some(player) => {
                        to_client.publish(ToClient::PlayerInfo(player.clone()));
                        host_tx.publish(ToHost::PlayerJoinedLobby(player));
                    }
                    None => to_client.publish(ToClient::OnError(ErrorReport::new(
                        "unknown_lobby",
                        format!("no open room with lobby code {}", request.lobby_code),
                    ))),
                }
            });
        }
        {
            let host_tx = self.host_tx.clone();
            let state = Arc::clone(&self.state);
            let player_id = player_id.to_string();
            from_client.subscribe(FromClientEvent::GameReady, move |_| {
                let player = state.lock().unwrap().players.get(&player_id).cloned();
                if let Some(player) = player {
                    host_tx.publish(ToHost::PlayerReady(player));
                }
            });
        }
        {
            let host_tx = self.host_tx.clone();
            from_client.subscribe(FromClientEvent::ReturnResponse, move |message| {
                if let FromClient::ReturnResponse(response) = message {
                    host_tx.publish(ToHost::PlayerReturned(response.clone()));
                }
            });
        }
        {
            let host_tx = self.host_tx.clone();
            let state = Arc::clone(&self.state);
            from_client.subscribe(FromClientEvent::UpdatePlayerInfo, move |message| {
                let FromClient::UpdatePlayerInfo(update) = message else {
                    return;
                };
                let updated = {
                    let mut state = state.lock().unwrap();
                    state.players.get_mut(&update.player_id).map(|player| {
                        if let Some(display_name) = &update.display_name {
                            player.display_name = display_name.clone();
                        }
                        if let Some(color) = &update.color {
                            player.color = color.clone();
                        }
                        player.clone()
                    })
                };
                if let Some(player) = updated {
                    host_tx.publish(ToHost::PlayerUpdated(player));
                }
            });
        }
        {
            let state = Arc::clone(&self.state);
            let to_client = to_client.clone();
            let player_id = player_id.to_string();
            from_client.subscribe(FromClientEvent::GetPlayerInfo, move |_| {
                let player = state.lock().unwrap().players.get(&player_id).cloned();
                if let Some(player) = player {
                    to_client.publish(ToClient::PlayerInfo(player));
                }
            });
        }

        ClientHandle {
            player_id: player_id.to_string(),
            client: Client::new(from_client.clone(), to_client.clone()),
            from_client,
            to_client,
        }
    }
}

/// One connected client: its facade plus the raw buses for test wiring.
pub struct ClientHandle {
    pub player_id: String,
    pub client: Client,
    pub from_client: EventBus<FromClient>,
    pub to_client: EventBus<ToClient>,
}

impl ClientHandle {
    /// Signal readiness as soon as the game loads, the way a well-behaved
    /// client application does.
    pub fn auto_ready(&self) {
        let from_client = self.from_client.clone();
        self.to_client.subscribe(ToClientEvent::LoadGame, move |_| {
            from_client.publish(FromClient::GameReady);
        });
    }
}

// ============================================================================
// Scripted packet handler
// ============================================================================

/// Answers packets from a fixed msg_id -> payload table; unknown msg_ids
/// are refused, which leaves the host's gather waiting on this responder.
pub struct CannedResponder {
    responses: HashMap<String, Value>,
}

impl CannedResponder {
    pub fn new(responses: HashMap<String, Value>) -> Self {
        Self { responses }
    }

    pub fn single(msg_id: &str, response: Value) -> Self {
        Self::new(HashMap::from([(msg_id.to_string(), response)]))
    }
}

#[async_trait]
impl PacketHandler for CannedResponder {
    async fn handle(&self, _responder: &Player, packet: &Packet) -> Result<Value, ClientError> {
        self.responses
            .get(&packet.msg_id)
            .cloned()
            .ok_or_else(|| ClientError::UnsupportedPayload(packet.msg_id.clone()))
    }
}

// ============================================================================
// Canned server data
// ============================================================================

pub fn canned_catalog() -> AvailableGames {
    AvailableGames {
        games: vec![GameLoader {
            gametype: "sketchy".to_string(),
            metadata: GameMetadata {
                active: true,
                title: "#sketchy".to_string(),
                subtitle: "sketchy subtitle".to_string(),
                version: "1.0.0".to_string(),
                min_players: 3,
                max_players: None,
            },
        }],
    }
}

pub fn canned_content(gametype: &str) -> GameContent {
    GameContent {
        base: ContentPack {
            pack_id: format!("{gametype}-base"),
            data: json!({"content": "BASE"}),
        },
        extra: vec![
            ContentPack {
                pack_id: format!("{gametype}-extra:0"),
                data: json!({"content": "EXTRA-0"}),
            },
            ContentPack {
                pack_id: format!("{gametype}-extra:1"),
                data: json!({"content": "EXTRA-1"}),
            },
        ],
    }
}
