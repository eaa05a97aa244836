// Session protocol data model
//
// Plain serializable types exchanged between the host, the server, and the
// clients. Payload bodies are opaque `serde_json::Value`s; this layer never
// inspects their shape.

pub mod events;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A participant's public identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub display_name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub lobby_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLobby {
    pub player_id: String,
    pub lobby_code: String,
}

/// Partial update to a player's public profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub player_id: String,
    pub display_name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerAction {
    Add,
    Kick,
    Ban,
}

pub type ManagePlayers = HashMap<String, PlayerAction>;

/// Per-player shared state pushed by the host; `None` clears the entry.
pub type PlayerStates = HashMap<String, Option<Value>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub active: bool,
    pub title: String,
    pub subtitle: String,
    pub version: String,
    pub min_players: u32,
    pub max_players: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLoader {
    pub gametype: String,
    pub metadata: GameMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableGames {
    pub games: Vec<GameLoader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGame {
    pub gametype: String,
    pub player_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadGame {
    pub gametype: String,
    pub player_ids: Vec<String>,
    pub reload: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPack {
    pub pack_id: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameContent {
    pub base: ContentPack,
    pub extra: Vec<ContentPack>,
}

/// A broadcast from the host to a set of recipients. Immutable once sent;
/// the `msg_id` correlates it to its responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub msg_id: String,
    pub recipient_ids: HashSet<String>,
    pub payload: Value,
    /// Zero means the packet never expires.
    pub expires_after: Duration,
    pub notify: bool,
    pub sent_at: DateTime<Utc>,
}

impl Packet {
    pub fn new(
        msg_id: impl Into<String>,
        recipient_ids: HashSet<String>,
        payload: Value,
        expires_after: Duration,
        notify: bool,
    ) -> Self {
        Self {
            msg_id: msg_id.into(),
            recipient_ids,
            payload,
            expires_after,
            notify,
            sent_at: Utc::now(),
        }
    }

    /// Expiry is advisory: an expired packet's late responses still count
    /// toward aggregation, the host merely logs them.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.expires_after.is_zero() {
            return false;
        }
        match TimeDelta::from_std(self.expires_after) {
            Ok(ttl) => self
                .sent_at
                .checked_add_signed(ttl)
                .map(|deadline| now >= deadline)
                .unwrap_or(false),
            // A TTL too large for chrono arithmetic never expires.
            Err(_) => false,
        }
    }
}

/// A single client's answer to a packet, correlated by `msg_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePacket {
    pub msg_id: String,
    pub responder_id: String,
    pub response: Value,
}

/// Payload of the dedicated error events; domain failures cross the
/// boundary as these rather than as panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
