//! Wire protocol between a client and its room.
//!
//! Messages are JSON objects tagged by `type`. Replica updates travel as
//! base64 encoded loro bytes.

use crate::presence::PresenceRecord;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Identifies one connection within a room.
pub type ConnectionId = u64;

/// Messages sent to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// One committed transaction (base64 encoded loro update)
    Sync { data: String },
    /// Undo the newest entry of the room's history
    Undo,
    /// Reapply the newest undone entry
    Redo,
    /// Replace this connection's presence record
    Presence { presence: PresenceRecord },
    /// Fire-and-forget event for every other connection
    Broadcast { payload: serde_json::Value },
}

/// Presence of a connection already in the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    pub connection_id: ConnectionId,
    pub presence: PresenceRecord,
}

/// Messages received from the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with current state
    Joined {
        room: String,
        connection_id: ConnectionId,
        /// Full replica snapshot, if the room has any history
        #[serde(skip_serializing_if = "Option::is_none", default)]
        initial_sync: Option<String>,
        #[serde(default)]
        peers: Vec<PeerState>,
        #[serde(default)]
        undo_depth: usize,
        #[serde(default)]
        redo_depth: usize,
    },
    /// Peer joined the room
    PeerJoined { connection_id: ConnectionId },
    /// Peer left the room
    PeerLeft { connection_id: ConnectionId },
    /// Replica update from another connection, or from an undo/redo
    Sync { data: String },
    /// The shared history changed size
    History { undo_depth: usize, redo_depth: usize },
    /// Presence update from another connection
    Presence {
        connection_id: ConnectionId,
        presence: PresenceRecord,
    },
    /// Event broadcast by another connection
    Broadcast {
        from: ConnectionId,
        payload: serde_json::Value,
    },
    /// Error message
    Error { message: String },
}

/// Encode replica bytes for the wire.
pub fn encode_update(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode replica bytes from the wire.
pub fn decode_update(data: &str) -> Option<Vec<u8>> {
    STANDARD.decode(data).ok()
}
