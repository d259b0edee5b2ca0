//! Replication transport abstraction.
//!
//! A transport owns one connection to a room: the shared shape map, the
//! room-wide undo/redo history, presence and broadcast channels. The core
//! only ever talks to it through [`Transport`].

mod memory;

pub use memory::{MemoryRoom, MemoryTransport};

use crate::error::CoreError;
use crate::presence::PresenceRecord;
use crate::shapes::{Shape, ShapeId};
use crate::subscription::Subscription;
pub use crate::sync::ConnectionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected to room {0}")]
    Disconnected(String),
    #[error("Replica error: {0}")]
    Replica(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Room state unavailable: {0}")]
    Room(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

impl From<TransportError> for CoreError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Disconnected(room) => CoreError::NetworkUnavailable(room),
            TransportError::Replica(msg) => CoreError::Replica(msg),
            other => CoreError::NetworkUnavailable(other.to_string()),
        }
    }
}

impl From<crate::replica::ReplicaError> for TransportError {
    fn from(e: crate::replica::ReplicaError) -> Self {
        TransportError::Replica(e.to_string())
    }
}

/// A single write inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MapOp {
    /// Whole-record upsert.
    Set(Shape),
    Delete(ShapeId),
}

impl MapOp {
    pub fn id(&self) -> ShapeId {
        match self {
            MapOp::Set(shape) => shape.id(),
            MapOp::Delete(id) => *id,
        }
    }
}

/// Effective change to one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyChange {
    pub id: ShapeId,
    pub before: Option<Shape>,
    pub after: Option<Shape>,
}

impl KeyChange {
    /// The change that undoes this one.
    pub fn inverse(&self) -> KeyChange {
        KeyChange {
            id: self.id,
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }

    /// The write that produces `after`.
    pub fn to_op(&self) -> MapOp {
        match &self.after {
            Some(shape) => MapOp::Set(shape.clone()),
            None => MapOp::Delete(self.id),
        }
    }
}

/// One grouped transaction in the room's shared timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub origin: ConnectionId,
    pub changes: Vec<KeyChange>,
}

impl HistoryEntry {
    pub fn inverse(&self) -> Vec<MapOp> {
        self.changes.iter().map(|c| c.inverse().to_op()).collect()
    }

    pub fn redo(&self) -> Vec<MapOp> {
        self.changes.iter().map(KeyChange::to_op).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Committed through this connection.
    Local,
    /// Arrived from the room.
    Remote,
}

/// Notification that the shared map changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub origin: ChangeOrigin,
    pub changes: Vec<KeyChange>,
}

/// Notification about other connections' presence.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Joined {
        connection_id: ConnectionId,
        presence: PresenceRecord,
    },
    Updated {
        connection_id: ConnectionId,
        presence: PresenceRecord,
    },
    Left {
        connection_id: ConnectionId,
    },
}

/// An ephemeral event broadcast by another connection.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEvent {
    pub from: ConnectionId,
    pub payload: serde_json::Value,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Shared map with multi-client sync, change notifications and a shared
/// undo/redo history.
pub trait Transport {
    fn connection_id(&self) -> ConnectionId;

    fn room_id(&self) -> &str;

    fn state(&self) -> ConnectionState;

    fn get(&self, id: &ShapeId) -> Option<Shape>;

    /// Every record in this connection's replica.
    fn entries(&self) -> Vec<Shape>;

    /// Commit a batch of writes as one unit and one history entry. Returns
    /// the effective changes; an empty batch records nothing.
    fn transact(&mut self, ops: Vec<MapOp>) -> TransportResult<Vec<KeyChange>>;

    fn set(&mut self, shape: Shape) -> TransportResult<Vec<KeyChange>> {
        self.transact(vec![MapOp::Set(shape)])
    }

    fn delete(&mut self, id: ShapeId) -> TransportResult<Vec<KeyChange>> {
        self.transact(vec![MapOp::Delete(id)])
    }

    /// Undo the newest entry of the room's history. Returns false when there
    /// was nothing to undo.
    fn undo(&mut self) -> TransportResult<bool>;

    fn redo(&mut self) -> TransportResult<bool>;

    fn can_undo(&self) -> bool;

    fn can_redo(&self) -> bool;

    fn update_presence(&mut self, presence: &PresenceRecord) -> TransportResult<()>;

    fn broadcast(&mut self, payload: serde_json::Value) -> TransportResult<()>;

    fn subscribe_to_changes(&self) -> Subscription<ChangeEvent>;

    fn subscribe_to_presence(&self) -> Subscription<PresenceEvent>;

    fn subscribe_to_broadcast(&self) -> Subscription<BroadcastEvent>;

    /// Process inbound traffic, firing subscriptions. Returns the number of
    /// messages handled.
    fn poll(&mut self) -> TransportResult<usize>;

    /// Leave the room. The shared map is left untouched.
    fn disconnect(&mut self);

    fn reconnect(&mut self) -> TransportResult<()>;
}
