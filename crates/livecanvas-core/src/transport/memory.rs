//! In-process room and transport.
//!
//! [`MemoryRoom`] plays the relay: it keeps the authoritative replica, the
//! presence table and the room-wide history, and fans JSON wire messages out
//! to per-connection inboxes. [`MemoryTransport`] is one client connection;
//! it keeps its own replica and only sees peers' work when it polls.

use super::{
    BroadcastEvent, ChangeEvent, ChangeOrigin, ConnectionId, ConnectionState, HistoryEntry,
    KeyChange, MapOp, PresenceEvent, Transport, TransportError, TransportResult,
};
use crate::config::OfflinePolicy;
use crate::presence::PresenceRecord;
use crate::replica::Replica;
use crate::shapes::{Shape, ShapeId};
use crate::subscription::{EventHub, Subscription};
use crate::sync::{ClientMessage, PeerState, ServerMessage, decode_update, encode_update};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

struct Peer {
    presence: PresenceRecord,
    inbox: VecDeque<String>,
}

struct RoomState {
    id: String,
    authority: Replica,
    next_connection: ConnectionId,
    peers: BTreeMap<ConnectionId, Peer>,
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
}

impl RoomState {
    fn push(&mut self, to: ConnectionId, msg: &ServerMessage) {
        let Some(peer) = self.peers.get_mut(&to) else {
            return;
        };
        match serde_json::to_string(msg) {
            Ok(json) => peer.inbox.push_back(json),
            Err(e) => log::error!("Failed to encode server message: {e}"),
        }
    }

    fn fan_out(&mut self, except: Option<ConnectionId>, msg: &ServerMessage) {
        let targets: Vec<ConnectionId> = self
            .peers
            .keys()
            .copied()
            .filter(|id| Some(*id) != except)
            .collect();
        for id in targets {
            self.push(id, msg);
        }
    }

    fn history_message(&self) -> ServerMessage {
        ServerMessage::History {
            undo_depth: self.undo_stack.len(),
            redo_depth: self.redo_stack.len(),
        }
    }

    fn handle(&mut self, from: ConnectionId, msg: ClientMessage) -> TransportResult<()> {
        if !matches!(msg, ClientMessage::Join { .. }) && !self.peers.contains_key(&from) {
            return Err(TransportError::Disconnected(self.id.clone()));
        }

        match msg {
            ClientMessage::Join { room } => {
                if room != self.id {
                    return Err(TransportError::Protocol(format!(
                        "connection {from} asked for room {room} on {}",
                        self.id
                    )));
                }
                let snapshot = self.authority.export_snapshot()?;
                let peers = self
                    .peers
                    .iter()
                    .filter(|(id, _)| **id != from)
                    .map(|(id, peer)| PeerState {
                        connection_id: *id,
                        presence: peer.presence.clone(),
                    })
                    .collect();
                self.peers.entry(from).or_insert_with(|| Peer {
                    presence: PresenceRecord::default(),
                    inbox: VecDeque::new(),
                });
                let joined = ServerMessage::Joined {
                    room: self.id.clone(),
                    connection_id: from,
                    initial_sync: Some(encode_update(&snapshot)),
                    peers,
                    undo_depth: self.undo_stack.len(),
                    redo_depth: self.redo_stack.len(),
                };
                self.push(from, &joined);
                self.fan_out(Some(from), &ServerMessage::PeerJoined { connection_id: from });
                log::debug!("Connection {from} joined room {}", self.id);
            }
            ClientMessage::Leave => {
                self.peers.remove(&from);
                self.fan_out(None, &ServerMessage::PeerLeft { connection_id: from });
                log::debug!("Connection {from} left room {}", self.id);
            }
            ClientMessage::Sync { data } => {
                let Some(bytes) = decode_update(&data) else {
                    self.push(from, &ServerMessage::Error {
                        message: "sync payload is not base64".to_string(),
                    });
                    return Ok(());
                };
                let changes = match self.authority.import(&bytes) {
                    Ok(changes) => changes,
                    Err(e) => {
                        self.push(from, &ServerMessage::Error { message: e.to_string() });
                        return Ok(());
                    }
                };
                self.fan_out(Some(from), &ServerMessage::Sync { data });
                if !changes.is_empty() {
                    self.undo_stack.push(HistoryEntry { origin: from, changes });
                    self.redo_stack.clear();
                }
                let history = self.history_message();
                self.fan_out(None, &history);
            }
            ClientMessage::Undo => {
                if let Some(entry) = self.undo_stack.pop() {
                    self.replay(&entry.inverse())?;
                    self.redo_stack.push(entry);
                }
                let history = self.history_message();
                self.fan_out(None, &history);
            }
            ClientMessage::Redo => {
                if let Some(entry) = self.redo_stack.pop() {
                    self.replay(&entry.redo())?;
                    self.undo_stack.push(entry);
                }
                let history = self.history_message();
                self.fan_out(None, &history);
            }
            ClientMessage::Presence { presence } => {
                if let Some(peer) = self.peers.get_mut(&from) {
                    peer.presence = presence.clone();
                }
                self.fan_out(Some(from), &ServerMessage::Presence {
                    connection_id: from,
                    presence,
                });
            }
            ClientMessage::Broadcast { payload } => {
                self.fan_out(Some(from), &ServerMessage::Broadcast { from, payload });
            }
        }
        Ok(())
    }

    /// Commit history ops on the authority and send the result to everyone,
    /// including the connection that asked.
    fn replay(&mut self, ops: &[MapOp]) -> TransportResult<()> {
        self.authority.apply(ops)?;
        let update = self.authority.export_pending()?;
        self.fan_out(None, &ServerMessage::Sync {
            data: encode_update(&update),
        });
        Ok(())
    }
}

/// A room shared by every connection created from it.
#[derive(Clone)]
pub struct MemoryRoom {
    inner: Arc<Mutex<RoomState>>,
}

impl MemoryRoom {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RoomState {
                id: id.into(),
                authority: Replica::new(),
                next_connection: 1,
                peers: BTreeMap::new(),
                undo_stack: Vec::new(),
                redo_stack: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> TransportResult<MutexGuard<'_, RoomState>> {
        self.inner
            .lock()
            .map_err(|e| TransportError::Room(e.to_string()))
    }

    pub fn id(&self) -> TransportResult<String> {
        Ok(self.lock()?.id.clone())
    }

    /// Open a connection that queues writes while disconnected.
    pub fn connect(&self) -> TransportResult<MemoryTransport> {
        self.connect_with(OfflinePolicy::Queue)
    }

    /// Open a connection. The join reply waits in the inbox until the first
    /// poll, so subscriptions made before that see the initial state.
    pub fn connect_with(&self, offline: OfflinePolicy) -> TransportResult<MemoryTransport> {
        let (connection_id, room_id) = {
            let mut state = self.lock()?;
            let id = state.next_connection;
            state.next_connection += 1;
            (id, state.id.clone())
        };
        let transport = MemoryTransport {
            room: self.clone(),
            room_id: room_id.clone(),
            connection_id,
            replica: Replica::new(),
            state: ConnectionState::Connected,
            offline,
            outbox: Vec::new(),
            undo_depth: 0,
            redo_depth: 0,
            changes: EventHub::new(),
            presence: EventHub::new(),
            broadcasts: EventHub::new(),
        };
        self.deliver(connection_id, &ClientMessage::Join { room: room_id })?;
        log::info!("Connection {connection_id} opened");
        Ok(transport)
    }

    fn deliver(&self, from: ConnectionId, msg: &ClientMessage) -> TransportResult<()> {
        let json = serde_json::to_string(msg).map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.deliver_json(from, &json)
    }

    /// Hand a raw JSON client message to the room.
    pub fn deliver_json(&self, from: ConnectionId, json: &str) -> TransportResult<()> {
        let msg: ClientMessage =
            serde_json::from_str(json).map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.lock()?.handle(from, msg)
    }

    fn take_inbox(&self, id: ConnectionId) -> TransportResult<Vec<String>> {
        let mut state = self.lock()?;
        Ok(state
            .peers
            .get_mut(&id)
            .map(|peer| peer.inbox.drain(..).collect())
            .unwrap_or_default())
    }

    pub fn peer_count(&self) -> usize {
        self.lock().map(|s| s.peers.len()).unwrap_or(0)
    }

    /// Number of shapes in the authoritative replica.
    pub fn shape_count(&self) -> usize {
        self.lock().map(|s| s.authority.len()).unwrap_or(0)
    }

    /// (undo, redo) depth of the shared history.
    pub fn history_depth(&self) -> (usize, usize) {
        self.lock()
            .map(|s| (s.undo_stack.len(), s.redo_stack.len()))
            .unwrap_or((0, 0))
    }
}

/// One client's connection to a [`MemoryRoom`].
pub struct MemoryTransport {
    room: MemoryRoom,
    room_id: String,
    connection_id: ConnectionId,
    replica: Replica,
    state: ConnectionState,
    offline: OfflinePolicy,
    /// Messages written while disconnected, replayed on reconnect.
    outbox: Vec<ClientMessage>,
    undo_depth: usize,
    redo_depth: usize,
    changes: EventHub<ChangeEvent>,
    presence: EventHub<PresenceEvent>,
    broadcasts: EventHub<BroadcastEvent>,
}

impl MemoryTransport {
    /// Deliver to the room and pick up whatever it sent back.
    fn send(&mut self, msg: ClientMessage) -> TransportResult<()> {
        if self.state == ConnectionState::Disconnected {
            return Err(TransportError::Disconnected(self.room_id.clone()));
        }
        self.room.deliver(self.connection_id, &msg)?;
        self.poll()?;
        Ok(())
    }

    fn require_connected(&self) -> TransportResult<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(TransportError::Disconnected(self.room_id.clone())),
        }
    }

    /// Writes queued while offline.
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    fn import_remote(&mut self, data: &str) {
        let Some(bytes) = decode_update(data) else {
            log::warn!("Dropping sync payload that is not base64");
            return;
        };
        match self.replica.import(&bytes) {
            Ok(changes) if !changes.is_empty() => self.changes.emit(ChangeEvent {
                origin: ChangeOrigin::Remote,
                changes,
            }),
            Ok(_) => {}
            Err(e) => log::warn!("Failed to import room update: {e}"),
        }
    }

    fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Joined {
                initial_sync,
                peers,
                undo_depth,
                redo_depth,
                ..
            } => {
                if let Some(data) = initial_sync {
                    self.import_remote(&data);
                }
                for peer in peers {
                    self.presence.emit(PresenceEvent::Joined {
                        connection_id: peer.connection_id,
                        presence: peer.presence,
                    });
                }
                self.undo_depth = undo_depth;
                self.redo_depth = redo_depth;
            }
            ServerMessage::PeerJoined { connection_id } => {
                self.presence.emit(PresenceEvent::Joined {
                    connection_id,
                    presence: PresenceRecord::default(),
                });
            }
            ServerMessage::PeerLeft { connection_id } => {
                if connection_id != self.connection_id {
                    self.presence.emit(PresenceEvent::Left { connection_id });
                }
            }
            ServerMessage::Sync { data } => self.import_remote(&data),
            ServerMessage::History {
                undo_depth,
                redo_depth,
            } => {
                self.undo_depth = undo_depth;
                self.redo_depth = redo_depth;
            }
            ServerMessage::Presence {
                connection_id,
                presence,
            } => {
                self.presence.emit(PresenceEvent::Updated {
                    connection_id,
                    presence,
                });
            }
            ServerMessage::Broadcast { from, payload } => {
                self.broadcasts.emit(BroadcastEvent { from, payload });
            }
            ServerMessage::Error { message } => {
                log::warn!("Room {} reported: {message}", self.room_id);
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    fn room_id(&self) -> &str {
        &self.room_id
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn get(&self, id: &ShapeId) -> Option<Shape> {
        self.replica.get(id)
    }

    fn entries(&self) -> Vec<Shape> {
        self.replica.entries()
    }

    fn transact(&mut self, ops: Vec<MapOp>) -> TransportResult<Vec<KeyChange>> {
        if self.state == ConnectionState::Disconnected && self.offline == OfflinePolicy::Drop {
            log::warn!("Dropping {} write(s) while disconnected from {}", ops.len(), self.room_id);
            return Err(TransportError::Disconnected(self.room_id.clone()));
        }

        let changes = self.replica.apply(&ops)?;
        if changes.is_empty() {
            return Ok(changes);
        }
        let update = self.replica.export_pending()?;
        self.changes.emit(ChangeEvent {
            origin: ChangeOrigin::Local,
            changes: changes.clone(),
        });

        let msg = ClientMessage::Sync {
            data: encode_update(&update),
        };
        if self.state == ConnectionState::Disconnected {
            self.outbox.push(msg);
            return Ok(changes);
        }
        if let Err(e) = self.send(msg.clone()) {
            // Keep the commit so it reaches the room once reconnected.
            log::warn!("Sync to {} failed, queueing: {e}", self.room_id);
            self.outbox.push(msg);
            self.state = ConnectionState::Disconnected;
        }
        Ok(changes)
    }

    fn undo(&mut self) -> TransportResult<bool> {
        self.require_connected()?;
        self.poll()?;
        let had_entry = self.undo_depth > 0;
        self.send(ClientMessage::Undo)?;
        Ok(had_entry)
    }

    fn redo(&mut self) -> TransportResult<bool> {
        self.require_connected()?;
        self.poll()?;
        let had_entry = self.redo_depth > 0;
        self.send(ClientMessage::Redo)?;
        Ok(had_entry)
    }

    fn can_undo(&self) -> bool {
        self.undo_depth > 0
    }

    fn can_redo(&self) -> bool {
        self.redo_depth > 0
    }

    fn update_presence(&mut self, presence: &PresenceRecord) -> TransportResult<()> {
        self.send(ClientMessage::Presence {
            presence: presence.clone(),
        })
    }

    fn broadcast(&mut self, payload: serde_json::Value) -> TransportResult<()> {
        self.send(ClientMessage::Broadcast { payload })
    }

    fn subscribe_to_changes(&self) -> Subscription<ChangeEvent> {
        self.changes.subscribe()
    }

    fn subscribe_to_presence(&self) -> Subscription<PresenceEvent> {
        self.presence.subscribe()
    }

    fn subscribe_to_broadcast(&self) -> Subscription<BroadcastEvent> {
        self.broadcasts.subscribe()
    }

    fn poll(&mut self) -> TransportResult<usize> {
        if self.state == ConnectionState::Disconnected {
            return Ok(0);
        }
        let inbox = self.room.take_inbox(self.connection_id)?;
        let count = inbox.len();
        for json in inbox {
            match serde_json::from_str::<ServerMessage>(&json) {
                Ok(msg) => self.handle_server_message(msg),
                Err(e) => log::warn!("Ignoring malformed server message: {e}"),
            }
        }
        Ok(count)
    }

    fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        if let Err(e) = self.room.deliver(self.connection_id, &ClientMessage::Leave) {
            log::warn!("Leave for connection {} failed: {e}", self.connection_id);
        }
        self.state = ConnectionState::Disconnected;
        log::info!("Connection {} closed", self.connection_id);
    }

    fn reconnect(&mut self) -> TransportResult<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.room.deliver(self.connection_id, &ClientMessage::Join {
            room: self.room_id.clone(),
        })?;
        self.state = ConnectionState::Connected;

        let queued = std::mem::take(&mut self.outbox);
        if !queued.is_empty() {
            log::info!("Replaying {} queued write(s) to {}", queued.len(), self.room_id);
        }
        for msg in queued {
            self.room.deliver(self.connection_id, &msg)?;
        }
        self.poll()?;
        Ok(())
    }
}
