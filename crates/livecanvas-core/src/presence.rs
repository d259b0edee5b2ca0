//! Presence: per-connection cursor and chat message, streamed to the room
//! at a bounded rate.

use crate::shapes::SerializableColor;
use crate::subscription::Subscription;
use crate::transport::{ConnectionId, PresenceEvent, Transport, TransportError};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Palette for remote cursors, picked by connection id.
pub const CURSOR_COLORS: [&str; 8] = [
    "#DC2626", "#D97706", "#059669", "#7C3AED", "#DB2777", "#2563EB", "#0891B2", "#65A30D",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl From<Point> for CursorPosition {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<CursorPosition> for Point {
    fn from(c: CursorPosition) -> Self {
        Point::new(c.x, c.y)
    }
}

/// What peers see of a connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Cursor in virtual coordinates; None while off the surface.
    pub cursor: Option<CursorPosition>,
    /// Live chat message; empty when not chatting.
    #[serde(default)]
    pub message: String,
}

/// Partial presence update. Unset fields are left alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresencePatch {
    pub cursor: Option<Option<CursorPosition>>,
    pub message: Option<String>,
}

impl PresencePatch {
    pub fn cursor(cursor: Option<Point>) -> Self {
        Self {
            cursor: Some(cursor.map(CursorPosition::from)),
            ..Self::default()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl PresenceRecord {
    /// Merge a patch. Returns true if anything changed.
    pub fn apply(&mut self, patch: PresencePatch) -> bool {
        let mut changed = false;
        if let Some(cursor) = patch.cursor {
            changed |= self.cursor != cursor;
            self.cursor = cursor;
        }
        if let Some(message) = patch.message {
            changed |= self.message != message;
            self.message = message;
        }
        changed
    }
}

/// A peer cursor ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub connection_id: ConnectionId,
    pub position: Point,
    pub message: String,
    pub color: SerializableColor,
}

/// Color assigned to a connection's cursor.
pub fn cursor_color(connection_id: ConnectionId) -> SerializableColor {
    let hex = CURSOR_COLORS[(connection_id % CURSOR_COLORS.len() as u64) as usize];
    SerializableColor::from_hex(hex).unwrap_or_else(SerializableColor::black)
}

/// Local presence plus the latest known presence of every peer.
pub struct PresenceChannel {
    local: PresenceRecord,
    dirty: bool,
    last_sent: Option<Instant>,
    throttle: Duration,
    others: BTreeMap<ConnectionId, PresenceRecord>,
    events: Option<Subscription<PresenceEvent>>,
}

impl PresenceChannel {
    pub fn new(throttle: Duration) -> Self {
        Self {
            local: PresenceRecord::default(),
            dirty: false,
            last_sent: None,
            throttle,
            others: BTreeMap::new(),
            events: None,
        }
    }

    /// Start listening to peers' presence on `transport`.
    pub fn attach<T: Transport + ?Sized>(&mut self, transport: &T) {
        self.events = Some(transport.subscribe_to_presence());
    }

    pub fn local(&self) -> &PresenceRecord {
        &self.local
    }

    pub fn has_pending(&self) -> bool {
        self.dirty
    }

    /// Merge into the local record. The change goes out on a later `flush`.
    pub fn update(&mut self, patch: PresencePatch) {
        if self.local.apply(patch) {
            self.dirty = true;
        }
    }

    /// Send the local record if it changed and the throttle interval has
    /// passed since the last send. Returns true if something was sent.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.throttle {
                return false;
            }
        }
        match transport.update_presence(&self.local) {
            Ok(()) => {
                self.dirty = false;
                self.last_sent = Some(now);
                true
            }
            Err(TransportError::Disconnected(_)) => false,
            Err(e) => {
                log::warn!("Presence update failed: {e}");
                false
            }
        }
    }

    /// Fold queued peer events into the peer table. Returns how many were handled.
    pub fn sync_remote(&mut self) -> usize {
        let Some(events) = &self.events else {
            return 0;
        };
        let drained = events.drain();
        let count = drained.len();
        for event in drained {
            match event {
                PresenceEvent::Joined {
                    connection_id,
                    presence,
                }
                | PresenceEvent::Updated {
                    connection_id,
                    presence,
                } => {
                    self.others.insert(connection_id, presence);
                }
                PresenceEvent::Left { connection_id } => {
                    self.others.remove(&connection_id);
                }
            }
        }
        count
    }

    pub fn others(&self) -> impl Iterator<Item = (ConnectionId, &PresenceRecord)> {
        self.others.iter().map(|(id, p)| (*id, p))
    }

    pub fn peer_count(&self) -> usize {
        self.others.len()
    }

    /// Peers whose cursor is on the surface.
    pub fn cursors(&self) -> Vec<RemoteCursor> {
        self.others
            .iter()
            .filter_map(|(id, presence)| {
                let cursor = presence.cursor?;
                Some(RemoteCursor {
                    connection_id: *id,
                    position: cursor.into(),
                    message: presence.message.clone(),
                    color: cursor_color(*id),
                })
            })
            .collect()
    }

    /// Forget local and remote state and stop listening.
    pub fn teardown(&mut self) {
        self.local = PresenceRecord::default();
        self.dirty = false;
        self.last_sent = None;
        self.others.clear();
        self.events = None;
    }
}
