//! Ephemeral reactions: emitted while held, broadcast once, shown for a
//! fixed time, never stored.

use crate::config::SessionConfig;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Wire payload of a reaction broadcast. The receiver stamps its own time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionBroadcast {
    pub x: f64,
    pub y: f64,
    pub value: String,
}

/// A reaction on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub position: Point,
    pub value: String,
    pub timestamp: Instant,
}

/// Display list of live reactions plus the timers that drive it.
pub struct ReactionFeed {
    reactions: Vec<ReactionEvent>,
    ttl: Duration,
    sweep_interval: Duration,
    emit_interval: Duration,
    last_sweep: Option<Instant>,
    last_emit: Option<Instant>,
}

impl ReactionFeed {
    pub fn new(ttl: Duration, sweep_interval: Duration, emit_interval: Duration) -> Self {
        Self {
            reactions: Vec::new(),
            ttl,
            sweep_interval,
            emit_interval,
            last_sweep: None,
            last_emit: None,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.reaction_ttl(),
            config.reaction_sweep(),
            config.reaction_interval(),
        )
    }

    pub fn push(&mut self, position: Point, value: impl Into<String>, now: Instant) {
        self.reactions.push(ReactionEvent {
            position,
            value: value.into(),
            timestamp: now,
        });
    }

    /// Add a reaction received from a peer. Malformed payloads are ignored.
    pub fn receive(&mut self, payload: &serde_json::Value, now: Instant) -> bool {
        match ReactionBroadcast::deserialize(payload) {
            Ok(reaction) if reaction.x.is_finite() && reaction.y.is_finite() => {
                self.push(Point::new(reaction.x, reaction.y), reaction.value, now);
                true
            }
            Ok(_) => {
                log::debug!("Ignoring reaction with non-finite position");
                false
            }
            Err(e) => {
                log::debug!("Ignoring broadcast that is not a reaction: {e}");
                false
            }
        }
    }

    /// Drop reactions older than the TTL. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.reactions.len();
        let ttl = self.ttl;
        self.reactions
            .retain(|r| now.saturating_duration_since(r.timestamp) < ttl);
        self.last_sweep = Some(now);
        before - self.reactions.len()
    }

    /// Run the periodic sweep if its interval has passed.
    pub fn tick(&mut self, now: Instant) -> usize {
        let due = match self.last_sweep {
            Some(last) => now.saturating_duration_since(last) >= self.sweep_interval,
            None => true,
        };
        if due { self.sweep(now) } else { 0 }
    }

    /// True when a held reaction should fire again; marks the emission.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        let due = match self.last_emit {
            Some(last) => now.saturating_duration_since(last) >= self.emit_interval,
            None => true,
        };
        if due {
            self.last_emit = Some(now);
        }
        due
    }

    /// Forget the emission timer, so the next press fires immediately.
    pub fn release(&mut self) {
        self.last_emit = None;
    }

    pub fn visible(&self) -> &[ReactionEvent] {
        &self.reactions
    }

    pub fn clear(&mut self) {
        self.reactions.clear();
        self.last_emit = None;
    }
}
