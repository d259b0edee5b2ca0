//! Explicit subscription handles.
//!
//! An [`EventHub`] fans events out to every live [`Subscription`]. Dropping a
//! subscription (or calling [`Subscription::unsubscribe`]) removes exactly
//! that registration and nothing else.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};

struct HubInner<T> {
    next_id: u64,
    subscribers: Vec<(u64, Sender<T>)>,
}

/// Broadcast point for one kind of event.
pub struct EventHub<T> {
    inner: Arc<Mutex<HubInner<T>>>,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }
}

impl<T: Clone> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel();
        let id = match self.inner.lock() {
            Ok(mut inner) => {
                let id = inner.next_id;
                inner.next_id += 1;
                inner.subscribers.push((id, tx));
                id
            }
            Err(_) => {
                log::warn!("Event hub lock poisoned, subscription will never fire");
                u64::MAX
            }
        };
        Subscription {
            id,
            receiver: rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every live subscription.
    pub fn emit(&self, event: T) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.subscribers.len()).unwrap_or(0)
    }

    /// Drop every registration. Existing handles simply stop receiving.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.clear();
        }
    }
}

/// A registration on an [`EventHub`]. Events queue up until drained.
pub struct Subscription<T> {
    id: u64,
    receiver: Receiver<T>,
    hub: Weak<Mutex<HubInner<T>>>,
}

impl<T> Subscription<T> {
    /// Take the next queued event, if any.
    pub fn try_next(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Take every queued event.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    /// Release this registration now.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if let Ok(mut inner) = hub.lock() {
                inner.subscribers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
