//! Client-side view of the shared shape map.
//!
//! [`ShapeStore`] is the only way the core mutates shapes. Every write goes
//! through a [`Transaction`], which becomes one replicated unit and one
//! entry in the room's undo history. Reads come from a snapshot cached
//! locally and refreshed from the transport's change notifications, so the
//! last synchronized state stays available while the network is down.

use crate::error::{CoreError, CoreResult};
use crate::shapes::{Shape, ShapeId};
use crate::subscription::Subscription;
use crate::transport::{ChangeEvent, MapOp, Transport};
use std::collections::HashMap;

/// Writes collected inside [`ShapeStore::transact`].
pub struct Transaction<'a, T: Transport> {
    transport: &'a T,
    ops: Vec<MapOp>,
}

impl<'a, T: Transport> Transaction<'a, T> {
    /// Whether `id` exists, counting writes made earlier in this transaction.
    pub fn exists(&self, id: &ShapeId) -> bool {
        for op in self.ops.iter().rev() {
            match op {
                MapOp::Set(shape) if shape.id() == *id => return true,
                MapOp::Delete(deleted) if deleted == id => return false,
                _ => {}
            }
        }
        self.transport.get(id).is_some()
    }

    /// Ids present right now, counting writes made earlier in this
    /// transaction.
    pub fn ids(&self) -> Vec<ShapeId> {
        let mut ids: Vec<ShapeId> = self.transport.entries().iter().map(Shape::id).collect();
        for op in &self.ops {
            if let MapOp::Set(shape) = op {
                if !ids.contains(&shape.id()) {
                    ids.push(shape.id());
                }
            }
        }
        ids.retain(|id| self.exists(id));
        ids
    }

    /// Upsert by whole-record replacement. Shapes with non-finite geometry
    /// are dropped, since peers could never read them back.
    pub fn set(&mut self, shape: Shape) -> bool {
        if !shape.is_finite() {
            log::warn!("Refusing to write shape {} with non-finite geometry", shape.id());
            return false;
        }
        self.ops.push(MapOp::Set(shape));
        true
    }

    /// Replace an existing record. Returns false (and writes nothing) when
    /// the id is unknown or the geometry is non-finite.
    pub fn update(&mut self, shape: Shape) -> bool {
        let id = shape.id();
        if !self.exists(&id) {
            log::debug!("{}", CoreError::InvalidShapeId(id));
            return false;
        }
        self.set(shape)
    }

    pub fn delete(&mut self, id: ShapeId) {
        self.ops.push(MapOp::Delete(id));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Shared shape map plus its cached snapshot.
pub struct ShapeStore<T: Transport> {
    transport: T,
    snapshot: HashMap<ShapeId, Shape>,
    changes: Subscription<ChangeEvent>,
}

impl<T: Transport> ShapeStore<T> {
    pub fn new(transport: T) -> Self {
        let changes = transport.subscribe_to_changes();
        let snapshot = transport
            .entries()
            .into_iter()
            .map(|shape| (shape.id(), shape))
            .collect();
        Self {
            transport,
            snapshot,
            changes,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        self.snapshot.get(id)
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        self.snapshot.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.snapshot.values()
    }

    pub fn snapshot(&self) -> &HashMap<ShapeId, Shape> {
        &self.snapshot
    }

    /// Run `f` and commit everything it wrote as one unit.
    ///
    /// Pending room traffic is processed first, so existence checks see the
    /// latest state and an update never resurrects a shape a peer deleted.
    pub fn transact<F, R>(&mut self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Transaction<'_, T>) -> R,
    {
        if let Err(e) = self.transport.poll() {
            log::warn!("Poll before transaction failed: {e}");
        }
        let (result, ops) = {
            let mut tx = Transaction {
                transport: &self.transport,
                ops: Vec::new(),
            };
            let result = f(&mut tx);
            (result, tx.ops)
        };
        if !ops.is_empty() {
            let committed = self.transport.transact(ops);
            self.refresh();
            committed?;
        } else {
            self.refresh();
        }
        Ok(result)
    }

    /// Upsert a shape. Returns `Ok(false)` when the shape was refused for
    /// non-finite geometry.
    pub fn set(&mut self, shape: Shape) -> CoreResult<bool> {
        self.transact(|tx| tx.set(shape))
    }

    /// Replace an existing shape. A missing id is a silent no-op and
    /// returns `Ok(false)`.
    pub fn update(&mut self, shape: Shape) -> CoreResult<bool> {
        self.transact(|tx| tx.update(shape))
    }

    /// Delete a shape. Deleting an absent id changes nothing.
    pub fn delete(&mut self, id: ShapeId) -> CoreResult<()> {
        self.transact(|tx| tx.delete(id))
    }

    /// Clear the whole map in one transaction. Returns true iff it is
    /// empty afterwards.
    pub fn delete_all(&mut self) -> CoreResult<bool> {
        // Enumerate inside the transaction so shapes that arrive with its
        // catch-up poll are cleared too.
        self.transact(|tx| {
            for id in tx.ids() {
                tx.delete(id);
            }
        })?;
        Ok(self.transport.entries().is_empty())
    }

    /// Undo the newest entry of the shared history.
    pub fn undo(&mut self) -> CoreResult<bool> {
        let undone = self.transport.undo();
        self.refresh();
        Ok(undone?)
    }

    pub fn redo(&mut self) -> CoreResult<bool> {
        let redone = self.transport.redo();
        self.refresh();
        Ok(redone?)
    }

    pub fn can_undo(&self) -> bool {
        self.transport.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.transport.can_redo()
    }

    /// Fold queued change notifications into the snapshot. Returns the ids
    /// that changed, in notification order.
    pub fn refresh(&mut self) -> Vec<ShapeId> {
        let mut changed = Vec::new();
        for event in self.changes.drain() {
            for change in event.changes {
                match change.after {
                    Some(shape) => {
                        self.snapshot.insert(change.id, shape);
                    }
                    None => {
                        self.snapshot.remove(&change.id);
                    }
                }
                if !changed.contains(&change.id) {
                    changed.push(change.id);
                }
            }
        }
        changed
    }

    /// Rebuild the snapshot from the replica, e.g. after a reconnect.
    pub fn resync(&mut self) {
        self.changes.drain();
        self.snapshot = self
            .transport
            .entries()
            .into_iter()
            .map(|shape| (shape.id(), shape))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Ellipse, Rectangle};
    use crate::transport::MemoryRoom;
    use kurbo::{Point, Vec2};

    fn rect(x: f64) -> Shape {
        Rectangle::new(Point::new(x, 0.0), 10.0, 10.0).into()
    }

    fn store(room: &MemoryRoom) -> ShapeStore<crate::transport::MemoryTransport> {
        let mut store = ShapeStore::new(room.connect().unwrap());
        store.transport_mut().poll().unwrap();
        store.refresh();
        store
    }

    #[test]
    fn test_set_is_idempotent() {
        let room = MemoryRoom::new("store");
        let mut store = store(&room);
        let shape = rect(0.0);
        store.set(shape.clone()).unwrap();
        store.set(shape.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&shape.id()), Some(&shape));
        // The second set changed nothing, so it added no history.
        assert_eq!(room.history_depth(), (1, 0));
    }

    #[test]
    fn test_update_missing_is_noop() {
        let room = MemoryRoom::new("store");
        let mut store = store(&room);
        assert!(!store.update(rect(0.0)).unwrap());
        assert!(store.is_empty());
        assert_eq!(room.history_depth(), (0, 0));
    }

    #[test]
    fn test_update_does_not_resurrect_remote_delete() {
        let room = MemoryRoom::new("store");
        let mut a = store(&room);
        let mut b = store(&room);
        let shape = rect(0.0);
        a.set(shape.clone()).unwrap();
        b.transport_mut().poll().unwrap();
        b.refresh();
        assert!(b.contains(&shape.id()));

        a.delete(shape.id()).unwrap();
        // B has not polled yet, but the transaction catches up first.
        let mut moved = shape.clone();
        moved.translate(Vec2::new(5.0, 5.0));
        assert!(!b.update(moved).unwrap());
        assert!(!b.contains(&shape.id()));
        assert_eq!(room.shape_count(), 0);
    }

    #[test]
    fn test_transaction_groups_writes() {
        let room = MemoryRoom::new("store");
        let mut store = store(&room);
        let a = rect(0.0);
        let b: Shape = Ellipse::new(Point::new(50.0, 50.0), 5.0, 5.0).into();
        let (a_id, b_id) = (a.id(), b.id());
        let updated = store
            .transact(|tx| {
                tx.set(a);
                tx.set(b);
                tx.delete(a_id);
                // Deleted earlier in this transaction.
                tx.update(rect(1.0)) || tx.exists(&a_id)
            })
            .unwrap();
        assert!(!updated);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&b_id));
        assert_eq!(room.history_depth(), (1, 0));
    }

    #[test]
    fn test_delete_all() {
        let room = MemoryRoom::new("store");
        let mut store = store(&room);
        store
            .transact(|tx| {
                tx.set(rect(0.0));
                tx.set(rect(20.0));
            })
            .unwrap();
        assert!(store.delete_all().unwrap());
        assert!(store.is_empty());

        // One entry for the creation, one for the clear.
        assert_eq!(room.history_depth(), (2, 0));
        assert!(store.undo().unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_delete_all_clears_unpolled_peer_writes() {
        let room = MemoryRoom::new("store");
        let mut a = store(&room);
        let mut b = store(&room);
        a.set(rect(0.0)).unwrap();
        b.set(rect(20.0)).unwrap();

        // A never saw B's shape before clearing.
        assert_eq!(a.len(), 1);
        assert!(a.delete_all().unwrap());
        assert!(a.is_empty());
        assert_eq!(room.shape_count(), 0);

        b.transport_mut().poll().unwrap();
        b.refresh();
        assert!(b.is_empty());
    }

    #[test]
    fn test_transaction_ids_include_pending_writes() {
        let room = MemoryRoom::new("store");
        let mut store = store(&room);
        let kept = rect(0.0);
        let dropped = rect(20.0);
        store.set(dropped.clone()).unwrap();
        let ids = store
            .transact(|tx| {
                tx.set(kept.clone());
                tx.delete(dropped.id());
                tx.ids()
            })
            .unwrap();
        assert_eq!(ids, vec![kept.id()]);
    }

    #[test]
    fn test_non_finite_shape_is_not_written() {
        let room = MemoryRoom::new("store");
        let mut a = store(&room);
        let mut b = store(&room);
        let shape: Shape = Rectangle::new(Point::new(f64::NAN, 0.0), 5.0, 5.0).into();
        assert!(!a.set(shape.clone()).unwrap());
        assert!(a.is_empty());
        assert_eq!(room.shape_count(), 0);
        assert_eq!(room.history_depth(), (0, 0));

        // An update to an existing shape is refused the same way.
        let good = rect(0.0);
        a.set(good.clone()).unwrap();
        let mut broken = good.clone();
        broken.translate(Vec2::new(f64::INFINITY, 0.0));
        assert!(!a.update(broken).unwrap());
        assert_eq!(a.get(&good.id()), Some(&good));

        b.transport_mut().poll().unwrap();
        b.refresh();
        assert_eq!(b.len(), a.len());
        assert_eq!(b.get(&good.id()), Some(&good));
    }

    #[test]
    fn test_undo_redo_refreshes_snapshot() {
        let room = MemoryRoom::new("store");
        let mut store = store(&room);
        let shape = rect(0.0);
        store.set(shape.clone()).unwrap();
        let mut moved = shape.clone();
        moved.translate(Vec2::new(10.0, 0.0));
        assert!(store.update(moved.clone()).unwrap());

        assert!(store.undo().unwrap());
        assert_eq!(store.get(&shape.id()), Some(&shape));
        assert!(store.can_redo());
        assert!(store.redo().unwrap());
        assert_eq!(store.get(&shape.id()), Some(&moved));
    }

    #[test]
    fn test_snapshot_survives_disconnect() {
        let room = MemoryRoom::new("store");
        let mut store = store(&room);
        store.set(rect(0.0)).unwrap();
        store.transport_mut().disconnect();
        assert_eq!(store.len(), 1);
        assert!(store.undo().is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_refresh_reports_remote_changes() {
        let room = MemoryRoom::new("store");
        let mut a = store(&room);
        let mut b = store(&room);
        let shape = rect(0.0);
        a.set(shape.clone()).unwrap();
        b.transport_mut().poll().unwrap();
        assert_eq!(b.refresh(), vec![shape.id()]);
        assert!(b.refresh().is_empty());
    }
}
