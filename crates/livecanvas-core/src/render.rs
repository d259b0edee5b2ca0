//! Rendering engine interface.
//!
//! The core never owns a render loop. It tells a [`RenderEngine`] which
//! shapes exist and how they look, and the engine reports back through
//! subscriptions. [`RenderBridge`] keeps the engine in step with the store
//! snapshot plus whatever the local user is drawing or dragging.

use crate::shapes::{Shape, ShapeId};
use crate::subscription::{EventHub, Subscription};
use kurbo::{Point, Vec2};
use std::collections::HashMap;

/// Engine events a session can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    ObjectModified,
    SelectionCleared,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The engine changed a shape's geometry itself (e.g. its own transform
    /// controls) and wants it committed.
    ObjectModified { shape: Shape },
    SelectionCleared,
}

impl EngineEvent {
    pub fn kind(&self) -> EngineEventKind {
        match self {
            EngineEvent::ObjectModified { .. } => EngineEventKind::ObjectModified,
            EngineEvent::SelectionCleared => EngineEventKind::SelectionCleared,
        }
    }
}

/// Drawing surface driven by the core.
pub trait RenderEngine {
    fn add(&mut self, shape: &Shape);

    fn remove(&mut self, id: &ShapeId);

    /// Replace the rendered geometry and style of `id` with `shape`.
    fn update(&mut self, id: &ShapeId, shape: &Shape);

    fn clear(&mut self);

    /// Map a raw device position to the surface's screen coordinates.
    fn get_pointer(&self, raw: Point) -> Point;

    fn on(&self, kind: EngineEventKind) -> Subscription<EngineEvent>;
}

/// Keeps a [`RenderEngine`] consistent with the store and local gestures.
pub struct RenderBridge<R: RenderEngine> {
    engine: R,
    rendered: HashMap<ShapeId, Shape>,
    transient: Option<ShapeId>,
}

impl<R: RenderEngine> RenderBridge<R> {
    pub fn new(engine: R) -> Self {
        Self {
            engine,
            rendered: HashMap::new(),
            transient: None,
        }
    }

    pub fn engine(&self) -> &R {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut R {
        &mut self.engine
    }

    pub fn is_rendered(&self, id: &ShapeId) -> bool {
        self.rendered.contains_key(id)
    }

    pub fn rendered(&self, id: &ShapeId) -> Option<&Shape> {
        self.rendered.get(id)
    }

    pub fn transient(&self) -> Option<ShapeId> {
        self.transient
    }

    /// Add or update the shape being drawn. It is not in the store.
    pub fn show_transient(&mut self, shape: &Shape) {
        self.transient = Some(shape.id());
        self.show(shape);
    }

    /// Remove the uncommitted shape from the surface.
    pub fn discard_transient(&mut self) -> Option<ShapeId> {
        let id = self.transient.take()?;
        if self.rendered.remove(&id).is_some() {
            self.engine.remove(&id);
        }
        Some(id)
    }

    /// The transient was committed; from now on the snapshot owns it.
    pub fn adopt_transient(&mut self) -> Option<ShapeId> {
        self.transient.take()
    }

    /// Show a locally modified version of a stored shape.
    pub fn preview(&mut self, shape: &Shape) {
        self.show(shape);
    }

    fn show(&mut self, shape: &Shape) {
        let id = shape.id();
        match self.rendered.get(&id) {
            Some(current) if current == shape => {}
            Some(_) => {
                self.engine.update(&id, shape);
                self.rendered.insert(id, shape.clone());
            }
            None => {
                self.engine.add(shape);
                self.rendered.insert(id, shape.clone());
            }
        }
    }

    /// Re-render from the authoritative snapshot.
    ///
    /// `pinned` are shapes the local user is currently dragging: their
    /// previews are left alone unless the shape is gone from the snapshot.
    /// The transient is never touched.
    pub fn sync(&mut self, snapshot: &HashMap<ShapeId, Shape>, pinned: &[ShapeId]) {
        let stale: Vec<ShapeId> = self
            .rendered
            .keys()
            .filter(|id| Some(**id) != self.transient && !snapshot.contains_key(id))
            .copied()
            .collect();
        for id in stale {
            self.rendered.remove(&id);
            self.engine.remove(&id);
        }
        for (id, shape) in snapshot {
            if pinned.contains(id) && self.rendered.contains_key(id) {
                continue;
            }
            self.show(shape);
        }
    }

    /// Drop a local preview of `id` and show the stored version again.
    pub fn restore(&mut self, id: &ShapeId, stored: Option<&Shape>) {
        match stored {
            Some(shape) => self.show(shape),
            None => {
                if self.rendered.remove(id).is_some() {
                    self.engine.remove(id);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.rendered.clear();
        self.transient = None;
        self.engine.clear();
    }
}

/// One call made on a [`HeadlessRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOp {
    Add(ShapeId),
    Remove(ShapeId),
    Update(ShapeId),
    Clear,
}

/// Most recent engine calls kept by [`HeadlessRenderer::ops`].
pub const OP_LOG_CAPACITY: usize = 1024;

/// In-memory engine for hosts without a display.
pub struct HeadlessRenderer {
    shapes: HashMap<ShapeId, Shape>,
    ops: Vec<RenderOp>,
    /// Position of the surface inside the device space.
    origin: Vec2,
    hubs: HashMap<EngineEventKind, EventHub<EngineEvent>>,
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        let hubs = [EngineEventKind::ObjectModified, EngineEventKind::SelectionCleared]
            .into_iter()
            .map(|kind| (kind, EventHub::new()))
            .collect();
        Self {
            shapes: HashMap::new(),
            ops: Vec::new(),
            origin: Vec2::ZERO,
            hubs,
        }
    }

    /// Surface placed at `origin` in device coordinates.
    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Recent engine calls, oldest first. At most [`OP_LOG_CAPACITY`].
    pub fn ops(&self) -> &[RenderOp] {
        &self.ops
    }

    /// Drain the call log.
    pub fn take_ops(&mut self) -> Vec<RenderOp> {
        std::mem::take(&mut self.ops)
    }

    fn record(&mut self, op: RenderOp) {
        if self.ops.len() >= OP_LOG_CAPACITY {
            self.ops.drain(..OP_LOG_CAPACITY / 2);
        }
        self.ops.push(op);
    }

    /// Fire an engine event, as a real surface would on user interaction.
    pub fn emit(&self, event: EngineEvent) {
        if let Some(hub) = self.hubs.get(&event.kind()) {
            hub.emit(event);
        }
    }
}

impl RenderEngine for HeadlessRenderer {
    fn add(&mut self, shape: &Shape) {
        self.record(RenderOp::Add(shape.id()));
        self.shapes.insert(shape.id(), shape.clone());
    }

    fn remove(&mut self, id: &ShapeId) {
        self.record(RenderOp::Remove(*id));
        self.shapes.remove(id);
    }

    fn update(&mut self, id: &ShapeId, shape: &Shape) {
        self.record(RenderOp::Update(*id));
        self.shapes.insert(*id, shape.clone());
    }

    fn clear(&mut self) {
        self.record(RenderOp::Clear);
        self.shapes.clear();
    }

    fn get_pointer(&self, raw: Point) -> Point {
        raw - self.origin
    }

    fn on(&self, kind: EngineEventKind) -> Subscription<EngineEvent> {
        match self.hubs.get(&kind) {
            Some(hub) => hub.subscribe(),
            // Every kind has a hub; a fresh one just never fires.
            None => EventHub::new().subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Rectangle;

    fn rect(x: f64) -> Shape {
        Rectangle::new(Point::new(x, 0.0), 10.0, 10.0).into()
    }

    #[test]
    fn test_transient_lifecycle() {
        let mut bridge = RenderBridge::new(HeadlessRenderer::new());
        let mut shape = rect(0.0);
        bridge.show_transient(&shape);
        shape.set_bounds(kurbo::Rect::new(0.0, 0.0, 30.0, 30.0));
        bridge.show_transient(&shape);
        assert_eq!(
            bridge.engine().ops(),
            &[RenderOp::Add(shape.id()), RenderOp::Update(shape.id())]
        );

        // Syncing an empty snapshot leaves the transient on screen.
        bridge.sync(&HashMap::new(), &[]);
        assert_eq!(bridge.engine().len(), 1);

        assert_eq!(bridge.discard_transient(), Some(shape.id()));
        assert!(bridge.engine().is_empty());
    }

    #[test]
    fn test_sync_adds_updates_and_removes() {
        let mut bridge = RenderBridge::new(HeadlessRenderer::new());
        let a = rect(0.0);
        let b = rect(50.0);
        let mut snapshot: HashMap<ShapeId, Shape> =
            [(a.id(), a.clone()), (b.id(), b.clone())].into_iter().collect();
        bridge.sync(&snapshot, &[]);
        assert_eq!(bridge.engine().len(), 2);
        bridge.engine_mut().take_ops();

        // Unchanged shapes cause no engine traffic.
        bridge.sync(&snapshot, &[]);
        assert!(bridge.engine().ops().is_empty());

        let mut moved = a.clone();
        moved.translate(Vec2::new(5.0, 0.0));
        snapshot.insert(a.id(), moved.clone());
        snapshot.remove(&b.id());
        bridge.sync(&snapshot, &[]);
        assert_eq!(bridge.engine().shape(&a.id()), Some(&moved));
        assert!(bridge.engine().shape(&b.id()).is_none());
    }

    #[test]
    fn test_pinned_preview_survives_sync_but_not_delete() {
        let mut bridge = RenderBridge::new(HeadlessRenderer::new());
        let a = rect(0.0);
        let snapshot: HashMap<ShapeId, Shape> = [(a.id(), a.clone())].into_iter().collect();
        bridge.sync(&snapshot, &[]);

        let mut dragged = a.clone();
        dragged.translate(Vec2::new(40.0, 0.0));
        bridge.preview(&dragged);
        bridge.sync(&snapshot, &[a.id()]);
        assert_eq!(bridge.rendered(&a.id()), Some(&dragged));

        bridge.sync(&HashMap::new(), &[a.id()]);
        assert!(!bridge.is_rendered(&a.id()));
    }

    #[test]
    fn test_restore() {
        let mut bridge = RenderBridge::new(HeadlessRenderer::new());
        let a = rect(0.0);
        let mut dragged = a.clone();
        dragged.translate(Vec2::new(1.0, 1.0));
        bridge.preview(&dragged);
        bridge.restore(&a.id(), Some(&a));
        assert_eq!(bridge.engine().shape(&a.id()), Some(&a));
        bridge.restore(&a.id(), None);
        assert!(bridge.engine().is_empty());
    }

    #[test]
    fn test_op_log_is_bounded() {
        let mut engine = HeadlessRenderer::new();
        let shape = rect(0.0);
        for _ in 0..OP_LOG_CAPACITY * 3 {
            engine.update(&shape.id(), &shape);
        }
        assert!(engine.ops().len() <= OP_LOG_CAPACITY);
        engine.clear();
        assert_eq!(engine.ops().last(), Some(&RenderOp::Clear));
        assert!(engine.take_ops().len() <= OP_LOG_CAPACITY);
        assert!(engine.ops().is_empty());
    }

    #[test]
    fn test_engine_events_and_pointer() {
        let engine = HeadlessRenderer::new().with_origin(Vec2::new(8.0, 4.0));
        assert_eq!(engine.get_pointer(Point::new(10.0, 10.0)), Point::new(2.0, 6.0));

        let modified = engine.on(EngineEventKind::ObjectModified);
        let cleared = engine.on(EngineEventKind::SelectionCleared);
        let shape = rect(0.0);
        engine.emit(EngineEvent::ObjectModified {
            shape: shape.clone(),
        });
        assert_eq!(modified.drain(), vec![EngineEvent::ObjectModified { shape }]);
        assert!(cleared.try_next().is_none());
    }
}
