//! Local interaction state machine.
//!
//! Turns virtual-coordinate pointer and key input into transient previews
//! on the render bridge and, on release, into store transactions. Nothing
//! is written to the shared map while a gesture is in progress.

use crate::config::ZeroSizePolicy;
use crate::error::CoreError;
use crate::input::{Key, KeyEvent, Modifiers};
use crate::render::{RenderBridge, RenderEngine};
use crate::selection::{apply_manipulation, hit_test_handles, ManipulationState, HANDLE_HIT_TOLERANCE};
use crate::shapes::{Shape, ShapeId};
use crate::store::ShapeStore;
use crate::tools::{ToolKind, ToolManager};
use crate::transport::Transport;
use kurbo::{Point, Rect, Size};

/// Pick tolerance for shape bodies, in screen pixels.
pub const SHAPE_HIT_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    /// A tool is drawing a transient shape.
    Drawing,
    /// Dragging the selection.
    Moving {
        start: Point,
        current: Point,
        originals: Vec<Shape>,
    },
    /// Dragging a resize handle.
    Scaling(ManipulationState),
    /// Dragging a marquee.
    Selecting { start: Point, current: Point },
    EditingText {
        shape: Shape,
        /// Not in the store yet.
        is_new: bool,
    },
}

impl InteractionState {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionState::Idle => "idle",
            InteractionState::Drawing => "drawing",
            InteractionState::Moving { .. } => "moving",
            InteractionState::Scaling(_) => "scaling",
            InteractionState::Selecting { .. } => "selecting",
            InteractionState::EditingText { .. } => "editing_text",
        }
    }
}

/// Gesture state, tool, and selection of one client.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    state: InteractionState,
    tools: ToolManager,
    selection: Vec<ShapeId>,
    zero_size: ZeroSizePolicy,
}

impl Interaction {
    pub fn new(zero_size: ZeroSizePolicy) -> Self {
        Self {
            zero_size,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, InteractionState::Idle)
    }

    pub fn is_editing_text(&self) -> bool {
        matches!(self.state, InteractionState::EditingText { .. })
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolManager {
        &mut self.tools
    }

    pub fn current_tool(&self) -> ToolKind {
        self.tools.current_tool
    }

    /// Switch tools. A gesture in progress is cancelled first.
    pub fn set_tool<T: Transport, R: RenderEngine>(
        &mut self,
        tool: ToolKind,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) {
        self.cancel(store, bridge);
        self.tools.set_tool(tool);
    }

    pub fn selection(&self) -> &[ShapeId] {
        &self.selection
    }

    pub fn select(&mut self, ids: Vec<ShapeId>) {
        self.selection = ids;
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Forget selected ids that are no longer in the store.
    pub fn retain_existing<T: Transport>(&mut self, store: &ShapeStore<T>) {
        self.selection.retain(|id| store.contains(id));
    }

    /// Shapes whose local preview must survive a re-render from the store.
    pub fn pinned(&self) -> Vec<ShapeId> {
        match &self.state {
            InteractionState::Moving { originals, .. } => originals.iter().map(Shape::id).collect(),
            InteractionState::Scaling(m) => vec![m.shape_id],
            InteractionState::EditingText { shape, is_new: false } => vec![shape.id()],
            _ => Vec::new(),
        }
    }

    /// Re-render the store snapshot around any gesture in progress.
    pub fn render<T: Transport, R: RenderEngine>(&self, store: &ShapeStore<T>, bridge: &mut RenderBridge<R>) {
        bridge.sync(store.snapshot(), &self.pinned());
    }

    /// Topmost shape under `point`. Smaller shapes sit above larger ones.
    pub fn shape_at<T: Transport>(&self, store: &ShapeStore<T>, point: Point, scale: f64) -> Option<ShapeId> {
        let tolerance = SHAPE_HIT_TOLERANCE / scale;
        store
            .shapes()
            .filter(|shape| shape.hit_test(point, tolerance))
            .min_by(|a, b| a.bounds().area().total_cmp(&b.bounds().area()))
            .map(Shape::id)
    }

    pub fn pointer_down<T: Transport, R: RenderEngine>(
        &mut self,
        point: Point,
        modifiers: Modifiers,
        scale: f64,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) {
        if self.is_editing_text() {
            self.finish_text(store, bridge);
        }
        if !self.is_idle() {
            // A press without a release: close out the old gesture first.
            self.pointer_up(point, store, bridge);
        }

        if self.tools.current_tool.is_drawing() {
            self.selection.clear();
            if let Some(shape) = self.tools.begin(point) {
                bridge.show_transient(shape);
                self.state = InteractionState::Drawing;
            }
            return;
        }

        let handle_tolerance = HANDLE_HIT_TOLERANCE / scale;
        for id in &self.selection {
            let Some(shape) = store.get(id) else {
                continue;
            };
            if let Some(handle) = hit_test_handles(shape, point, handle_tolerance) {
                self.state = InteractionState::Scaling(ManipulationState::new(
                    Some(handle),
                    point,
                    shape.clone(),
                ));
                self.selection = vec![*id];
                return;
            }
        }

        match self.shape_at(store, point, scale) {
            Some(id) => {
                if !self.selection.contains(&id) {
                    if !modifiers.shift {
                        self.selection.clear();
                    }
                    self.selection.push(id);
                }
                let originals = self
                    .selection
                    .iter()
                    .filter_map(|id| store.get(id).cloned())
                    .collect();
                self.state = InteractionState::Moving {
                    start: point,
                    current: point,
                    originals,
                };
            }
            None => {
                if !modifiers.shift {
                    self.selection.clear();
                }
                self.state = InteractionState::Selecting {
                    start: point,
                    current: point,
                };
            }
        }
    }

    pub fn pointer_move<T: Transport, R: RenderEngine>(
        &mut self,
        point: Point,
        store: &ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) {
        match &mut self.state {
            InteractionState::Drawing => {
                if let Some(shape) = self.tools.update(point) {
                    bridge.show_transient(shape);
                }
            }
            InteractionState::Moving {
                start,
                current,
                originals,
            } => {
                *current = point;
                let delta = point - *start;
                for original in originals.iter() {
                    // A peer may have deleted it; don't bring it back on screen.
                    if store.contains(&original.id()) {
                        bridge.preview(&apply_manipulation(original, None, delta));
                    }
                }
            }
            InteractionState::Scaling(manipulation) => {
                manipulation.current_point = point;
                if store.contains(&manipulation.shape_id) {
                    bridge.preview(&manipulation.preview());
                }
            }
            InteractionState::Selecting { current, .. } => *current = point,
            InteractionState::Idle | InteractionState::EditingText { .. } => {}
        }
    }

    /// Release: the gesture ends and its result is committed.
    pub fn pointer_up<T: Transport, R: RenderEngine>(
        &mut self,
        point: Point,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) {
        self.pointer_move(point, store, bridge);
        match std::mem::take(&mut self.state) {
            InteractionState::Drawing => self.finish_drawing(store, bridge),
            InteractionState::Moving {
                start,
                current,
                originals,
            } => {
                let delta = current - start;
                let moved = originals
                    .iter()
                    .map(|original| apply_manipulation(original, None, delta))
                    .collect();
                self.commit_geometry(moved, store, bridge);
            }
            InteractionState::Scaling(manipulation) => {
                self.commit_geometry(vec![manipulation.preview()], store, bridge);
            }
            InteractionState::Selecting { start, current } => {
                let marquee = Rect::from_points(start, current);
                for shape in store.shapes() {
                    if shape.intersects_rect(marquee) && !self.selection.contains(&shape.id()) {
                        self.selection.push(shape.id());
                    }
                }
            }
            editing @ InteractionState::EditingText { .. } => self.state = editing,
            InteractionState::Idle => {}
        }
    }

    /// Abort the gesture: transients vanish and previews fall back to the
    /// stored geometry. Text being edited is finished normally.
    pub fn cancel<T: Transport, R: RenderEngine>(&mut self, store: &mut ShapeStore<T>, bridge: &mut RenderBridge<R>) {
        match std::mem::take(&mut self.state) {
            InteractionState::Drawing => {
                self.tools.cancel();
                bridge.discard_transient();
            }
            InteractionState::Moving { originals, .. } => {
                for original in originals {
                    bridge.restore(&original.id(), store.get(&original.id()));
                }
            }
            InteractionState::Scaling(manipulation) => {
                bridge.restore(&manipulation.shape_id, store.get(&manipulation.shape_id));
            }
            editing @ InteractionState::EditingText { .. } => {
                self.state = editing;
                self.finish_text(store, bridge);
            }
            InteractionState::Selecting { .. } | InteractionState::Idle => {}
        }
    }

    /// Drop everything local without writing, e.g. when leaving the room.
    pub fn abandon<T: Transport, R: RenderEngine>(&mut self, store: &ShapeStore<T>, bridge: &mut RenderBridge<R>) {
        self.tools.cancel();
        bridge.discard_transient();
        for id in self.pinned() {
            bridge.restore(&id, store.get(&id));
        }
        self.state = InteractionState::Idle;
        self.selection.clear();
    }

    /// Returns true if the key was used.
    pub fn on_key<T: Transport, R: RenderEngine>(
        &mut self,
        event: &KeyEvent,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) -> bool {
        if self.is_editing_text() {
            return self.edit_text(event, store, bridge);
        }

        if event.key == Key::Escape {
            if !self.is_idle() {
                log::debug!("Cancelling {} gesture", self.state.name());
                self.cancel(store, bridge);
                return true;
            }
            let had_selection = !self.selection.is_empty();
            self.selection.clear();
            return had_selection;
        }
        if !self.is_idle() {
            return false;
        }

        match &event.key {
            Key::Delete | Key::Backspace if !self.selection.is_empty() => {
                self.delete_selection(store, bridge);
                true
            }
            Key::Enter => self.edit_selected_text(store),
            Key::Char(_) if event.modifiers.command() => match event.key.char_lower() {
                Some('z') if event.modifiers.shift => self.redo(store, bridge),
                Some('z') => self.undo(store, bridge),
                Some('y') => self.redo(store, bridge),
                _ => false,
            },
            _ => false,
        }
    }

    /// Commit geometry the engine changed itself. During a move or resize
    /// of that shape, the in-progress geometry is committed and the gesture
    /// continues from there.
    pub fn object_modified<T: Transport, R: RenderEngine>(
        &mut self,
        shape: Shape,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) {
        let id = shape.id();
        if !shape.is_finite() {
            log::warn!("Ignoring engine update of {id} with non-finite geometry");
            bridge.restore(&id, store.get(&id));
            return;
        }
        let mut geometry: Vec<Shape> = match &self.state {
            InteractionState::Moving {
                start,
                current,
                originals,
            } => originals
                .iter()
                .map(|original| apply_manipulation(original, None, *current - *start))
                .collect(),
            InteractionState::Scaling(manipulation) => vec![manipulation.preview()],
            _ => Vec::new(),
        };
        let Some(slot) = geometry.iter_mut().find(|s| s.id() == id) else {
            self.commit_geometry(vec![shape], store, bridge);
            return;
        };
        *slot = shape;

        self.commit_geometry(geometry.clone(), store, bridge);
        match &mut self.state {
            InteractionState::Moving {
                start,
                current,
                originals,
            } => {
                *start = *current;
                *originals = geometry.into_iter().filter(|s| store.contains(&s.id())).collect();
            }
            InteractionState::Scaling(manipulation) => {
                if let Some(committed) = geometry.pop() {
                    manipulation.original_shape = committed;
                    manipulation.start_point = manipulation.current_point;
                }
            }
            _ => {}
        }
    }

    pub fn undo<T: Transport, R: RenderEngine>(&mut self, store: &mut ShapeStore<T>, bridge: &mut RenderBridge<R>) -> bool {
        let undone = store.undo().unwrap_or_else(|e| {
            log::warn!("Undo failed: {e}");
            false
        });
        self.retain_existing(store);
        self.render(store, bridge);
        undone
    }

    pub fn redo<T: Transport, R: RenderEngine>(&mut self, store: &mut ShapeStore<T>, bridge: &mut RenderBridge<R>) -> bool {
        let redone = store.redo().unwrap_or_else(|e| {
            log::warn!("Redo failed: {e}");
            false
        });
        self.retain_existing(store);
        self.render(store, bridge);
        redone
    }

    pub fn delete_selection<T: Transport, R: RenderEngine>(
        &mut self,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) {
        let ids = std::mem::take(&mut self.selection);
        if let Err(e) = store.transact(|tx| {
            for id in ids {
                tx.delete(id);
            }
        }) {
            log::warn!("Failed to delete selection: {e}");
        }
        self.render(store, bridge);
    }

    fn finish_drawing<T: Transport, R: RenderEngine>(&mut self, store: &mut ShapeStore<T>, bridge: &mut RenderBridge<R>) {
        let Some(mut shape) = self.tools.end() else {
            return;
        };

        if matches!(shape, Shape::Text(_)) {
            bridge.show_transient(&shape);
            self.state = InteractionState::EditingText { shape, is_new: true };
            return;
        }
        if let Shape::Path(path) = &shape {
            if path.len() < 2 {
                log::debug!("Discarding single-point path");
                bridge.discard_transient();
                return;
            }
        }
        if shape.is_zero_size() {
            match self.zero_size {
                ZeroSizePolicy::Discard => {
                    log::debug!("Discarding zero-size {}", shape.kind());
                    bridge.discard_transient();
                    return;
                }
                ZeroSizePolicy::Minimum { size } => {
                    let origin = shape.bounds().origin();
                    shape.set_bounds(Rect::from_origin_size(origin, Size::new(size, size)));
                }
            }
        }

        let id = shape.id();
        bridge.show_transient(&shape);
        match store.set(shape) {
            Ok(true) => {
                bridge.adopt_transient();
                self.selection = vec![id];
            }
            Ok(false) => {
                bridge.discard_transient();
            }
            Err(e) => {
                log::warn!("Failed to commit new shape: {e}");
                bridge.discard_transient();
            }
        }
        self.render(store, bridge);
    }

    /// Write moved or resized shapes back. Shapes a peer deleted meanwhile
    /// stay deleted.
    fn commit_geometry<T: Transport, R: RenderEngine>(
        &mut self,
        shapes: Vec<Shape>,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) {
        let ids: Vec<ShapeId> = shapes.iter().map(Shape::id).collect();
        let committed = store.transact(|tx| {
            let mut raced = Vec::new();
            for shape in shapes {
                let id = shape.id();
                if !tx.update(shape) {
                    raced.push(id);
                }
            }
            raced
        });
        match committed {
            Ok(raced) => {
                for id in raced {
                    log::info!("{}", CoreError::ConcurrentDeleteRace(id));
                    self.selection.retain(|s| *s != id);
                }
            }
            Err(e) => log::warn!("Failed to commit shape geometry: {e}"),
        }
        for id in &ids {
            bridge.restore(id, store.get(id));
        }
        self.render(store, bridge);
    }

    fn edit_selected_text<T: Transport>(&mut self, store: &ShapeStore<T>) -> bool {
        let [id] = self.selection.as_slice() else {
            return false;
        };
        match store.get(id) {
            Some(shape @ Shape::Text(_)) => {
                self.state = InteractionState::EditingText {
                    shape: shape.clone(),
                    is_new: false,
                };
                true
            }
            _ => false,
        }
    }

    fn edit_text<T: Transport, R: RenderEngine>(
        &mut self,
        event: &KeyEvent,
        store: &mut ShapeStore<T>,
        bridge: &mut RenderBridge<R>,
    ) -> bool {
        let InteractionState::EditingText { shape, is_new } = &mut self.state else {
            return false;
        };
        let Some(text) = shape.as_text_mut() else {
            return false;
        };
        match &event.key {
            Key::Enter | Key::Escape => {
                self.finish_text(store, bridge);
                return true;
            }
            Key::Backspace => {
                let mut content = text.content().to_string();
                content.pop();
                text.set_content(content);
            }
            Key::Char(c) if !event.modifiers.command() => {
                let mut content = text.content().to_string();
                content.push(*c);
                text.set_content(content);
            }
            _ => return false,
        }
        if *is_new {
            bridge.show_transient(shape);
        } else {
            bridge.preview(shape);
        }
        true
    }

    /// Leave text editing: commit non-empty text, drop empty text.
    fn finish_text<T: Transport, R: RenderEngine>(&mut self, store: &mut ShapeStore<T>, bridge: &mut RenderBridge<R>) {
        let InteractionState::EditingText { shape, is_new } = std::mem::take(&mut self.state) else {
            return;
        };
        let id = shape.id();
        let empty = shape.as_text().is_none_or(|text| text.content().is_empty());

        match (is_new, empty) {
            (true, true) => {
                bridge.discard_transient();
            }
            (true, false) => match store.set(shape) {
                Ok(true) => {
                    bridge.adopt_transient();
                    self.selection = vec![id];
                }
                Ok(false) => {
                    bridge.discard_transient();
                }
                Err(e) => {
                    log::warn!("Failed to commit text: {e}");
                    bridge.discard_transient();
                }
            },
            (false, true) => {
                if let Err(e) = store.delete(id) {
                    log::warn!("Failed to delete emptied text: {e}");
                }
                self.selection.retain(|s| *s != id);
            }
            (false, false) => match store.update(shape) {
                Ok(true) => {}
                Ok(false) => log::info!("{}", CoreError::ConcurrentDeleteRace(id)),
                Err(e) => log::warn!("Failed to commit text: {e}"),
            },
        }
        bridge.restore(&id, store.get(&id));
        self.render(store, bridge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessRenderer;
    use crate::shapes::Rectangle;
    use crate::transport::{MemoryRoom, MemoryTransport};
    use kurbo::Vec2;

    struct Client {
        interaction: Interaction,
        store: ShapeStore<MemoryTransport>,
        bridge: RenderBridge<HeadlessRenderer>,
    }

    impl Client {
        fn join(room: &MemoryRoom) -> Self {
            Self::with_policy(room, ZeroSizePolicy::Discard)
        }

        fn with_policy(room: &MemoryRoom, zero_size: ZeroSizePolicy) -> Self {
            let mut store = ShapeStore::new(room.connect().unwrap());
            store.transport_mut().poll().unwrap();
            store.refresh();
            Self {
                interaction: Interaction::new(zero_size),
                store,
                bridge: RenderBridge::new(HeadlessRenderer::new()),
            }
        }

        fn tool(&mut self, tool: ToolKind) {
            self.interaction.set_tool(tool, &mut self.store, &mut self.bridge);
        }

        fn down(&mut self, x: f64, y: f64) {
            self.interaction.pointer_down(
                Point::new(x, y),
                Modifiers::default(),
                1.0,
                &mut self.store,
                &mut self.bridge,
            );
        }

        fn to(&mut self, x: f64, y: f64) {
            self.interaction.pointer_move(Point::new(x, y), &self.store, &mut self.bridge);
        }

        fn up(&mut self, x: f64, y: f64) {
            self.interaction.pointer_up(Point::new(x, y), &mut self.store, &mut self.bridge);
        }

        fn drag(&mut self, from: (f64, f64), to: (f64, f64)) {
            self.down(from.0, from.1);
            self.to(to.0, to.1);
            self.up(to.0, to.1);
        }

        fn key(&mut self, event: KeyEvent) -> bool {
            self.interaction.on_key(&event, &mut self.store, &mut self.bridge)
        }

        fn sync(&mut self) {
            self.store.transport_mut().poll().unwrap();
            self.store.refresh();
            self.interaction.retain_existing(&self.store);
            self.interaction.render(&self.store, &mut self.bridge);
        }

        fn only_shape(&self) -> Shape {
            assert_eq!(self.store.len(), 1);
            self.store.shapes().next().cloned().unwrap()
        }
    }

    fn seed(client: &mut Client, rect: Rect) -> ShapeId {
        let shape: Shape = Rectangle::from_corners(rect.origin(), Point::new(rect.x1, rect.y1)).into();
        let id = shape.id();
        client.store.set(shape).unwrap();
        client.interaction.render(&client.store, &mut client.bridge);
        id
    }

    #[test]
    fn test_drawing_commits_only_on_release() {
        let room = MemoryRoom::new("draw");
        let mut a = Client::join(&room);
        a.tool(ToolKind::Rectangle);
        a.down(10.0, 10.0);
        a.to(60.0, 30.0);
        assert!(matches!(a.interaction.state(), InteractionState::Drawing));
        assert!(a.store.is_empty());
        assert_eq!(room.shape_count(), 0);
        assert_eq!(a.bridge.engine().len(), 1);

        a.up(110.0, 60.0);
        assert!(a.interaction.is_idle());
        let shape = a.only_shape();
        assert_eq!(shape.bounds(), Rect::new(10.0, 10.0, 110.0, 60.0));
        assert_eq!(a.interaction.selection(), &[shape.id()]);
        assert_eq!(a.bridge.transient(), None);
        assert_eq!(a.bridge.engine().shape(&shape.id()), Some(&shape));
        assert_eq!(room.history_depth(), (1, 0));
    }

    #[test]
    fn test_zero_size_discarded_by_default() {
        let room = MemoryRoom::new("zero");
        let mut a = Client::join(&room);
        a.tool(ToolKind::Ellipse);
        a.down(5.0, 5.0);
        a.up(5.0, 5.0);
        assert!(a.store.is_empty());
        assert!(a.bridge.engine().is_empty());
        assert_eq!(room.history_depth(), (0, 0));
    }

    #[test]
    fn test_zero_size_minimum_policy() {
        let room = MemoryRoom::new("zero");
        let mut a = Client::with_policy(&room, ZeroSizePolicy::Minimum { size: 8.0 });
        a.tool(ToolKind::Rectangle);
        a.down(5.0, 5.0);
        a.up(5.0, 5.0);
        assert_eq!(a.only_shape().bounds(), Rect::new(5.0, 5.0, 13.0, 13.0));

        // A click with the path tool never makes a dot.
        a.tool(ToolKind::Path);
        a.down(50.0, 50.0);
        a.up(50.0, 50.0);
        assert_eq!(a.store.len(), 1);
    }

    #[test]
    fn test_path_is_simplified_before_commit() {
        let room = MemoryRoom::new("path");
        let mut a = Client::join(&room);
        a.tool(ToolKind::Path);
        a.down(0.0, 0.0);
        for i in 1..=20 {
            a.to(i as f64, 0.0);
        }
        a.up(20.0, 0.0);
        let Shape::Path(path) = a.only_shape() else {
            panic!("expected a path");
        };
        assert_eq!(path.points, vec![Point::new(0.0, 0.0), Point::new(20.0, 0.0)]);
    }

    #[test]
    fn test_text_editing_lifecycle() {
        let room = MemoryRoom::new("text");
        let mut a = Client::join(&room);
        a.tool(ToolKind::Text);
        a.drag((10.0, 10.0), (10.0, 10.0));
        assert!(a.interaction.is_editing_text());
        assert!(a.store.is_empty());

        a.key(KeyEvent::named("h"));
        a.key(KeyEvent::named("i"));
        a.key(KeyEvent::named("!"));
        a.key(KeyEvent::named("Backspace"));
        // Shortcuts are text while editing.
        assert!(a.key(KeyEvent::named("z").with_modifiers(Modifiers::default())));
        a.key(KeyEvent::named("Backspace"));
        assert!(a.store.is_empty());
        a.key(KeyEvent::named("Enter"));

        let shape = a.only_shape();
        assert_eq!(shape.as_text().map(|t| t.content()), Some("hi"));
        assert!(a.interaction.is_idle());

        // Re-enter on the selected text and clear it: the shape goes away.
        assert!(a.key(KeyEvent::named("Enter")));
        assert!(a.interaction.is_editing_text());
        a.key(KeyEvent::named("Backspace"));
        a.key(KeyEvent::named("Backspace"));
        a.key(KeyEvent::named("Escape"));
        assert!(a.store.is_empty());
        assert!(a.bridge.engine().is_empty());
    }

    #[test]
    fn test_empty_new_text_is_discarded() {
        let room = MemoryRoom::new("text");
        let mut a = Client::join(&room);
        a.tool(ToolKind::Text);
        a.drag((10.0, 10.0), (10.0, 10.0));
        a.tool(ToolKind::Rectangle);
        assert!(a.store.is_empty());
        assert!(a.bridge.engine().is_empty());
        assert_eq!(room.history_depth(), (0, 0));
    }

    #[test]
    fn test_move_commits_once() {
        let room = MemoryRoom::new("move");
        let mut a = Client::join(&room);
        let id = seed(&mut a, Rect::new(0.0, 0.0, 100.0, 50.0));

        a.down(50.0, 25.0);
        assert_eq!(a.interaction.selection(), &[id]);
        a.to(60.0, 30.0);
        a.to(70.0, 35.0);
        // Only the preview moved.
        assert_eq!(a.store.get(&id).unwrap().bounds(), Rect::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(
            a.bridge.engine().shape(&id).unwrap().bounds(),
            Rect::new(20.0, 10.0, 120.0, 60.0)
        );

        a.up(70.0, 35.0);
        assert_eq!(a.store.get(&id).unwrap().bounds(), Rect::new(20.0, 10.0, 120.0, 60.0));
        assert_eq!(room.history_depth(), (2, 0));
    }

    #[test]
    fn test_click_without_drag_records_nothing() {
        let room = MemoryRoom::new("move");
        let mut a = Client::join(&room);
        seed(&mut a, Rect::new(0.0, 0.0, 100.0, 50.0));
        a.drag((50.0, 25.0), (50.0, 25.0));
        assert_eq!(room.history_depth(), (1, 0));
    }

    #[test]
    fn test_scale_by_handle() {
        let room = MemoryRoom::new("scale");
        let mut a = Client::join(&room);
        let id = seed(&mut a, Rect::new(0.0, 0.0, 100.0, 50.0));
        a.interaction.select(vec![id]);

        a.down(100.0, 50.0);
        assert!(matches!(a.interaction.state(), InteractionState::Scaling(_)));
        a.to(150.0, 100.0);
        a.up(150.0, 100.0);
        assert_eq!(a.store.get(&id).unwrap().bounds(), Rect::new(0.0, 0.0, 150.0, 100.0));
    }

    #[test]
    fn test_marquee_selects_intersecting() {
        let room = MemoryRoom::new("marquee");
        let mut a = Client::join(&room);
        let first = seed(&mut a, Rect::new(0.0, 0.0, 10.0, 10.0));
        let second = seed(&mut a, Rect::new(20.0, 0.0, 30.0, 10.0));
        seed(&mut a, Rect::new(200.0, 200.0, 210.0, 210.0));

        a.down(-20.0, -20.0);
        assert!(matches!(a.interaction.state(), InteractionState::Selecting { .. }));
        a.to(25.0, 5.0);
        a.up(25.0, 5.0);
        let mut selected = a.interaction.selection().to_vec();
        selected.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(selected, expected);

        // Delete removes the whole selection in one transaction.
        assert!(a.key(KeyEvent::named("Delete")));
        assert_eq!(a.store.len(), 1);
        assert!(a.interaction.selection().is_empty());
        assert_eq!(room.history_depth(), (4, 0));
    }

    #[test]
    fn test_escape_cancels_gestures() {
        let room = MemoryRoom::new("cancel");
        let mut a = Client::join(&room);
        let id = seed(&mut a, Rect::new(0.0, 0.0, 100.0, 50.0));

        a.down(50.0, 25.0);
        a.to(80.0, 80.0);
        assert!(a.key(KeyEvent::named("Escape")));
        assert!(a.interaction.is_idle());
        assert_eq!(
            a.bridge.engine().shape(&id).unwrap().bounds(),
            Rect::new(0.0, 0.0, 100.0, 50.0)
        );

        a.tool(ToolKind::Rectangle);
        a.down(200.0, 200.0);
        a.to(250.0, 250.0);
        a.key(KeyEvent::named("Escape"));
        a.up(250.0, 250.0);
        assert_eq!(a.store.len(), 1);
        assert_eq!(a.bridge.engine().len(), 1);
        assert_eq!(room.history_depth(), (1, 0));
    }

    #[test]
    fn test_undo_redo_shortcuts() {
        let room = MemoryRoom::new("undo");
        let mut a = Client::join(&room);
        a.tool(ToolKind::Rectangle);
        a.drag((0.0, 0.0), (10.0, 10.0));
        assert_eq!(a.store.len(), 1);

        assert!(a.key(KeyEvent::named("z").with_modifiers(Modifiers::with_command())));
        assert!(a.store.is_empty());
        assert!(a.bridge.engine().is_empty());
        assert!(a.interaction.selection().is_empty());

        let redo = Modifiers {
            shift: true,
            ..Modifiers::with_command()
        };
        assert!(a.key(KeyEvent::named("Z").with_modifiers(redo)));
        assert_eq!(a.store.len(), 1);

        a.key(KeyEvent::named("z").with_modifiers(Modifiers::with_command()));
        assert!(a.key(KeyEvent::named("y").with_modifiers(Modifiers::with_command())));
        assert_eq!(a.store.len(), 1);

        // Nothing left to redo.
        assert!(!a.key(KeyEvent::named("y").with_modifiers(Modifiers::with_command())));
    }

    #[test]
    fn test_concurrent_delete_during_move_is_not_resurrected() {
        let room = MemoryRoom::new("race");
        let mut a = Client::join(&room);
        let mut b = Client::join(&room);
        let id = seed(&mut a, Rect::new(0.0, 0.0, 100.0, 50.0));
        b.sync();

        a.down(50.0, 25.0);
        a.to(90.0, 25.0);
        b.store.delete(id).unwrap();

        a.up(100.0, 25.0);
        assert!(a.interaction.is_idle());
        assert!(!a.store.contains(&id));
        assert!(a.bridge.engine().shape(&id).is_none());
        assert_eq!(room.shape_count(), 0);
    }

    #[test]
    fn test_object_modified_commits_mid_gesture() {
        let room = MemoryRoom::new("modified");
        let mut a = Client::join(&room);
        let id = seed(&mut a, Rect::new(0.0, 0.0, 100.0, 50.0));

        a.down(50.0, 25.0);
        a.to(60.0, 25.0);
        let mut current = a.store.get(&id).cloned().unwrap();
        current.translate(Vec2::new(10.0, 0.0));
        a.interaction.object_modified(current, &mut a.store, &mut a.bridge);
        assert_eq!(a.store.get(&id).unwrap().bounds(), Rect::new(10.0, 0.0, 110.0, 50.0));
        assert!(matches!(a.interaction.state(), InteractionState::Moving { .. }));

        // The rest of the drag continues from the committed geometry.
        a.to(70.0, 25.0);
        a.up(70.0, 25.0);
        assert_eq!(a.store.get(&id).unwrap().bounds(), Rect::new(20.0, 0.0, 120.0, 50.0));
        assert_eq!(room.history_depth(), (3, 0));
    }

    #[test]
    fn test_remote_changes_rerender() {
        let room = MemoryRoom::new("remote");
        let mut a = Client::join(&room);
        let mut b = Client::join(&room);
        let id = seed(&mut a, Rect::new(0.0, 0.0, 10.0, 10.0));
        b.sync();
        assert!(b.bridge.engine().shape(&id).is_some());

        a.store.delete(id).unwrap();
        b.sync();
        assert!(b.bridge.engine().is_empty());
    }
}
