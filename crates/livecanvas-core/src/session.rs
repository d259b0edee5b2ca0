//! One client's session on a board.
//!
//! A [`Session`] owns everything a client needs: the viewport, the shape
//! store on top of a transport, the render bridge, the interaction state
//! machine, presence, the cursor mode and the reaction feed. Hosts feed it
//! input with [`Session::handle_event`], call [`Session::poll`] when network
//! traffic may have arrived and [`Session::tick`] from a timer.

use crate::config::SessionConfig;
use crate::cursor::CursorState;
use crate::error::{CoreError, CoreResult};
use crate::input::{InputEvent, KeyEvent, PointerEvent, PointerKind, validate_point};
use crate::interaction::Interaction;
use crate::presence::{PresenceChannel, PresencePatch, RemoteCursor};
use crate::reactions::{ReactionBroadcast, ReactionFeed};
use crate::render::{EngineEvent, EngineEventKind, RenderBridge, RenderEngine};
use crate::shapes::{Image, Shape, ShapeId};
use crate::store::ShapeStore;
use crate::subscription::Subscription;
use crate::tools::ToolKind;
use crate::transport::{BroadcastEvent, ConnectionId, MemoryRoom, MemoryTransport, Transport};
use crate::viewport::Viewport;
use kurbo::{Point, Size, Vec2};

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

pub struct Session<T: Transport, R: RenderEngine> {
    config: SessionConfig,
    viewport: Viewport,
    store: ShapeStore<T>,
    bridge: RenderBridge<R>,
    interaction: Interaction,
    presence: PresenceChannel,
    cursor: CursorState,
    reactions: ReactionFeed,
    broadcasts: Subscription<BroadcastEvent>,
    modified: Subscription<EngineEvent>,
    selection_cleared: Subscription<EngineEvent>,
    /// Last pointer position on the surface, virtual coordinates.
    pointer: Option<Point>,
    closed: bool,
}

impl<R: RenderEngine> Session<MemoryTransport, R> {
    /// Connect to an in-process room and open a session on it.
    pub fn join(room: &MemoryRoom, config: SessionConfig, engine: R) -> CoreResult<Self> {
        let transport = room.connect_with(config.offline)?;
        Self::open(config, transport, engine)
    }
}

impl<T: Transport, R: RenderEngine> Session<T, R> {
    pub fn open(config: SessionConfig, transport: T, engine: R) -> CoreResult<Self> {
        config.validate()?;
        if transport.room_id() != config.room_id {
            log::warn!(
                "Session configured for room {} but transport is in {}",
                config.room_id,
                transport.room_id()
            );
        }

        let store = ShapeStore::new(transport);
        let mut presence = PresenceChannel::new(config.presence_throttle());
        presence.attach(store.transport());
        let broadcasts = store.transport().subscribe_to_broadcast();
        let modified = engine.on(EngineEventKind::ObjectModified);
        let selection_cleared = engine.on(EngineEventKind::SelectionCleared);

        let mut session = Self {
            viewport: Viewport::from_config(&config),
            interaction: Interaction::new(config.zero_size),
            reactions: ReactionFeed::from_config(&config),
            config,
            store,
            bridge: RenderBridge::new(engine),
            presence,
            cursor: CursorState::default(),
            broadcasts,
            modified,
            selection_cleared,
            pointer: None,
            closed: false,
        };
        session.poll(Instant::now());
        log::info!(
            "Joined room {} as connection {}",
            session.store.transport().room_id(),
            session.connection_id()
        );
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.store.transport().connection_id()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn store(&self) -> &ShapeStore<T> {
        &self.store
    }

    pub fn bridge(&self) -> &RenderBridge<R> {
        &self.bridge
    }

    pub fn engine(&self) -> &R {
        self.bridge.engine()
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.presence.cursors()
    }

    pub fn reactions(&self) -> &ReactionFeed {
        &self.reactions
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_tool(&mut self, tool: ToolKind) {
        self.interaction.set_tool(tool, &mut self.store, &mut self.bridge);
    }

    /// Pick a reaction from the selector.
    pub fn select_reaction(&mut self, value: impl Into<String>) {
        self.cursor.select_reaction(value);
    }

    /// Feed one input event. Only malformed input is reported as an
    /// error; everything else is handled or logged.
    pub fn handle_event(&mut self, event: impl Into<InputEvent>, now: Instant) -> CoreResult<()> {
        if self.closed {
            log::debug!("Ignoring input on a closed session");
            return Ok(());
        }
        match event.into() {
            InputEvent::Pointer(mut pointer) => {
                pointer.validate()?;
                // The engine mapping and the viewport may still produce
                // garbage from a finite raw position.
                pointer.position = self.bridge.engine().get_pointer(pointer.position);
                validate_point(pointer.position)?;
                validate_point(self.viewport.to_virtual(pointer.position))?;
                self.on_pointer(pointer, now);
            }
            InputEvent::Wheel(wheel) => {
                wheel.validate()?;
                let position = self.bridge.engine().get_pointer(wheel.position);
                validate_point(position)?;
                self.viewport.zoom_wheel(position, wheel.delta_y);
            }
            InputEvent::Key(key) => self.on_key(&key),
        }
        self.tick(now);
        Ok(())
    }

    /// `event.position` is already in surface coordinates.
    fn on_pointer(&mut self, event: PointerEvent, now: Instant) {
        let panned = self.viewport.handle_pointer(&event);
        if event.kind == PointerKind::Leave {
            self.pointer = None;
            let patch = self.cursor.on_pointer_leave();
            self.presence.update(patch);
            return;
        }
        if panned {
            return;
        }

        let point = self.viewport.to_virtual(event.position);
        self.pointer = Some(point);
        match event.kind {
            PointerKind::Down => {
                if self.cursor.on_pointer_down() {
                    self.emit_reaction(now);
                    return;
                }
                self.interaction.pointer_down(
                    point,
                    event.modifiers,
                    self.viewport.scale,
                    &mut self.store,
                    &mut self.bridge,
                );
            }
            PointerKind::Move => {
                if self.cursor != CursorState::ReactionSelector {
                    self.presence.update(PresencePatch::cursor(Some(point)));
                }
                self.interaction.pointer_move(point, &self.store, &mut self.bridge);
            }
            PointerKind::Up => {
                if self.cursor.on_pointer_up() {
                    self.reactions.release();
                    return;
                }
                self.interaction.pointer_up(point, &mut self.store, &mut self.bridge);
            }
            PointerKind::Leave => {}
        }
    }

    fn on_key(&mut self, event: &KeyEvent) {
        // Text editing owns the keyboard, cursor shortcuts included.
        if !self.interaction.is_editing_text() {
            let outcome = self.cursor.on_key(event);
            if let Some(patch) = outcome.presence {
                self.presence.update(patch);
            }
            if outcome.consumed {
                return;
            }
        }
        self.interaction.on_key(event, &mut self.store, &mut self.bridge);
    }

    /// Fire the held reaction if its interval has passed.
    fn emit_reaction(&mut self, now: Instant) {
        let (Some(value), Some(position)) = (self.cursor.reaction(), self.pointer) else {
            return;
        };
        if !self.reactions.should_emit(now) {
            return;
        }
        let reaction = ReactionBroadcast {
            x: position.x,
            y: position.y,
            value: value.to_string(),
        };
        self.reactions.push(position, reaction.value.clone(), now);
        match serde_json::to_value(&reaction) {
            Ok(payload) => {
                if let Err(e) = self.store.transport_mut().broadcast(payload) {
                    log::debug!("Reaction not broadcast: {e}");
                }
            }
            Err(e) => log::warn!("Failed to encode reaction: {e}"),
        }
    }

    /// Timers: reaction sweep and emission, throttled presence.
    pub fn tick(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        self.reactions.tick(now);
        if self.cursor.is_emitting() {
            self.emit_reaction(now);
        }
        self.presence.flush(self.store.transport_mut(), now);
    }

    /// Process inbound traffic and engine events, then re-render. Returns
    /// the number of transport messages handled.
    pub fn poll(&mut self, now: Instant) -> usize {
        if self.closed {
            return 0;
        }
        let handled = self.store.transport_mut().poll().unwrap_or_else(|e| {
            log::warn!("Poll failed: {e}");
            0
        });
        self.store.refresh();
        self.interaction.retain_existing(&self.store);
        self.interaction.render(&self.store, &mut self.bridge);
        self.presence.sync_remote();

        for event in self.broadcasts.drain() {
            self.reactions.receive(&event.payload, now);
        }
        for event in self.modified.drain() {
            if let EngineEvent::ObjectModified { shape } = event {
                self.interaction.object_modified(shape, &mut self.store, &mut self.bridge);
            }
        }
        if !self.selection_cleared.drain().is_empty() {
            self.interaction.clear_selection();
        }
        handled
    }

    pub fn undo(&mut self) -> bool {
        self.interaction.undo(&mut self.store, &mut self.bridge)
    }

    pub fn redo(&mut self) -> bool {
        self.interaction.redo(&mut self.store, &mut self.bridge)
    }

    pub fn delete_selection(&mut self) {
        self.interaction.delete_selection(&mut self.store, &mut self.bridge);
    }

    /// Remove every shape in the room. Returns true iff the board is empty
    /// afterwards.
    pub fn reset_canvas(&mut self) -> CoreResult<bool> {
        self.interaction.abandon(&self.store, &mut self.bridge);
        let cleared = self.store.delete_all();
        self.interaction.render(&self.store, &mut self.bridge);
        cleared
    }

    /// Copies of the selected shapes, for a host clipboard.
    pub fn copy_selection(&self) -> Vec<Shape> {
        self.interaction
            .selection()
            .iter()
            .filter_map(|id| self.store.get(id).cloned())
            .collect()
    }

    /// Insert copies of `shapes` with fresh ids, shifted by `offset`, and
    /// select them.
    pub fn paste(&mut self, shapes: Vec<Shape>, offset: Vec2) -> CoreResult<Vec<ShapeId>> {
        validate_point(offset.to_point())?;
        let pasted: Vec<Shape> = shapes
            .into_iter()
            .map(|mut shape| {
                shape.regenerate_id();
                shape.translate(offset);
                shape
            })
            .collect();
        let ids: Vec<ShapeId> = self.store.transact(|tx| {
            pasted
                .into_iter()
                .filter_map(|shape| {
                    let id = shape.id();
                    tx.set(shape).then_some(id)
                })
                .collect()
        })?;
        self.interaction.select(ids.clone());
        self.interaction.render(&self.store, &mut self.bridge);
        Ok(ids)
    }

    /// Place an encoded image with its top-left corner at `at` (real
    /// coordinates), scaled to fit within `max_size`.
    pub fn insert_image(&mut self, data: &[u8], size: Size, at: Point, max_size: Size) -> CoreResult<ShapeId> {
        validate_point(at)?;
        let position = self.viewport.to_virtual(at);
        validate_point(position)?;
        let image = Image::from_bytes(position, data, size.width, size.height)
            .ok_or(CoreError::UnsupportedImage)?
            .fit_within(max_size.width, max_size.height);
        let shape = Shape::from(image);
        let id = shape.id();
        if !self.store.set(shape)? {
            return Err(CoreError::UnsupportedImage);
        }
        self.interaction.select(vec![id]);
        self.interaction.render(&self.store, &mut self.bridge);
        Ok(id)
    }

    /// Leave the room. Any shape being drawn is discarded and presence is
    /// torn down; the shared map is left exactly as it is.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.interaction.abandon(&self.store, &mut self.bridge);
        self.cursor = CursorState::Hidden;
        self.pointer = None;
        self.presence.teardown();
        self.reactions.clear();
        self.store.transport_mut().disconnect();
        self.closed = true;
        log::info!("Left room {}", self.config.room_id);
    }

    /// Rejoin after [`Session::close`] or a dropped connection.
    pub fn reconnect(&mut self, now: Instant) -> CoreResult<()> {
        self.store.transport_mut().reconnect()?;
        self.store.resync();
        self.presence.attach(self.store.transport());
        self.closed = false;
        self.poll(now);
        Ok(())
    }
}
