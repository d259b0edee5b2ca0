//! LiveCanvas Core Library
//!
//! Replicated shape store, interaction state machine, viewport, presence and
//! reactions for the LiveCanvas collaborative board. Rendering and networking
//! sit behind the [`render::RenderEngine`] and [`transport::Transport`] traits.

pub mod config;
pub mod cursor;
pub mod error;
pub mod input;
pub mod interaction;
pub mod presence;
pub mod reactions;
pub mod render;
pub mod replica;
pub mod selection;
pub mod session;
pub mod shapes;
pub mod store;
pub mod subscription;
pub mod sync;
pub mod tools;
pub mod transport;
pub mod viewport;

pub use config::{OfflinePolicy, SessionConfig, ZeroSizePolicy};
pub use cursor::CursorState;
pub use error::{CoreError, CoreResult};
pub use input::{InputEvent, Key, KeyEvent, Modifiers, MouseButton, PointerEvent, PointerKind, WheelEvent};
pub use interaction::{Interaction, InteractionState};
pub use presence::{PresenceChannel, PresencePatch, PresenceRecord, RemoteCursor};
pub use reactions::{ReactionEvent, ReactionFeed};
pub use render::{EngineEvent, EngineEventKind, HeadlessRenderer, RenderBridge, RenderEngine};
pub use selection::{Handle, HandleKind, ManipulationState};
pub use session::Session;
pub use shapes::{Shape, ShapeId};
pub use store::{ShapeStore, Transaction};
pub use subscription::{EventHub, Subscription};
pub use tools::{ToolKind, ToolManager};
pub use transport::{ConnectionState, MemoryRoom, MemoryTransport, Transport, TransportError};
pub use viewport::Viewport;
