//! Error kinds surfaced by the core.

use crate::shapes::ShapeId;
use thiserror::Error;

/// Errors produced by the store, interaction and session layers.
///
/// Most of these are caught at the session boundary and logged; the
/// interaction state machine never aborts because of one.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("Invalid shape id: {0}")]
    InvalidShapeId(ShapeId),
    #[error("Malformed pointer input at ({x}, {y})")]
    MalformedPointerInput { x: f64, y: f64 },
    #[error("Shape {0} was deleted by a peer during the gesture")]
    ConcurrentDeleteRace(ShapeId),
    #[error("Unsupported image data")]
    UnsupportedImage,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Replica error: {0}")]
    Replica(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
