//! Selection handles and the geometry of handle-driven resizing.

use crate::shapes::{Shape, ShapeId};
use kurbo::{Point, Rect, Vec2};

/// Handle size in screen pixels.
pub const HANDLE_SIZE: f64 = 16.0;

/// Hit radius for handles in screen pixels. Divide by the viewport scale
/// before testing against virtual coordinates.
pub const HANDLE_HIT_TOLERANCE: f64 = 12.0;

/// Which corner of a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Which edge of a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Corner(Corner),
    Edge(Edge),
}

/// A handle drawn around the selected shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Check if a point (virtual coordinates) hits this handle.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

/// Get the selection handles for a shape.
pub fn get_handles(shape: &Shape) -> Vec<Handle> {
    let bounds = shape.bounds();
    match shape {
        // Text scales uniformly with its font, so edges make no sense.
        Shape::Text(_) => corner_handles(bounds),
        Shape::Rectangle(_) | Shape::Ellipse(_) | Shape::Path(_) | Shape::Image(_) => {
            let mut handles = corner_handles(bounds);
            handles.extend(edge_handles(bounds));
            handles
        }
    }
}

fn corner_handles(bounds: Rect) -> Vec<Handle> {
    vec![
        Handle::new(
            Point::new(bounds.x0, bounds.y0),
            HandleKind::Corner(Corner::TopLeft),
        ),
        Handle::new(
            Point::new(bounds.x1, bounds.y0),
            HandleKind::Corner(Corner::TopRight),
        ),
        Handle::new(
            Point::new(bounds.x0, bounds.y1),
            HandleKind::Corner(Corner::BottomLeft),
        ),
        Handle::new(
            Point::new(bounds.x1, bounds.y1),
            HandleKind::Corner(Corner::BottomRight),
        ),
    ]
}

fn edge_handles(bounds: Rect) -> Vec<Handle> {
    let center = bounds.center();
    vec![
        Handle::new(Point::new(center.x, bounds.y0), HandleKind::Edge(Edge::Top)),
        Handle::new(Point::new(bounds.x1, center.y), HandleKind::Edge(Edge::Right)),
        Handle::new(Point::new(center.x, bounds.y1), HandleKind::Edge(Edge::Bottom)),
        Handle::new(Point::new(bounds.x0, center.y), HandleKind::Edge(Edge::Left)),
    ]
}

/// Find which handle (if any) is hit at the given point.
/// Corners win over edges when both are in reach.
pub fn hit_test_handles(shape: &Shape, point: Point, tolerance: f64) -> Option<HandleKind> {
    get_handles(shape)
        .into_iter()
        .find(|handle| handle.hit_test(point, tolerance))
        .map(|handle| handle.kind)
}

/// State of an in-progress move or resize of one shape.
#[derive(Debug, Clone)]
pub struct ManipulationState {
    pub shape_id: ShapeId,
    /// The handle being dragged (None = moving the whole shape).
    pub handle: Option<HandleKind>,
    pub start_point: Point,
    pub current_point: Point,
    /// Geometry at the start of the gesture; every update is computed from it.
    pub original_shape: Shape,
}

impl ManipulationState {
    pub fn new(handle: Option<HandleKind>, start_point: Point, original_shape: Shape) -> Self {
        Self {
            shape_id: original_shape.id(),
            handle,
            start_point,
            current_point: start_point,
            original_shape,
        }
    }

    pub fn delta(&self) -> Vec2 {
        self.current_point - self.start_point
    }

    /// The shape as it should look at the current pointer position.
    pub fn preview(&self) -> Shape {
        apply_manipulation(&self.original_shape, self.handle, self.delta())
    }
}

/// Move the side(s) of `bounds` that `handle` controls by `delta`.
/// The result is normalized, so dragging past the opposite side flips it.
pub fn resize_bounds(bounds: Rect, handle: HandleKind, delta: Vec2) -> Rect {
    let Rect {
        mut x0,
        mut y0,
        mut x1,
        mut y1,
    } = bounds;
    match handle {
        HandleKind::Corner(Corner::TopLeft) => {
            x0 += delta.x;
            y0 += delta.y;
        }
        HandleKind::Corner(Corner::TopRight) => {
            x1 += delta.x;
            y0 += delta.y;
        }
        HandleKind::Corner(Corner::BottomLeft) => {
            x0 += delta.x;
            y1 += delta.y;
        }
        HandleKind::Corner(Corner::BottomRight) => {
            x1 += delta.x;
            y1 += delta.y;
        }
        HandleKind::Edge(Edge::Top) => y0 += delta.y,
        HandleKind::Edge(Edge::Right) => x1 += delta.x,
        HandleKind::Edge(Edge::Bottom) => y1 += delta.y,
        HandleKind::Edge(Edge::Left) => x0 += delta.x,
    }
    Rect::new(x0, y0, x1, y1).abs()
}

/// Apply a move (no handle) or a resize (handle) to a copy of `shape`.
pub fn apply_manipulation(shape: &Shape, handle: Option<HandleKind>, delta: Vec2) -> Shape {
    let mut shape = shape.clone();
    match handle {
        None => shape.translate(delta),
        Some(handle) => {
            let bounds = resize_bounds(shape.bounds(), handle, delta);
            shape.set_bounds(bounds);
        }
    }
    shape
}
