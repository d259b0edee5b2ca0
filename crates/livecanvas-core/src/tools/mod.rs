//! Drawing tools and the transient shape they produce.

use crate::shapes::{Ellipse, Path, Rectangle, SIMPLIFY_TOLERANCE, Shape, ShapeStyle, Text};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Select,
    Rectangle,
    Ellipse,
    Path,
    Text,
}

impl ToolKind {
    /// Tools that create a shape on pointer-down.
    pub fn is_drawing(&self) -> bool {
        !matches!(self, ToolKind::Select)
    }
}

/// State of a tool interaction.
#[derive(Debug, Clone, Default)]
pub enum ToolState {
    #[default]
    Idle,
    /// A shape is being drawn.
    Active {
        /// Where the pointer went down.
        start: Point,
        /// Latest pointer position.
        current: Point,
        /// The transient shape, shown locally but not committed.
        preview: Shape,
    },
}

/// Current tool, its style, and the shape it's drawing.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    pub current_tool: ToolKind,
    pub state: ToolState,
    /// Style applied to new shapes.
    pub current_style: ShapeStyle,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch tools, abandoning any shape in progress.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
        self.state = ToolState::Idle;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ToolState::Active { .. })
    }

    /// Start drawing at `point` (virtual coordinates). Returns the new
    /// zero-size transient shape, or None for the select tool.
    pub fn begin(&mut self, point: Point) -> Option<&Shape> {
        let mut shape: Shape = match self.current_tool {
            ToolKind::Select => return None,
            ToolKind::Rectangle => Rectangle::new(point, 0.0, 0.0).into(),
            ToolKind::Ellipse => Ellipse::new(point, 0.0, 0.0).into(),
            ToolKind::Path => Path::new(point).into(),
            ToolKind::Text => Text::new(point, String::new()).into(),
        };
        *shape.style_mut() = self.current_style.clone();
        self.state = ToolState::Active {
            start: point,
            current: point,
            preview: shape,
        };
        self.preview_shape()
    }

    /// Follow the pointer. Box shapes span the anchor and the pointer;
    /// paths collect the point.
    pub fn update(&mut self, point: Point) -> Option<&Shape> {
        let ToolState::Active {
            start,
            current,
            preview,
        } = &mut self.state
        else {
            return None;
        };
        *current = point;
        match &mut *preview {
            Shape::Path(path) => path.add_point(point),
            // Text keeps its anchor; the box follows the content.
            Shape::Text(_) => {}
            shape => shape.set_bounds(Rect::from_points(*start, point)),
        }
        Some(&*preview)
    }

    /// Finish drawing and hand back the shape to commit.
    pub fn end(&mut self) -> Option<Shape> {
        match std::mem::take(&mut self.state) {
            ToolState::Active { mut preview, .. } => {
                if let Shape::Path(path) = &mut preview {
                    path.simplify(SIMPLIFY_TOLERANCE);
                }
                Some(preview)
            }
            ToolState::Idle => None,
        }
    }

    /// Abandon the shape in progress.
    pub fn cancel(&mut self) -> Option<Shape> {
        match std::mem::take(&mut self.state) {
            ToolState::Active { preview, .. } => Some(preview),
            ToolState::Idle => None,
        }
    }

    pub fn preview_shape(&self) -> Option<&Shape> {
        match &self.state {
            ToolState::Active { preview, .. } => Some(preview),
            ToolState::Idle => None,
        }
    }
}
