//! Text shape.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Font size given to newly placed text.
pub const DEFAULT_FONT_SIZE: f64 = 36.0;
/// Average glyph advance relative to the font size.
const CHAR_WIDTH_FACTOR: f64 = 0.55;
/// Line height relative to the font size.
const LINE_HEIGHT_FACTOR: f64 = 1.2;
/// Text boxes never get narrower than this, so empty text stays clickable.
const MIN_WIDTH: f64 = 20.0;

/// A block of text anchored at its top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub(crate) id: ShapeId,
    pub position: Point,
    pub content: String,
    pub font_size: f64,
    pub style: ShapeStyle,
}

impl Text {
    pub fn new(position: Point, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            content,
            font_size: DEFAULT_FONT_SIZE,
            style: ShapeStyle::default(),
        }
    }

    pub fn with_font_size(mut self, size: f64) -> Self {
        self.font_size = size;
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: String) {
        self.content = content;
    }

    /// Rough width estimate from the longest line.
    fn approximate_width(&self) -> f64 {
        let max_line_len = self
            .content
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        (max_line_len as f64 * self.font_size * CHAR_WIDTH_FACTOR).max(MIN_WIDTH)
    }

    fn approximate_height(&self) -> f64 {
        let mut line_count = self.content.lines().count().max(1);
        if self.content.ends_with('\n') {
            line_count += 1;
        }
        line_count as f64 * self.font_size * LINE_HEIGHT_FACTOR
    }
}

impl ShapeTrait for Text {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.approximate_width(), self.approximate_height()))
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.bounds().inflate(tolerance, tolerance).contains(point)
    }

    fn to_path(&self) -> BezPath {
        // Glyph outlines belong to the renderer; the box is enough for selection.
        self.bounds().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        let rect = affine.transform_rect_bbox(self.bounds());
        self.set_bounds(rect);
    }

    fn set_bounds(&mut self, rect: Rect) {
        let rect = rect.abs();
        let old_height = self.approximate_height();
        if old_height > f64::EPSILON && rect.height() > f64::EPSILON {
            self.font_size *= rect.height() / old_height;
        }
        self.position = rect.origin();
    }
}
