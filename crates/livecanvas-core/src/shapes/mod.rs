//! Shape records stored in the shared map.

mod ellipse;
mod image;
mod path;
mod rectangle;
mod text;

pub use ellipse::Ellipse;
pub use image::{Image, ImageFormat};
pub use path::{Path, SIMPLIFY_TOLERANCE};
pub use rectangle::Rectangle;
pub use text::Text;

use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for shapes. Generated on the client that creates the shape.
pub type ShapeId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        match digits.len() {
            3 => {
                let mut out = [0u8; 3];
                for (i, c) in digits.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                Some(Self::new(out[0], out[1], out[2], 255))
            }
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// `#rrggbb`, with an alpha pair only when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Style properties for shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
    /// Fill color (None = transparent).
    #[serde(default)]
    pub fill_color: Option<SerializableColor>,
}

impl ShapeStyle {
    /// Get the stroke color as a peniko Color.
    pub fn stroke(&self) -> Color {
        self.stroke_color.into()
    }

    /// Get the fill color as a peniko Color.
    pub fn fill(&self) -> Option<Color> {
        self.fill_color.map(|c| c.into())
    }

    /// Set the stroke color from a peniko Color.
    pub fn set_stroke(&mut self, color: Color) {
        self.stroke_color = color.into();
    }

    /// Set the fill color from a peniko Color.
    pub fn set_fill(&mut self, color: Option<Color>) {
        self.fill_color = color.map(|c| c.into());
    }
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            fill_color: None,
        }
    }
}

/// Distance from a point to a line segment (a->b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = Vec2::new(b.x - a.x, b.y - a.y);
    let pv = Vec2::new(point.x - a.x, point.y - a.y);
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * seg.x, a.y + t * seg.y);
    (point - proj).hypot()
}

/// Common behavior of every shape variant.
pub trait ShapeTrait {
    /// Get the unique identifier.
    fn id(&self) -> ShapeId;

    /// Get the bounding box in virtual coordinates.
    fn bounds(&self) -> Rect;

    /// Check if a point (in virtual coordinates) hits this shape.
    fn hit_test(&self, point: Point, tolerance: f64) -> bool;

    /// Get the path representation for rendering.
    fn to_path(&self) -> BezPath;

    /// Get the style.
    fn style(&self) -> &ShapeStyle;

    /// Get mutable style.
    fn style_mut(&mut self) -> &mut ShapeStyle;

    /// Apply a transform to this shape.
    fn transform(&mut self, affine: Affine);

    /// Fit the shape's geometry into `rect`.
    fn set_bounds(&mut self, rect: Rect);
}

/// A shape record. Serialized with a `type` tag, and the serialized form is
/// what gets replicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Rectangle(Rectangle),
    Ellipse(Ellipse),
    Path(Path),
    Text(Text),
    Image(Image),
}

impl Shape {
    pub fn id(&self) -> ShapeId {
        match self {
            Shape::Rectangle(s) => s.id(),
            Shape::Ellipse(s) => s.id(),
            Shape::Path(s) => s.id(),
            Shape::Text(s) => s.id(),
            Shape::Image(s) => s.id(),
        }
    }

    /// Name of the variant, as it appears in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Rectangle(_) => "rectangle",
            Shape::Ellipse(_) => "ellipse",
            Shape::Path(_) => "path",
            Shape::Text(_) => "text",
            Shape::Image(_) => "image",
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Shape::Rectangle(s) => s.bounds(),
            Shape::Ellipse(s) => s.bounds(),
            Shape::Path(s) => s.bounds(),
            Shape::Text(s) => s.bounds(),
            Shape::Image(s) => s.bounds(),
        }
    }

    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        match self {
            Shape::Rectangle(s) => s.hit_test(point, tolerance),
            Shape::Ellipse(s) => s.hit_test(point, tolerance),
            Shape::Path(s) => s.hit_test(point, tolerance),
            Shape::Text(s) => s.hit_test(point, tolerance),
            Shape::Image(s) => s.hit_test(point, tolerance),
        }
    }

    pub fn to_path(&self) -> BezPath {
        match self {
            Shape::Rectangle(s) => s.to_path(),
            Shape::Ellipse(s) => s.to_path(),
            Shape::Path(s) => s.to_path(),
            Shape::Text(s) => s.to_path(),
            Shape::Image(s) => s.to_path(),
        }
    }

    pub fn style(&self) -> &ShapeStyle {
        match self {
            Shape::Rectangle(s) => s.style(),
            Shape::Ellipse(s) => s.style(),
            Shape::Path(s) => s.style(),
            Shape::Text(s) => s.style(),
            Shape::Image(s) => s.style(),
        }
    }

    pub fn style_mut(&mut self) -> &mut ShapeStyle {
        match self {
            Shape::Rectangle(s) => s.style_mut(),
            Shape::Ellipse(s) => s.style_mut(),
            Shape::Path(s) => s.style_mut(),
            Shape::Text(s) => s.style_mut(),
            Shape::Image(s) => s.style_mut(),
        }
    }

    pub fn transform(&mut self, affine: Affine) {
        match self {
            Shape::Rectangle(s) => s.transform(affine),
            Shape::Ellipse(s) => s.transform(affine),
            Shape::Path(s) => s.transform(affine),
            Shape::Text(s) => s.transform(affine),
            Shape::Image(s) => s.transform(affine),
        }
    }

    pub fn set_bounds(&mut self, rect: Rect) {
        match self {
            Shape::Rectangle(s) => s.set_bounds(rect),
            Shape::Ellipse(s) => s.set_bounds(rect),
            Shape::Path(s) => s.set_bounds(rect),
            Shape::Text(s) => s.set_bounds(rect),
            Shape::Image(s) => s.set_bounds(rect),
        }
    }

    /// Move the shape by `delta`.
    pub fn translate(&mut self, delta: Vec2) {
        self.transform(Affine::translate(delta));
    }

    /// True when the shape covers no area on either axis.
    pub fn is_zero_size(&self) -> bool {
        let bounds = self.bounds();
        bounds.width() < f64::EPSILON && bounds.height() < f64::EPSILON
    }

    /// True when every coordinate and size is a finite number. JSON has no
    /// NaN or infinity, so anything else cannot be replicated.
    pub fn is_finite(&self) -> bool {
        let point = |p: &Point| p.x.is_finite() && p.y.is_finite();
        let geometry = match self {
            Shape::Rectangle(s) => point(&s.position) && s.width.is_finite() && s.height.is_finite(),
            Shape::Ellipse(s) => point(&s.center) && s.radius_x.is_finite() && s.radius_y.is_finite(),
            Shape::Path(s) => s.points.iter().all(point),
            Shape::Text(s) => point(&s.position) && s.font_size.is_finite(),
            Shape::Image(s) => point(&s.position) && s.width.is_finite() && s.height.is_finite(),
        };
        geometry && self.style().stroke_width.is_finite()
    }

    /// Test if this shape intersects a selection rectangle.
    pub fn intersects_rect(&self, rect: Rect) -> bool {
        match self {
            Shape::Path(p) => p.intersects_rect(rect),
            _ => {
                let bounds = self.bounds();
                rect.intersect(bounds.inflate(1.0, 1.0)).area() > 0.0
            }
        }
    }

    /// Give the shape a fresh identifier, for pasted copies.
    pub fn regenerate_id(&mut self) {
        let new_id = Uuid::new_v4();
        match self {
            Shape::Rectangle(s) => s.id = new_id,
            Shape::Ellipse(s) => s.id = new_id,
            Shape::Path(s) => s.id = new_id,
            Shape::Text(s) => s.id = new_id,
            Shape::Image(s) => s.id = new_id,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Shape::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut Text> {
        match self {
            Shape::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Serialize to the JSON record stored in the shared map.
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a JSON record from the shared map.
    pub fn from_record(record: &str) -> serde_json::Result<Self> {
        serde_json::from_str(record)
    }
}

impl From<Rectangle> for Shape {
    fn from(s: Rectangle) -> Self {
        Shape::Rectangle(s)
    }
}

impl From<Ellipse> for Shape {
    fn from(s: Ellipse) -> Self {
        Shape::Ellipse(s)
    }
}

impl From<Path> for Shape {
    fn from(s: Path) -> Self {
        Shape::Path(s)
    }
}

impl From<Text> for Shape {
    fn from(s: Text) -> Self {
        Shape::Text(s)
    }
}

impl From<Image> for Shape {
    fn from(s: Image) -> Self {
        Shape::Image(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_carries_type_tag() {
        let shape = Shape::from(Rectangle::new(Point::new(10.0, 10.0), 100.0, 50.0));
        let record = shape.to_record().unwrap();
        let value: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(value["type"], "rectangle");
        assert_eq!(value["id"], shape.id().to_string());

        let parsed = Shape::from_record(&record).unwrap();
        assert_eq!(parsed, shape);
    }

    #[test]
    fn test_default_style() {
        let style = ShapeStyle::default();
        assert_eq!(style.stroke_color, SerializableColor::black());
        assert!((style.stroke_width - 2.0).abs() < f64::EPSILON);
        assert!(style.fill_color.is_none());
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(SerializableColor::from_hex("#DC2626"), Some(SerializableColor::new(0xdc, 0x26, 0x26, 255)));
        assert_eq!(SerializableColor::from_hex("#fff"), Some(SerializableColor::white()));
        assert_eq!(SerializableColor::from_hex("#00000000"), Some(SerializableColor::transparent()));
        assert_eq!(SerializableColor::from_hex("DC2626"), None);
        assert_eq!(SerializableColor::from_hex("#zzzzzz"), None);
        assert_eq!(SerializableColor::new(1, 2, 3, 255).to_hex(), "#010203");
    }

    #[test]
    fn test_peniko_conversion() {
        let color = SerializableColor::new(12, 34, 56, 78);
        let peniko_color: Color = color.into();
        assert_eq!(SerializableColor::from(peniko_color), color);
    }

    #[test]
    fn test_zero_size() {
        let point = Shape::from(Rectangle::new(Point::new(5.0, 5.0), 0.0, 0.0));
        assert!(point.is_zero_size());
        let line = Shape::from(Rectangle::new(Point::new(5.0, 5.0), 100.0, 0.0));
        assert!(!line.is_zero_size());
    }

    #[test]
    fn test_is_finite() {
        assert!(Shape::from(Rectangle::new(Point::new(5.0, 5.0), 10.0, 10.0)).is_finite());
        assert!(!Shape::from(Rectangle::new(Point::new(f64::NAN, 0.0), 5.0, 5.0)).is_finite());
        assert!(!Shape::from(Ellipse::new(Point::ZERO, f64::INFINITY, 1.0)).is_finite());
        let path = Path::from_points(vec![Point::ZERO, Point::new(1.0, f64::NEG_INFINITY)]);
        assert!(!Shape::from(path).is_finite());

        let mut shape = Shape::from(Rectangle::new(Point::ZERO, 10.0, 10.0));
        shape.translate(Vec2::new(f64::NAN, 0.0));
        assert!(!shape.is_finite());
    }

    #[test]
    fn test_translate_and_set_bounds() {
        let mut shape = Shape::from(Ellipse::new(Point::new(50.0, 50.0), 10.0, 20.0));
        shape.translate(Vec2::new(5.0, -5.0));
        assert_eq!(shape.bounds(), Rect::new(45.0, 25.0, 65.0, 65.0));

        shape.set_bounds(Rect::new(0.0, 0.0, 40.0, 10.0));
        assert_eq!(shape.bounds(), Rect::new(0.0, 0.0, 40.0, 10.0));
    }

    #[test]
    fn test_regenerate_id() {
        let mut shape = Shape::from(Text::new(Point::ORIGIN, "hi".to_string()));
        let old = shape.id();
        shape.regenerate_id();
        assert_ne!(shape.id(), old);
    }

    #[test]
    fn test_intersects_rect() {
        let shape = Shape::from(Rectangle::new(Point::new(10.0, 10.0), 20.0, 20.0));
        assert!(shape.intersects_rect(Rect::new(0.0, 0.0, 15.0, 15.0)));
        assert!(!shape.intersects_rect(Rect::new(100.0, 100.0, 150.0, 150.0)));
    }
}
