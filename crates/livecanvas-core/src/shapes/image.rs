//! Image shape for pasted or uploaded raster images.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use base64::{Engine, engine::general_purpose::STANDARD};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encoding of the embedded image bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// Detect format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }
        None
    }
}

/// A raster image placed on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub(crate) id: ShapeId,
    /// Top-left corner position.
    pub position: Point,
    /// Display width.
    pub width: f64,
    /// Display height.
    pub height: f64,
    pub format: ImageFormat,
    /// Image bytes, base64 encoded so the record stays plain JSON.
    pub data_base64: String,
    /// Stroke is used for an optional border.
    pub style: ShapeStyle,
}

impl Image {
    /// Build an image from raw bytes, sniffing the format. Returns None for
    /// unsupported encodings.
    pub fn from_bytes(position: Point, data: &[u8], width: f64, height: f64) -> Option<Self> {
        let format = ImageFormat::from_magic_bytes(data)?;
        Some(Self {
            id: Uuid::new_v4(),
            position,
            width,
            height,
            format,
            data_base64: STANDARD.encode(data),
            style: ShapeStyle::default(),
        })
    }

    /// Build an image from a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(position: Point, uri: &str, width: f64, height: f64) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (mime, payload) = rest.split_once(";base64,")?;
        let format = ImageFormat::from_mime_type(mime)?;
        STANDARD.decode(payload).ok()?;
        Some(Self {
            id: Uuid::new_v4(),
            position,
            width,
            height,
            format,
            data_base64: payload.to_string(),
            style: ShapeStyle::default(),
        })
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.data_base64)
    }

    /// Raw image bytes.
    pub fn data(&self) -> Option<Vec<u8>> {
        STANDARD.decode(&self.data_base64).ok()
    }

    /// Scale down to fit within the given box, keeping the aspect ratio.
    pub fn fit_within(mut self, max_width: f64, max_height: f64) -> Self {
        if self.width <= max_width && self.height <= max_height {
            return self;
        }
        let scale = (max_width / self.width).min(max_height / self.height);
        self.width *= scale;
        self.height *= scale;
        self
    }

    pub fn as_rect(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }
}

impl ShapeTrait for Image {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        self.as_rect()
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.as_rect().inflate(tolerance, tolerance).contains(point)
    }

    fn to_path(&self) -> BezPath {
        self.as_rect().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        let rect = affine.transform_rect_bbox(self.as_rect());
        self.set_bounds(rect);
    }

    fn set_bounds(&mut self, rect: Rect) {
        let rect = rect.abs();
        self.position = rect.origin();
        self.width = rect.width();
        self.height = rect.height();
    }
}
