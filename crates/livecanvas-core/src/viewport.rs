//! Viewport module for pan/zoom transforms.
//!
//! The viewport is client-local. Real coordinates are what the pointer
//! reports; virtual coordinates are where shapes live.

use crate::config::{DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE, SessionConfig};
use crate::input::{MouseButton, PointerEvent, PointerKind};
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Zoom factor for one wheel notch toward the user (zoom out).
pub const WHEEL_ZOOM_OUT: f64 = 0.9;
/// Zoom factor for one wheel notch away from the user (zoom in).
pub const WHEEL_ZOOM_IN: f64 = 1.1;

/// Scale and offset mapping real pointer coordinates onto the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Current translation offset (pan), in real pixels.
    pub offset: Vec2,
    /// Current scale factor.
    pub scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Last pointer position of an active pan gesture.
    #[serde(skip)]
    pan_anchor: Option<Point>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            pan_anchor: None,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            ..Self::default()
        }
    }

    /// Virtual-to-real transform, for renderers.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale)
    }

    /// Real-to-virtual transform.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.offset)
    }

    /// Convert a real point to virtual coordinates.
    pub fn to_virtual(&self, real: Point) -> Point {
        Point::new(
            (real.x - self.offset.x) / self.scale,
            (real.y - self.offset.y) / self.scale,
        )
    }

    /// Convert a virtual point to real coordinates.
    pub fn to_real(&self, virt: Point) -> Point {
        Point::new(virt.x * self.scale + self.offset.x, virt.y * self.scale + self.offset.y)
    }

    /// Pan by a delta in real coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom by `factor`, keeping the board point under `real` fixed.
    pub fn zoom_at(&mut self, real: Point, factor: f64) {
        let new_scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return;
        }

        let virt = self.to_virtual(real);
        let change = new_scale - self.scale;
        self.offset -= Vec2::new(virt.x * change, virt.y * change);
        self.scale = new_scale;
    }

    /// One wheel notch: zoom out when scrolling down, in otherwise.
    pub fn zoom_wheel(&mut self, real: Point, delta_y: f64) {
        let factor = if delta_y > 0.0 { WHEEL_ZOOM_OUT } else { WHEEL_ZOOM_IN };
        self.zoom_at(real, factor);
    }

    /// Feed a pointer event to the pan gesture. Returns true when the
    /// event belongs to the gesture and must not reach the interaction layer.
    ///
    /// A pan starts on pointer-down with the middle button or Alt held, and
    /// ends on pointer-up or when the pointer leaves the surface.
    pub fn handle_pointer(&mut self, event: &PointerEvent) -> bool {
        match event.kind {
            PointerKind::Down => {
                if event.button == MouseButton::Middle || event.modifiers.alt {
                    self.pan_anchor = Some(event.position);
                    return true;
                }
                false
            }
            PointerKind::Move => match self.pan_anchor {
                Some(last) => {
                    self.pan(event.position - last);
                    self.pan_anchor = Some(event.position);
                    true
                }
                None => false,
            },
            PointerKind::Up | PointerKind::Leave => self.pan_anchor.take().is_some(),
        }
    }

    pub fn is_panning(&self) -> bool {
        self.pan_anchor.is_some()
    }

    /// Back to identity.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.scale = 1.0;
        self.pan_anchor = None;
    }

    /// Fit the viewport to show the given virtual bounds.
    pub fn fit_to_bounds(&mut self, bounds: Rect, viewport: Size, padding: f64) {
        if bounds.is_zero_area() {
            self.reset();
            return;
        }

        let available = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );
        let scale_x = available.width / bounds.width();
        let scale_y = available.height / bounds.height();
        self.scale = scale_x.min(scale_y).clamp(self.min_scale, self.max_scale);

        let bounds_center = bounds.center();
        self.offset = Vec2::new(
            viewport.width / 2.0 - bounds_center.x * self.scale,
            viewport.height / 2.0 - bounds_center.y * self.scale,
        );
    }
}
