//! Freehand path shape.

use super::{ShapeId, ShapeStyle, ShapeTrait, point_to_segment_dist};
use kurbo::{Affine, BezPath, Point, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default simplification tolerance applied when a stroke is committed.
pub const SIMPLIFY_TOLERANCE: f64 = 1.0;

/// An ordered list of points drawn with the pencil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub(crate) id: ShapeId,
    pub points: Vec<Point>,
    pub style: ShapeStyle,
}

impl Path {
    /// Start a stroke at `start`.
    pub fn new(start: Point) -> Self {
        Self::from_points(vec![start])
    }

    /// Create from existing points.
    pub fn from_points(points: Vec<Point>) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            style: ShapeStyle::default(),
        }
    }

    /// Append a point unless it repeats the last one.
    pub fn add_point(&mut self, point: Point) {
        if self.points.last() != Some(&point) {
            self.points.push(point);
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop points that don't change the stroke's shape by more than `tolerance`.
    pub fn simplify(&mut self, tolerance: f64) {
        if self.points.len() < 3 {
            return;
        }
        self.points = rdp_simplify(&self.points, tolerance);
    }

    pub(crate) fn intersects_rect(&self, rect: Rect) -> bool {
        if self.points.iter().any(|p| rect.contains(*p)) {
            return true;
        }
        // A segment may cross the rect with both ends outside.
        self.points
            .windows(2)
            .any(|w| segment_hits_rect(w[0], w[1], rect))
    }
}

/// Ramer-Douglas-Peucker line simplification.
fn rdp_simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];

    let (max_index, max_dist) = points
        .iter()
        .enumerate()
        .skip(1)
        .take(points.len() - 2)
        .map(|(i, p)| (i, point_to_segment_dist(*p, first, last)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if max_dist > tolerance {
        let mut left = rdp_simplify(&points[..=max_index], tolerance);
        let right = rdp_simplify(&points[max_index..], tolerance);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Liang-Barsky style clip test of segment a->b against `rect`.
fn segment_hits_rect(a: Point, b: Point, rect: Rect) -> bool {
    let d = b - a;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    let edges = [
        (-d.x, a.x - rect.x0),
        (d.x, rect.x1 - a.x),
        (-d.y, a.y - rect.y0),
        (d.y, rect.y1 - a.y),
    ];
    for (p, q) in edges {
        if p.abs() < f64::EPSILON {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return false;
        }
    }
    true
}

impl ShapeTrait for Path {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };
        self.points
            .iter()
            .skip(1)
            .fold(Rect::from_points(*first, *first), |acc, p| acc.union_pt(*p))
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let reach = tolerance + self.style.stroke_width / 2.0;
        match self.points.as_slice() {
            [] => false,
            [only] => (point - *only).hypot() <= reach,
            points => points
                .windows(2)
                .any(|w| point_to_segment_dist(point, w[0], w[1]) <= reach),
        }
    }

    fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut iter = self.points.iter();
        if let Some(first) = iter.next() {
            path.move_to(*first);
            for p in iter {
                path.line_to(*p);
            }
        }
        path
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        for p in &mut self.points {
            *p = affine * *p;
        }
    }

    fn set_bounds(&mut self, rect: Rect) {
        let rect = rect.abs();
        let old = self.bounds();
        // Degenerate axes can't be scaled, only moved.
        let sx = if old.width() > f64::EPSILON { rect.width() / old.width() } else { 1.0 };
        let sy = if old.height() > f64::EPSILON { rect.height() / old.height() } else { 1.0 };
        for p in &mut self.points {
            p.x = rect.x0 + (p.x - old.x0) * sx;
            p.y = rect.y0 + (p.y - old.y0) * sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_point_skips_repeats() {
        let mut path = Path::new(Point::new(0.0, 0.0));
        path.add_point(Point::new(0.0, 0.0));
        path.add_point(Point::new(1.0, 1.0));
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_simplify_straight_line() {
        let points = (0..10).map(|i| Point::new(i as f64, i as f64)).collect();
        let mut path = Path::from_points(points);
        path.simplify(SIMPLIFY_TOLERANCE);
        assert_eq!(path.points, vec![Point::new(0.0, 0.0), Point::new(9.0, 9.0)]);
    }

    #[test]
    fn test_simplify_keeps_corner() {
        let mut path = Path::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.1),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ]);
        path.simplify(SIMPLIFY_TOLERANCE);
        assert_eq!(
            path.points,
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)]
        );
    }

    #[test]
    fn test_bounds_and_hit_test() {
        let path = Path::from_points(vec![Point::new(10.0, 10.0), Point::new(50.0, 30.0)]);
        assert_eq!(path.bounds(), Rect::new(10.0, 10.0, 50.0, 30.0));
        assert!(path.hit_test(Point::new(30.0, 20.0), 1.0));
        assert!(!path.hit_test(Point::new(30.0, 0.0), 1.0));
    }

    #[test]
    fn test_set_bounds_scales_points() {
        let mut path = Path::from_points(vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)]);
        path.set_bounds(Rect::new(100.0, 100.0, 120.0, 140.0));
        assert_eq!(path.points, vec![Point::new(100.0, 100.0), Point::new(120.0, 140.0)]);
    }

    #[test]
    fn test_intersects_rect_crossing_segment() {
        let path = Path::from_points(vec![Point::new(0.0, 50.0), Point::new(100.0, 50.0)]);
        assert!(path.intersects_rect(Rect::new(40.0, 40.0, 60.0, 60.0)));
        assert!(!path.intersects_rect(Rect::new(40.0, 60.0, 60.0, 80.0)));
    }
}
