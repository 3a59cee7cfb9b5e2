//! Point-level inclusion test for one ROI.

use crate::reader::Point;
use crate::shape::Shape;

/// Exact inclusion test derived from a query's shape. Boundaries are inclusive.
///
/// The same predicate is handed to readers as a push-down filter and can be
/// applied to already decoded points with [`ClipPredicate::filter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipPredicate {
    Circle { x: f64, y: f64, r2: f64 },
    Rectangle { xmin: f64, ymin: f64, xmax: f64, ymax: f64 },
}

impl ClipPredicate {
    pub fn new(shape: &Shape) -> Self {
        match *shape {
            Shape::Circle { x, y, r } => ClipPredicate::Circle { x, y, r2: r * r },
            Shape::Rectangle {
                x,
                y,
                half_w,
                half_h,
            } => ClipPredicate::Rectangle {
                xmin: x - half_w,
                ymin: y - half_h,
                xmax: x + half_w,
                ymax: y + half_h,
            },
        }
    }

    #[inline]
    pub fn includes(&self, px: f64, py: f64) -> bool {
        match *self {
            ClipPredicate::Circle { x, y, r2 } => {
                let dx = px - x;
                let dy = py - y;
                dx * dx + dy * dy <= r2
            }
            ClipPredicate::Rectangle {
                xmin,
                ymin,
                xmax,
                ymax,
            } => xmin <= px && px <= xmax && ymin <= py && py <= ymax,
        }
    }

    /// In-memory form of the filter, for readers that cannot push it down.
    pub fn filter(&self, points: &[Point]) -> Vec<Point> {
        points
            .iter()
            .filter(|p| self.includes(p.x, p.y))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: i32, step: f64) -> Vec<Point> {
        let mut pts = Vec::new();
        for i in -n..=n {
            for j in -n..=n {
                pts.push(Point::new(i as f64 * step, j as f64 * step, 0.0));
            }
        }
        pts
    }

    #[test]
    fn test_circle_boundary_is_inclusive() {
        let p = ClipPredicate::new(&Shape::Circle { x: 0.0, y: 0.0, r: 5.0 });
        assert!(p.includes(5.0, 0.0));
        assert!(p.includes(3.0, 4.0));
        assert!(!p.includes(3.0, 4.001));
    }

    #[test]
    fn test_rectangle_uses_both_half_extents() {
        let p = ClipPredicate::new(&Shape::Rectangle { x: 10.0, y: 10.0, half_w: 4.0, half_h: 1.0 });
        assert!(p.includes(14.0, 11.0));
        assert!(p.includes(6.0, 9.0));
        assert!(!p.includes(14.0, 11.5));
        assert!(!p.includes(5.5, 10.0));
    }

    #[test]
    fn test_square_matches_axis_aligned_box() {
        let pts = grid(40, 0.25);
        let (cx, cy, r) = (0.5, -1.25, 3.0);
        let square = ClipPredicate::new(&Shape::Rectangle { x: cx, y: cy, half_w: r, half_h: r });

        let expected: Vec<Point> = pts
            .iter()
            .filter(|p| p.x >= cx - r && p.x <= cx + r && p.y >= cy - r && p.y <= cy + r)
            .copied()
            .collect();

        assert_eq!(square.filter(&pts), expected);
        assert_eq!(expected.len(), 25 * 25);
    }

    #[test]
    fn test_circle_is_subset_of_its_square() {
        let pts = grid(20, 0.5);
        let circle = ClipPredicate::new(&Shape::Circle { x: 0.0, y: 0.0, r: 4.0 });
        let square = ClipPredicate::new(&Shape::Rectangle { x: 0.0, y: 0.0, half_w: 4.0, half_h: 4.0 });

        let inside = circle.filter(&pts);
        assert!(!inside.is_empty());
        assert!(inside.iter().all(|p| square.includes(p.x, p.y)));
        assert!(inside.len() < square.filter(&pts).len());
    }
}
