//! Planar boxes and ROI shapes.

use rstar::AABB;

/// Axis-aligned bounding box in catalog units (metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    #[inline]
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    /// Inclusive overlap test; boxes sharing only an edge or a corner intersect.
    #[inline]
    pub fn intersects(&self, other: &BBox) -> bool {
        self.xmin <= other.xmax
            && other.xmin <= self.xmax
            && self.ymin <= other.ymax
            && other.ymin <= self.ymax
    }

    pub fn is_valid(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
            && self.xmin <= self.xmax
            && self.ymin <= self.ymax
    }

    #[inline]
    pub(crate) fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.xmin, self.ymin], [self.xmax, self.ymax])
    }
}

impl From<ptile::Extent> for BBox {
    fn from(e: ptile::Extent) -> Self {
        BBox::new(e.xmin, e.ymin, e.xmax, e.ymax)
    }
}

/// Geometry of one ROI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle {
        x: f64,
        y: f64,
        r: f64,
    },
    /// Axis-aligned rectangle centred on (x, y) with half-extents `half_w` and `half_h`.
    Rectangle {
        x: f64,
        y: f64,
        half_w: f64,
        half_h: f64,
    },
}

impl Shape {
    pub fn bbox(&self) -> BBox {
        match *self {
            Shape::Circle { x, y, r } => BBox::new(x - r, y - r, x + r, y + r),
            Shape::Rectangle {
                x,
                y,
                half_w,
                half_h,
            } => BBox::new(x - half_w, y - half_h, x + half_w, y + half_h),
        }
    }
}
