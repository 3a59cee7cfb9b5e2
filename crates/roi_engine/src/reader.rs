//! Point records and the reader contract the extractor depends on.

use crate::clip::ClipPredicate;
use std::io;
use std::path::Path;

/// One decoded point, in catalog units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Classification label; 0 when the source has none.
    pub label: u8,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, label: 0 }
    }
}

impl From<ptile::PointM> for Point {
    #[inline]
    fn from(p: ptile::PointM) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            label: p.label,
        }
    }
}

/// Decodes one tile file, keeping only the points `filter` includes.
///
/// Implementations are shared read-only across worker threads.
pub trait PointReader: Sync {
    fn read(&self, path: &Path, filter: &ClipPredicate) -> io::Result<Vec<Point>>;
}

/// Reader for `.ptile` files; the predicate is applied during decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct PtileReader;

impl PointReader for PtileReader {
    fn read(&self, path: &Path, filter: &ClipPredicate) -> io::Result<Vec<Point>> {
        let points = ptile::read_file_filtered(path, |x, y| filter.includes(x, y))?;
        Ok(points.into_iter().map(Point::from).collect())
    }
}
