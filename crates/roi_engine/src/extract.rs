use crate::error::TileReadError;
use crate::query::ResolvedQuery;
use crate::reader::{Point, PointReader};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Every intersecting tile was read.
    Complete,
    /// At least one tile failed; `points` holds what the others yielded.
    Partial,
}

/// Points extracted for one ROI, plus any tiles that could not be read.
#[derive(Debug)]
pub struct QueryResult {
    pub name: String,
    pub points: Vec<Point>,
    pub errors: Vec<TileReadError>,
}

impl QueryResult {
    pub fn status(&self) -> QueryStatus {
        if self.errors.is_empty() {
            QueryStatus::Complete
        } else {
            QueryStatus::Partial
        }
    }

    pub fn is_partial(&self) -> bool {
        self.status() == QueryStatus::Partial
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Reads and stitches the tiles of one resolved query.
#[derive(Debug)]
pub struct Extractor<'r, R: ?Sized> {
    reader: &'r R,
}

impl<'r, R: PointReader + ?Sized> Extractor<'r, R> {
    pub fn new(reader: &'r R) -> Self {
        Self { reader }
    }

    /// Concatenate the filtered points of every tile in tile-set order.
    /// A failing tile is recorded on the result and skipped.
    pub fn extract(&self, job: &ResolvedQuery<'_>) -> QueryResult {
        let predicate = job.query.predicate();
        let mut points = Vec::new();
        let mut errors = Vec::new();

        for tile in &job.tiles {
            match self.reader.read(&tile.path, &predicate) {
                Ok(mut pts) => {
                    debug!(
                        "{}: {} point(s) from {}",
                        job.query.name,
                        pts.len(),
                        tile.path.display()
                    );
                    points.append(&mut pts);
                }
                Err(source) => {
                    warn!(
                        "{}: cannot read {}: {}",
                        job.query.name,
                        tile.path.display(),
                        source
                    );
                    errors.push(TileReadError {
                        path: tile.path.clone(),
                        source,
                    });
                }
            }
        }

        QueryResult {
            name: job.query.name.clone(),
            points,
            errors,
        }
    }
}
