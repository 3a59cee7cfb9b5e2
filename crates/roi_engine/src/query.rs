//! Request validation and tile resolution.

use crate::clip::ClipPredicate;
use crate::catalog::Tile;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tile_index::PointSource;
use log::{debug, info};
use std::collections::HashSet;

/// A radius given once for every query, or once per query.
#[derive(Debug, Clone, PartialEq)]
pub enum Radius {
    Scalar(f64),
    PerQuery(Vec<f64>),
}

impl Radius {
    /// Number of values supplied.
    pub fn len(&self) -> usize {
        match self {
            Radius::Scalar(_) => 1,
            Radius::PerQuery(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Radius of query `i`; a single value is recycled.
    fn at(&self, i: usize) -> f64 {
        match self {
            Radius::Scalar(r) => *r,
            Radius::PerQuery(v) if v.len() == 1 => v[0],
            Radius::PerQuery(v) => v[i],
        }
    }

    fn check(&self, argument: &'static str, n: usize) -> Result<()> {
        if n > 0 && self.is_empty() {
            return Err(Error::invalid(argument, "no radius given"));
        }

        if self.len() > 1 && self.len() != n {
            return Err(Error::invalid(
                argument,
                format!("expected 1 or {} values, got {}", n, self.len()),
            ));
        }

        (0..self.len().min(n.max(1))).try_for_each(|i| {
            let r = self.at(i);
            if r.is_finite() && r > 0.0 {
                Ok(())
            } else {
                Err(Error::invalid(argument, format!("radius {} must be finite and > 0", r)))
            }
        })
    }
}

impl From<f64> for Radius {
    fn from(r: f64) -> Self {
        Radius::Scalar(r)
    }
}

impl From<Vec<f64>> for Radius {
    fn from(r: Vec<f64>) -> Self {
        Radius::PerQuery(r)
    }
}

/// Parallel arrays describing a batch of ROIs, as a caller supplies them.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiRequest {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub r: Radius,
    /// Second radius; when present every ROI is a rectangle with half-width
    /// `r` and half-height `r2`.
    pub r2: Option<Radius>,
    pub names: Option<Vec<String>>,
}

impl RoiRequest {
    pub fn new(x: Vec<f64>, y: Vec<f64>, r: impl Into<Radius>) -> Self {
        Self {
            x,
            y,
            r: r.into(),
            r2: None,
            names: None,
        }
    }

    pub fn with_r2(mut self, r2: impl Into<Radius>) -> Self {
        self.r2 = Some(r2.into());
        self
    }

    pub fn with_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// One validated ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub r2: Option<f64>,
    pub shape: Shape,
}

impl Query {
    pub fn new(name: impl Into<String>, x: f64, y: f64, r: f64, r2: Option<f64>) -> Self {
        let shape = match r2 {
            Some(r2) => Shape::Rectangle {
                x,
                y,
                half_w: r,
                half_h: r2,
            },
            None => Shape::Circle { x, y, r },
        };

        Self {
            name: name.into(),
            x,
            y,
            r,
            r2,
            shape,
        }
    }

    pub fn predicate(&self) -> ClipPredicate {
        ClipPredicate::new(&self.shape)
    }
}

/// A query together with the tiles it must read. `tiles` is never empty.
#[derive(Debug, Clone)]
pub struct ResolvedQuery<'a> {
    pub query: Query,
    pub tiles: Vec<&'a Tile>,
}

/// Outcome of resolving a batch: the jobs to run and the names dropped for
/// lack of intersecting tiles.
#[derive(Debug, Default)]
pub struct Resolution<'a> {
    pub jobs: Vec<ResolvedQuery<'a>>,
    pub unresolved: Vec<String>,
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Validate `request` and expand it into queries in input order.
    pub fn build(request: &RoiRequest) -> Result<Vec<Query>> {
        let n = request.x.len();

        if request.y.len() != n {
            return Err(Error::invalid(
                "y",
                format!("x has {} values but y has {}", n, request.y.len()),
            ));
        }

        request.r.check("r", n)?;
        if let Some(r2) = request.r2.as_ref() {
            r2.check("r2", n)?;
        }

        let names: Vec<String> = match request.names.as_ref() {
            Some(names) => {
                if names.len() != n {
                    return Err(Error::invalid(
                        "names",
                        format!("expected {} names, got {}", n, names.len()),
                    ));
                }
                names.clone()
            }
            None => (1..=n).map(|i| format!("ROI{i}")).collect(),
        };

        let queries: Vec<Query> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                Query::new(
                    name,
                    request.x[i],
                    request.y[i],
                    request.r.at(i),
                    request.r2.as_ref().map(|r2| r2.at(i)),
                )
            })
            .collect();

        Self::validate(&queries)?;
        Ok(queries)
    }

    /// Check per-query invariants: finite centres, finite positive radii and
    /// names unique within the batch.
    pub fn validate(queries: &[Query]) -> Result<()> {
        let positive = |r: f64| r.is_finite() && r > 0.0;
        let mut seen = HashSet::with_capacity(queries.len());

        for q in queries {
            if !q.x.is_finite() {
                return Err(Error::invalid("x", format!("{}: x {} is not finite", q.name, q.x)));
            }
            if !q.y.is_finite() {
                return Err(Error::invalid("y", format!("{}: y {} is not finite", q.name, q.y)));
            }
            if !positive(q.r) {
                return Err(Error::invalid(
                    "r",
                    format!("{}: radius {} must be finite and > 0", q.name, q.r),
                ));
            }
            if let Some(r2) = q.r2.filter(|&r2| !positive(r2)) {
                return Err(Error::invalid(
                    "r2",
                    format!("{}: radius {} must be finite and > 0", q.name, r2),
                ));
            }
            if !seen.insert(q.name.as_str()) {
                return Err(Error::invalid("names", format!("duplicate name '{}'", q.name)));
            }
        }

        Ok(())
    }

    /// Pair each query with its tiles, dropping queries that hit none.
    pub fn resolve(queries: Vec<Query>, source: &PointSource) -> Resolution<'_> {
        let mut resolution = Resolution::default();

        for query in queries {
            let tiles = source.resolve(&query.shape);

            if tiles.is_empty() {
                info!("{}: no tile intersects this ROI, dropped", query.name);
                resolution.unresolved.push(query.name);
                continue;
            }

            debug!("{}: {} tile(s)", query.name, tiles.len());
            resolution.jobs.push(ResolvedQuery { query, tiles });
        }

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::shape::BBox;

    fn argument_of(err: Error) -> &'static str {
        match err {
            Error::InvalidArgument { argument, .. } => argument,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_default_names_and_scalar_radius() {
        let req = RoiRequest::new(vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], 2.5);
        let queries = QueryBuilder::build(&req).unwrap();

        let names: Vec<_> = queries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, ["ROI1", "ROI2", "ROI3"]);
        assert!(queries.iter().all(|q| q.r == 2.5));
        assert_eq!(queries[1].shape, Shape::Circle { x: 2.0, y: 5.0, r: 2.5 });
    }

    #[test]
    fn test_r2_makes_rectangles() {
        let req = RoiRequest::new(vec![0.0, 10.0], vec![0.0, 10.0], vec![1.0, 2.0])
            .with_r2(vec![3.0, 4.0])
            .with_names(["a", "b"]);
        let queries = QueryBuilder::build(&req).unwrap();

        assert_eq!(
            queries[1].shape,
            Shape::Rectangle { x: 10.0, y: 10.0, half_w: 2.0, half_h: 4.0 }
        );
        assert_eq!(queries[0].name, "a");
    }

    #[test]
    fn test_length_mismatches_name_the_argument() {
        let req = RoiRequest::new(vec![1.0, 2.0], vec![1.0], 1.0);
        assert_eq!(argument_of(QueryBuilder::build(&req).unwrap_err()), "y");

        let req = RoiRequest::new(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0], vec![1.0, 2.0]);
        assert_eq!(argument_of(QueryBuilder::build(&req).unwrap_err()), "r");

        let req = RoiRequest::new(vec![1.0], vec![1.0], 1.0).with_r2(vec![1.0, 2.0]);
        assert_eq!(argument_of(QueryBuilder::build(&req).unwrap_err()), "r2");

        let req = RoiRequest::new(vec![1.0], vec![1.0], 1.0).with_names(["a", "b"]);
        assert_eq!(argument_of(QueryBuilder::build(&req).unwrap_err()), "names");
    }

    #[test]
    fn test_single_element_radius_vector_is_recycled() {
        let req = RoiRequest::new(vec![1.0, 2.0], vec![1.0, 2.0], vec![7.0]);
        let queries = QueryBuilder::build(&req).unwrap();
        assert_eq!(queries[1].r, 7.0);
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let req = RoiRequest::new(vec![1.0], vec![1.0], 0.0);
        assert_eq!(argument_of(QueryBuilder::build(&req).unwrap_err()), "r");

        let req = RoiRequest::new(vec![f64::NAN], vec![1.0], 1.0);
        assert_eq!(argument_of(QueryBuilder::build(&req).unwrap_err()), "x");

        let req = RoiRequest::new(vec![1.0, 2.0], vec![1.0, 2.0], 1.0).with_names(["a", "a"]);
        assert_eq!(argument_of(QueryBuilder::build(&req).unwrap_err()), "names");
    }

    #[test]
    fn test_validate_checks_hand_built_queries() {
        let dup = [Query::new("a", 10.0, 10.0, 1.0, None), Query::new("a", 50.0, 50.0, 1.0, None)];
        assert_eq!(argument_of(QueryBuilder::validate(&dup).unwrap_err()), "names");

        let neg = [Query::new("neg", 50.0, 50.0, -5.0, None)];
        assert_eq!(argument_of(QueryBuilder::validate(&neg).unwrap_err()), "r");

        let flat = [Query::new("flat", 50.0, 50.0, 5.0, Some(0.0))];
        assert_eq!(argument_of(QueryBuilder::validate(&flat).unwrap_err()), "r2");

        let inf = [Query::new("inf", 1.0, f64::INFINITY, 5.0, None)];
        assert_eq!(argument_of(QueryBuilder::validate(&inf).unwrap_err()), "y");

        assert!(QueryBuilder::validate(&[Query::new("ok", 1.0, 2.0, 3.0, Some(4.0))]).is_ok());
    }

    #[test]
    fn test_empty_request_is_valid() {
        let req = RoiRequest::new(vec![], vec![], 1.0);
        assert!(QueryBuilder::build(&req).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_drops_queries_outside_catalog() {
        let catalog = Catalog::from_tiles(vec![Tile::new(
            "a.ptile",
            BBox::new(0.0, 0.0, 100.0, 100.0),
        )])
        .unwrap();
        let source = PointSource::catalog(catalog);

        let req = RoiRequest::new(vec![10.0, 500.0, 99.0], vec![10.0, 500.0, 50.0], 5.0);
        let resolution = QueryBuilder::resolve(QueryBuilder::build(&req).unwrap(), &source);

        let names: Vec<_> = resolution.jobs.iter().map(|j| j.query.name.as_str()).collect();
        assert_eq!(names, ["ROI1", "ROI3"]);
        assert_eq!(resolution.unresolved, ["ROI2"]);
        assert!(resolution.jobs.iter().all(|j| !j.tiles.is_empty()));
    }
}
