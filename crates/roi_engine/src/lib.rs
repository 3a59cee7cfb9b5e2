//! Batch region-of-interest extraction over tiled point-cloud catalogs.
//!
//! A batch flows through these stages:
//! - [`QueryBuilder`] validates the caller's parallel arrays into [`Query`] records.
//! - [`TileIndex`] (an R-tree over tile boxes) resolves each query to the
//!   tiles it touches; queries touching none are dropped.
//! - [`Scheduler`] runs one [`Extractor`] job per resolved query, serially or
//!   on a bounded worker pool, with each tile read through a [`PointReader`]
//!   using the query's [`ClipPredicate`] as a push-down filter.
//! - [`ResultCollector`] gathers results as they complete and projects them
//!   back into input order.
//!
//! Output order always equals input order, whatever the execution mode.
//!
//! ```no_run
//! use roi_engine::{Catalog, EngineConfig, PointSource, RoiEngine, RoiRequest};
//!
//! let catalog = Catalog::scan("tiles")?;
//! let engine = RoiEngine::new(PointSource::catalog(catalog), EngineConfig::default());
//!
//! let request = RoiRequest::new(vec![100.0, 10.0], vec![100.0, 10.0], 25.0);
//! for roi in engine.clip(&request)?.iter() {
//!     println!("{}: {} points ({:?})", roi.name, roi.points.len(), roi.status());
//! }
//! # Ok::<(), roi_engine::Error>(())
//! ```

pub mod catalog;
pub mod clip;
pub mod collect;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod progress;
pub mod query;
pub mod reader;
pub mod scheduler;
pub mod shape;
pub mod tile_index;

pub use catalog::{Catalog, Tile, TILE_EXTENSION};
pub use clip::ClipPredicate;
pub use collect::{OutputCollection, ResultCollector};
pub use config::EngineConfig;
pub use engine::RoiEngine;
pub use error::{Error, Result, TileReadError};
pub use extract::{Extractor, QueryResult, QueryStatus};
pub use progress::{LogProgress, ProgressSink};
pub use query::{Query, QueryBuilder, Radius, ResolvedQuery, Resolution, RoiRequest};
pub use reader::{Point, PointReader, PtileReader};
pub use scheduler::{ScheduledBatch, Scheduler};
pub use shape::{BBox, Shape};
pub use tile_index::{PointSource, TileIndex};
