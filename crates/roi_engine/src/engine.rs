use crate::collect::OutputCollection;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::extract::Extractor;
use crate::progress::ProgressSink;
use crate::query::{Query, QueryBuilder, RoiRequest};
use crate::reader::{PointReader, PtileReader};
use crate::scheduler::Scheduler;
use crate::tile_index::PointSource;
use log::info;

/// Answers batches of ROI requests against one point source.
///
/// The source and reader are shared read-only by every job of every batch.
#[derive(Debug)]
pub struct RoiEngine<R = PtileReader> {
    source: PointSource,
    reader: R,
    scheduler: Scheduler,
}

impl RoiEngine<PtileReader> {
    pub fn new(source: PointSource, config: EngineConfig) -> Self {
        Self::with_reader(source, PtileReader, config)
    }
}

impl<R: PointReader> RoiEngine<R> {
    pub fn with_reader(source: PointSource, reader: R, config: EngineConfig) -> Self {
        Self {
            source,
            reader,
            scheduler: Scheduler::new(config),
        }
    }

    pub fn source(&self) -> &PointSource {
        &self.source
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn config(&self) -> &EngineConfig {
        self.scheduler.config()
    }

    /// Validate, resolve and extract a batch. Invalid requests fail before any I/O.
    pub fn clip(&self, request: &RoiRequest) -> Result<OutputCollection> {
        self.run(QueryBuilder::build(request)?, None)
    }

    pub fn clip_with_progress(
        &self,
        request: &RoiRequest,
        progress: &dyn ProgressSink,
    ) -> Result<OutputCollection> {
        self.run(QueryBuilder::build(request)?, Some(progress))
    }

    /// Run hand-built queries; results follow the order of `queries`.
    /// Queries are validated before any tile is read.
    pub fn run(
        &self,
        queries: Vec<Query>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<OutputCollection> {
        QueryBuilder::validate(&queries)?;

        let order: Vec<String> = queries.iter().map(|q| q.name.clone()).collect();
        let resolution = QueryBuilder::resolve(queries, &self.source);

        info!(
            "{} ROI(s): {} resolved over {} tile(s), {} without data",
            order.len(),
            resolution.jobs.len(),
            self.source.tile_count(),
            resolution.unresolved.len()
        );

        let extractor = Extractor::new(&self.reader);
        let batch = self.scheduler.run(&resolution.jobs, &extractor, progress)?;

        Ok(OutputCollection {
            results: batch.results.into_ordered(order.iter().map(String::as_str)),
            unresolved: resolution.unresolved,
            skipped: batch.skipped,
        })
    }
}
