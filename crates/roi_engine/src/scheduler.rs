//! Serial or pooled execution of resolved queries.

use crate::collect::ResultCollector;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::extract::Extractor;
use crate::progress::{ProgressCounter, ProgressSink};
use crate::query::ResolvedQuery;
use crate::reader::PointReader;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Results of one scheduled batch, keyed by query name.
#[derive(Debug)]
pub struct ScheduledBatch {
    pub results: ResultCollector,
    /// Jobs never started because the batch deadline passed, in job order.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    config: EngineConfig,
}

impl Scheduler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every job once. Completion order is unspecified; each finished job
    /// inserts its own key into the returned collector.
    pub fn run<R: PointReader + ?Sized>(
        &self,
        jobs: &[ResolvedQuery<'_>],
        extractor: &Extractor<'_, R>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<ScheduledBatch> {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let sink = if self.config.progress { progress } else { None };
        let counter = ProgressCounter::new(jobs.len(), sink);
        let results = ResultCollector::with_capacity(jobs.len());

        let expired = || deadline.is_some_and(|d| Instant::now() >= d);

        let run_one = |job: &ResolvedQuery<'_>| {
            if expired() {
                debug!("{}: deadline passed, not started", job.query.name);
                return;
            }
            results.insert(extractor.extract(job));
            counter.bump();
        };

        if self.config.runs_serially(jobs.len()) {
            debug!("Running {} ROI(s) serially", jobs.len());
            jobs.iter().for_each(run_one);
        } else {
            let workers = self.config.parallelism.min(jobs.len());
            debug!("Running {} ROIs on {} workers", jobs.len(), workers);

            // Dropped at the end of this call on every path, joining its threads.
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("roi-worker-{i}"))
                .build()?;

            let next = AtomicUsize::new(0);
            pool.scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|_| loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(i) else {
                            break;
                        };
                        run_one(job);
                    });
                }
            });
        }

        let skipped: Vec<String> = jobs
            .iter()
            .filter(|job| !results.contains(&job.query.name))
            .map(|job| job.query.name.clone())
            .collect();

        if !skipped.is_empty() {
            warn!("{} ROI(s) skipped after the batch timeout", skipped.len());
        }

        info!(
            "Extracted {}/{} ROI(s) in {:.2?}",
            results.len(),
            jobs.len(),
            started.elapsed()
        );

        Ok(ScheduledBatch { results, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Tile;
    use crate::clip::ClipPredicate;
    use crate::query::Query;
    use crate::reader::Point;
    use crate::shape::BBox;
    use parking_lot::Mutex;
    use std::io;
    use std::path::Path;
    use std::thread::ThreadId;
    use std::time::Duration;

    /// Records which threads did the reading.
    #[derive(Default)]
    struct ThreadTrackingReader {
        threads: Mutex<Vec<ThreadId>>,
    }

    impl PointReader for ThreadTrackingReader {
        fn read(&self, _: &Path, _: &ClipPredicate) -> io::Result<Vec<Point>> {
            self.threads.lock().push(std::thread::current().id());
            std::thread::sleep(Duration::from_millis(5));
            Ok(vec![Point::new(0.0, 0.0, 0.0)])
        }
    }

    fn jobs(tile: &Tile, n: usize) -> Vec<ResolvedQuery<'_>> {
        (0..n)
            .map(|i| ResolvedQuery {
                query: Query::new(format!("q{i}"), 0.0, 0.0, 1.0, None),
                tiles: vec![tile],
            })
            .collect()
    }

    #[test]
    fn test_small_batch_stays_on_calling_thread() {
        let tile = Tile::new("t", BBox::new(-1.0, -1.0, 1.0, 1.0));
        let reader = ThreadTrackingReader::default();
        let scheduler = Scheduler::new(EngineConfig::default().with_parallelism(4));

        let batch = scheduler.run(&jobs(&tile, 2), &Extractor::new(&reader), None).unwrap();
        assert_eq!(batch.results.len(), 2);

        let me = std::thread::current().id();
        assert!(reader.threads.lock().iter().all(|t| *t == me));
    }

    #[test]
    fn test_large_batch_uses_worker_threads() {
        let tile = Tile::new("t", BBox::new(-1.0, -1.0, 1.0, 1.0));
        let reader = ThreadTrackingReader::default();
        let scheduler = Scheduler::new(EngineConfig::default().with_parallelism(3));

        let batch = scheduler.run(&jobs(&tile, 12), &Extractor::new(&reader), None).unwrap();
        assert_eq!(batch.results.len(), 12);
        assert!(batch.skipped.is_empty());

        let me = std::thread::current().id();
        let threads = reader.threads.lock();
        assert_eq!(threads.len(), 12);
        assert!(threads.iter().all(|t| *t != me));
    }

    #[test]
    fn test_progress_only_when_enabled() {
        let tile = Tile::new("t", BBox::new(-1.0, -1.0, 1.0, 1.0));
        let reader = ThreadTrackingReader::default();
        let calls = AtomicUsize::new(0);
        let sink = |_: usize, total: usize| {
            assert_eq!(total, 5);
            calls.fetch_add(1, Ordering::Relaxed);
        };

        let quiet = Scheduler::new(EngineConfig::default().with_parallelism(2));
        quiet.run(&jobs(&tile, 5), &Extractor::new(&reader), Some(&sink)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let loud = Scheduler::new(EngineConfig::default().with_parallelism(2).with_progress(true));
        loud.run(&jobs(&tile, 5), &Extractor::new(&reader), Some(&sink)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_expired_deadline_skips_unstarted_jobs() {
        let tile = Tile::new("t", BBox::new(-1.0, -1.0, 1.0, 1.0));
        let reader = ThreadTrackingReader::default();
        let scheduler = Scheduler::new(
            EngineConfig::serial().with_timeout(Some(Duration::ZERO)),
        );

        let batch = scheduler.run(&jobs(&tile, 3), &Extractor::new(&reader), None).unwrap();
        assert!(batch.results.is_empty());
        assert_eq!(batch.skipped, ["q0", "q1", "q2"]);
    }
}
