//! Best-effort batch progress.

use log::info;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Observer of completed jobs. Called from worker threads; must not block.
pub trait ProgressSink: Sync {
    fn advance(&self, current: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Sync,
{
    fn advance(&self, current: usize, total: usize) {
        self(current, total)
    }
}

/// Monotonic completion counter shared by the workers of one batch.
#[derive(Debug)]
pub(crate) struct ProgressCounter<'a> {
    done: AtomicUsize,
    total: usize,
    sink: Option<&'a dyn ProgressSink>,
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn new(total: usize, sink: Option<&'a dyn ProgressSink>) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            sink,
        }
    }

    pub(crate) fn bump(&self) {
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(sink) = self.sink {
            sink.advance(current, self.total);
        }
    }
}

impl std::fmt::Debug for dyn ProgressSink + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressSink")
    }
}

/// Sink that logs a progress line at most once per interval, plus the last job.
#[derive(Debug)]
pub struct LogProgress {
    start: Instant,
    last: Mutex<Instant>,
    min_interval: Duration,
}

impl LogProgress {
    pub fn new(min_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: Mutex::new(now),
            min_interval,
        }
    }

    /// Jobs per second since creation.
    fn rate(&self, count: usize) -> f64 {
        count as f64 / self.start.elapsed().as_secs_f64().max(1e-9)
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl ProgressSink for LogProgress {
    fn advance(&self, current: usize, total: usize) {
        // Skip rather than wait if another worker is logging.
        let Some(mut last) = self.last.try_lock() else {
            return;
        };

        if current < total && last.elapsed() < self.min_interval {
            return;
        }

        info!(
            "ROIs done {:>6}/{:<6} ({:5.1}%), {:6.2} ROI/s",
            current,
            total,
            100.0 * current as f64 / total.max(1) as f64,
            self.rate(current)
        );
        *last = Instant::now();
    }
}
