use std::time::Duration;

/// Batches with at most this many jobs run on the calling thread.
pub const DEFAULT_SERIAL_THRESHOLD: usize = 2;

/// Execution options for one engine. Passed explicitly to the scheduler;
/// there is no process-wide state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker threads used for parallel batches. Always at least 1.
    pub parallelism: usize,

    /// Run every batch sequentially on the calling thread.
    pub force_serial: bool,

    /// Largest batch that is still run serially.
    pub serial_threshold: usize,

    /// Advance the progress sink (if any) after each job.
    pub progress: bool,

    /// Jobs not yet started when this much time has elapsed are skipped.
    pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
            force_serial: false,
            serial_threshold: DEFAULT_SERIAL_THRESHOLD,
            progress: false,
            timeout: None,
        }
    }
}

impl EngineConfig {
    pub fn serial() -> Self {
        Self::default().with_force_serial(true)
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_force_serial(mut self, force_serial: bool) -> Self {
        self.force_serial = force_serial;
        self
    }

    pub fn with_serial_threshold(mut self, threshold: usize) -> Self {
        self.serial_threshold = threshold;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a batch of `jobs` runs on the calling thread.
    pub fn runs_serially(&self, jobs: usize) -> bool {
        self.force_serial || self.parallelism <= 1 || jobs <= self.serial_threshold
    }
}
