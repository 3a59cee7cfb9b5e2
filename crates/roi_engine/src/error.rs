//! Error taxonomy for ROI batches.
//!
//! Batch-level failures ([`Error`]) abort before or instead of scheduling.
//! Per-tile failures ([`TileReadError`]) ride along with the affected query's
//! result and never abort sibling jobs.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request arrays; nothing has been read yet.
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// The catalog is empty or could not be built.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The worker pool for a parallel batch could not be created.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn invalid(argument: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    pub(crate) fn catalog(msg: impl Into<String>) -> Self {
        Error::Catalog(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A tile that could not be read while extracting one query.
#[derive(Debug, Error)]
#[error("failed to read tile {}: {source}", path.display())]
pub struct TileReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
