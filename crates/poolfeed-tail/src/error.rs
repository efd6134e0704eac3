//! Error types for the poolfeed-tail crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while following log files.
#[derive(Debug, Error)]
pub enum TailError {
    /// A read on one file failed. Retried on the next poll.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// None of the configured files can ever appear again: every parent
    /// directory is gone.
    #[error("Log source gone: {dirs}")]
    SourceGone { dirs: String },

    /// The source was started without any file to follow.
    #[error("No log files configured")]
    NoFiles,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TailError>;
