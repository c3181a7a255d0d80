//! Run error taxonomy.
//!
//! `Configuration` and `Usage` are fatal before any item runs; `Timeout` aborts a run in
//! progress. [`ItemFault`] never aborts a run: the dispatcher turns it into a
//! [`FailureRecord`](crate::FailureRecord) and moves on.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal errors of a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Unresolvable step or malformed pipeline configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Nothing to do (no input, or the input expanded to zero items).
    #[error("usage error: {0}")]
    Usage(String),

    /// No task resolved within the per-task bound.
    #[error("timed out after {0:?} waiting for a task to finish ({1} of {2} resolved)")]
    Timeout(Duration, usize, usize),

    /// Coordinator-side filesystem failure (report files, output directory).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RunError::Io {
            context: context.into(),
            source,
        }
    }
}

/// A fault raised while processing one item, tagged with where it happened.
#[derive(Debug, Error)]
#[error("{path}: {step}: {message}")]
pub struct ItemFault {
    pub path: PathBuf,
    /// Identifier of the faulting step, or of the loader.
    pub step: String,
    pub message: String,
}
