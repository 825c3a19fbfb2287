//! The [`Source`] trait: anything that yields rows.
//!
//! A source is pulled one row at a time with [`Source::next_row`]. Returning
//! `Ok(None)` ends the run; returning `Err` is an iteration-level failure
//! (lost connectivity, unreadable file) and aborts the run.
//!
//! Sources may be renewed between scheduled runs in one of two in-place ways
//! ([`reset`](Source::reset) and [`reconstruct`](Source::reconstruct)); the
//! caller picks which one explicitly, nothing is detected at runtime.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Row;

/// Errors raised by a source while pulling rows.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The source was closed and accepts no more input.
    #[error("source is closed")]
    Closed,

    /// The requested renewal operation is not implemented by this source.
    #[error("source does not support {0}")]
    Unsupported(&'static str),

    #[error("{0}")]
    Other(String),
}

/// A pull-based sequence of [`Row`]s.
#[async_trait]
pub trait Source: Send {
    /// Short label used in logs.
    fn name(&self) -> &str {
        "source"
    }

    /// Pull the next row, `Ok(None)` once exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>, SourceError>;

    /// Rewind in place so the next pull starts over.
    fn reset(&mut self) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("reset"))
    }

    /// Build a fresh instance from the original construction parameters.
    fn reconstruct(&self) -> Result<Box<dyn Source>, SourceError> {
        Err(SourceError::Unsupported("reconstruct"))
    }
}

#[async_trait]
impl<S: Source + ?Sized> Source for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        (**self).next_row().await
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        (**self).reset()
    }

    fn reconstruct(&self) -> Result<Box<dyn Source>, SourceError> {
        (**self).reconstruct()
    }
}
