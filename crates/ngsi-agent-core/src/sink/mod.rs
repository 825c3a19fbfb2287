//! Delivery abstraction for ngsi-agent.
//!
//! The [`Sink`] trait delivers one serialized entity at a time. Sinks are
//! shared between concurrent runs (`Arc<dyn Sink>`), so every method takes
//! `&self` and implementations must be `Send + Sync`.
//!
//! # Lifecycle
//!
//! 1. [`write`](Sink::write) is called once per transformed record.
//! 2. [`close`](Sink::close) is called once at the end of every agent run.
//!    It releases run-scoped resources (flushes buffers, drops handles);
//!    the sink must accept writes again in a later run.
//! 3. [`status`](Sink::status) may be called at any time for health checks.

pub mod memory;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// How a sink classified a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Delivery failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The remote endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid sink configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Destination for serialized entities.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one message.
    async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError>;

    /// Health snapshot, rendered as-is by the daemon's `/status` endpoint.
    async fn status(&self) -> Value {
        json!({ "state": "ok" })
    }

    /// Release run-scoped resources.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
