//! Push-based source backed by an in-process queue.
//!
//! Connectors that receive data through callbacks (message brokers,
//! webhooks, sensors) push records through a [`QueueHandle`]; the agent pulls
//! them from the paired [`QueueSource`]. A pull blocks until a record arrives
//! or the queue is closed.
//!
//! Closing (through [`QueueHandle::close`] or the shutdown token the source
//! was created with) wakes a blocked pull immediately. Records accepted
//! before the close are still delivered, later pushes are rejected, and the
//! source then ends.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ngsi_agent_core::models::Row;
use ngsi_agent_core::source::{Source, SourceError};

/// Producer side of a [`QueueSource`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<Value>,
    closing: CancellationToken,
}

impl QueueHandle {
    /// Enqueue a record. Fails with [`SourceError::Closed`] once closed.
    pub fn push(&self, record: Value) -> Result<(), SourceError> {
        if self.closing.is_cancelled() {
            return Err(SourceError::Closed);
        }
        self.tx.send(record).map_err(|_| SourceError::Closed)
    }

    /// End the stream: a blocked pull returns, pending records drain.
    pub fn close(&self) {
        self.closing.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closing.is_cancelled() || self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct QueueSource {
    provider: String,
    rx: mpsc::UnboundedReceiver<Value>,
    closing: CancellationToken,
    draining: bool,
}

impl QueueSource {
    pub fn new(provider: impl Into<String>) -> (Self, QueueHandle) {
        Self::with_shutdown(provider, &CancellationToken::new())
    }

    /// Like [`new`](Self::new), but also closes when `shutdown` fires.
    pub fn with_shutdown(
        provider: impl Into<String>,
        shutdown: &CancellationToken,
    ) -> (Self, QueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closing = shutdown.child_token();
        let source = Self {
            provider: provider.into(),
            rx,
            closing: closing.clone(),
            draining: false,
        };
        (source, QueueHandle { tx, closing })
    }

    fn row(&self, record: Value) -> Row {
        Row::new(self.provider.clone(), record)
    }
}

#[async_trait]
impl Source for QueueSource {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        if !self.draining {
            tokio::select! {
                biased;
                _ = self.closing.cancelled() => {
                    info!(provider = %self.provider, "queue closed, draining");
                    self.draining = true;
                    self.rx.close();
                }
                record = self.rx.recv() => {
                    return Ok(record.map(|r| self.row(r)));
                }
            }
        }

        let record = self.rx.recv().await;
        if record.is_none() {
            debug!(provider = %self.provider, "queue drained");
        }
        Ok(record.map(|r| self.row(r)))
    }
}
