//! In-memory [`Sink`] implementations for testing and embedding.
//!
//! [`MemorySink`] collects every message behind a `std::sync::Mutex`;
//! [`NullSink`] discards everything.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Sink, SinkError, WriteOutcome};

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
    closes: Mutex<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every message written so far, in write order.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Messages parsed back into JSON; unparsable ones are skipped.
    pub fn entities(&self) -> Vec<Value> {
        self.messages()
            .iter()
            .filter_map(|m| serde_json::from_str(m).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times [`Sink::close`] has been called.
    pub fn close_count(&self) -> u64 {
        self.closes.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|e| SinkError::Other(e.to_string()))?;
        messages.push(message.to_string());
        Ok(WriteOutcome::Created)
    }

    async fn status(&self) -> Value {
        json!({ "state": "ok", "messages": self.len() })
    }

    async fn close(&self) -> Result<(), SinkError> {
        let mut closes = self
            .closes
            .lock()
            .map_err(|e| SinkError::Other(e.to_string()))?;
        *closes += 1;
        Ok(())
    }
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    async fn write(&self, _message: &str) -> Result<WriteOutcome, SinkError> {
        Ok(WriteOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.write(r#"{"id":"a"}"#).await.unwrap();
        sink.write("not json").await.unwrap();
        sink.write(r#"{"id":"b"}"#).await.unwrap();

        assert_eq!(sink.len(), 3);
        let ids: Vec<_> = sink.entities().iter().map(|e| e["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("b")]);
        assert_eq!(sink.status().await["messages"], 3);
    }

    #[tokio::test]
    async fn test_close_is_counted_and_sink_stays_usable() {
        let sink = MemorySink::new();
        sink.close().await.unwrap();
        sink.write("x").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(sink.close_count(), 2);
        assert_eq!(sink.messages(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_null_sink_accepts_everything() {
        let sink = NullSink;
        assert_eq!(sink.write("dummy").await.unwrap(), WriteOutcome::Created);
        assert_eq!(sink.status().await["state"], "ok");
    }
}
