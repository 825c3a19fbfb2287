//! One-pass agent: source → transform → sink.
//!
//! An [`Agent`] pulls every row from its source, applies the transform,
//! serializes the resulting entity and hands it to the sink. Failures of a
//! single record (transform error, serialization error, rejected write) are
//! counted in [`Stats::errors`] and never stop the pass. A failure of the
//! source itself ends the run with [`AgentError::Source`]; the counters
//! accumulated up to that point stay available through [`Agent::stats`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use ngsi_agent_core::models::{Row, Stats};
use ngsi_agent_core::sink::{Sink, SinkError, WriteOutcome};
use ngsi_agent_core::source::{Source, SourceError};

/// Failure while processing one record, or while pulling the source.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transform failed: {0:#}")]
    Transform(anyhow::Error),

    #[error("cannot serialize entity: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink rejected entity: {0}")]
    Sink(#[from] SinkError),

    #[error("source failed: {0}")]
    Source(#[from] SourceError),
}

/// Turns one row into at most one serialized entity.
///
/// Any closure `Fn(&Row) -> anyhow::Result<Option<E>>` with `E: Serialize`
/// is a transform. Returning `Ok(None)` marks the row as ignored.
pub trait Transform: Send + Sync {
    fn apply(&self, row: &Row) -> Result<Option<String>, AgentError>;
}

impl<F, E> Transform for F
where
    F: Fn(&Row) -> anyhow::Result<Option<E>> + Send + Sync,
    E: Serialize,
{
    fn apply(&self, row: &Row) -> Result<Option<String>, AgentError> {
        match (self)(row).map_err(AgentError::Transform)? {
            Some(entity) => Ok(Some(serde_json::to_string(&entity)?)),
            None => Ok(None),
        }
    }
}

/// Transform that forwards the record unchanged.
pub fn identity() -> impl Transform {
    |row: &Row| -> anyhow::Result<Option<Value>> { Ok(Some(row.record.clone())) }
}

/// A single pass over one source.
pub struct Agent<'a> {
    source: &'a mut dyn Source,
    sink: Arc<dyn Sink>,
    transform: Arc<dyn Transform>,
    stats: Stats,
}

impl<'a> Agent<'a> {
    pub fn new(
        source: &'a mut dyn Source,
        sink: Arc<dyn Sink>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            source,
            sink,
            transform,
            stats: Stats::default(),
        }
    }

    /// Run the agent and release the sink, whatever the outcome.
    pub async fn run_once(
        source: &'a mut dyn Source,
        sink: Arc<dyn Sink>,
        transform: Arc<dyn Transform>,
    ) -> Result<Stats, AgentError> {
        let mut agent = Self::new(source, sink, transform);
        let result = agent.run().await;
        agent.close().await?;
        result
    }

    /// Pull the source to exhaustion.
    pub async fn run(&mut self) -> Result<Stats, AgentError> {
        let source_name = self.source.name().to_string();
        debug!(source = %source_name, "agent run started");

        while let Some(row) = self.source.next_row().await? {
            self.stats.processed += 1;
            match process(self.transform.as_ref(), self.sink.as_ref(), &row).await {
                Ok(Some(WriteOutcome::Created)) => self.stats.created += 1,
                Ok(Some(WriteOutcome::Updated)) => self.stats.updated += 1,
                Ok(None) => self.stats.ignored += 1,
                Err(e) => {
                    warn!(provider = %row.provider, error = %e, "record failed");
                    self.stats.errors += 1;
                }
            }
        }

        info!(
            source = %source_name,
            processed = self.stats.processed,
            created = self.stats.created,
            updated = self.stats.updated,
            ignored = self.stats.ignored,
            errors = self.stats.errors,
            "agent run finished"
        );
        Ok(self.stats)
    }

    /// Counters of the current (or last) run.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Release the sink. Consumes the agent so it happens once.
    pub async fn close(self) -> Result<(), SinkError> {
        self.sink.close().await
    }
}

/// Transform and deliver one row.
///
/// Takes the transform and sink rather than the agent, so that no borrow of
/// the (`Send` only) source is held across the write.
async fn process(
    transform: &dyn Transform,
    sink: &dyn Sink,
    row: &Row,
) -> Result<Option<WriteOutcome>, AgentError> {
    let Some(message) = transform.apply(row)? else {
        return Ok(None);
    };
    Ok(Some(sink.write(&message).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_json::JsonSource;
    use async_trait::async_trait;
    use ngsi_agent_core::entity::Entity;
    use ngsi_agent_core::sink::memory::MemorySink;
    use serde_json::json;

    fn fruits() -> Value {
        json!([
            {"fruit": "Apple", "size": "Large", "color": "Red"},
            {"fruit": "Lime", "size": "Medium", "color": "Yellow"}
        ])
    }

    fn build_fruit(row: &Row) -> anyhow::Result<Option<Entity>> {
        let name = row.record["fruit"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing fruit"))?;
        let mut e = Entity::new(format!("Fruit-{}", name), "Fruit");
        e.add("size", row.record["size"].clone());
        e.add("color", row.record["color"].clone());
        Ok(Some(e))
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_future_can_be_spawned() {
        let sink = Arc::new(MemorySink::new());
        let handle = tokio::spawn({
            let sink = sink.clone();
            async move {
                let mut src = JsonSource::new(fruits());
                let mut agent = Agent::new(&mut src, sink, Arc::new(build_fruit));
                let run = agent.run();
                assert_send(&run);
                run.await
            }
        });
        assert_eq!(handle.await.unwrap().unwrap().created, 2);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_fruit_scenario() {
        let mut src = JsonSource::new(fruits());
        let sink = Arc::new(MemorySink::new());
        let stats = Agent::run_once(&mut src, sink.clone(), Arc::new(build_fruit))
            .await
            .unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.created, 2);
        let ids: Vec<_> = sink.entities().iter().map(|e| e["id"].clone()).collect();
        assert_eq!(ids, vec![json!("Fruit-Apple"), json!("Fruit-Lime")]);
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_records_are_isolated() {
        let mut src = JsonSource::new(json!([
            {"fruit": "Apple"},
            {"nofruit": 1},
            {"fruit": "Lime"},
            {"nofruit": 2}
        ]));
        let sink = Arc::new(MemorySink::new());
        let mut agent = Agent::new(&mut src, sink.clone(), Arc::new(build_fruit));
        let stats = agent.run().await.unwrap();
        agent.close().await.unwrap();

        assert_eq!(stats.processed, 4);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.created, 2);
        assert!(stats.is_balanced());
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_ignored_rows() {
        let mut src = JsonSource::new(json!([1, 2, 3, 4]));
        let even_only = |row: &Row| -> anyhow::Result<Option<Value>> {
            let n = row.record.as_i64().unwrap_or(0);
            Ok((n % 2 == 0).then(|| json!({ "n": n })))
        };
        let sink = Arc::new(MemorySink::new());
        let stats = Agent::run_once(&mut src, sink.clone(), Arc::new(even_only))
            .await
            .unwrap();
        assert_eq!(stats.ignored, 2);
        assert_eq!(stats.created, 2);
        assert!(stats.is_balanced());
    }

    struct FlakySink;

    #[async_trait]
    impl Sink for FlakySink {
        async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError> {
            if message.contains("Lime") {
                return Err(SinkError::Transport("connection refused".into()));
            }
            Ok(WriteOutcome::Updated)
        }
    }

    #[tokio::test]
    async fn test_sink_failure_counts_as_record_error() {
        let mut src = JsonSource::new(fruits());
        let stats = Agent::run_once(&mut src, Arc::new(FlakySink), Arc::new(identity()))
            .await
            .unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.errors, 1);
    }

    struct BrokenAfter {
        left: u32,
    }

    #[async_trait]
    impl Source for BrokenAfter {
        async fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
            if self.left == 0 {
                return Err(SourceError::Other("connection lost".into()));
            }
            self.left -= 1;
            Ok(Some(Row::new("broken", json!({ "left": self.left }))))
        }
    }

    #[tokio::test]
    async fn test_source_failure_aborts_run_and_keeps_stats() {
        let mut src = BrokenAfter { left: 3 };
        let sink = Arc::new(MemorySink::new());
        let mut agent = Agent::new(&mut src, sink.clone(), Arc::new(identity()));
        let err = agent.run().await.unwrap_err();
        assert!(matches!(err, AgentError::Source(_)));
        assert_eq!(agent.stats().processed, 3);
        assert!(agent.stats().is_balanced());
        agent.close().await.unwrap();
        assert_eq!(sink.close_count(), 1);
    }
}
