//! In-memory JSON sources.
//!
//! [`JsonSource`] replays a JSON document already held in memory;
//! [`FuncSource`] awaits a user fetch (typically an API request) once per
//! pass and emits whatever records it returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ngsi_agent_core::models::Row;
use ngsi_agent_core::source::{Source, SourceError};

/// Emits the elements of a JSON array, or a single JSON object as one row.
#[derive(Debug, Clone)]
pub struct JsonSource {
    provider: String,
    records: Arc<Vec<Value>>,
    position: usize,
}

impl JsonSource {
    pub fn new(document: Value) -> Self {
        Self::with_provider("json", document)
    }

    pub fn with_provider(provider: impl Into<String>, document: Value) -> Self {
        let records = match document {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Self {
            provider: provider.into(),
            records: Arc::new(records),
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl Source for JsonSource {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        let Some(record) = self.records.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        Ok(Some(Row::new(self.provider.clone(), record.clone())))
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.position = 0;
        Ok(())
    }

    fn reconstruct(&self) -> Result<Box<dyn Source>, SourceError> {
        Ok(Box::new(Self {
            provider: self.provider.clone(),
            records: self.records.clone(),
            position: 0,
        }))
    }
}

type FetchFuture = Pin<Box<dyn Future<Output = anyhow::Result<Vec<Value>>> + Send>>;
type Fetch = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Emits the records returned by an async fetch, awaited lazily on first pull.
///
/// A failing fetch is a source-level failure and aborts the run.
pub struct FuncSource {
    provider: String,
    fetch: Fetch,
    pending: Option<std::vec::IntoIter<Value>>,
}

impl FuncSource {
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<Value>>> + Send + 'static,
    {
        Self::with_provider("api", fetch)
    }

    pub fn with_provider<F, Fut>(provider: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<Value>>> + Send + 'static,
    {
        Self {
            provider: provider.into(),
            fetch: Arc::new(move || Box::pin(fetch()) as FetchFuture),
            pending: None,
        }
    }

    /// Source over a blocking fetch (a synchronous HTTP client, a file
    /// scan), run on tokio's blocking pool so it never stalls the runtime.
    pub fn blocking<F>(provider: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        let fetch = Arc::new(fetch);
        Self::with_provider(provider, move || {
            let fetch = fetch.clone();
            async move {
                match tokio::task::spawn_blocking(move || fetch()).await {
                    Ok(result) => result,
                    Err(e) => Err(anyhow::anyhow!("fetch task failed: {}", e)),
                }
            }
        })
    }
}

#[async_trait]
impl Source for FuncSource {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        if self.pending.is_none() {
            let records = (self.fetch)()
                .await
                .map_err(|e| SourceError::Other(format!("{:#}", e)))?;
            self.pending = Some(records.into_iter());
        }
        Ok(self
            .pending
            .as_mut()
            .and_then(|it| it.next())
            .map(|record| Row::new(self.provider.clone(), record)))
    }

    /// Forget the last fetch; the next pull calls the function again.
    fn reset(&mut self) -> Result<(), SourceError> {
        self.pending = None;
        Ok(())
    }

    fn reconstruct(&self) -> Result<Box<dyn Source>, SourceError> {
        Ok(Box::new(Self {
            provider: self.provider.clone(),
            fetch: self.fetch.clone(),
            pending: None,
        }))
    }
}
