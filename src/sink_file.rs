//! Local sinks: standard output, plain files and gzip files.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use ngsi_agent_core::sink::{Sink, SinkError, WriteOutcome};

/// Prints one message per line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError> {
        println!("{}", message);
        Ok(WriteOutcome::Created)
    }
}

#[derive(Debug, Default)]
struct FileState {
    writer: Option<BufWriter<File>>,
    opened: bool,
    lines: u64,
}

/// Writes one message per line to a file.
///
/// The file is opened on the first write. Unless `append` is set, that
/// first open truncates it; after a [`close`](Sink::close) the next run
/// reopens it in append mode so earlier runs are kept.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    append: bool,
    state: Mutex<FileState>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_append(path, false)
    }

    pub fn with_append(path: impl AsRef<Path>, append: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append,
            state: Mutex::new(FileState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError> {
        let mut state = self.state.lock().await;
        if state.writer.is_none() {
            let append = self.append || state.opened;
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(&self.path)
                .await?;
            state.writer = Some(BufWriter::new(file));
            state.opened = true;
        }
        if let Some(writer) = state.writer.as_mut() {
            writer.write_all(message.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        state.lines += 1;
        Ok(WriteOutcome::Created)
    }

    async fn status(&self) -> Value {
        let state = self.state.lock().await;
        json!({
            "state": "ok",
            "path": self.path.display().to_string(),
            "lines": state.lines,
        })
    }

    async fn close(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if let Some(mut writer) = state.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct GzipState {
    encoder: Option<GzEncoder<Vec<u8>>>,
    opened: bool,
    lines: u64,
}

/// Writes one message per line to a gzip-compressed file.
///
/// Each run is compressed in memory and written out as one gzip member
/// on [`close`](Sink::close). Members from later runs are appended, which
/// any multi-member gzip reader (including `FileSource`) reads back as a
/// single stream. Truncation follows [`FileSink`].
pub struct GzipFileSink {
    path: PathBuf,
    append: bool,
    state: Mutex<GzipState>,
}

impl GzipFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_append(path, false)
    }

    pub fn with_append(path: impl AsRef<Path>, append: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append,
            state: Mutex::new(GzipState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for GzipFileSink {
    async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError> {
        let mut state = self.state.lock().await;
        let encoder = state
            .encoder
            .get_or_insert_with(|| GzEncoder::new(Vec::new(), Compression::default()));
        encoder.write_all(message.as_bytes())?;
        encoder.write_all(b"\n")?;
        state.lines += 1;
        Ok(WriteOutcome::Created)
    }

    async fn status(&self) -> Value {
        let state = self.state.lock().await;
        json!({
            "state": "ok",
            "path": self.path.display().to_string(),
            "lines": state.lines,
        })
    }

    async fn close(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        let Some(encoder) = state.encoder.take() else {
            return Ok(());
        };
        let member = encoder.finish()?;
        let append = self.append || state.opened;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)
            .await?;
        state.opened = true;
        file.write_all(&member).await?;
        file.sync_all().await?;
        Ok(())
    }
}
