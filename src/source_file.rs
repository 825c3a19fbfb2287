//! File-backed source.
//!
//! A [`FileSource`] reads either a file on disk or an uploaded payload. The
//! content is decoded on the first pull, so an unreadable or malformed file
//! surfaces as a run-level failure of the agent rather than at construction.
//!
//! # Formats
//!
//! | Extension | Rows |
//! |-----------|------|
//! | `.zip` | first archive entry, decoded by its own extension |
//! | `.gz` | decompressed, then decoded by the remaining extension |
//! | `.json` | each element of a top-level array, or the single document |
//! | `.jsonl`, `.ndjson` | one JSON document per non-empty line |
//! | anything else | one string record per non-empty line |
//!
//! The row provider is the file name.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ngsi_agent_core::models::Row;
use ngsi_agent_core::source::{Source, SourceError};

/// Maximum decompressed bytes read from a ZIP entry or gzip stream.
const MAX_DECOMPRESSED_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
enum Origin {
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
}

#[derive(Debug)]
pub struct FileSource {
    filename: String,
    origin: Origin,
    records: Option<Vec<Value>>,
    position: usize,
}

impl FileSource {
    /// Source over a file on disk, read lazily.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            filename,
            origin: Origin::Path(path),
            records: None,
            position: 0,
        }
    }

    /// Source over an in-memory payload. `filename` selects the format and
    /// becomes the row provider.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            origin: Origin::Bytes(Arc::new(data)),
            records: None,
            position: 0,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    async fn load(&self) -> Result<Vec<Value>, SourceError> {
        match &self.origin {
            Origin::Path(path) => {
                let data = tokio::fs::read(path).await?;
                decode(&self.filename, &data)
            }
            Origin::Bytes(data) => decode(&self.filename, data),
        }
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> &str {
        &self.filename
    }

    async fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        if self.records.is_none() {
            self.records = Some(self.load().await?);
            self.position = 0;
        }
        let record = self
            .records
            .as_ref()
            .and_then(|records| records.get(self.position))
            .cloned();
        if record.is_some() {
            self.position += 1;
        }
        Ok(record.map(|r| Row::new(self.filename.clone(), r)))
    }

    /// Rewind to the first row. Files on disk are read again on the next
    /// pull, so appended content is picked up.
    fn reset(&mut self) -> Result<(), SourceError> {
        if matches!(self.origin, Origin::Path(_)) {
            self.records = None;
        }
        self.position = 0;
        Ok(())
    }

    fn reconstruct(&self) -> Result<Box<dyn Source>, SourceError> {
        Ok(Box::new(Self {
            filename: self.filename.clone(),
            origin: self.origin.clone(),
            records: None,
            position: 0,
        }))
    }
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn decode(filename: &str, data: &[u8]) -> Result<Vec<Value>, SourceError> {
    decode_bounded(filename, data, MAX_DECOMPRESSED_BYTES)
}

fn decode_bounded(filename: &str, data: &[u8], max_bytes: u64) -> Result<Vec<Value>, SourceError> {
    match extension(filename).as_str() {
        "zip" => {
            let (entry_name, content) = read_first_zip_entry(data, max_bytes)?;
            decode_text(&entry_name, &content)
        }
        "gz" => {
            let inner = Path::new(filename)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let content = read_bounded(
                flate2::read::MultiGzDecoder::new(data),
                max_bytes,
                filename,
            )?;
            decode_bounded(&inner, &content, max_bytes)
        }
        _ => decode_text(filename, data),
    }
}

fn decode_text(filename: &str, data: &[u8]) -> Result<Vec<Value>, SourceError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| SourceError::Other(format!("{} is not valid UTF-8: {}", filename, e)))?;
    let lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    match extension(filename).as_str() {
        "json" => match serde_json::from_str(text)? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        },
        "jsonl" | "ndjson" => lines
            .map(|l| serde_json::from_str(l).map_err(SourceError::from))
            .collect(),
        _ => Ok(lines.map(|l| Value::String(l.to_string())).collect()),
    }
}

/// Read at most `max_bytes` from a decompressing reader; anything larger is
/// an error, not a silent truncation.
fn read_bounded(reader: impl Read, max_bytes: u64, what: &str) -> Result<Vec<u8>, SourceError> {
    let mut out = Vec::new();
    reader
        .take(max_bytes + 1)
        .read_to_end(&mut out)
        .map_err(|e| SourceError::Other(format!("cannot decompress {}: {}", what, e)))?;
    if out.len() as u64 > max_bytes {
        return Err(SourceError::Other(format!(
            "{} exceeds {} bytes once decompressed",
            what, max_bytes
        )));
    }
    Ok(out)
}

fn read_first_zip_entry(data: &[u8], max_bytes: u64) -> Result<(String, Vec<u8>), SourceError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| SourceError::Other(format!("invalid zip archive: {}", e)))?;
    if archive.len() == 0 {
        return Err(SourceError::Other("zip archive is empty".to_string()));
    }
    let entry = archive
        .by_index(0)
        .map_err(|e| SourceError::Other(format!("invalid zip entry: {}", e)))?;
    let name = entry.name().to_string();
    let out = read_bounded(entry, max_bytes, &name)?;
    Ok((name, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    async fn drain(src: &mut FileSource) -> Result<Vec<Row>, SourceError> {
        let mut rows = Vec::new();
        while let Some(row) = src.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[tokio::test]
    async fn test_json_array_upload() {
        let mut src = FileSource::from_bytes(
            "fruits.json",
            br#"[{"fruit":"Apple"},{"fruit":"Lime"}]"#.to_vec(),
        );
        let rows = drain(&mut src).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].provider, "fruits.json");
        assert_eq!(rows[1].record["fruit"], "Lime");
    }

    #[tokio::test]
    async fn test_jsonl_and_plain_lines() {
        let mut src = FileSource::from_bytes("m.jsonl", b"{\"t\":1}\n\n{\"t\":2}\n".to_vec());
        assert_eq!(drain(&mut src).await.unwrap().len(), 2);

        let mut src = FileSource::from_bytes("temps.csv", b"22.5\n23.0\n\n".to_vec());
        let rows = drain(&mut src).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record, Value::String("22.5".into()));
    }

    #[tokio::test]
    async fn test_malformed_json_fails_on_first_pull() {
        let mut src = FileSource::from_bytes("bad.json", b"[{\"oops\"".to_vec());
        assert!(matches!(src.next_row().await, Err(SourceError::Json(_))));
    }

    #[tokio::test]
    async fn test_zip_first_entry() {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zw = zip::ZipWriter::new(&mut buf);
            zw.start_file("data.json", zip::write::SimpleFileOptions::default())
                .unwrap();
            zw.write_all(br#"[1,2,3]"#).unwrap();
            zw.finish().unwrap();
        }
        let mut src = FileSource::from_bytes("upload.zip", buf.into_inner());
        assert_eq!(drain(&mut src).await.unwrap().len(), 3);
    }

    fn zip_of(name: &str, content: &[u8]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zw = zip::ZipWriter::new(&mut buf);
            zw.start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zw.write_all(content).unwrap();
            zw.finish().unwrap();
        }
        buf.into_inner()
    }

    fn gzip_of(content: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(content).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_oversized_zip_entry_is_rejected() {
        let data = zip_of("data.json", b"[1,2,3,4,5,6,7,8]");
        let err = decode_bounded("upload.zip", &data, 8).unwrap_err();
        assert!(err.to_string().contains("exceeds 8 bytes"), "{}", err);

        // Exactly at the limit is fine.
        let data = zip_of("data.json", b"[1,2,3]");
        assert_eq!(decode_bounded("upload.zip", &data, 7).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_gzip_upload_decoded_by_inner_extension() {
        let data = gzip_of(b"{\"t\":1}\n{\"t\":2}\n");
        let mut src = FileSource::from_bytes("readings.jsonl.gz", data);
        let rows = drain(&mut src).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].record["t"], 2);
        assert_eq!(rows[0].provider, "readings.jsonl.gz");
    }

    #[tokio::test]
    async fn test_concatenated_gzip_members_are_all_read() {
        let mut data = gzip_of(b"a\nb\n");
        data.extend(gzip_of(b"c\n"));
        let mut src = FileSource::from_bytes("lines.txt.gz", data);
        assert_eq!(drain(&mut src).await.unwrap().len(), 3);
    }

    #[test]
    fn test_oversized_and_corrupt_gzip_are_rejected() {
        let err = decode_bounded("big.txt.gz", &gzip_of(b"0123456789"), 4).unwrap_err();
        assert!(err.to_string().contains("exceeds 4 bytes"));

        let err = decode("broken.json.gz", b"not gzip at all").unwrap_err();
        assert!(err.to_string().contains("cannot decompress"));
    }

    #[tokio::test]
    async fn test_reset_rereads_file_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lines.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        let mut src = FileSource::open(&path);
        assert_eq!(src.filename(), "lines.txt");
        assert_eq!(drain(&mut src).await.unwrap().len(), 2);

        std::fs::write(&path, "a\nb\nc\n").unwrap();
        src.reset().unwrap();
        assert_eq!(drain(&mut src).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let mut src = FileSource::open("/nonexistent/ngsi-agent/input.json");
        assert!(matches!(src.next_row().await, Err(SourceError::Io(_))));
    }
}
