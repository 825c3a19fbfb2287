//! TOML configuration.
//!
//! Every section is optional; an empty file (or no file at all) yields a
//! daemon on `127.0.0.1:8000` writing to stdout.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [schedule]
//! interval = 5
//! unit = "minutes"
//! file = "data.json"
//!
//! [sink]
//! kind = "orion"
//! host = "orion.example.org"
//! port = 1026
//! service = "smartcity"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use ngsi_agent_core::sink::memory::NullSink;
use ngsi_agent_core::sink::Sink;

use crate::scheduler::Unit;
use crate::sink_file::{FileSink, GzipFileSink, StdoutSink};
use crate::sink_http::{HttpSink, OrionSink};

/// Environment variable consulted when the Orion sink has no token.
pub const ORION_TOKEN_ENV: &str = "ORION_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Run one agent at a time.
    #[serde(default)]
    pub serialize_runs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            serialize_runs: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    pub interval: u64,
    #[serde(default = "default_unit")]
    pub unit: Unit,
    /// Input re-read on every job.
    pub file: Option<PathBuf>,
}

fn default_unit() -> Unit {
    Unit::Minutes
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Null,
    #[default]
    Stdout,
    File(FileSinkConfig),
    /// Same settings as `file`, written gzip-compressed.
    Gzip(FileSinkConfig),
    Http(HttpSinkConfig),
    Orion(OrionSinkConfig),
}

impl SinkConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Null => "null",
            SinkConfig::Stdout => "stdout",
            SinkConfig::File(_) => "file",
            SinkConfig::Gzip(_) => "gzip",
            SinkConfig::Http(_) => "http",
            SinkConfig::Orion(_) => "orion",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSinkConfig {
    pub url: String,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrionSinkConfig {
    #[serde(default = "default_orion_host")]
    pub host: String,
    #[serde(default = "default_orion_port")]
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub baseurl: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub service_path: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OrionSinkConfig {
    fn default() -> Self {
        Self {
            host: default_orion_host(),
            port: default_orion_port(),
            secure: false,
            baseurl: None,
            token: None,
            service: None,
            service_path: None,
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_orion_host() -> String {
    "127.0.0.1".to_string()
}
fn default_orion_port() -> u16 {
    1026
}
fn default_user_agent() -> String {
    format!("ngsi-agent/{}", env!("CARGO_PKG_VERSION"))
}
fn default_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(schedule) = &config.schedule {
        if schedule.interval == 0 {
            anyhow::bail!("schedule.interval must be >= 1");
        }
    }

    match &mut config.sink {
        SinkConfig::File(file) | SinkConfig::Gzip(file) if file.path.as_os_str().is_empty() => {
            anyhow::bail!("sink.path must not be empty for the file sink");
        }
        SinkConfig::Http(http) if !http.url.starts_with("http") => {
            anyhow::bail!("sink.url must be an http(s) URL, got '{}'", http.url);
        }
        SinkConfig::Orion(orion) => {
            if orion.host.is_empty() {
                anyhow::bail!("sink.host must not be empty for the orion sink");
            }
            if orion.token.is_none() {
                orion.token = std::env::var(ORION_TOKEN_ENV).ok().filter(|t| !t.is_empty());
            }
        }
        _ => {}
    }

    Ok(config)
}

/// Build the sink described by `config`.
pub fn build_sink(config: &SinkConfig) -> Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match config {
        SinkConfig::Null => Arc::new(NullSink),
        SinkConfig::Stdout => Arc::new(StdoutSink),
        SinkConfig::File(file) => Arc::new(FileSink::with_append(&file.path, file.append)),
        SinkConfig::Gzip(file) => Arc::new(GzipFileSink::with_append(&file.path, file.append)),
        SinkConfig::Http(http) => {
            Arc::new(HttpSink::new(http).context("Failed to build http sink")?)
        }
        SinkConfig::Orion(orion) => {
            Arc::new(OrionSink::new(orion).context("Failed to build orion sink")?)
        }
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert!(!config.server.serialize_runs);
        assert!(config.schedule.is_none());
        assert_eq!(config.sink.kind(), "stdout");
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
            [server]
            bind = "0.0.0.0:9000"
            serialize_runs = true

            [schedule]
            interval = 5
            unit = "seconds"
            file = "data.json"

            [sink]
            kind = "orion"
            host = "orion.example.org"
            port = 1027
            token = "secret"
            service = "smartcity"
            service_path = "/parking"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.server.serialize_runs);
        let schedule = config.schedule.unwrap();
        assert_eq!(schedule.interval, 5);
        assert_eq!(schedule.unit, Unit::Seconds);
        match config.sink {
            SinkConfig::Orion(orion) => {
                assert_eq!(orion.host, "orion.example.org");
                assert_eq!(orion.port, 1027);
                assert_eq!(orion.token.as_deref(), Some("secret"));
                assert_eq!(orion.service_path.as_deref(), Some("/parking"));
            }
            other => panic!("unexpected sink {:?}", other),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = parse_config("[schedule]\ninterval = 0\n").unwrap_err();
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn test_unknown_sink_kind_rejected() {
        assert!(parse_config("[sink]\nkind = \"kafka\"\n").is_err());
    }

    #[test]
    fn test_file_sink_requires_path() {
        assert!(parse_config("[sink]\nkind = \"file\"\n").is_err());
        let config = parse_config("[sink]\nkind = \"file\"\npath = \"out.jsonl\"\nappend = true\n")
            .unwrap();
        assert!(build_sink(&config.sink).is_ok());
    }

    #[test]
    fn test_gzip_sink_kind() {
        assert!(parse_config("[sink]\nkind = \"gzip\"\n").is_err());
        let config = parse_config("[sink]\nkind = \"gzip\"\npath = \"out.jsonl.gz\"\n").unwrap();
        assert_eq!(config.sink.kind(), "gzip");
        match &config.sink {
            SinkConfig::Gzip(file) => {
                assert_eq!(file.path, PathBuf::from("out.jsonl.gz"));
                assert!(!file.append);
            }
            other => panic!("expected gzip sink, got {:?}", other),
        }
        assert!(build_sink(&config.sink).is_ok());
    }

    #[test]
    fn test_missing_config_file_has_context() {
        let err = load_config(Path::new("/nonexistent/ngsi-agent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
