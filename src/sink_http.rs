//! HTTP sinks: a generic JSON endpoint and an Orion context broker.
//!
//! Both POST each message as `application/json` and report a non-success
//! answer as [`SinkError::Http`]. Health snapshots fall back to
//! `{"state": "Down or Unreachable"}` when the endpoint cannot be queried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use ngsi_agent_core::sink::{Sink, SinkError, WriteOutcome};

use crate::config::{HttpSinkConfig, OrionSinkConfig};

const UNREACHABLE: &str = "Down or Unreachable";

fn build_client(timeout_secs: u64, headers: HeaderMap) -> Result<Client, SinkError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| SinkError::Config(e.to_string()))
}

fn header(name: &'static str, value: &str) -> Result<(HeaderName, HeaderValue), SinkError> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| SinkError::Config(format!("invalid {} header: {}", name, e)))?;
    Ok((HeaderName::from_static(name), value))
}

async fn post_json(client: &Client, url: &str, message: &str) -> Result<StatusCode, SinkError> {
    let resp = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(message.to_string())
        .send()
        .await
        .map_err(|e| SinkError::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SinkError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(status)
}

async fn get_status(client: &Client, url: &str) -> Value {
    match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() => resp
            .json::<Value>()
            .await
            .unwrap_or_else(|_| json!({ "state": "ok" })),
        Ok(resp) => {
            debug!(url, status = resp.status().as_u16(), "status endpoint answered an error");
            json!({ "state": UNREACHABLE })
        }
        Err(e) => {
            debug!(url, error = %e, "status endpoint unreachable");
            json!({ "state": UNREACHABLE })
        }
    }
}

/// POSTs every message to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    url: String,
    status_url: String,
}

impl HttpSink {
    pub fn new(config: &HttpSinkConfig) -> Result<Self, SinkError> {
        let url = config.url.clone();
        let status_url = config
            .status_url
            .clone()
            .unwrap_or_else(|| format!("{}/status", url.trim_end_matches('/')));
        Ok(Self {
            client: build_client(config.timeout_secs, HeaderMap::new())?,
            url,
            status_url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError> {
        post_json(&self.client, &self.url, message).await?;
        Ok(WriteOutcome::Created)
    }

    async fn status(&self) -> Value {
        get_status(&self.client, &self.status_url).await
    }
}

/// Upserts entities into an Orion context broker (NGSI v2).
///
/// `201 Created` counts as a created entity, any other success as an
/// update of an existing one.
#[derive(Debug, Clone)]
pub struct OrionSink {
    client: Client,
    post_url: String,
    status_url: String,
}

impl OrionSink {
    pub fn new(config: &OrionSinkConfig) -> Result<Self, SinkError> {
        let protocol = if config.secure { "https" } else { "http" };
        let baseurl = config
            .baseurl
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');
        let root = format!("{}://{}:{}{}", protocol, config.host, config.port, baseurl);

        let mut headers = HeaderMap::new();
        let mut insert = |name: &'static str, value: &str| -> Result<(), SinkError> {
            let (name, value) = header(name, value)?;
            headers.insert(name, value);
            Ok(())
        };
        if let Some(token) = config.token.as_deref() {
            insert("x-auth-token", token)?;
        }
        if let Some(service) = config.service.as_deref() {
            insert("fiware-service", service)?;
        }
        if let Some(path) = config.service_path.as_deref() {
            insert("fiware-servicepath", path)?;
        }
        let agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| SinkError::Config(format!("invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, agent);

        Ok(Self {
            client: build_client(config.timeout_secs, headers)?,
            post_url: format!("{}/v2/entities?options=upsert", root),
            status_url: format!("{}/version", root),
        })
    }

    pub fn post_url(&self) -> &str {
        &self.post_url
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }
}

#[async_trait]
impl Sink for OrionSink {
    async fn write(&self, message: &str) -> Result<WriteOutcome, SinkError> {
        let status = post_json(&self.client, &self.post_url, message).await?;
        if status == StatusCode::CREATED {
            Ok(WriteOutcome::Created)
        } else {
            Ok(WriteOutcome::Updated)
        }
    }

    async fn status(&self) -> Value {
        get_status(&self.client, &self.status_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orion_default_urls() {
        let sink = OrionSink::new(&OrionSinkConfig::default()).unwrap();
        assert_eq!(
            sink.post_url(),
            "http://127.0.0.1:1026/v2/entities?options=upsert"
        );
        assert_eq!(sink.status_url(), "http://127.0.0.1:1026/version");
    }

    #[test]
    fn test_orion_baseurl_and_secure() {
        let config = OrionSinkConfig {
            host: "orion.fiware.org".to_string(),
            port: 1027,
            secure: true,
            baseurl: Some("/hopu/orion/".to_string()),
            ..Default::default()
        };
        let sink = OrionSink::new(&config).unwrap();
        assert_eq!(
            sink.post_url(),
            "https://orion.fiware.org:1027/hopu/orion/v2/entities?options=upsert"
        );
        assert_eq!(
            sink.status_url(),
            "https://orion.fiware.org:1027/hopu/orion/version"
        );
    }

    #[test]
    fn test_invalid_token_is_config_error() {
        let config = OrionSinkConfig {
            token: Some("bad\ntoken".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            OrionSink::new(&config),
            Err(SinkError::Config(_))
        ));
    }

    #[test]
    fn test_http_status_url_defaults_to_status_path() {
        let config = HttpSinkConfig {
            url: "http://127.0.0.1:8080/".to_string(),
            status_url: None,
            timeout_secs: 5,
        };
        let sink = HttpSink::new(&config).unwrap();
        assert_eq!(sink.url(), "http://127.0.0.1:8080/");
        assert_eq!(sink.status_url(), "http://127.0.0.1:8080/status");
    }
}
