//! Human-readable output for the CLI.
//!
//! Prints run statistics after `ngsi-agent run`, and the daemon status plus
//! sink health for `ngsi-agent status`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use ngsi_agent_core::models::{Stats, Status};

use crate::config::Config;

/// Body of a daemon's `GET /status`.
#[derive(Debug, Deserialize)]
pub struct StatusReport {
    pub status: Status,
    pub sink: Value,
}

pub fn print_stats(label: &str, stats: &Stats) {
    println!("{}", label);
    println!("  Processed:   {}", stats.processed);
    println!("  Created:     {}", stats.created);
    println!("  Updated:     {}", stats.updated);
    println!("  Ignored:     {}", stats.ignored);
    println!("  Errors:      {}", stats.errors);
}

/// Print the effective configuration and the sink's health.
pub fn print_local(config: &Config, sink: &Value) {
    println!("ngsi-agent {}", env!("CARGO_PKG_VERSION"));
    println!("================");
    println!();
    println!("  Bind:        {}", config.server.bind);
    println!("  Sink:        {}", config.sink.kind());
    match &config.schedule {
        Some(s) => println!("  Schedule:    every {} {}", s.interval, s.unit),
        None => println!("  Schedule:    none"),
    }
    println!("  Sink health: {}", sink);
}

/// Fetch `/status` from a running daemon at `base`.
pub async fn fetch_remote(base: &str) -> Result<StatusReport> {
    let url = format!("{}/status", base.trim_end_matches('/'));
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", url))?;
    if !resp.status().is_success() {
        anyhow::bail!("{} answered {}", url, resp.status());
    }
    resp.json::<StatusReport>()
        .await
        .with_context(|| format!("Unexpected /status body from {}", url))
}

pub fn print_remote(base: &str, report: &StatusReport) {
    let s = &report.status;
    println!("Daemon at {}", base);
    println!("  State:       {:?}", s.state);
    println!("  Started:     {}", format_relative(s.starttime));
    println!("  Last call:   {}", format_relative(s.lastcalltime));
    println!("  Calls:       {}", s.calls);
    println!("  Success:     {}", s.success);
    println!("  Errors:      {}", s.errors);
    if let Some(e) = &s.last_error {
        println!("  Last error:  {}", e);
    }
    println!("  Sink health: {}", report.sink);
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_relative(ts: Option<DateTime<Utc>>) -> String {
    let Some(ts) = ts else {
        return "never".to_string();
    };
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        format_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_iso(ts)
    }
}

fn format_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_relative() {
        assert_eq!(format_relative(None), "never");
        assert_eq!(format_relative(Some(Utc::now())), "just now");
        assert_eq!(
            format_relative(Some(Utc::now() - Duration::minutes(1))),
            "1 min ago"
        );
        assert_eq!(
            format_relative(Some(Utc::now() - Duration::hours(5))),
            "5 hours ago"
        );
        let old = Utc::now() - Duration::days(90);
        assert_eq!(format_relative(Some(old)), format_iso(old));
    }

    #[test]
    fn test_status_report_parses_daemon_body() {
        let body = serde_json::json!({
            "status": {
                "state": "RUNNING",
                "starttime": "2024-01-01T00:00:00Z",
                "lastcalltime": null,
                "calls": 3,
                "success": 2,
                "errors": 1,
                "last_error": "source failed: broker unreachable"
            },
            "sink": {"state": "ok"}
        });
        let report: StatusReport = serde_json::from_value(body).unwrap();
        assert_eq!(report.status.calls, 3);
        assert_eq!(report.sink["state"], "ok");
    }
}
