//! # ngsi-agent
//!
//! ETL agents that pull records from a source, transform each one into an
//! entity, and push it to a sink such as an Orion context broker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │  Source  │──▶│ Transform │──▶│   Sink   │
//! │ file/api │   │  (user)   │   │ orion/.. │
//! └──────────┘   └───────────┘   └──────────┘
//!        ▲  one pass = one Agent run
//!        │
//!   ┌────┴─────┐        ┌───────────┐
//!   │  Daemon  │◀───────│ Scheduler │
//!   │  status  │◀──┐    └───────────┘
//!   └──────────┘   │    ┌───────────┐
//!                  └────│   HTTP    │
//!                       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ngsi-agent run fruits.json            # one-shot, prints stats
//! ngsi-agent schedule data.json --interval 5 --unit minutes
//! ngsi-agent serve                      # POST /uploadfile/, GET /status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | One pass over a source, the `Transform` trait |
//! | [`daemon`] | Shared sink, status and cumulative stats across runs |
//! | [`scheduler`] | Periodic triggering with source renewal |
//! | [`server`] | HTTP front-end |
//! | [`config`] | TOML configuration and sink construction |
//! | [`source_json`] | In-memory JSON and function-backed sources |
//! | [`source_file`] | File and upload sources |
//! | [`source_queue`] | Push-based queue source |
//! | [`sink_file`] | Stdout and file sinks |
//! | [`sink_http`] | HTTP and Orion sinks |
//! | [`report`] | CLI output |
//!
//! Core types (`Row`, `Stats`, `Status`, `Entity`, the `Source` and `Sink`
//! traits) live in the `ngsi-agent-core` crate.

pub mod agent;
pub mod config;
pub mod daemon;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod sink_file;
pub mod sink_http;
pub mod source_file;
pub mod source_json;
pub mod source_queue;
