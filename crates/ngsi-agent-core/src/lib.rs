//! # ngsi-agent core
//!
//! Runtime-agnostic building blocks shared by every ngsi-agent component:
//! the [`Row`](models::Row) flowing out of a source, the per-run
//! [`Stats`](models::Stats), the daemon [`Status`](models::Status), the
//! NGSI [`Entity`](entity::Entity) helper, and the [`Source`](source::Source)
//! and [`Sink`](sink::Sink) traits that connectors implement.
//!
//! This crate has no tokio, HTTP, or filesystem dependency. Everything that
//! needs a runtime lives in the `ngsi-agent` crate.

pub mod entity;
pub mod models;
pub mod sink;
pub mod source;
