//! Core data models used throughout ngsi-agent.
//!
//! A [`Row`] is what a source emits, [`Stats`] describe the outcome of one
//! agent run, and [`Status`] is the long-lived health record a daemon keeps
//! across runs.

use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One raw record emitted by a source.
///
/// `provider` identifies where the record came from (a topic, a file name,
/// an API label). The record itself is opaque to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub provider: String,
    pub record: Value,
}

impl Row {
    pub fn new(provider: impl Into<String>, record: Value) -> Self {
        Self {
            provider: provider.into(),
            record,
        }
    }
}

/// Counters describing the outcome of a single agent run.
///
/// At the end of a run `processed == created + updated + ignored + errors`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub ignored: u64,
    pub errors: u64,
}

impl Stats {
    /// Whether every processed row has been classified exactly once.
    pub fn is_balanced(&self) -> bool {
        self.processed == self.created + self.updated + self.ignored + self.errors
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.ignored += other.ignored;
        self.errors += other.errors;
    }
}

/// Lifecycle state of a daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    #[default]
    Pending,
    Running,
    Closed,
    Error,
}

impl State {
    /// `Closed` and `Error` cannot be left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Closed | State::Error)
    }
}

/// Cross-run health record of a daemon.
///
/// `calls` counts trigger attempts; `success` and `errors` count completed
/// attempts, so `calls == success + errors` once nothing is in flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub state: State,
    pub starttime: Option<DateTime<Utc>>,
    pub lastcalltime: Option<DateTime<Utc>>,
    pub calls: u64,
    pub success: u64,
    pub errors: u64,
    /// Message of the most recent run-level failure.
    pub last_error: Option<String>,
}

impl Status {
    /// Move to `next`, refusing to leave a terminal state or to go back to
    /// `Pending`. Returns whether the transition happened.
    pub fn transition(&mut self, next: State) -> bool {
        if self.state.is_terminal() || next == State::Pending || self.state == next {
            return false;
        }
        if next == State::Running {
            self.starttime = Some(Utc::now());
        }
        self.state = next;
        true
    }

    /// Number of attempts that have not completed yet.
    pub fn in_flight(&self) -> u64 {
        self.calls.saturating_sub(self.success + self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stats_add_assign_is_fieldwise() {
        let mut total = Stats {
            processed: 3,
            created: 1,
            updated: 1,
            ignored: 0,
            errors: 1,
        };
        total += Stats {
            processed: 2,
            created: 2,
            ..Default::default()
        };
        assert_eq!(total.processed, 5);
        assert_eq!(total.created, 3);
        assert_eq!(total.updated, 1);
        assert_eq!(total.errors, 1);
        assert!(total.is_balanced());
    }

    #[test]
    fn test_status_transitions() {
        let mut status = Status::default();
        assert_eq!(status.state, State::Pending);
        assert!(status.starttime.is_none());

        assert!(status.transition(State::Running));
        assert!(status.starttime.is_some());
        assert!(!status.transition(State::Pending));

        assert!(status.transition(State::Closed));
        assert!(!status.transition(State::Running));
        assert!(!status.transition(State::Error));
        assert_eq!(status.state, State::Closed);
    }

    #[test]
    fn test_status_serializes_state_uppercase() {
        let status = Status {
            calls: 2,
            success: 1,
            ..Default::default()
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["state"], "PENDING");
        assert_eq!(v["calls"], 2);
        assert_eq!(v["lastcalltime"], json!(null));
        assert_eq!(status.in_flight(), 1);
    }
}
