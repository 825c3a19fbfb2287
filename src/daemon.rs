//! Long-lived agent host.
//!
//! A [`Daemon`] owns the shared sink and transform and keeps a [`Status`]
//! plus cumulative [`Stats`] across runs. Every [`trigger`](Daemon::trigger)
//! builds a fresh [`Agent`] for the given source, so triggers from the HTTP
//! front-end and the scheduler may overlap. The ledger mutex is only taken
//! for short bookkeeping sections and never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use ngsi_agent_core::models::{State, Stats, Status};
use ngsi_agent_core::sink::Sink;
use ngsi_agent_core::source::Source;

use crate::agent::{Agent, Transform};

#[derive(Debug, Default)]
struct Ledger {
    /// Lifecycle state and call counters reported by `/status`.
    status: Status,
    /// Stats summed over successful runs only.
    stats: Stats,
}

pub struct Daemon {
    /// Shared by every run; closed after each run and once more on [`Daemon::close`].
    sink: Arc<dyn Sink>,
    transform: Arc<dyn Transform>,
    /// Never held across an `.await`.
    ledger: Mutex<Ledger>,
    /// Set by [`Daemon::serialize_runs`].
    run_lock: Option<tokio::sync::Mutex<()>>,
}

/// Counts a started run as failed if its future is dropped before settling.
struct PendingRun<'a> {
    daemon: &'a Daemon,
    settled: bool,
}

impl Drop for PendingRun<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut ledger = self.daemon.ledger();
        ledger.status.errors += 1;
        ledger.status.last_error = Some("run abandoned before completion".to_string());
        warn!(calls = ledger.status.calls, "run abandoned before completion");
    }
}

impl Daemon {
    pub fn new(sink: Arc<dyn Sink>, transform: impl Transform + 'static) -> Self {
        Self {
            sink,
            transform: Arc::new(transform),
            ledger: Mutex::new(Ledger::default()),
            run_lock: None,
        }
    }

    /// Run one agent at a time, for sinks that cannot take concurrent writers.
    pub fn serialize_runs(mut self, enabled: bool) -> Self {
        self.run_lock = enabled.then(|| tokio::sync::Mutex::new(()));
        self
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // A panic elsewhere must not take the health record down with it.
        self.ledger.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run an agent over `source` and record the outcome.
    ///
    /// Returns the run's stats, or `None` when the run failed. Failures are
    /// logged and counted but never returned to the caller. A trigger whose
    /// future is dropped mid-run is counted as an error.
    pub async fn trigger(&self, source: &mut dyn Source) -> Option<Stats> {
        let calls = {
            let mut ledger = self.ledger();
            ledger.status.calls += 1;
            ledger.status.lastcalltime = Some(Utc::now());
            ledger.status.calls
        };
        let mut pending = PendingRun {
            daemon: self,
            settled: false,
        };
        debug!(calls, source = source.name(), "trigger");

        let _serial = match &self.run_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        let result = Agent::run_once(source, self.sink.clone(), self.transform.clone()).await;

        pending.settled = true;
        let mut ledger = self.ledger();
        match result {
            Ok(stats) => {
                ledger.status.success += 1;
                ledger.stats += stats;
                info!(
                    calls = ledger.status.calls,
                    success = ledger.status.success,
                    processed = stats.processed,
                    "run completed"
                );
                Some(stats)
            }
            Err(e) => {
                ledger.status.errors += 1;
                ledger.status.last_error = Some(e.to_string());
                error!(error = %e, errors = ledger.status.errors, "run failed");
                None
            }
        }
    }

    /// Count an attempt that failed before an agent could run.
    pub fn record_failed_call(&self, reason: impl std::fmt::Display) {
        let mut ledger = self.ledger();
        ledger.status.calls += 1;
        ledger.status.errors += 1;
        ledger.status.lastcalltime = Some(Utc::now());
        ledger.status.last_error = Some(reason.to_string());
        error!(error = %reason, "run could not start");
    }

    /// Mark the daemon as running. No effect once closed or failed.
    pub fn start(&self) {
        if self.ledger().status.transition(State::Running) {
            info!("daemon running");
        }
    }

    /// Mark the daemon as closed and release the sink.
    pub async fn close(&self) {
        if !self.ledger().status.transition(State::Closed) {
            return;
        }
        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "sink close failed");
        }
        info!("daemon closed");
    }

    /// Mark the daemon as failed.
    pub fn fail(&self, reason: impl std::fmt::Display) {
        let mut ledger = self.ledger();
        if ledger.status.transition(State::Error) {
            ledger.status.last_error = Some(reason.to_string());
            error!(error = %reason, "daemon failed");
        }
    }

    pub fn status(&self) -> Status {
        self.ledger().status.clone()
    }

    /// Stats accumulated over every successful run.
    pub fn stats(&self) -> Stats {
        self.ledger().stats
    }

    pub async fn sink_status(&self) -> Value {
        self.sink.status().await
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }
}
