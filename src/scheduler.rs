//! Periodic triggering of a [`Daemon`].
//!
//! A [`Scheduler`] runs one job immediately, then one job every
//! `interval × unit`, until its shutdown token fires. Before each job after
//! the first, the source is renewed according to the [`Renewal`] strategy
//! chosen at construction.
//!
//! Timing is checked by polling: the loop wakes up every
//! [`Unit::poll_granularity`] and fires when at least the full interval has
//! elapsed since the previous job finished. Jobs never overlap and a job
//! that fails only shows up in the daemon's status.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ngsi_agent_core::source::{Source, SourceError};

use crate::daemon::Daemon;

/// Time unit of a schedule interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Unit {
    pub fn duration(self, n: u64) -> Duration {
        let secs = match self {
            Unit::Seconds => 1,
            Unit::Minutes => 60,
            Unit::Hours => 3_600,
            Unit::Days => 86_400,
        };
        Duration::from_secs(n.saturating_mul(secs))
    }

    /// How often the loop checks whether a job is due.
    pub fn poll_granularity(self) -> Duration {
        Duration::from_secs(match self {
            Unit::Seconds => 1,
            Unit::Minutes => 4,
            Unit::Hours => 32,
            Unit::Days => 128,
        })
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Seconds => "seconds",
            Unit::Minutes => "minutes",
            Unit::Hours => "hours",
            Unit::Days => "days",
        })
    }
}

impl FromStr for Unit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "second" | "seconds" => Ok(Unit::Seconds),
            "m" | "minute" | "minutes" => Ok(Unit::Minutes),
            "h" | "hour" | "hours" => Ok(Unit::Hours),
            "d" | "day" | "days" => Ok(Unit::Days),
            other => anyhow::bail!(
                "unknown time unit '{}', expected seconds, minutes, hours or days",
                other
            ),
        }
    }
}

pub type SourceFactory = Box<dyn FnMut() -> Result<Box<dyn Source>, SourceError> + Send>;

/// How the scheduler obtains a source for each job.
pub enum Renewal {
    /// Build a brand-new source for every job.
    Factory(SourceFactory),
    /// Reuse one source, calling [`Source::reset`] before every job but the first.
    Reset(Box<dyn Source>),
    /// Replace the source with [`Source::reconstruct`] before every job but the first.
    Reconstruct(Box<dyn Source>),
}

impl Renewal {
    pub fn factory<F>(f: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn Source>, SourceError> + Send + 'static,
    {
        Renewal::Factory(Box::new(f))
    }
}

impl fmt::Debug for Renewal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Renewal::Factory(_) => "Factory",
            Renewal::Reset(_) => "Reset",
            Renewal::Reconstruct(_) => "Reconstruct",
        })
    }
}

pub struct Scheduler {
    daemon: Arc<Daemon>,
    renewal: Renewal,
    /// Minimum time between the end of one job and the start of the next.
    period: Duration,
    /// How often the elapsed time is checked.
    poll: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        daemon: Arc<Daemon>,
        renewal: Renewal,
        interval: u64,
        unit: Unit,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(interval >= 1, "schedule interval must be at least 1");
        Ok(Self {
            daemon,
            renewal,
            period: unit.duration(interval),
            poll: unit.poll_granularity(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Override the polling period.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the loop on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        self.daemon.start();
        info!(
            period_secs = self.period.as_secs(),
            renewal = ?self.renewal,
            "scheduler started"
        );

        self.job(true).await;
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.poll) => {}
            }
            if last.elapsed() >= self.period {
                self.job(false).await;
                last = Instant::now();
            }
        }
        info!("scheduler stopped");
    }

    async fn job(&mut self, first: bool) {
        debug!(first, "scheduled job");
        match &mut self.renewal {
            Renewal::Factory(factory) => match factory() {
                Ok(mut source) => {
                    self.daemon.trigger(source.as_mut()).await;
                }
                Err(e) => self
                    .daemon
                    .record_failed_call(format!("cannot build source: {}", e)),
            },
            Renewal::Reset(source) => {
                if !first {
                    if let Err(e) = source.reset() {
                        self.daemon
                            .record_failed_call(format!("cannot reset source: {}", e));
                        return;
                    }
                }
                self.daemon.trigger(source.as_mut()).await;
            }
            Renewal::Reconstruct(source) => {
                if !first {
                    match source.reconstruct() {
                        Ok(fresh) => *source = fresh,
                        Err(e) => {
                            self.daemon
                                .record_failed_call(format!("cannot reconstruct source: {}", e));
                            return;
                        }
                    }
                }
                self.daemon.trigger(source.as_mut()).await;
            }
        }
    }
}
