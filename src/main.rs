//! # ngsi-agent CLI
//!
//! ## Usage
//!
//! ```bash
//! ngsi-agent --config ./ngsi-agent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ngsi-agent run <file>` | Run the agent once over a file and print stats |
//! | `ngsi-agent serve` | Start the HTTP daemon (and the scheduler if configured) |
//! | `ngsi-agent schedule <file>` | Run the agent over a file periodically |
//! | `ngsi-agent status` | Show configuration and sink health |
//!
//! Without `--config`, `./ngsi-agent.toml` is used when present, otherwise
//! built-in defaults (stdout sink, `127.0.0.1:8000`).
//!
//! Log verbosity follows `RUST_LOG` (default `ngsi_agent=info`); logs go to
//! stderr so the stdout sink stays machine-readable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ngsi_agent::agent::{identity, Agent};
use ngsi_agent::config::{self, Config};
use ngsi_agent::daemon::Daemon;
use ngsi_agent::report;
use ngsi_agent::scheduler::{Renewal, Scheduler, Unit};
use ngsi_agent::server;
use ngsi_agent::source_file::FileSource;

const DEFAULT_CONFIG: &str = "ngsi-agent.toml";

#[derive(Parser)]
#[command(
    name = "ngsi-agent",
    about = "ETL agents that move records from sources to NGSI context brokers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent once over a file.
    ///
    /// The format follows the extension: `.json`, `.jsonl`/`.ndjson`, `.zip`
    /// (first entry), anything else one record per line.
    Run {
        file: PathBuf,
    },

    /// Start the HTTP daemon.
    ///
    /// When `[schedule]` names a file, the scheduler runs alongside the
    /// server over the same daemon.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the agent over a file on a fixed interval until interrupted.
    Schedule {
        file: PathBuf,

        /// Interval length, at least 1.
        #[arg(long)]
        interval: Option<u64>,

        /// seconds, minutes, hours or days.
        #[arg(long)]
        unit: Option<String>,
    },

    /// Show the effective configuration and sink health.
    Status {
        /// Query a running daemon (e.g. `http://127.0.0.1:8000`) instead.
        #[arg(long)]
        remote: Option<String>,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ngsi_agent=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

/// Token cancelled on Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        trigger.cancel();
    });
    token
}

fn build_daemon(cfg: &Config) -> Result<Arc<Daemon>> {
    let sink = config::build_sink(&cfg.sink)?;
    Ok(Arc::new(
        Daemon::new(sink, identity()).serialize_runs(cfg.server.serialize_runs),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { file } => {
            let sink = config::build_sink(&cfg.sink)?;
            let mut source = FileSource::open(&file);
            let stats = Agent::run_once(&mut source, sink, Arc::new(identity())).await?;
            report::print_stats(&format!("Run over {}", file.display()), &stats);
        }
        Commands::Serve { bind } => {
            let daemon = build_daemon(&cfg)?;
            let shutdown = shutdown_on_ctrl_c();

            let scheduler = match &cfg.schedule {
                Some(s) => match &s.file {
                    Some(file) => {
                        let renewal = Renewal::Reset(Box::new(FileSource::open(file)));
                        let scheduler = Scheduler::new(daemon.clone(), renewal, s.interval, s.unit)?
                            .with_shutdown(shutdown.clone());
                        Some(scheduler.spawn())
                    }
                    None => {
                        warn!("[schedule] has no file, scheduler disabled");
                        None
                    }
                },
                None => None,
            };

            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let result = server::run_server(daemon, &bind, shutdown.clone()).await;
            shutdown.cancel();
            if let Some(handle) = scheduler {
                if let Err(e) = handle.await {
                    warn!(error = %e, "scheduler task ended abnormally");
                }
            }
            result?;
        }
        Commands::Schedule {
            file,
            interval,
            unit,
        } => {
            let interval = interval
                .or_else(|| cfg.schedule.as_ref().map(|s| s.interval))
                .unwrap_or(1);
            let unit = match unit {
                Some(u) => u.parse::<Unit>()?,
                None => cfg.schedule.as_ref().map(|s| s.unit).unwrap_or(Unit::Minutes),
            };

            let daemon = build_daemon(&cfg)?;
            let renewal = Renewal::Reset(Box::new(FileSource::open(&file)));
            Scheduler::new(daemon.clone(), renewal, interval, unit)?
                .with_shutdown(shutdown_on_ctrl_c())
                .run()
                .await;

            daemon.close().await;
            let status = daemon.status();
            report::print_stats(
                &format!("{} runs ({} failed)", status.calls, status.errors),
                &daemon.stats(),
            );
        }
        Commands::Status { remote } => match remote {
            Some(base) => {
                let status = report::fetch_remote(&base).await?;
                report::print_remote(&base, &status);
            }
            None => {
                let sink = config::build_sink(&cfg.sink)?;
                report::print_local(&cfg, &sink.status().await);
            }
        },
    }

    Ok(())
}
