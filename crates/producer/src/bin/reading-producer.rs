//! reading-producer — replays the smoker dataset onto the sensor queues.
//!
//! Every row becomes one `timestamp,value` message per sensor, published
//! to that sensor's durable queue, with `reading_interval_secs` between
//! rows. Stops early on Ctrl+C.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info};

use pitwatch_core::{Config, MonitorConfig};
use pitwatch_producer::{dataset, Replayer};
use pitwatch_queue::RabbitMqPublisher;

// ── CLI ─────────────────────────────────────────────────────────────

/// Publishes recorded smoker temperatures at a fixed cadence.
#[derive(Parser, Debug)]
#[command(name = "reading-producer", version, about)]
struct Cli {
    /// CSV dataset: header, then timestamp,smoker,food A,food B.
    #[arg(long, env = "PITWATCH_DATASET", default_value = "smoker-temps.csv")]
    input: String,

    /// Path to the sensor profile file. Built-in profiles are used when omitted.
    #[arg(long, env = "PITWATCH_CONFIG")]
    config: Option<String>,

    /// Broker host, overriding `PITWATCH_AMQP_HOST`.
    #[arg(long)]
    host: Option<String>,

    /// Seconds between rows, overriding `reading_interval_secs`. 0 publishes
    /// without pausing.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Publish at most this many rows.
    #[arg(long)]
    limit: Option<usize>,

    /// Delete and re-declare the sensor queues before publishing.
    #[arg(long)]
    purge: bool,

    /// Emit JSON log lines.
    #[arg(long, env = "PITWATCH_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_profiles(path: Option<&str>) -> anyhow::Result<MonitorConfig> {
    let mut profiles = match path {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("failed to load sensor profiles from {path}"))?,
        None => MonitorConfig::reference(),
    };
    profiles.apply_env_overrides();
    profiles.validate().context("invalid sensor profiles")?;
    Ok(profiles)
}

/// Pause between rows: the command-line override, else the profile cadence.
fn replay_interval(override_secs: Option<u64>, profiles: &MonitorConfig) -> Duration {
    Duration::from_secs(override_secs.unwrap_or(profiles.reading_interval_secs))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let profiles = load_profiles(cli.config.as_deref())?;

    let rows = dataset::load(&cli.input)
        .with_context(|| format!("failed to read dataset {}", cli.input))?;
    info!(path = %cli.input, rows = rows.len(), "dataset loaded");

    let mut config = Config::from_env();
    if let Some(host) = cli.host {
        config.broker = config.broker.with_host(host);
    }

    let publisher = RabbitMqPublisher::connect(&config.broker.uri())
        .await
        .with_context(|| {
            format!(
                "connection to RabbitMQ failed, verify the server is running on {}",
                config.broker.redacted_uri()
            )
        })?;

    let shutdown = Arc::new(Notify::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal_shutdown.notify_one();
        }
    });

    let replayer = Replayer::new(&publisher, &profiles)
        .with_interval(replay_interval(cli.interval_secs, &profiles));
    info!(interval_secs = replayer.interval().as_secs(), "replaying");
    let result = replayer.run(&rows, cli.purge, cli.limit, shutdown).await;

    if let Err(e) = publisher.close().await {
        error!(error = %e, "failed to close broker connection");
    }

    let summary = result?;
    info!(
        rows = summary.rows,
        published = summary.published,
        skipped = summary.skipped,
        interrupted = summary.interrupted,
        "replay finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    pitwatch_core::config::load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("reading producer stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_override_is_allowed() {
        let profiles = load_profiles(None).unwrap();
        assert_eq!(replay_interval(Some(0), &profiles), Duration::ZERO);
    }

    #[test]
    fn interval_defaults_to_profile_cadence() {
        let profiles = MonitorConfig::reference();
        assert_eq!(
            replay_interval(None, &profiles),
            Duration::from_secs(profiles.reading_interval_secs)
        );
    }
}
