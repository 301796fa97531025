//! monitor-worker — consumes one sensor queue and raises trend alerts.
//!
//! Run one process per sensor (`--sensor smoker`, `--sensor food-a`, ...).
//! Several processes may consume the same queue as competing consumers.
//!
//! Exit codes: 0 after SIGINT/SIGTERM, 1 on configuration, connection or
//! consumption failure.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info};

use pitwatch_core::{Config, MonitorConfig};
use pitwatch_monitor::{connect_with_retry, SensorWorker};
use pitwatch_notify::{Dispatcher, Notifier};
use pitwatch_queue::{QueuePublisher, RabbitMqConsumer};

// ── CLI ─────────────────────────────────────────────────────────────

/// Pit temperature monitor worker.
#[derive(Parser, Debug)]
#[command(name = "monitor-worker", version, about)]
struct Cli {
    /// Sensor profile to monitor (key under `[sensors]`).
    #[arg(long, env = "PITWATCH_SENSOR")]
    sensor: String,

    /// Path to the sensor profile file. Built-in profiles are used when omitted.
    #[arg(long, env = "PITWATCH_CONFIG")]
    config: Option<String>,

    /// Broker host, overriding `PITWATCH_AMQP_HOST`.
    #[arg(long)]
    host: Option<String>,

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

/// Resolve on SIGINT or SIGTERM (Ctrl+C elsewhere).
async fn os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let profiles = load_profiles(cli.config.as_deref())?;
    let profile = profiles.sensor(&cli.sensor)?;

    let mut config = Config::from_env();
    if let Some(host) = cli.host {
        config.broker = config.broker.with_host(host);
    }
    config.log_summary();

    let notifier: Arc<dyn Notifier> = Arc::new(Dispatcher::from_config(&config)?);
    let worker = SensorWorker::new(
        &cli.sensor,
        profile,
        profiles.reading_interval_secs,
        notifier,
    )?
    .with_alert_timeout(config.alert_timeout());

    let uri = config.broker.uri();
    let uri = uri.as_str();
    let redacted = config.broker.redacted_uri();
    let mut consumer = connect_with_retry(
        config.broker.connect_retries,
        Duration::from_millis(config.broker.connect_backoff_ms),
        |attempt| {
            info!(attempt, broker = %redacted, "connecting to broker");
            RabbitMqConsumer::connect(uri)
        },
    )
    .await
    .with_context(|| {
        format!("connection to RabbitMQ failed, verify the server is running on {redacted}")
    })?;

    let mut worker = if profile.dead_letter_queue.is_some() {
        let publisher: Arc<dyn QueuePublisher> = Arc::new(consumer.publisher());
        worker.with_dead_letters(publisher)
    } else {
        worker
    };

    let shutdown = Arc::new(Notify::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = os_signal().await {
            error!(error = %e, "failed to listen for shutdown signals");
            return;
        }
        info!("shutdown signal received");
        signal_shutdown.notify_one();
    });

    worker.run(&mut consumer, shutdown).await?;
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
            error!("monitor worker stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}
