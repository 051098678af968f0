//! Collector - Scheduled API to message queue bridge

use anyhow::{anyhow, Result};
use clap::Parser;
use collector::config::Settings;
use collector::fetcher::Fetcher;
use collector::normalizer::Normalizer;
use collector::orchestrator::{CycleOrchestrator, CycleOutcome, FetchRequest};
use collector::publisher::AmqpPublisher;
use collector::retry::RetryPolicy;
use collector::scheduler::Scheduler;
use collector_common::logging::{init_logging, LogConfig, LogLevel};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(
    author,
    version,
    about = "Collects data from an HTTP API and publishes it to a message queue"
)]
struct Cli {
    /// Run a single collection cycle and exit
    #[arg(long)]
    once: bool,

    /// Endpoint suffix appended to API_URL (overrides API_ENDPOINT)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Query parameter passed through to the API, repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `.env` feeds both Settings and the logging fallback below
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();

    // Logging comes up even when the rest of the configuration is invalid
    let mut log_config = match &settings {
        Ok(settings) => settings.log.clone(),
        Err(_) => LogConfig::from_env().unwrap_or_default(),
    };
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    let _log_guard = init_logging(&log_config)?;

    let mut settings = settings.inspect_err(|e| {
        error!(error = %e, "Invalid configuration, collector not started");
    })?;
    if let Some(endpoint) = cli.endpoint {
        settings.api.endpoint = endpoint;
    }

    info!("Starting data collector");
    info!(
        api_url = %settings.api.url,
        endpoint = %settings.api.endpoint,
        broker = %format!("{}:{}", settings.broker.host, settings.broker.port),
        queue = %settings.broker.queue,
        exchange = %settings.broker.exchange,
        interval_secs = settings.schedule.interval_secs,
        "Configuration loaded"
    );

    let fetcher = Fetcher::new(&settings.api, RetryPolicy::from(&settings.retry))?;
    let request = FetchRequest::new(Some(settings.api.endpoint.clone())).with_params(cli.params);
    let orchestrator = CycleOrchestrator::new(fetcher, Normalizer::default(), request);

    let publisher = AmqpPublisher::new(settings.broker.clone());
    let reconnect = RetryPolicy::new(settings.broker.reconnect_attempts, settings.retry.delay());
    let mut scheduler = Scheduler::new(
        orchestrator,
        publisher,
        settings.schedule.interval(),
        reconnect,
    );

    if cli.once {
        return match scheduler.run_once().await? {
            CycleOutcome::Completed { published } => {
                info!(published, "Single cycle complete");
                Ok(())
            },
            CycleOutcome::Failed { stage, error } => {
                Err(anyhow!("Collection cycle failed at {stage}: {error}"))
            },
        };
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    scheduler.run(shutdown).await?;

    info!("Collector shut down gracefully");
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    token.cancel();
}
