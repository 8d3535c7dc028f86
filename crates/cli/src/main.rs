//! RESTful Metrics CLI - add metrics and drive the delayed job queue

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use restful_metrics_core::application::{
    shutdown_channel, JobRunner, MetricReceipt, MetricsClient, PeriodicRunner, RecoveryService,
    RetryPolicy,
};
use restful_metrics_core::domain::MetricValue;
use restful_metrics_core::port::id_provider::ProcessRunIdProvider;
use restful_metrics_core::port::time_provider::SystemTimeProvider;
use restful_metrics_core::port::{AuditLog, JobStore};
use restful_metrics_core::DeliveryMode;
use restful_metrics_infra_http::{HttpTransport, HttpTransportConfig};
use restful_metrics_infra_sqlite::{create_pool_with, run_migrations, PoolConfig, SqliteJobStore};
use settings::Settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "restful-metrics")]
#[command(about = "RESTful Metrics client and delayed job runner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ./restful-metrics.toml if present)
    #[arg(short, long, env = "RESTFUL_METRICS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a metric (sent now, or queued in deferred mode)
    Add {
        /// Metric name
        metric: String,

        /// Value as JSON (number, bool, string or array); anything else is sent as text
        value: String,

        /// Distinct user id, overrides the configured one
        #[arg(short, long)]
        distinct_id: Option<String>,
    },

    /// Deliver every queued job once
    Run,

    /// Deliver queued jobs periodically until Ctrl+C
    Serve {
        /// Seconds between passes (default from configuration)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Release locks left by crashed runs
    Sweep,

    /// Show queue status
    Status,
}

#[derive(Tabled)]
struct QueueStat {
    table: &'static str,
    rows: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Add {
            metric,
            value,
            distinct_id,
        } => add(&settings, &metric, parse_value(&value), distinct_id.as_deref()).await,
        Commands::Run => run_once(&settings).await,
        Commands::Serve { interval_secs } => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.runner.interval());
            serve(&settings, interval).await
        }
        Commands::Sweep => sweep(&settings).await,
        Commands::Status => status(&settings).await,
    }
}

fn init_logging() {
    let log_format =
        std::env::var("RESTFUL_METRICS_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("restful_metrics=info"));

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// JSON scalar or array of scalars, else the raw text
fn parse_value(raw: &str) -> MetricValue {
    serde_json::from_str(raw).unwrap_or_else(|_| MetricValue::from(raw))
}

async fn open_store(settings: &Settings) -> Result<Arc<SqliteJobStore>> {
    let db_url = settings.database.expanded_url();
    ensure_parent_dir(&db_url)?;

    info!(db_url = %db_url, "Opening job store");
    let pool_config = PoolConfig {
        max_connections: settings.database.max_connections,
        ..Default::default()
    };
    let pool = create_pool_with(&db_url, &pool_config)
        .await
        .with_context(|| format!("Failed to open job store at {}", db_url))?;
    run_migrations(&pool).await.context("Migration failed")?;

    Ok(Arc::new(SqliteJobStore::new(
        pool,
        Arc::new(SystemTimeProvider),
    )))
}

/// Create the directory of a file database; memory URLs are left alone
fn ensure_parent_dir(db_url: &str) -> Result<()> {
    if db_url.contains(":memory:") || db_url.contains("mode=memory") {
        return Ok(());
    }
    let path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn build_transport(settings: &Settings) -> Result<Arc<HttpTransport>> {
    let config = HttpTransportConfig::new(settings.metrics.api_key.clone().unwrap_or_default())
        .with_base_url(settings.http.base_url.clone())
        .with_timeout(settings.http.timeout());
    Ok(Arc::new(HttpTransport::new(config)?))
}

fn build_runner(settings: &Settings, store: Arc<SqliteJobStore>) -> Result<JobRunner> {
    if settings
        .metrics
        .api_key
        .as_deref()
        .map_or(true, str::is_empty)
    {
        anyhow::bail!("API Key must be set before running delayed jobs");
    }

    let retry_policy = settings
        .runner
        .max_attempts
        .map(RetryPolicy::bounded)
        .unwrap_or_default();

    Ok(JobRunner::new(
        store.clone(),
        store,
        build_transport(settings)?,
        Arc::new(ProcessRunIdProvider),
        Arc::new(SystemTimeProvider),
    )
    .with_retry_policy(retry_policy))
}

async fn add(
    settings: &Settings,
    metric: &str,
    value: MetricValue,
    distinct_id: Option<&str>,
) -> Result<()> {
    let mut client = MetricsClient::new(settings.metrics.clone(), build_transport(settings)?);
    if settings.metrics.mode == DeliveryMode::Deferred {
        client = client.with_job_store(open_store(settings).await?);
    }

    match client.add_metric(metric, value, distinct_id).await? {
        MetricReceipt::Sent => println!("{}", format!("✓ Metric '{}' sent", metric).green().bold()),
        MetricReceipt::Queued(job_id) => println!(
            "{}",
            format!("✓ Metric '{}' queued as job {}", metric, job_id)
                .green()
                .bold()
        ),
        MetricReceipt::Suppressed => {
            println!("{}", "Metrics are disabled, nothing sent".yellow())
        }
    }
    Ok(())
}

async fn run_once(settings: &Settings) -> Result<()> {
    let store = open_store(settings).await?;
    let mut runner = build_runner(settings, store)?;

    let report = runner.run().await?;

    println!(
        "{}",
        format!(
            "✓ Delivered {} of {} jobs (run {})",
            report.delivered, report.claimed, report.run_id
        )
        .green()
        .bold()
    );
    for failed in &report.failed {
        println!("  {} job {}: {}", "✗".red(), failed.job_id, failed.failure);
    }

    runner.ensure_no_errors()?;
    Ok(())
}

async fn serve(settings: &Settings, interval: Duration) -> Result<()> {
    info!("RESTful Metrics runner v{} starting...", VERSION);

    let store = open_store(settings).await?;
    let runner = build_runner(settings, store.clone())?;
    let recovery = RecoveryService::new(
        store,
        Arc::new(SystemTimeProvider),
        Some(settings.runner.stale_lock_ms()),
    );
    let mut periodic = PeriodicRunner::new(runner, interval).with_recovery(recovery);

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let runner_handle = tokio::spawn(async move {
        if let Err(e) = periodic.run(shutdown_rx).await {
            tracing::error!(error = ?e, "Periodic runner failed");
        }
    });

    info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");
    shutdown_tx.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(30), runner_handle).await;

    info!("Shutdown complete.");
    Ok(())
}

async fn sweep(settings: &Settings) -> Result<()> {
    let store = open_store(settings).await?;
    let recovery = RecoveryService::new(
        store,
        Arc::new(SystemTimeProvider),
        Some(settings.runner.stale_lock_ms()),
    );

    let released = recovery.release_stale_locks().await?;
    println!("  {} {} stale locks released", "✓".green(), released);
    Ok(())
}

async fn status(settings: &Settings) -> Result<()> {
    let store = open_store(settings).await?;

    let stats = vec![
        QueueStat {
            table: "pending jobs",
            rows: store.count_pending().await?,
        },
        QueueStat {
            table: "locked jobs",
            rows: store.count_locked().await?,
        },
        QueueStat {
            table: "audit log",
            rows: store.count_completed().await?,
        },
    ];

    println!("{}", "RESTful Metrics queue".bold());
    println!("{}", Table::new(stats));
    Ok(())
}
