//! Dues Ledger - Penalty Sweep Worker
//!
//! Connects to PostgreSQL, applies pending migrations and runs the late
//! penalty sweep once a day until interrupted.
//!
//! # Usage
//!
//! ```bash
//! LEDGER_DATABASE_URL=postgres://... LEDGER_TIMEZONE=Asia/Colombo cargo run --bin ledger-worker
//! ```
//!
//! # Environment Variables
//!
//! * `LEDGER_DATABASE_URL` - PostgreSQL connection string (falls back to `DATABASE_URL`)
//! * `LEDGER_TIMEZONE` - IANA zone of the business calendar (default: UTC)
//! * `LEDGER_SWEEP_TIME` - Local time of the daily sweep, `HH:MM` (default: 01:00)
//! * `LEDGER_RUN_ON_START` - Sweep once at start-up (default: false)
//! * `LEDGER_PENALTY__GRACE_PERIOD_DAYS` - Days without penalty (default: 7)
//! * `LEDGER_PENALTY__WEEKLY_PENALTY_RATE` - Rate per full week (default: 0.01)
//! * `LEDGER_LOG_LEVEL` - Log filter when `RUST_LOG` is unset (default: info)

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::SystemClock;
use infra_db::{create_pool, run_migrations, PostgresLedgerAdapter};
use ledger_worker::{config::LedgerConfig, LedgerServices, SweepScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = LedgerConfig::from_env().context("loading configuration")?;
    init_tracing(&config.log_level);

    let timezone = config.timezone()?;
    let sweep_time = config.sweep_time()?;
    info!(
        timezone = %timezone.0,
        sweep_time = %sweep_time,
        grace_days = config.penalty.grace_period_days,
        weekly_rate = %config.penalty.weekly_penalty_rate,
        "Starting dues ledger worker"
    );

    let pool = create_pool(config.database())
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;

    let store = Arc::new(PostgresLedgerAdapter::new(pool));
    let clock = Arc::new(SystemClock::new(timezone));
    let services = LedgerServices::new(&config, store, clock);

    let scheduler = SweepScheduler::new(services.penalties.clone(), timezone, sweep_time)
        .run_on_start(config.run_on_start);
    let shutdown = scheduler.shutdown_handle();
    let handle = scheduler.start();

    shutdown_signal().await;
    shutdown.notify_one();
    handle.await.context("sweep scheduler panicked")?;

    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing current sweep"),
        _ = terminate => info!("Received SIGTERM, finishing current sweep"),
    }
}
