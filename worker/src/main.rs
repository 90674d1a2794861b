//! Couple ledger worker.
//!
//! Runs the daily ticket reset sweep and the gateway sync listener against
//! the `PostgreSQL` stores and the Redis ticket cache.
//!
//! Run with: `cargo run -p couple-ledger-worker`
//! Metrics: `http://$METRICS_ADDR/metrics` when `METRICS_ADDR` is set

mod config;
mod lifecycle;

use anyhow::Context;
use config::WorkerConfig;
use couple_ledger::providers::{Clock, RandomCodeGenerator, SystemClock};
use couple_ledger::stores::RedisLedgerCache;
use couple_ledger::stores::postgres::{self, PostgresLedgerStore, PostgresPairingStore};
use couple_ledger::sync::RedisSyncListener;
use couple_ledger::{DailyResetSweep, PairingEngine, SyncInbox, TicketLedger};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,couple_ledger=debug,sqlx=warn".into()),
        )
        .init();

    let config = WorkerConfig::from_env()?;
    info!(
        cache_strategy = config.cache_strategy.name(),
        time_zone = %config.schedule.time_zone,
        reset_at = %config.schedule.reset_at,
        sync_enabled = config.sync_enabled,
        "Starting couple ledger worker"
    );

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        couple_ledger::metrics::register_metrics();
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    postgres::migrate(&pool).await?;
    info!("PostgreSQL connected and migrated");

    let cache = RedisLedgerCache::new(&config.redis_url).await?;
    info!("Redis ticket cache connected");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(PairingEngine::new(
        PostgresPairingStore::new(pool.clone()),
        RandomCodeGenerator,
        Arc::clone(&clock),
        config.pairing.clone(),
    ));
    let ledger = Arc::new(TicketLedger::new(
        engine,
        PostgresLedgerStore::new(pool.clone()),
        cache,
        Arc::clone(&config.cache_strategy),
        Arc::clone(&clock),
        config.ledger.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut handles = Vec::new();

    let sweep = Arc::new(DailyResetSweep::new(
        Arc::clone(&ledger),
        config.schedule.clone(),
        Arc::clone(&clock),
    ));
    handles.push(("daily_reset", sweep.spawn(shutdown_tx.subscribe())));

    if config.sync_enabled {
        let inbox = Arc::new(SyncInbox::new(Arc::clone(&ledger)));
        let listener = RedisSyncListener::new(&config.redis_url, config.sync_channel.clone(), inbox)?;
        handles.push(("ticket_sync", listener.spawn(shutdown_tx.subscribe())));
    }

    info!(tasks = handles.len(), "Worker running, press Ctrl+C to stop");
    lifecycle::shutdown_signal().await;

    info!("Shutting down background tasks");
    let _ = shutdown_tx.send(());
    lifecycle::await_shutdown(handles).await;
    pool.close().await;

    info!("Graceful shutdown complete");
    Ok(())
}
