//! WeeWX daemon: station driver, interval archiving and daily summaries
//!
//! This binary coordinates:
//! - Weather station data collection (via drivers)
//! - Interval aggregation into the SQLite archive
//! - End-of-day statistics through the aggregation engine

mod config;
mod scheduler;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use weewx_config::AppConfig;
use weex_archive::IntervalAggregator;
use weex_db::DbClient;
use weex_ingest::{create_packet_channel, pump, DriverRegistry};
use weex_query::{AggregationEngine, QueryPool};

use crate::config::DaemonConfig;
use crate::scheduler::{DailySummaries, Scheduler};

/// LOOP packets allowed to queue between the driver and the archiver
const PACKET_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    weewx_obs::init("weexd");

    let app = AppConfig::load().context("Failed to load configuration")?;
    let config = DaemonConfig::from_app(&app)?;
    info!(
        station = %config.station_id,
        driver = %config.driver,
        archive_interval = config.archive_interval,
        "Starting WeeWX daemon"
    );

    let db = DbClient::open(config.db_options.clone())
        .await
        .with_context(|| format!("Failed to open archive {}", config.db_options.path().display()))?;
    db.ping().await.context("Database ping failed")?;
    let caught_up = db
        .backfill_daily()
        .await
        .context("Failed to bring daily summaries up to date")?;
    info!(records = caught_up, "Daily summaries up to date");

    let driver = DriverRegistry::builtin()
        .create(&config.driver, &config.driver_options)
        .with_context(|| format!("Failed to create driver {}", config.driver))?;

    let aggregator = IntervalAggregator::new(
        config.archive_interval,
        Arc::clone(&config.model),
        config.accumulators.clone(),
        db.clone(),
    )
    .context("Failed to create interval aggregator")?;

    let engine = AggregationEngine::new(db.clone(), Arc::clone(&config.model), Arc::new(config.xtypes()));
    let pool = Arc::new(QueryPool::new(
        Arc::new(engine),
        config.query_workers,
        config.query_timeout,
    ));

    let shutdown = CancellationToken::new();
    let (sender, receiver) = create_packet_channel(PACKET_QUEUE);
    let mut ingest = tokio::spawn(pump(driver, sender, shutdown.child_token()));

    let mut scheduler = Scheduler::new(receiver, aggregator)
        .with_summaries(DailySummaries::new(Arc::clone(&pool), db.clock()));
    // Drains the queue and stops once the pump drops its sender
    let archiver = tokio::spawn(async move { scheduler.run(CancellationToken::new()).await });

    info!("Daemon running - press Ctrl+C to stop");
    let pumped = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown signal received");
            shutdown.cancel();
            (&mut ingest).await
        }
        pumped = &mut ingest => {
            warn!("Driver stopped on its own, shutting down");
            shutdown.cancel();
            pumped
        }
    };
    match pumped {
        Ok(Ok(forwarded)) => info!(packets = forwarded, "Driver stopped"),
        Ok(Err(e)) => error!("Driver failed: {}", e),
        Err(e) => error!("Driver task panicked: {}", e),
    }

    let stats = archiver.await.context("Archiver task panicked")??;
    pool.shutdown();
    info!(
        packets = stats.packets,
        records = stats.records,
        "WeeWX daemon stopped"
    );

    db.close().await;
    Ok(())
}
