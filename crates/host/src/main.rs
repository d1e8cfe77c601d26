use std::time::Duration;

use anyhow::Context;
use jobforge_engine::{EngineConfig, JobEngine, RecurringJobId, WorkUnit};
use jobforge_host::RecurringDriver;
use jobforge_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let format = std::env::var("JOBFORGE_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse::<LogFormat>().ok())
        .unwrap_or_default();
    jobforge_observability::tracing::init(format);

    let config = EngineConfig::from_env();
    tracing::info!(config = %serde_json::to_string(&config)?, "loaded engine configuration");

    let engine = JobEngine::new(config).context("failed to start job engine")?;

    let heartbeat = std::env::var("JOBFORGE_HEARTBEAT_SCHEDULE").unwrap_or_else(|_| {
        tracing::warn!("JOBFORGE_HEARTBEAT_SCHEDULE not set; using @every 30s");
        "@every 30s".to_string()
    });
    engine.add_or_update_recurring(
        RecurringJobId::new("heartbeat")?,
        "host.heartbeat",
        WorkUnit::new(|ctx| async move {
            tracing::info!(job_id = %ctx.job_id, "heartbeat");
            Ok(())
        }),
        heartbeat,
    )?;

    let tick_ms = std::env::var("JOBFORGE_DRIVER_TICK_MS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(1_000);

    let sweeper = engine.spawn_sweeper();
    let driver = RecurringDriver::new(engine.clone(), Duration::from_millis(tick_ms));

    driver
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await;

    sweeper.shutdown().await;

    let stats = engine.stats()?;
    tracing::info!(stats = %serde_json::to_string(&stats)?, "job engine stopped");
    Ok(())
}
