//! Lending Position Engine
//!
//! Collateralized lending service over externally priced assets.
//! Features:
//! - Supply, borrow, repay and withdraw with LTV and health-factor checks
//! - Validated, cached oracle prices with median/mean/cache fallback
//! - Optimistic ledger updates settled against an external executor
//! - Background health monitoring with alerts and liquidation hand-off

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lending_api::{HttpPriceSource, RelayerClient};
use lending_chain::{PriceOracleAdapter, SystemClock, TimedExecutor};
use lending_core::{
    EngineConfig, InMemoryLedger, LendingEngine, PoolsConfig, PositionMonitor, TracingNotifier,
};

/// How often pending transactions are polled for a final status.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lending_core=debug,lending_chain=debug")),
        )
        .init();

    // LENDING_CONFIG points at a TOML file; otherwise LENDING_PROFILE picks
    // testing, production or default
    let config = EngineConfig::load()?;
    config.log_config();

    info!("Starting lending position engine");

    let clock = Arc::new(SystemClock);

    // Price feed behind the validating oracle adapter
    let price_source = Arc::new(HttpPriceSource::from_env()?);
    info!(url = price_source.base_url(), "Price API configured");
    let oracle = Arc::new(PriceOracleAdapter::new(
        price_source,
        config.oracle.clone(),
        clock.clone(),
    ));

    // Relayer, bounded by the executor timeout
    let relayer = Arc::new(RelayerClient::from_env()?);
    info!(url = relayer.base_url(), "Relayer configured");
    let executor = TimedExecutor::new(relayer, config.lending.executor_timeout());

    // Pools
    let pools = PoolsConfig::from_env()?.to_pools()?;
    if pools.is_empty() {
        warn!("No pools configured, set POOLS_CONFIG");
    }
    for pool in &pools {
        for asset in [&pool.collateral_asset, &pool.debt_asset] {
            if !oracle.supports(asset) {
                anyhow::bail!("Pool {} uses {} which has no price source in oracle.asset_ids", pool.id, asset);
            }
        }
        info!(
            pool = %pool.id,
            collateral = %pool.collateral_asset,
            debt = %pool.debt_asset,
            max_ltv = %pool.max_ltv,
            liquidation_threshold = %pool.liquidation_threshold,
            utilization = %pool.utilization(),
            "Pool loaded"
        );
    }
    let ledger = Arc::new(InMemoryLedger::with_pools(pools)?);

    let engine = Arc::new(
        LendingEngine::new(
            ledger.clone(),
            oracle.clone(),
            executor,
            clock.clone(),
            config.lending.clone(),
        )
        .with_thresholds(config.monitor.thresholds()),
    );

    // Liquidation hand-off; consumed by an external liquidator
    let (liquidation_tx, mut liquidation_rx) = mpsc::channel(config.monitor.liquidation_channel_capacity);
    let monitor = Arc::new(
        PositionMonitor::new(
            ledger,
            oracle,
            Arc::new(TracingNotifier),
            clock,
            config.monitor.clone(),
        )
        .with_liquidation_sender(liquidation_tx),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    handles.push(tokio::spawn(async move {
        while let Some(position_id) = liquidation_rx.recv().await {
            warn!(position = %position_id, "Position queued for liquidation");
        }
    }));

    let monitor_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    }));

    let mut reconcile_shutdown = shutdown_rx;
    handles.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => match engine.reconcile_pending().await {
                    Ok(report) if report.checked > 0 => info!(
                        checked = report.checked,
                        confirmed = report.confirmed,
                        failed = report.failed,
                        still_pending = report.still_pending,
                        errors = report.errors,
                        "Reconciled pending transactions"
                    ),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Reconcile failed"),
                },
                changed = reconcile_shutdown.changed() => {
                    if changed.is_err() || *reconcile_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }));

    info!("All components initialized");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown_tx.send(true)?;

    // The liquidation consumer ends once the monitor drops its sender
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Task panicked");
        }
    }

    info!("Lending position engine stopped");
    Ok(())
}
