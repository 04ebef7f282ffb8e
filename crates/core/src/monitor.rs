//! Background health monitoring of active positions.
//!
//! Each cycle loads the active positions, batch-fetches the prices they need,
//! classifies every position and raises alerts through the notification
//! gateway. The only ledger write is the cached health factor, and it is
//! dropped if the position changed since it was read.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lending_chain::{Clock, PriceOracleAdapter};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::alerts::{NotificationGateway, Severity};
use crate::config::MonitorSettings;
use crate::error::LedgerError;
use crate::health::{self, HealthClass, HealthThresholds, PairPrices};
use crate::ledger::PositionLedger;
use crate::pool::{Pool, PoolId};
use crate::position::{Position, PositionId, PositionStatus};

/// Classification of one position in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionAssessment {
    pub position_id: PositionId,
    pub pool_id: PoolId,
    pub health_factor: Option<Decimal>,
    pub class: HealthClass,
}

/// Per-cycle statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub evaluated: usize,
    pub safe: usize,
    pub at_risk: usize,
    pub critical: usize,
    pub liquidatable: usize,
    /// Positions without a usable price or pool
    pub skipped: usize,
    pub alerts_sent: usize,
    pub health_updates: usize,
    /// Ordered by position id
    pub assessments: Vec<PositionAssessment>,
}

impl CycleReport {
    fn count(&mut self, class: HealthClass) {
        self.evaluated += 1;
        match class {
            HealthClass::Safe => self.safe += 1,
            HealthClass::AtRisk => self.at_risk += 1,
            HealthClass::Critical => self.critical += 1,
            HealthClass::Liquidatable => self.liquidatable += 1,
        }
    }
}

/// Last alert raised for a position.
#[derive(Debug, Clone, Copy)]
struct AlertRecord {
    class: HealthClass,
    sent_at: DateTime<Utc>,
}

/// Scheduled position health monitor.
pub struct PositionMonitor {
    ledger: Arc<dyn PositionLedger>,
    oracle: Arc<PriceOracleAdapter>,
    notifier: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
    thresholds: HealthThresholds,
    last_alerts: DashMap<PositionId, AlertRecord>,
    liquidations: Option<mpsc::Sender<PositionId>>,
}

impl fmt::Debug for PositionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionMonitor")
            .field("settings", &self.settings)
            .field("tracked_alerts", &self.last_alerts.len())
            .field("forwards_liquidations", &self.liquidations.is_some())
            .finish()
    }
}

impl PositionMonitor {
    /// Create a new monitor.
    pub fn new(
        ledger: Arc<dyn PositionLedger>,
        oracle: Arc<PriceOracleAdapter>,
        notifier: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
    ) -> Self {
        let thresholds = settings.thresholds();
        Self {
            ledger,
            oracle,
            notifier,
            clock,
            settings,
            thresholds,
            last_alerts: DashMap::new(),
            liquidations: None,
        }
    }

    /// Forward liquidatable position ids to an external liquidation executor.
    pub fn with_liquidation_sender(mut self, sender: mpsc::Sender<PositionId>) -> Self {
        self.liquidations = Some(sender);
        self
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Run one evaluation cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, LedgerError> {
        let positions = self.ledger.positions_by_status(PositionStatus::Active).await?;
        let pools: HashMap<PoolId, Pool> = self
            .ledger
            .pools()
            .await?
            .into_iter()
            .map(|pool| (pool.id.clone(), pool))
            .collect();

        // Only indebted positions need prices
        let assets: BTreeSet<&str> = positions
            .iter()
            .filter(|p| p.has_debt())
            .filter_map(|p| pools.get(&p.pool_id))
            .flat_map(|pool| [pool.collateral_asset.as_str(), pool.debt_asset.as_str()])
            .collect();
        let assets: Vec<&str> = assets.into_iter().collect();
        let quotes = if assets.is_empty() {
            HashMap::new()
        } else {
            self.oracle.get_prices(&assets).await
        };
        let price = |asset: &str| quotes.get(asset).and_then(|q| q.as_ref().ok()).map(|q| q.price);

        // Forget alert history of positions that are no longer active
        let active: HashSet<PositionId> = positions.iter().map(|p| p.id).collect();
        self.last_alerts.retain(|id, _| active.contains(id));

        let now = self.clock.now();
        let mut report = CycleReport::default();

        for position in &positions {
            let Some(pool) = pools.get(&position.pool_id) else {
                warn!(position = %position.id, pool = %position.pool_id, "Position references unknown pool");
                report.skipped += 1;
                continue;
            };

            let health_factor = if position.has_debt() {
                let (Some(collateral), Some(debt)) = (price(&pool.collateral_asset), price(&pool.debt_asset)) else {
                    debug!(position = %position.id, "No usable prices, skipping");
                    report.skipped += 1;
                    continue;
                };
                match health::health_factor(position, pool, &PairPrices { collateral, debt }) {
                    Ok(hf) => hf,
                    Err(e) => {
                        error!(position = %position.id, error = %e, "Health factor computation failed");
                        report.skipped += 1;
                        continue;
                    }
                }
            } else {
                None
            };

            let class = HealthClass::classify(health_factor, &self.thresholds);
            report.count(class);

            if position.health_factor != health_factor {
                if self.ledger.record_health(position.id, position.version, health_factor).await? {
                    report.health_updates += 1;
                } else {
                    debug!(position = %position.id, "Position changed during cycle, health not recorded");
                }
            }

            if self.alert(position, health_factor, class, now) {
                report.alerts_sent += 1;
            }

            report.assessments.push(PositionAssessment {
                position_id: position.id,
                pool_id: position.pool_id.clone(),
                health_factor,
                class,
            });
        }

        if report.liquidatable > 0 || report.critical > 0 {
            info!(
                evaluated = report.evaluated,
                at_risk = report.at_risk,
                critical = report.critical,
                liquidatable = report.liquidatable,
                skipped = report.skipped,
                "Monitor cycle complete"
            );
        } else {
            debug!(
                evaluated = report.evaluated,
                at_risk = report.at_risk,
                skipped = report.skipped,
                "Monitor cycle complete"
            );
        }
        Ok(report)
    }

    /// Run cycles on the configured interval until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.settings.interval_secs, "Starting position monitor");
        let mut ticker = interval(self.settings.interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Monitor cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Position monitor stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Raise an alert on a class change or once the cooldown has passed.
    fn alert(&self, position: &Position, health_factor: Option<Decimal>, class: HealthClass, now: DateTime<Utc>) -> bool {
        let Some(severity) = Severity::for_class(class) else {
            self.last_alerts.remove(&position.id);
            return false;
        };

        let due = match self.last_alerts.get(&position.id) {
            // A clock that moved backwards never counts as elapsed
            Some(last) => {
                last.class != class
                    || (now - last.sent_at)
                        .to_std()
                        .is_ok_and(|elapsed| elapsed >= self.settings.alert_cooldown())
            }
            None => true,
        };
        if !due {
            return false;
        }

        let hf = health_factor.map(|hf| hf.round_dp(4).to_string()).unwrap_or_default();
        let message = format!(
            "position {} in pool {} is {} (health factor {}, debt {}, collateral {})",
            position.id, position.pool_id, class, hf, position.debt_amount, position.collateral_amount
        );
        self.notifier.notify(position.id, severity, &message);
        self.last_alerts.insert(position.id, AlertRecord { class, sent_at: now });

        if class.is_liquidatable() {
            if let Some(sender) = &self.liquidations {
                if let Err(e) = sender.try_send(position.id) {
                    warn!(position = %position.id, error = %e, "Liquidation candidate dropped");
                }
            }
        }
        true
    }
}
