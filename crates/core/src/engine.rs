//! Lending engine: supply, borrow, repay and withdraw.
//!
//! Every operation runs the same pipeline under the per-(owner, pool) lock:
//! validate inputs, load state and accrue interest, fetch prices, check the
//! prospective position, submit to the executor, then commit the position,
//! pool delta and transaction record in one ledger step. A rejected
//! operation persists nothing.
//!
//! Ledger updates are optimistic. [`LendingEngine::settle`] finalizes a
//! transaction once the executor reports an outcome and reverses the
//! update when it failed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lending_chain::{Clock, ExecutionStatus, PriceOracleAdapter, SubmitRequest, TimedExecutor};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::LendingSettings;
use crate::error::{LendingError, Result};
use crate::health::{self, HealthClass, HealthThresholds, PairPrices};
use crate::ledger::{Commit, LedgerUpdate, PoolDelta, PositionLedger, Settle};
use crate::math::{self, sub_floor, VALUE_SCALE};
use crate::pool::{Pool, PoolId};
use crate::position::{Position, PositionId, PositionKey, PositionStatus};
use crate::transaction::{NewTransaction, OperationType, Transaction, TransactionId, TransactionStatus};

/// Longest owner address accepted, in hex digits.
const MAX_ADDRESS_DIGITS: usize = 64;

/// Position and transaction produced by an operation or settlement.
#[derive(Debug, Clone)]
pub struct OperationReceipt {
    pub position: Position,
    pub transaction: Transaction,
}

/// Final outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    Failed { reason: String },
}

impl Settlement {
    /// `None` while the executor still reports the transaction as pending.
    pub fn from_status(status: ExecutionStatus) -> Option<Self> {
        match status {
            ExecutionStatus::Pending => None,
            ExecutionStatus::Confirmed => Some(Self::Confirmed),
            ExecutionStatus::Failed { reason } => Some(Self::Failed { reason }),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Read-only health view of a position at current prices.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHealth {
    pub position_id: PositionId,
    pub status: PositionStatus,
    pub collateral_amount: Decimal,
    /// Includes interest accrued since the last update
    pub debt_amount: Decimal,
    pub health_factor: Option<Decimal>,
    pub ltv: Decimal,
    /// Additional debt the position can take on right now
    pub available_to_borrow: Decimal,
    pub max_withdrawable: Decimal,
    pub class: HealthClass,
    pub prices: PairPrices,
}

/// Lending engine.
pub struct LendingEngine {
    ledger: Arc<dyn PositionLedger>,
    oracle: Arc<PriceOracleAdapter>,
    executor: TimedExecutor,
    clock: Arc<dyn Clock>,
    settings: LendingSettings,
    thresholds: HealthThresholds,
    /// One lock per (owner, pool), shared by all four operations
    locks: DashMap<PositionKey, Arc<Mutex<()>>>,
    /// Serializes liquidity checks against submits that draw on the same pool
    pool_locks: DashMap<PoolId, Arc<Mutex<()>>>,
}

impl fmt::Debug for LendingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LendingEngine")
            .field("executor", &self.executor.name())
            .field("settings", &self.settings)
            .field("locks", &self.locks.len())
            .field("pool_locks", &self.pool_locks.len())
            .finish()
    }
}

impl LendingEngine {
    /// Create a new engine.
    pub fn new(
        ledger: Arc<dyn PositionLedger>,
        oracle: Arc<PriceOracleAdapter>,
        executor: TimedExecutor,
        clock: Arc<dyn Clock>,
        settings: LendingSettings,
    ) -> Self {
        Self {
            ledger,
            oracle,
            executor,
            clock,
            settings,
            thresholds: HealthThresholds::default(),
            locks: DashMap::new(),
            pool_locks: DashMap::new(),
        }
    }

    /// Set the thresholds used to classify positions in [`Self::position_health`].
    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn PositionLedger> {
        &self.ledger
    }

    pub fn settings(&self) -> &LendingSettings {
        &self.settings
    }

    /// Deposit collateral, opening a position on the first supply to a pool.
    #[instrument(skip(self))]
    pub async fn supply(&self, pool_id: &PoolId, asset: &str, amount: Decimal, owner: &str) -> Result<OperationReceipt> {
        validate_amount(amount)?;
        let owner = normalize_owner(owner)?;
        let pool = self.active_pool(pool_id).await?;
        if !pool.is_collateral_asset(asset) {
            return Err(LendingError::InvalidAsset {
                asset: asset.to_string(),
                reason: format!("pool {} takes {} as collateral", pool.id, pool.collateral_asset),
            });
        }

        let lock = self.position_lock(PositionKey {
            owner: owner.clone(),
            pool_id: pool.id.clone(),
        });
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let (mut position, expected_version) = match self.ledger.position_for(&owner, &pool.id).await? {
            Some(existing) => {
                let version = existing.version;
                (existing, Some(version))
            }
            None => {
                let id = self.ledger.next_position_id().await?;
                debug!(position = %id, owner = %owner, pool = %pool.id, "Opening position");
                (Position::new(id, owner.clone(), pool.id.clone(), now), None)
            }
        };
        let interest = self.accrue(&mut position, &pool, now)?;

        let rate = self.executor.exchange_rate(pool.id.as_str()).await?;
        let shares = health::shares_for_deposit(amount, rate)?;

        position.collateral_amount += amount;
        position.shares += shares;
        if position.has_debt() {
            position.health_factor = self.refreshed_health(&position, &pool).await;
        }
        position.updated_at = now;

        let request = SubmitRequest {
            operation: OperationType::Supply,
            pool_id: pool.id.to_string(),
            asset: pool.collateral_asset.clone(),
            amount,
            owner,
        };
        let update = LedgerUpdate {
            position,
            expected_version,
            pool_delta: PoolDelta::collateral(amount).with_interest(interest),
        };
        self.submit_and_commit(request, update, shares).await
    }

    /// Borrow the pool's debt asset against existing collateral.
    ///
    /// Checks, in order: prospective LTV against `max_ltv`, prospective health
    /// factor against 1.0, and the amount against available liquidity.
    #[instrument(skip(self))]
    pub async fn borrow(
        &self,
        pool_id: &PoolId,
        collateral_asset: &str,
        debt_asset: &str,
        amount: Decimal,
        owner: &str,
    ) -> Result<OperationReceipt> {
        validate_amount(amount)?;
        let owner = normalize_owner(owner)?;
        let pool = self.active_pool(pool_id).await?;
        if !pool.is_collateral_asset(collateral_asset) {
            return Err(LendingError::InvalidAsset {
                asset: collateral_asset.to_string(),
                reason: format!("pool {} takes {} as collateral", pool.id, pool.collateral_asset),
            });
        }
        if !pool.is_debt_asset(debt_asset) {
            return Err(LendingError::InvalidAsset {
                asset: debt_asset.to_string(),
                reason: format!("pool {} lends {}", pool.id, pool.debt_asset),
            });
        }

        let lock = self.position_lock(PositionKey {
            owner: owner.clone(),
            pool_id: pool.id.clone(),
        });
        let _guard = lock.lock().await;

        let mut position = self
            .ledger
            .position_for(&owner, &pool.id)
            .await?
            .filter(Position::has_collateral)
            .ok_or(LendingError::InsufficientBalance {
                balance: "collateral",
                requested: amount,
                available: Decimal::ZERO,
            })?;
        let expected_version = position.version;

        // Held through submit and commit so no other borrow can spend the
        // liquidity checked below
        let pool_lock = self.pool_lock(&pool.id);
        let _pool_guard = pool_lock.lock().await;
        let pool = self.load_pool(&pool.id).await?;
        let now = self.clock.now();
        let interest = self.accrue(&mut position, &pool, now)?;
        let prices = self.pair_prices(&pool).await?;

        let new_debt = position.debt_amount + amount;
        let ltv = health::ltv_for(position.collateral_amount, new_debt, &prices)?;
        if ltv > pool.max_ltv {
            debug!(position = %position.id, %ltv, max_ltv = %pool.max_ltv, "Borrow rejected");
            return Err(LendingError::LtvExceeded {
                ltv,
                max_ltv: pool.max_ltv,
            });
        }
        let health_factor =
            health::health_factor_for(position.collateral_amount, new_debt, pool.liquidation_threshold, &prices)?;
        if let Some(hf) = health_factor.filter(|hf| *hf < Decimal::ONE) {
            return Err(LendingError::HealthFactorTooLow {
                health_factor: hf,
                minimum: Decimal::ONE,
            });
        }
        let available = pool.available_liquidity();
        if amount > available {
            return Err(LendingError::InsufficientLiquidity {
                requested: amount,
                available,
            });
        }

        position.debt_amount = new_debt;
        position.health_factor = health_factor;
        position.updated_at = now;

        let request = SubmitRequest {
            operation: OperationType::Borrow,
            pool_id: pool.id.to_string(),
            asset: pool.debt_asset.clone(),
            amount,
            owner,
        };
        let update = LedgerUpdate {
            position,
            expected_version: Some(expected_version),
            pool_delta: PoolDelta::borrowed(amount).with_interest(interest),
        };
        self.submit_and_commit(request, update, Decimal::ZERO).await
    }

    /// Repay outstanding debt, including interest accrued so far.
    ///
    /// Never blocked on prices: if they are unavailable the previous health
    /// factor is kept until the monitor refreshes it.
    #[instrument(skip(self))]
    pub async fn repay(&self, position_id: PositionId, amount: Decimal, owner: &str) -> Result<OperationReceipt> {
        validate_amount(amount)?;
        let owner = normalize_owner(owner)?;
        let position = self.load_owned(position_id, &owner).await?;

        let lock = self.position_lock(position.key());
        let _guard = lock.lock().await;

        let mut position = self.load_active(position_id).await?;
        let expected_version = position.version;
        let pool = self.load_pool(&position.pool_id).await?;
        let now = self.clock.now();
        let interest = self.accrue(&mut position, &pool, now)?;

        if amount > position.debt_amount {
            return Err(LendingError::InvalidAmount {
                amount,
                reason: "exceeds outstanding debt",
            });
        }

        position.debt_amount -= amount;
        position.health_factor = if position.has_debt() {
            self.refreshed_health(&position, &pool).await
        } else {
            None
        };
        position.updated_at = now;

        let request = SubmitRequest {
            operation: OperationType::Repay,
            pool_id: pool.id.to_string(),
            asset: pool.debt_asset.clone(),
            amount,
            owner,
        };
        let update = LedgerUpdate {
            position,
            expected_version: Some(expected_version),
            pool_delta: PoolDelta::borrowed(-amount).with_interest(interest),
        };
        self.submit_and_commit(request, update, Decimal::ZERO).await
    }

    /// Withdraw collateral, burning shares at the current exchange rate.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, position_id: PositionId, amount: Decimal, owner: &str) -> Result<OperationReceipt> {
        validate_amount(amount)?;
        let owner = normalize_owner(owner)?;
        let position = self.load_owned(position_id, &owner).await?;

        let lock = self.position_lock(position.key());
        let _guard = lock.lock().await;

        let mut position = self.load_active(position_id).await?;
        let expected_version = position.version;
        let pool = self.load_pool(&position.pool_id).await?;

        if amount > position.collateral_amount {
            return Err(LendingError::InsufficientBalance {
                balance: "collateral",
                requested: amount,
                available: position.collateral_amount,
            });
        }

        let now = self.clock.now();
        let interest = self.accrue(&mut position, &pool, now)?;
        let remaining = position.collateral_amount - amount;

        let health_factor = if position.has_debt() {
            let prices = self.pair_prices(&pool).await?;
            let max_withdrawable = health::max_withdrawable(&position, &pool, &prices)?;
            if amount > max_withdrawable {
                return Err(LendingError::PositionUndercollateralized {
                    requested: amount,
                    max_withdrawable,
                });
            }
            let hf = health::health_factor_for(remaining, position.debt_amount, pool.liquidation_threshold, &prices)?;
            if let Some(hf) = hf.filter(|hf| *hf < Decimal::ONE) {
                return Err(LendingError::HealthFactorTooLow {
                    health_factor: hf,
                    minimum: Decimal::ONE,
                });
            }
            hf
        } else {
            None
        };

        let rate = self.executor.exchange_rate(pool.id.as_str()).await?;
        let shares = if remaining.is_zero() {
            position.shares
        } else {
            health::shares_for_deposit(amount, rate)?.min(position.shares)
        };

        position.collateral_amount = remaining;
        position.shares -= shares;
        position.health_factor = health_factor;
        position.updated_at = now;

        let request = SubmitRequest {
            operation: OperationType::Withdraw,
            pool_id: pool.id.to_string(),
            asset: pool.collateral_asset.clone(),
            amount,
            owner,
        };
        let update = LedgerUpdate {
            position,
            expected_version: Some(expected_version),
            pool_delta: PoolDelta::collateral(-amount).with_interest(interest),
        };
        self.submit_and_commit(request, update, shares).await
    }

    /// Finalize a pending transaction.
    ///
    /// A failed transaction has its ledger effect reversed, balances clamped
    /// at zero. A position left with no balances and nothing pending is
    /// closed. Settling a final transaction returns it unchanged.
    #[instrument(skip(self))]
    pub async fn settle(&self, tx_id: TransactionId, outcome: Settlement) -> Result<OperationReceipt> {
        let tx = self
            .ledger
            .transaction(tx_id)
            .await?
            .ok_or(LendingError::TransactionNotFound { tx_id })?;
        let position = self.load_position(tx.position_id).await?;

        let lock = self.position_lock(position.key());
        let _guard = lock.lock().await;

        let position = self.load_position(tx.position_id).await?;
        let tx = self
            .ledger
            .transaction(tx_id)
            .await?
            .ok_or(LendingError::TransactionNotFound { tx_id })?;
        if !tx.is_pending() {
            debug!(tx = %tx_id, status = ?tx.status, "Transaction already settled");
            return Ok(OperationReceipt {
                position,
                transaction: tx,
            });
        }

        // A reversed repay draws liquidity again
        let pool_lock = self.pool_lock(&position.pool_id);
        let _pool_guard = match outcome {
            Settlement::Failed { .. } => Some(pool_lock.lock().await),
            Settlement::Confirmed => None,
        };

        let (status, failure_reason, mut next, pool_delta) = match outcome {
            Settlement::Confirmed => (TransactionStatus::Confirmed, None, position.clone(), PoolDelta::default()),
            Settlement::Failed { reason } => {
                let (reversed, delta) = reversal(&position, &tx);
                (TransactionStatus::Failed, Some(reason), reversed, delta)
            }
        };

        if status == TransactionStatus::Failed && next.has_debt() {
            let pool = self.load_pool(&next.pool_id).await?;
            next.health_factor = self.refreshed_health(&next, &pool).await;
        }

        let others_pending = self
            .ledger
            .transactions_for_position(position.id)
            .await?
            .iter()
            .any(|other| other.id != tx.id && other.is_pending());
        if next.is_active() && next.is_empty() && !others_pending {
            next.status = PositionStatus::Closed;
        }

        let update = (next != position || !pool_delta.is_zero()).then(|| LedgerUpdate {
            position: next,
            expected_version: Some(position.version),
            pool_delta,
        });
        let (transaction, updated) = self
            .ledger
            .settle(Settle {
                tx_id,
                status,
                failure_reason,
                settled_at: self.clock.now(),
                update,
            })
            .await?;

        let position = updated.unwrap_or(position);
        match transaction.status {
            TransactionStatus::Failed => warn!(
                tx = %tx_id,
                external_tx = %transaction.external_id,
                operation = %transaction.operation,
                reason = transaction.failure_reason.as_deref().unwrap_or_default(),
                "Transaction failed, ledger update reversed"
            ),
            _ => info!(tx = %tx_id, operation = %transaction.operation, position_status = %position.status, "Transaction confirmed"),
        }
        Ok(OperationReceipt { position, transaction })
    }

    /// Poll the executor for every pending transaction and settle final ones.
    #[instrument(skip(self))]
    pub async fn reconcile_pending(&self) -> Result<ReconcileReport> {
        let pending = self.ledger.transactions_by_status(TransactionStatus::Pending).await?;
        let mut report = ReconcileReport {
            checked: pending.len(),
            ..Default::default()
        };

        for tx in pending {
            let status = match self.executor.status(&tx.external_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(tx = %tx.id, external_tx = %tx.external_id, error = %e, "Status poll failed");
                    report.errors += 1;
                    continue;
                }
            };
            let Some(outcome) = Settlement::from_status(status) else {
                report.still_pending += 1;
                continue;
            };
            let failed = matches!(outcome, Settlement::Failed { .. });
            match self.settle(tx.id, outcome).await {
                Ok(_) if failed => report.failed += 1,
                Ok(_) => report.confirmed += 1,
                Err(e) => {
                    warn!(tx = %tx.id, error = %e, "Settlement failed");
                    report.errors += 1;
                }
            }
        }

        if report.checked > 0 {
            info!(
                checked = report.checked,
                confirmed = report.confirmed,
                failed = report.failed,
                pending = report.still_pending,
                errors = report.errors,
                "Reconciliation pass complete"
            );
        }
        Ok(report)
    }

    /// Health view of a position at current prices. Persists nothing.
    #[instrument(skip(self))]
    pub async fn position_health(&self, position_id: PositionId) -> Result<PositionHealth> {
        let mut position = self.load_position(position_id).await?;
        let pool = self.load_pool(&position.pool_id).await?;
        self.accrue(&mut position, &pool, self.clock.now())?;
        let prices = self.pair_prices(&pool).await?;

        let health_factor = health::health_factor(&position, &pool, &prices)?;
        let limit = health::max_borrowable(position.collateral_amount, prices.collateral, prices.debt, pool.max_ltv)?;
        let available_to_borrow = sub_floor(limit, position.debt_amount).min(pool.available_liquidity());

        Ok(PositionHealth {
            position_id,
            status: position.status,
            collateral_amount: position.collateral_amount,
            debt_amount: position.debt_amount,
            health_factor,
            ltv: health::ltv(&position, &prices)?,
            available_to_borrow,
            max_withdrawable: health::max_withdrawable(&position, &pool, &prices)?,
            class: HealthClass::classify(health_factor, &self.thresholds),
            prices,
        })
    }

    fn position_lock(&self, key: PositionKey) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().clone()
    }

    /// Always taken after the position lock.
    fn pool_lock(&self, pool_id: &PoolId) -> Arc<Mutex<()>> {
        self.pool_locks.entry(pool_id.clone()).or_default().clone()
    }

    async fn load_pool(&self, pool_id: &PoolId) -> Result<Pool> {
        self.ledger
            .pool(pool_id)
            .await?
            .ok_or_else(|| LendingError::InvalidPool {
                pool_id: pool_id.clone(),
            })
    }

    async fn active_pool(&self, pool_id: &PoolId) -> Result<Pool> {
        let pool = self.load_pool(pool_id).await?;
        if !pool.active {
            return Err(LendingError::PoolNotActive {
                pool_id: pool_id.clone(),
            });
        }
        Ok(pool)
    }

    async fn load_position(&self, position_id: PositionId) -> Result<Position> {
        self.ledger
            .position(position_id)
            .await?
            .ok_or(LendingError::PositionNotFound { position_id })
    }

    async fn load_owned(&self, position_id: PositionId, owner: &str) -> Result<Position> {
        let position = self.load_position(position_id).await?;
        if position.owner != owner {
            return Err(LendingError::PositionNotOwned {
                position_id,
                caller: owner.to_string(),
            });
        }
        Ok(position)
    }

    async fn load_active(&self, position_id: PositionId) -> Result<Position> {
        let position = self.load_position(position_id).await?;
        if !position.is_active() {
            return Err(LendingError::PositionNotActive {
                position_id,
                status: position.status,
            });
        }
        Ok(position)
    }

    /// Add simple interest since the last update to the loaded debt.
    fn accrue(&self, position: &mut Position, pool: &Pool, now: DateTime<Utc>) -> Result<Decimal> {
        if !self.settings.accrue_interest || !position.has_debt() {
            return Ok(Decimal::ZERO);
        }
        let elapsed = position.secs_since_update(now);
        let interest = math::simple_interest(position.debt_amount, pool.borrow_apy, elapsed)?;
        if !interest.is_zero() {
            debug!(position = %position.id, %interest, elapsed_secs = elapsed, "Accrued interest");
            position.debt_amount += interest;
        }
        Ok(interest)
    }

    /// Collateral and debt prices, fetched concurrently.
    async fn pair_prices(&self, pool: &Pool) -> Result<PairPrices> {
        let (collateral, debt) = if self.settings.use_price_fallback {
            tokio::join!(
                self.oracle.get_price_with_fallback(&pool.collateral_asset),
                self.oracle.get_price_with_fallback(&pool.debt_asset)
            )
        } else {
            tokio::join!(
                self.oracle.get_price(&pool.collateral_asset),
                self.oracle.get_price(&pool.debt_asset)
            )
        };
        Ok(PairPrices {
            collateral: collateral?.price,
            debt: debt?.price,
        })
    }

    /// Best-effort health factor for operations that can only improve health.
    async fn refreshed_health(&self, position: &Position, pool: &Pool) -> Option<Decimal> {
        let refreshed = match self.pair_prices(pool).await {
            Ok(prices) => health::health_factor(position, pool, &prices).map_err(LendingError::from),
            Err(e) => Err(e),
        };
        match refreshed {
            Ok(hf) => hf,
            Err(e) => {
                warn!(position = %position.id, error = %e, "Keeping previous health factor");
                position.health_factor
            }
        }
    }

    async fn submit_and_commit(
        &self,
        request: SubmitRequest,
        update: LedgerUpdate,
        shares: Decimal,
    ) -> Result<OperationReceipt> {
        let external_id = self.executor.submit(&request).await?;
        let position_id = update.position.id;
        let commit = Commit {
            update,
            transaction: NewTransaction {
                position_id,
                operation: request.operation,
                asset: request.asset.clone(),
                amount: request.amount,
                shares,
                external_id: external_id.clone(),
                created_at: self.clock.now(),
            },
        };

        match self.ledger.commit(commit).await {
            Ok(committed) => {
                info!(
                    position = %committed.position.id,
                    tx = %committed.transaction.id,
                    external_tx = %external_id,
                    operation = %request.operation,
                    amount = %request.amount,
                    collateral = %committed.position.collateral_amount,
                    debt = %committed.position.debt_amount,
                    "Operation committed"
                );
                Ok(OperationReceipt {
                    position: committed.position,
                    transaction: committed.transaction,
                })
            }
            Err(e) => {
                error!(
                    position = %position_id,
                    external_tx = %external_id,
                    operation = %request.operation,
                    error = %e,
                    "Submitted transaction could not be recorded"
                );
                Err(e.into())
            }
        }
    }
}

/// Position and pool delta that undo a transaction's ledger effect.
fn reversal(position: &Position, tx: &Transaction) -> (Position, PoolDelta) {
    let mut reversed = position.clone();
    let delta = match tx.operation {
        OperationType::Supply => {
            let amount = tx.amount.min(reversed.collateral_amount);
            reversed.collateral_amount -= amount;
            reversed.shares = sub_floor(reversed.shares, tx.shares);
            PoolDelta::collateral(-amount)
        }
        OperationType::Withdraw => {
            reversed.collateral_amount += tx.amount;
            reversed.shares += tx.shares;
            PoolDelta::collateral(tx.amount)
        }
        OperationType::Borrow => {
            let amount = tx.amount.min(reversed.debt_amount);
            reversed.debt_amount -= amount;
            PoolDelta::borrowed(-amount)
        }
        OperationType::Repay => {
            reversed.debt_amount += tx.amount;
            PoolDelta::borrowed(tx.amount)
        }
    };
    if !reversed.has_debt() {
        reversed.health_factor = None;
    }
    (reversed, delta)
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LendingError::InvalidAmount {
            amount,
            reason: "must be positive",
        });
    }
    if amount.normalize().scale() > VALUE_SCALE {
        return Err(LendingError::InvalidAmount {
            amount,
            reason: "more than 18 decimal places",
        });
    }
    Ok(())
}

/// `0x` followed by 1 to 64 hex digits, lowercased.
fn normalize_owner(owner: &str) -> Result<String> {
    let valid = owner
        .strip_prefix("0x")
        .map(|digits| {
            !digits.is_empty()
                && digits.len() <= MAX_ADDRESS_DIGITS
                && digits.chars().all(|c| c.is_ascii_hexdigit())
        })
        .unwrap_or(false);
    if !valid {
        return Err(LendingError::InvalidAddress {
            address: owner.to_string(),
        });
    }
    Ok(owner.to_ascii_lowercase())
}
