//! Position ledger: durable positions, pools and transactions.
//!
//! The engine never writes position balances, pool totals or transaction
//! records separately. Every mutation is a [`Commit`] (or a settlement
//! [`LedgerUpdate`]) applied atomically, compare-and-swap on the position
//! version it was computed from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::pool::{Pool, PoolId};
use crate::position::{Position, PositionId, PositionKey, PositionStatus};
use crate::transaction::{NewTransaction, Transaction, TransactionId, TransactionStatus};

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Signed adjustments to a pool's totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolDelta {
    pub collateral: Decimal,
    pub supplied: Decimal,
    pub borrowed: Decimal,
}

impl PoolDelta {
    pub fn collateral(amount: Decimal) -> Self {
        Self {
            collateral: amount,
            ..Default::default()
        }
    }

    pub fn borrowed(amount: Decimal) -> Self {
        Self {
            borrowed: amount,
            ..Default::default()
        }
    }

    /// Accrued interest grows both lender liquidity and outstanding loans.
    pub fn with_interest(mut self, interest: Decimal) -> Self {
        self.supplied += interest;
        self.borrowed += interest;
        self
    }

    pub fn is_zero(&self) -> bool {
        self.collateral.is_zero() && self.supplied.is_zero() && self.borrowed.is_zero()
    }
}

/// New position state plus the pool adjustment it implies.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    /// Desired position state; its `version` is ignored and reassigned
    pub position: Position,
    /// Version the update was computed from; `None` creates the position
    pub expected_version: Option<u64>,
    pub pool_delta: PoolDelta,
}

/// One engine operation: position update and its transaction record.
#[derive(Debug, Clone)]
pub struct Commit {
    pub update: LedgerUpdate,
    pub transaction: NewTransaction,
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct Committed {
    pub position: Position,
    pub transaction: Transaction,
}

/// Settlement of a pending transaction.
#[derive(Debug, Clone)]
pub struct Settle {
    pub tx_id: TransactionId,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub settled_at: DateTime<Utc>,
    /// Position change applied in the same step (reversal or close)
    pub update: Option<LedgerUpdate>,
}

/// Persistent store behind the engine and the monitor.
#[async_trait]
pub trait PositionLedger: Send + Sync + Debug {
    /// Register a new pool.
    async fn create_pool(&self, pool: Pool) -> LedgerResult<()>;

    /// Mark a pool inactive. Pools are never deleted.
    async fn deactivate_pool(&self, pool_id: &PoolId) -> LedgerResult<Pool>;

    async fn pool(&self, pool_id: &PoolId) -> LedgerResult<Option<Pool>>;

    /// All pools, ordered by id.
    async fn pools(&self) -> LedgerResult<Vec<Pool>>;

    async fn position(&self, id: PositionId) -> LedgerResult<Option<Position>>;

    /// The active position an owner holds in a pool, if any.
    async fn position_for(&self, owner: &str, pool_id: &PoolId) -> LedgerResult<Option<Position>>;

    async fn positions_by_owner(&self, owner: &str) -> LedgerResult<Vec<Position>>;

    /// Positions with the given status, ordered by id.
    async fn positions_by_status(&self, status: PositionStatus) -> LedgerResult<Vec<Position>>;

    /// Allocate an id for a position about to be created.
    async fn next_position_id(&self) -> LedgerResult<PositionId>;

    /// Apply a position update, pool delta and pending transaction atomically.
    async fn commit(&self, commit: Commit) -> LedgerResult<Committed>;

    async fn transaction(&self, id: TransactionId) -> LedgerResult<Option<Transaction>>;

    async fn transactions_by_status(&self, status: TransactionStatus) -> LedgerResult<Vec<Transaction>>;

    async fn transactions_for_position(&self, position_id: PositionId) -> LedgerResult<Vec<Transaction>>;

    /// Finalize a pending transaction together with an optional position update.
    ///
    /// Settling an already-final transaction is a no-op returning the stored record.
    async fn settle(&self, settle: Settle) -> LedgerResult<(Transaction, Option<Position>)>;

    /// Store a monitor-computed health factor unless the position moved on.
    ///
    /// Returns `false` when the version no longer matches. Does not bump the version.
    async fn record_health(
        &self,
        id: PositionId,
        expected_version: u64,
        health_factor: Option<Decimal>,
    ) -> LedgerResult<bool>;
}

#[derive(Debug, Default)]
struct LedgerState {
    pools: HashMap<PoolId, Pool>,
    positions: HashMap<PositionId, Position>,
    /// Active position per (owner, pool)
    active: HashMap<PositionKey, PositionId>,
    transactions: HashMap<TransactionId, Transaction>,
    by_position: HashMap<PositionId, SmallVec<[TransactionId; 8]>>,
}

impl LedgerState {
    /// Validate and apply an update; nothing is written on error.
    fn apply(&mut self, update: LedgerUpdate) -> LedgerResult<Position> {
        let LedgerUpdate {
            mut position,
            expected_version,
            pool_delta,
        } = update;

        let pool = self
            .pools
            .get(&position.pool_id)
            .ok_or_else(|| LedgerError::NotFound {
                entity: "pool",
                id: position.pool_id.to_string(),
            })?;

        let version = match expected_version {
            Some(expected) => {
                let current = self.positions.get(&position.id).ok_or_else(|| LedgerError::NotFound {
                    entity: "position",
                    id: position.id.to_string(),
                })?;
                if current.version != expected {
                    return Err(LedgerError::VersionConflict {
                        position_id: position.id,
                        expected,
                        found: current.version,
                    });
                }
                if current.owner != position.owner || current.pool_id != position.pool_id {
                    return Err(LedgerError::InvariantViolation(format!(
                        "position {} cannot change owner or pool",
                        position.id
                    )));
                }
                if current.status != position.status && !current.status.can_transition_to(position.status) {
                    return Err(LedgerError::InvariantViolation(format!(
                        "position {} cannot move from {} to {}",
                        position.id, current.status, position.status
                    )));
                }
                expected + 1
            }
            None => {
                if self.positions.contains_key(&position.id) {
                    return Err(LedgerError::InvariantViolation(format!(
                        "position {} already exists",
                        position.id
                    )));
                }
                if self.active.contains_key(&position.key()) {
                    return Err(LedgerError::InvariantViolation(format!(
                        "{} already holds an active position in pool {}",
                        position.owner, position.pool_id
                    )));
                }
                1
            }
        };

        if position.collateral_amount < Decimal::ZERO
            || position.debt_amount < Decimal::ZERO
            || position.shares < Decimal::ZERO
        {
            return Err(LedgerError::InvariantViolation(format!(
                "position {} would hold a negative balance",
                position.id
            )));
        }

        let mut next_pool = pool.clone();
        next_pool.total_collateral += pool_delta.collateral;
        next_pool.total_supplied += pool_delta.supplied;
        next_pool.total_borrowed += pool_delta.borrowed;
        if next_pool.total_collateral < Decimal::ZERO
            || next_pool.total_supplied < Decimal::ZERO
            || next_pool.total_borrowed < Decimal::ZERO
        {
            return Err(LedgerError::InvariantViolation(format!(
                "pool {} would hold a negative total",
                next_pool.id
            )));
        }
        if next_pool.total_borrowed > next_pool.total_supplied {
            return Err(LedgerError::InvariantViolation(format!(
                "pool {} would lend {} out of {} supplied",
                next_pool.id, next_pool.total_borrowed, next_pool.total_supplied
            )));
        }

        position.version = version;
        let key = position.key();
        if position.is_active() {
            self.active.insert(key, position.id);
        } else if self.active.get(&key) == Some(&position.id) {
            self.active.remove(&key);
        }
        self.pools.insert(next_pool.id.clone(), next_pool);
        self.positions.insert(position.id, position.clone());
        Ok(position)
    }
}

/// In-process ledger over a single read-write lock.
///
/// Every commit and settlement runs under one write guard, so readers see
/// either all or none of it.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    next_position: AtomicU64,
    next_transaction: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger seeded with an initial pool set.
    pub fn with_pools(pools: impl IntoIterator<Item = Pool>) -> LedgerResult<Self> {
        let ledger = Self::new();
        {
            let mut state = ledger.state.write();
            for pool in pools {
                if state.pools.contains_key(&pool.id) {
                    return Err(LedgerError::DuplicatePool { pool_id: pool.id });
                }
                pool.validate().map_err(LedgerError::InvariantViolation)?;
                state.pools.insert(pool.id.clone(), pool);
            }
        }
        Ok(ledger)
    }

    fn sorted<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
        items.sort_by_key(key);
        items
    }
}

#[async_trait]
impl PositionLedger for InMemoryLedger {
    async fn create_pool(&self, pool: Pool) -> LedgerResult<()> {
        pool.validate().map_err(LedgerError::InvariantViolation)?;
        let mut state = self.state.write();
        if state.pools.contains_key(&pool.id) {
            return Err(LedgerError::DuplicatePool { pool_id: pool.id });
        }
        info!(pool = %pool.id, collateral = %pool.collateral_asset, debt = %pool.debt_asset, "Pool created");
        state.pools.insert(pool.id.clone(), pool);
        Ok(())
    }

    async fn deactivate_pool(&self, pool_id: &PoolId) -> LedgerResult<Pool> {
        let mut state = self.state.write();
        let pool = state.pools.get_mut(pool_id).ok_or_else(|| LedgerError::NotFound {
            entity: "pool",
            id: pool_id.to_string(),
        })?;
        pool.active = false;
        info!(pool = %pool_id, "Pool deactivated");
        Ok(pool.clone())
    }

    async fn pool(&self, pool_id: &PoolId) -> LedgerResult<Option<Pool>> {
        Ok(self.state.read().pools.get(pool_id).cloned())
    }

    async fn pools(&self) -> LedgerResult<Vec<Pool>> {
        let pools = self.state.read().pools.values().cloned().collect();
        Ok(Self::sorted(pools, |p: &Pool| p.id.clone()))
    }

    async fn position(&self, id: PositionId) -> LedgerResult<Option<Position>> {
        Ok(self.state.read().positions.get(&id).cloned())
    }

    async fn position_for(&self, owner: &str, pool_id: &PoolId) -> LedgerResult<Option<Position>> {
        let state = self.state.read();
        let key = PositionKey {
            owner: owner.to_string(),
            pool_id: pool_id.clone(),
        };
        Ok(state
            .active
            .get(&key)
            .and_then(|id| state.positions.get(id))
            .cloned())
    }

    async fn positions_by_owner(&self, owner: &str) -> LedgerResult<Vec<Position>> {
        let positions = self
            .state
            .read()
            .positions
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect();
        Ok(Self::sorted(positions, |p: &Position| p.id))
    }

    async fn positions_by_status(&self, status: PositionStatus) -> LedgerResult<Vec<Position>> {
        let positions = self
            .state
            .read()
            .positions
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        Ok(Self::sorted(positions, |p: &Position| p.id))
    }

    async fn next_position_id(&self) -> LedgerResult<PositionId> {
        Ok(PositionId(self.next_position.fetch_add(1, Ordering::Relaxed) + 1))
    }

    async fn commit(&self, commit: Commit) -> LedgerResult<Committed> {
        let Commit { update, transaction } = commit;
        if transaction.position_id != update.position.id {
            return Err(LedgerError::InvariantViolation(format!(
                "transaction for {} committed with position {}",
                transaction.position_id, update.position.id
            )));
        }

        let mut state = self.state.write();
        let position = state.apply(update)?;

        let tx_id = TransactionId(self.next_transaction.fetch_add(1, Ordering::Relaxed) + 1);
        let tx = Transaction::pending(tx_id, transaction);
        state.by_position.entry(position.id).or_default().push(tx_id);
        state.transactions.insert(tx_id, tx.clone());

        debug!(
            position = %position.id,
            tx = %tx_id,
            operation = %tx.operation,
            version = position.version,
            "Committed"
        );
        Ok(Committed {
            position,
            transaction: tx,
        })
    }

    async fn transaction(&self, id: TransactionId) -> LedgerResult<Option<Transaction>> {
        Ok(self.state.read().transactions.get(&id).cloned())
    }

    async fn transactions_by_status(&self, status: TransactionStatus) -> LedgerResult<Vec<Transaction>> {
        let txs = self
            .state
            .read()
            .transactions
            .values()
            .filter(|tx| tx.status == status)
            .cloned()
            .collect();
        Ok(Self::sorted(txs, |tx: &Transaction| tx.id))
    }

    async fn transactions_for_position(&self, position_id: PositionId) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.read();
        Ok(state
            .by_position
            .get(&position_id)
            .map(|ids| ids.iter().filter_map(|id| state.transactions.get(id)).cloned().collect())
            .unwrap_or_default())
    }

    async fn settle(&self, settle: Settle) -> LedgerResult<(Transaction, Option<Position>)> {
        if !settle.status.is_final() {
            return Err(LedgerError::InvariantViolation(format!(
                "cannot settle {} as pending",
                settle.tx_id
            )));
        }

        let mut state = self.state.write();
        let current = state
            .transactions
            .get(&settle.tx_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound {
                entity: "transaction",
                id: settle.tx_id.to_string(),
            })?;
        if !current.is_pending() {
            return Ok((current, None));
        }

        let position = match settle.update {
            Some(update) => Some(state.apply(update)?),
            None => None,
        };

        let mut tx = current;
        tx.status = settle.status;
        tx.settled_at = Some(settle.settled_at);
        tx.failure_reason = settle.failure_reason;
        state.transactions.insert(tx.id, tx.clone());
        Ok((tx, position))
    }

    async fn record_health(
        &self,
        id: PositionId,
        expected_version: u64,
        health_factor: Option<Decimal>,
    ) -> LedgerResult<bool> {
        let mut state = self.state.write();
        match state.positions.get_mut(&id) {
            Some(position) if position.version == expected_version => {
                position.health_factor = health_factor;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(LedgerError::NotFound {
                entity: "position",
                id: id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::OperationType;
    use rust_decimal_macros::dec;

    fn pool() -> Pool {
        Pool {
            id: PoolId::from("eth-usdc"),
            collateral_asset: "ETH".to_string(),
            debt_asset: "USDC".to_string(),
            total_supplied: dec!(1000),
            total_borrowed: Decimal::ZERO,
            total_collateral: Decimal::ZERO,
            max_ltv: dec!(0.80),
            liquidation_threshold: dec!(0.85),
            supply_apy: Decimal::ZERO,
            borrow_apy: Decimal::ZERO,
            active: true,
        }
    }

    fn new_tx(position_id: PositionId, operation: OperationType, amount: Decimal) -> NewTransaction {
        NewTransaction {
            position_id,
            operation,
            asset: "ETH".to_string(),
            amount,
            shares: Decimal::ZERO,
            external_id: "0xabc".to_string(),
            created_at: Utc::now(),
        }
    }

    async fn open(ledger: &InMemoryLedger, collateral: Decimal) -> Committed {
        let id = ledger.next_position_id().await.unwrap();
        let mut position = Position::new(id, "0x1", PoolId::from("eth-usdc"), Utc::now());
        position.collateral_amount = collateral;
        ledger
            .commit(Commit {
                update: LedgerUpdate {
                    position,
                    expected_version: None,
                    pool_delta: PoolDelta::collateral(collateral),
                },
                transaction: new_tx(id, OperationType::Supply, collateral),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_creates_position_and_transaction() {
        let ledger = InMemoryLedger::with_pools([pool()]).unwrap();
        let committed = open(&ledger, dec!(10)).await;

        assert_eq!(committed.position.version, 1);
        assert!(committed.transaction.is_pending());

        let stored = ledger.position(committed.position.id).await.unwrap().unwrap();
        assert_eq!(stored.collateral_amount, dec!(10));
        let found = ledger.position_for("0x1", &PoolId::from("eth-usdc")).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(committed.position.id));

        let pool = ledger.pool(&PoolId::from("eth-usdc")).await.unwrap().unwrap();
        assert_eq!(pool.total_collateral, dec!(10));
        assert_eq!(ledger.transactions_for_position(stored.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected_without_writes() {
        let ledger = InMemoryLedger::with_pools([pool()]).unwrap();
        let committed = open(&ledger, dec!(10)).await;

        let mut position = committed.position.clone();
        position.debt_amount = dec!(100);
        let err = ledger
            .commit(Commit {
                update: LedgerUpdate {
                    position,
                    expected_version: Some(0),
                    pool_delta: PoolDelta::borrowed(dec!(100)),
                },
                transaction: new_tx(committed.position.id, OperationType::Borrow, dec!(100)),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::VersionConflict { expected: 0, found: 1, .. }));

        let pool = ledger.pool(&PoolId::from("eth-usdc")).await.unwrap().unwrap();
        assert_eq!(pool.total_borrowed, Decimal::ZERO);
        assert_eq!(ledger.transactions_by_status(TransactionStatus::Pending).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pool_invariant_checked_at_commit() {
        let ledger = InMemoryLedger::with_pools([pool()]).unwrap();
        let committed = open(&ledger, dec!(10)).await;

        let mut position = committed.position.clone();
        position.debt_amount = dec!(1001);
        let err = ledger
            .commit(Commit {
                update: LedgerUpdate {
                    position,
                    expected_version: Some(1),
                    pool_delta: PoolDelta::borrowed(dec!(1001)),
                },
                transaction: new_tx(committed.position.id, OperationType::Borrow, dec!(1001)),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
        let stored = ledger.position(committed.position.id).await.unwrap().unwrap();
        assert_eq!(stored.debt_amount, Decimal::ZERO);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let ledger = InMemoryLedger::with_pools([pool()]).unwrap();
        let committed = open(&ledger, dec!(10)).await;
        let settle = Settle {
            tx_id: committed.transaction.id,
            status: TransactionStatus::Confirmed,
            failure_reason: None,
            settled_at: Utc::now(),
            update: None,
        };

        let (tx, _) = ledger.settle(settle.clone()).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Confirmed);

        let failed = Settle {
            status: TransactionStatus::Failed,
            failure_reason: Some("reverted".to_string()),
            ..settle
        };
        let (tx, position) = ledger.settle(failed).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert!(position.is_none());
    }

    #[tokio::test]
    async fn test_closing_frees_owner_pool_slot() {
        let ledger = InMemoryLedger::with_pools([pool()]).unwrap();
        let committed = open(&ledger, dec!(10)).await;

        let mut closed = committed.position.clone();
        closed.collateral_amount = Decimal::ZERO;
        closed.status = PositionStatus::Closed;
        ledger
            .commit(Commit {
                update: LedgerUpdate {
                    position: closed,
                    expected_version: Some(1),
                    pool_delta: PoolDelta::collateral(dec!(-10)),
                },
                transaction: new_tx(committed.position.id, OperationType::Withdraw, dec!(10)),
            })
            .await
            .unwrap();

        let pool_id = PoolId::from("eth-usdc");
        assert!(ledger.position_for("0x1", &pool_id).await.unwrap().is_none());
        let reopened = open(&ledger, dec!(1)).await;
        assert_ne!(reopened.position.id, committed.position.id);
        assert_eq!(ledger.positions_by_owner("0x1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_health_checks_version() {
        let ledger = InMemoryLedger::with_pools([pool()]).unwrap();
        let committed = open(&ledger, dec!(10)).await;
        let id = committed.position.id;

        assert!(ledger.record_health(id, 1, Some(dec!(1.5))).await.unwrap());
        assert!(!ledger.record_health(id, 0, Some(dec!(0.5))).await.unwrap());

        let stored = ledger.position(id).await.unwrap().unwrap();
        assert_eq!(stored.health_factor, Some(dec!(1.5)));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_pool_administration() {
        let ledger = InMemoryLedger::new();
        ledger.create_pool(pool()).await.unwrap();
        assert!(matches!(
            ledger.create_pool(pool()).await,
            Err(LedgerError::DuplicatePool { .. })
        ));

        let pool = ledger.deactivate_pool(&PoolId::from("eth-usdc")).await.unwrap();
        assert!(!pool.active);
        assert_eq!(ledger.pools().await.unwrap().len(), 1);
        assert!(ledger.deactivate_pool(&PoolId::from("missing")).await.is_err());
    }
}
