//! Lending engine core logic.
//!
//! This crate provides the collateralized lending position engine:
//! - Position, pool and transaction records with a pluggable ledger
//! - Pure health evaluation (health factor, LTV, borrow/withdraw limits)
//! - The lending engine: supply, borrow, repay, withdraw and settlement
//! - Scheduled position monitoring with alerting and liquidation hand-off
//! - Profile-based configuration
//!
//! Prices and transaction execution come from `lending-chain`.

mod alerts;
pub mod config;
mod engine;
mod error;
pub mod health;
mod ledger;
pub mod math;
mod monitor;
mod pool;
mod position;
mod transaction;

#[cfg(test)]
mod test_support;

pub use alerts::{NotificationGateway, Severity, TracingNotifier};
pub use config::{EngineConfig, LendingSettings, MonitorSettings, PoolConfig, PoolsConfig};
pub use engine::{LendingEngine, OperationReceipt, PositionHealth, ReconcileReport, Settlement};
pub use error::{ErrorKind, LedgerError, LendingError, Result};
pub use health::{HealthClass, HealthThresholds, PairPrices};
pub use ledger::{Commit, Committed, InMemoryLedger, LedgerResult, LedgerUpdate, PoolDelta, PositionLedger, Settle};
pub use math::MathError;
pub use monitor::{CycleReport, PositionAssessment, PositionMonitor};
pub use pool::{Pool, PoolId};
pub use position::{Position, PositionId, PositionKey, PositionStatus};
pub use transaction::{NewTransaction, OperationType, Transaction, TransactionId, TransactionStatus};
