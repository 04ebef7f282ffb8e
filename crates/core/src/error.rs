//! Typed errors for ledger and engine operations.

use lending_chain::{ExecutorError, OracleError};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use crate::math::MathError;
use crate::pool::PoolId;
use crate::position::{PositionId, PositionStatus};
use crate::transaction::TransactionId;

/// Persistence failures raised by a [`crate::PositionLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("position {position_id} changed concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        position_id: PositionId,
        expected: u64,
        found: u64,
    },

    #[error("pool {pool_id} already exists")]
    DuplicatePool { pool_id: PoolId },

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
}

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAmount,
    InvalidAddress,
    InvalidAsset,
    InvalidPool,
    LtvExceeded,
    InsufficientLiquidity,
    PositionUndercollateralized,
    HealthFactorTooLow,
    PoolNotActive,
    InsufficientBalance,
    PositionNotFound,
    PositionNotOwned,
    PositionNotActive,
    OracleUnavailable,
    ExecutorUnavailable,
    TransactionFailed,
    TransactionNotFound,
    LedgerError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::InvalidAsset => "INVALID_ASSET",
            Self::InvalidPool => "INVALID_POOL",
            Self::LtvExceeded => "LTV_EXCEEDED",
            Self::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            Self::PositionUndercollateralized => "POSITION_UNDERCOLLATERALIZED",
            Self::HealthFactorTooLow => "HEALTH_FACTOR_TOO_LOW",
            Self::PoolNotActive => "POOL_NOT_ACTIVE",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::PositionNotFound => "POSITION_NOT_FOUND",
            Self::PositionNotOwned => "POSITION_NOT_OWNED",
            Self::PositionNotActive => "POSITION_NOT_ACTIVE",
            Self::OracleUnavailable => "ORACLE_UNAVAILABLE",
            Self::ExecutorUnavailable => "EXECUTOR_UNAVAILABLE",
            Self::TransactionFailed => "TRANSACTION_FAILED",
            Self::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            Self::LedgerError => "LEDGER_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`crate::LendingEngine`] operations.
#[derive(Debug, Error)]
pub enum LendingError {
    // Validation
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: &'static str },

    #[error("invalid owner address {address:?}")]
    InvalidAddress { address: String },

    #[error("invalid asset {asset}: {reason}")]
    InvalidAsset { asset: String, reason: String },

    #[error("pool {pool_id} does not exist")]
    InvalidPool { pool_id: PoolId },

    // Business rules
    #[error("ltv {ltv} exceeds pool maximum {max_ltv}")]
    LtvExceeded { ltv: Decimal, max_ltv: Decimal },

    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Decimal, available: Decimal },

    #[error("withdrawal of {requested} would undercollateralize position (max withdrawable {max_withdrawable})")]
    PositionUndercollateralized {
        requested: Decimal,
        max_withdrawable: Decimal,
    },

    #[error("health factor {health_factor} below minimum {minimum}")]
    HealthFactorTooLow {
        health_factor: Decimal,
        minimum: Decimal,
    },

    #[error("pool {pool_id} is not active")]
    PoolNotActive { pool_id: PoolId },

    #[error("insufficient {balance}: requested {requested}, available {available}")]
    InsufficientBalance {
        balance: &'static str,
        requested: Decimal,
        available: Decimal,
    },

    // Position lookup
    #[error("position {position_id} not found")]
    PositionNotFound { position_id: PositionId },

    #[error("position {position_id} is not owned by {caller}")]
    PositionNotOwned { position_id: PositionId, caller: String },

    #[error("position {position_id} is {status}")]
    PositionNotActive {
        position_id: PositionId,
        status: PositionStatus,
    },

    // External dependencies
    #[error("price oracle unavailable: {0}")]
    OracleUnavailable(OracleError),

    #[error("transaction executor unavailable: {0}")]
    ExecutorUnavailable(ExecutorError),

    #[error("transaction rejected by executor: {reason}")]
    TransactionFailed { reason: String },

    #[error("transaction {tx_id} not found")]
    TransactionNotFound { tx_id: TransactionId },

    // System
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LendingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            Self::InvalidAsset { .. } => ErrorKind::InvalidAsset,
            Self::InvalidPool { .. } => ErrorKind::InvalidPool,
            Self::LtvExceeded { .. } => ErrorKind::LtvExceeded,
            Self::InsufficientLiquidity { .. } => ErrorKind::InsufficientLiquidity,
            Self::PositionUndercollateralized { .. } => ErrorKind::PositionUndercollateralized,
            Self::HealthFactorTooLow { .. } => ErrorKind::HealthFactorTooLow,
            Self::PoolNotActive { .. } => ErrorKind::PoolNotActive,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::PositionNotFound { .. } => ErrorKind::PositionNotFound,
            Self::PositionNotOwned { .. } => ErrorKind::PositionNotOwned,
            Self::PositionNotActive { .. } => ErrorKind::PositionNotActive,
            Self::OracleUnavailable(_) => ErrorKind::OracleUnavailable,
            Self::ExecutorUnavailable(_) => ErrorKind::ExecutorUnavailable,
            Self::TransactionFailed { .. } => ErrorKind::TransactionFailed,
            Self::TransactionNotFound { .. } => ErrorKind::TransactionNotFound,
            Self::Ledger(_) => ErrorKind::LedgerError,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OracleUnavailable(e) => e.is_retryable(),
            Self::ExecutorUnavailable(e) => e.is_retryable(),
            Self::Ledger(LedgerError::VersionConflict { .. }) => true,
            _ => false,
        }
    }
}

impl From<OracleError> for LendingError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::UnknownAsset { asset } => Self::InvalidAsset {
                asset,
                reason: "no price source configured".to_string(),
            },
            other => Self::OracleUnavailable(other),
        }
    }
}

impl From<ExecutorError> for LendingError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Rejected { reason, .. } => Self::TransactionFailed { reason },
            other => Self::ExecutorUnavailable(other),
        }
    }
}

impl From<LedgerError> for LendingError {
    /// A broken ledger invariant is a bug, not a persistence failure.
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvariantViolation(reason) => Self::Internal(format!("ledger invariant violated: {reason}")),
            other => Self::Ledger(other),
        }
    }
}

impl From<MathError> for LendingError {
    fn from(err: MathError) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_codes() {
        let err = LendingError::LtvExceeded {
            ltv: dec!(0.80125),
            max_ltv: dec!(0.8),
        };
        assert_eq!(err.kind(), ErrorKind::LtvExceeded);
        assert_eq!(err.kind().as_str(), "LTV_EXCEEDED");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("0.80125"));
    }

    #[test]
    fn test_unknown_asset_is_invalid_asset() {
        let err: LendingError = OracleError::UnknownAsset { asset: "DOGE".into() }.into();
        assert_eq!(err.kind(), ErrorKind::InvalidAsset);
    }

    #[test]
    fn test_oracle_timeout_is_retryable() {
        let err: LendingError = OracleError::Timeout {
            asset: "ETH".into(),
            timeout_ms: 5000,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::OracleUnavailable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_executor_errors() {
        let err: LendingError = ExecutorError::Timeout {
            call: "submit",
            timeout_ms: 5000,
        }
        .into();
        assert_eq!(err.kind().as_str(), "EXECUTOR_UNAVAILABLE");
        assert!(err.is_retryable());

        let err: LendingError = ExecutorError::Rejected {
            call: "submit",
            reason: "insufficient allowance".into(),
        }
        .into();
        assert_eq!(err.kind().as_str(), "TRANSACTION_FAILED");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("insufficient allowance"));
    }

    #[test]
    fn test_ledger_errors() {
        let err: LendingError = LedgerError::InvariantViolation("total_borrowed exceeds total_supplied".into()).into();
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert!(err.to_string().contains("total_borrowed"));

        let err: LendingError = LedgerError::VersionConflict {
            position_id: PositionId(1),
            expected: 2,
            found: 3,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::LedgerError);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_math_error_is_internal() {
        let err: LendingError = MathError::DivisionByZero("health factor").into();
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert!(err.to_string().contains("health factor"));
    }
}
