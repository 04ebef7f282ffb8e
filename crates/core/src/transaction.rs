//! Append-only records of engine-initiated operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::position::PositionId;
pub use lending_chain::OperationType;

/// Ledger-assigned transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Settlement state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Transaction fields known before the ledger assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub position_id: PositionId,
    pub operation: OperationType,
    pub asset: String,
    pub amount: Decimal,
    pub shares: Decimal,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

/// One engine operation and its settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub position_id: PositionId,
    pub operation: OperationType,
    pub asset: String,
    /// Underlying amount moved
    pub amount: Decimal,
    /// Shares minted (supply) or burned (withdraw); zero otherwise
    pub shares: Decimal,
    /// Executor-side transaction id
    pub external_id: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Transaction {
    /// Materialize a pending record.
    pub fn pending(id: TransactionId, new: NewTransaction) -> Self {
        Self {
            id,
            position_id: new.position_id,
            operation: new.operation,
            asset: new.asset,
            amount: new.amount,
            shares: new.shares,
            external_id: new.external_id,
            status: TransactionStatus::Pending,
            created_at: new.created_at,
            settled_at: None,
            failure_reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pending_record() {
        let tx = Transaction::pending(
            TransactionId(7),
            NewTransaction {
                position_id: PositionId(1),
                operation: OperationType::Borrow,
                asset: "USDC".to_string(),
                amount: dec!(800),
                shares: Decimal::ZERO,
                external_id: "0xfeed".to_string(),
                created_at: Utc::now(),
            },
        );
        assert!(tx.is_pending());
        assert!(!tx.status.is_final());
        assert_eq!(tx.id.to_string(), "tx-7");
        assert_eq!(tx.settled_at, None);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(TransactionStatus::Confirmed).unwrap();
        assert_eq!(json, "confirmed");
        let op = serde_json::to_value(OperationType::Withdraw).unwrap();
        assert_eq!(op, "withdraw");
    }
}
