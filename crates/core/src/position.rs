//! Position records: one owner's exposure to one pool.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pool::PoolId;

/// Ledger-assigned position identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos-{}", self.0)
    }
}

/// Position lifecycle. `Liquidated` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Liquidated,
    Closed,
}

impl PositionStatus {
    /// Whether moving to `next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Active) | (Self::Active, Self::Liquidated) | (Self::Active, Self::Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Liquidated => "liquidated",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the single active position an owner may hold in a pool.
///
/// All engine operations on that position serialize on this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub owner: String,
    pub pool_id: PoolId,
}

/// One user's collateral and debt in one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Position identifier
    pub id: PositionId,
    /// Owner address
    pub owner: String,
    /// Pool this position belongs to
    pub pool_id: PoolId,
    /// Collateral in underlying units (never negative)
    pub collateral_amount: Decimal,
    /// Outstanding debt in debt-asset units (never negative)
    pub debt_amount: Decimal,
    /// Vault shares backing the collateral
    pub shares: Decimal,
    /// Last computed health factor; `None` means no debt (infinite health)
    pub health_factor: Option<Decimal>,
    /// Lifecycle status
    pub status: PositionStatus,
    /// Last engine mutation
    pub updated_at: DateTime<Utc>,
    /// Bumped on every engine commit, used for compare-and-swap writes
    pub version: u64,
}

impl Position {
    /// Create an empty active position.
    pub fn new(id: PositionId, owner: impl Into<String>, pool_id: PoolId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner: owner.into(),
            pool_id,
            collateral_amount: Decimal::ZERO,
            debt_amount: Decimal::ZERO,
            shares: Decimal::ZERO,
            health_factor: None,
            status: PositionStatus::Active,
            updated_at: now,
            version: 0,
        }
    }

    pub fn key(&self) -> PositionKey {
        PositionKey {
            owner: self.owner.clone(),
            pool_id: self.pool_id.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn has_debt(&self) -> bool {
        self.debt_amount > Decimal::ZERO
    }

    pub fn has_collateral(&self) -> bool {
        self.collateral_amount > Decimal::ZERO
    }

    /// Both balances are zero.
    pub fn is_empty(&self) -> bool {
        !self.has_debt() && !self.has_collateral()
    }

    /// Seconds since the last engine mutation.
    pub fn secs_since_update(&self, now: DateTime<Utc>) -> u64 {
        (now - self.updated_at).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_transitions() {
        use PositionStatus::*;
        assert!(Active.can_transition_to(Closed));
        assert!(Active.can_transition_to(Liquidated));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Liquidated.can_transition_to(Closed));
    }

    #[test]
    fn test_new_position_is_empty() {
        let now = Utc::now();
        let mut pos = Position::new(PositionId(1), "0xabc", PoolId::from("eth-usdc"), now);
        assert!(pos.is_active());
        assert!(pos.is_empty());
        assert_eq!(pos.health_factor, None);

        pos.collateral_amount = dec!(1);
        assert!(!pos.is_empty());
        assert!(!pos.has_debt());
    }

    #[test]
    fn test_display() {
        assert_eq!(PositionId(42).to_string(), "pos-42");
        assert_eq!(PositionStatus::Liquidated.to_string(), "liquidated");
    }
}
