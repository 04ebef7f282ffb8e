//! Pool records: a collateral/debt asset pair market.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::math::sub_floor;

/// Administrative pool identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub String);

impl PoolId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PoolId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PoolId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lending market for one collateral asset against one debt asset.
///
/// `total_supplied` and `total_borrowed` are denominated in the debt asset
/// (lender liquidity and outstanding loans); `total_collateral` is
/// denominated in the collateral asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub collateral_asset: String,
    pub debt_asset: String,
    /// Debt-asset liquidity supplied by lenders
    pub total_supplied: Decimal,
    /// Debt-asset amount currently lent out
    pub total_borrowed: Decimal,
    /// Collateral deposited by borrowers
    pub total_collateral: Decimal,
    /// Origination limit on debt value / collateral value (e.g. 0.80)
    pub max_ltv: Decimal,
    /// Collateral discount applied in the health factor (e.g. 0.85)
    pub liquidation_threshold: Decimal,
    pub supply_apy: Decimal,
    pub borrow_apy: Decimal,
    /// Inactive pools reject supply and borrow
    pub active: bool,
}

impl Pool {
    /// Liquidity available to borrow.
    pub fn available_liquidity(&self) -> Decimal {
        sub_floor(self.total_supplied, self.total_borrowed)
    }

    /// Borrowed share of supplied liquidity.
    pub fn utilization(&self) -> Decimal {
        if self.total_supplied.is_zero() {
            return Decimal::ZERO;
        }
        crate::math::div(self.total_borrowed, self.total_supplied, "utilization").unwrap_or(Decimal::ZERO)
    }

    pub fn is_collateral_asset(&self, asset: &str) -> bool {
        self.collateral_asset.eq_ignore_ascii_case(asset)
    }

    pub fn is_debt_asset(&self, asset: &str) -> bool {
        self.debt_asset.eq_ignore_ascii_case(asset)
    }

    /// Check the static risk parameters and totals.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.0.trim().is_empty() {
            return Err("pool id is empty".to_string());
        }
        if self.collateral_asset.is_empty() || self.debt_asset.is_empty() {
            return Err(format!("pool {} has an empty asset symbol", self.id));
        }
        if self.max_ltv <= Decimal::ZERO || self.max_ltv > self.liquidation_threshold {
            return Err(format!(
                "pool {}: max_ltv {} must be in (0, liquidation_threshold {}]",
                self.id, self.max_ltv, self.liquidation_threshold
            ));
        }
        if self.liquidation_threshold > Decimal::ONE {
            return Err(format!(
                "pool {}: liquidation_threshold {} exceeds 1",
                self.id, self.liquidation_threshold
            ));
        }
        if self.total_supplied < Decimal::ZERO
            || self.total_borrowed < Decimal::ZERO
            || self.total_collateral < Decimal::ZERO
        {
            return Err(format!("pool {} has a negative total", self.id));
        }
        if self.total_borrowed > self.total_supplied {
            return Err(format!(
                "pool {}: total_borrowed {} exceeds total_supplied {}",
                self.id, self.total_borrowed, self.total_supplied
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pool() -> Pool {
        Pool {
            id: PoolId::from("eth-usdc"),
            collateral_asset: "ETH".to_string(),
            debt_asset: "USDC".to_string(),
            total_supplied: dec!(10000),
            total_borrowed: dec!(2500),
            total_collateral: dec!(0),
            max_ltv: dec!(0.80),
            liquidation_threshold: dec!(0.85),
            supply_apy: dec!(0.02),
            borrow_apy: dec!(0.05),
            active: true,
        }
    }

    #[test]
    fn test_liquidity_and_utilization() {
        let pool = pool();
        assert_eq!(pool.available_liquidity(), dec!(7500));
        assert_eq!(pool.utilization(), dec!(0.25));
    }

    #[test]
    fn test_asset_matching() {
        let pool = pool();
        assert!(pool.is_collateral_asset("eth"));
        assert!(!pool.is_collateral_asset("USDC"));
        assert!(pool.is_debt_asset("USDC"));
    }

    #[test]
    fn test_validate() {
        assert!(pool().validate().is_ok());

        let mut bad = pool();
        bad.max_ltv = dec!(0.90);
        assert!(bad.validate().is_err());

        let mut bad = pool();
        bad.total_borrowed = dec!(20000);
        assert!(bad.validate().is_err());
    }
}
