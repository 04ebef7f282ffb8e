//! Position health evaluation.
//!
//! Pure functions over position balances, pool risk parameters and prices.
//! No I/O and no state; every result is truncated per [`crate::math`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::math::{self, MathError};
use crate::pool::Pool;
use crate::position::Position;

/// Prices of a pool's two assets in a common quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairPrices {
    pub collateral: Decimal,
    pub debt: Decimal,
}

/// Health factor with the threshold-adjusted collateral as numerator.
///
/// `None` when there is no debt (infinite health).
pub fn health_factor(position: &Position, pool: &Pool, prices: &PairPrices) -> Result<Option<Decimal>, MathError> {
    health_factor_for(
        position.collateral_amount,
        position.debt_amount,
        pool.liquidation_threshold,
        prices,
    )
}

/// [`health_factor`] over raw balances, for prospective states.
pub fn health_factor_for(
    collateral_amount: Decimal,
    debt_amount: Decimal,
    liquidation_threshold: Decimal,
    prices: &PairPrices,
) -> Result<Option<Decimal>, MathError> {
    if debt_amount.is_zero() {
        return Ok(None);
    }
    let collateral_value = math::mul(collateral_amount, prices.collateral, "collateral value")?;
    let adjusted = math::mul(collateral_value, liquidation_threshold, "risk-adjusted collateral")?;
    let debt_value = math::mul(debt_amount, prices.debt, "debt value")?;
    math::div(adjusted, debt_value, "health factor").map(Some)
}

/// Loan-to-value against raw (unadjusted) collateral value; zero without collateral.
pub fn ltv(position: &Position, prices: &PairPrices) -> Result<Decimal, MathError> {
    ltv_for(position.collateral_amount, position.debt_amount, prices)
}

/// [`ltv`] over raw balances, for prospective states.
pub fn ltv_for(collateral_amount: Decimal, debt_amount: Decimal, prices: &PairPrices) -> Result<Decimal, MathError> {
    if collateral_amount.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let debt_value = math::mul(debt_amount, prices.debt, "debt value")?;
    let collateral_value = math::mul(collateral_amount, prices.collateral, "collateral value")?;
    math::div(debt_value, collateral_value, "ltv")
}

/// Total debt the collateral supports at the origination limit.
pub fn max_borrowable(
    collateral_amount: Decimal,
    collateral_price: Decimal,
    debt_price: Decimal,
    max_ltv: Decimal,
) -> Result<Decimal, MathError> {
    let collateral_value = math::mul(collateral_amount, collateral_price, "collateral value")?;
    let limit_value = math::mul(collateral_value, max_ltv, "borrow limit value")?;
    math::div(limit_value, debt_price, "max borrowable")
}

/// Collateral removable while keeping the health factor at or above 1.0.
///
/// Required collateral rounds up so the result never exceeds what a
/// withdrawal can actually take.
pub fn max_withdrawable(position: &Position, pool: &Pool, prices: &PairPrices) -> Result<Decimal, MathError> {
    if !position.has_debt() {
        return Ok(position.collateral_amount);
    }
    let debt_value = math::mul(position.debt_amount, prices.debt, "debt value")?;
    let adjusted_price = math::mul(pool.liquidation_threshold, prices.collateral, "adjusted collateral price")?;
    let required = math::div_up(debt_value, adjusted_price, "required collateral")?;
    Ok(math::sub_floor(position.collateral_amount, required))
}

/// Vault shares minted for a deposit of `amount` underlying.
pub fn shares_for_deposit(amount: Decimal, exchange_rate: Decimal) -> Result<Decimal, MathError> {
    math::div(amount, exchange_rate, "shares for deposit")
}

/// Underlying value of `shares` at `exchange_rate`.
pub fn underlying_for_shares(shares: Decimal, exchange_rate: Decimal) -> Result<Decimal, MathError> {
    math::mul(shares, exchange_rate, "underlying for shares")
}

/// Health factor boundaries for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// At or above: safe
    #[serde(default = "default_at_risk")]
    pub at_risk_hf: Decimal,
    /// At or above (and below `at_risk_hf`): at risk
    #[serde(default = "default_critical")]
    pub critical_hf: Decimal,
    /// At or above (and below `critical_hf`): critical; below: liquidatable
    #[serde(default = "default_liquidation")]
    pub liquidation_hf: Decimal,
}

fn default_at_risk() -> Decimal {
    dec!(1.2)
}
fn default_critical() -> Decimal {
    dec!(1.05)
}
fn default_liquidation() -> Decimal {
    Decimal::ONE
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            at_risk_hf: default_at_risk(),
            critical_hf: default_critical(),
            liquidation_hf: default_liquidation(),
        }
    }
}

impl HealthThresholds {
    /// Thresholds must be strictly descending.
    pub fn validate(&self) -> Result<(), String> {
        if self.at_risk_hf > self.critical_hf && self.critical_hf > self.liquidation_hf {
            Ok(())
        } else {
            Err(format!(
                "health thresholds must descend: at_risk {} > critical {} > liquidation {}",
                self.at_risk_hf, self.critical_hf, self.liquidation_hf
            ))
        }
    }
}

/// Health classification of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthClass {
    Safe,
    AtRisk,
    Critical,
    Liquidatable,
}

impl HealthClass {
    /// Classify a health factor; `None` (no debt) is always safe.
    pub fn classify(health_factor: Option<Decimal>, thresholds: &HealthThresholds) -> Self {
        let Some(hf) = health_factor else {
            return Self::Safe;
        };
        if hf >= thresholds.at_risk_hf {
            Self::Safe
        } else if hf >= thresholds.critical_hf {
            Self::AtRisk
        } else if hf >= thresholds.liquidation_hf {
            Self::Critical
        } else {
            Self::Liquidatable
        }
    }

    /// Eligible for external liquidation.
    pub fn is_liquidatable(&self) -> bool {
        matches!(self, Self::Liquidatable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::AtRisk => "at_risk",
            Self::Critical => "critical",
            Self::Liquidatable => "liquidatable",
        }
    }
}

impl fmt::Display for HealthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
