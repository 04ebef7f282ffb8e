//! Checked decimal arithmetic with a single rounding policy.
//!
//! Every value and ratio is truncated toward zero at [`VALUE_SCALE`]
//! decimal places, so the protocol never credits more than it holds.
//! Amounts the user must keep (required collateral) round up instead.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Fixed number of decimal places kept by every computation.
pub const VALUE_SCALE: u32 = 18;

/// Seconds in a 365-day year, used to pro-rate APYs.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Arithmetic failure. Indicates a bug or absurd inputs, never a user error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("decimal overflow computing {0}")]
    Overflow(&'static str),
    #[error("division by zero computing {0}")]
    DivisionByZero(&'static str),
}

/// Truncate to [`VALUE_SCALE`] places.
#[inline]
pub fn round_down(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(VALUE_SCALE, RoundingStrategy::ToZero)
}

/// Round away from zero at [`VALUE_SCALE`] places.
#[inline]
pub fn round_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(VALUE_SCALE, RoundingStrategy::AwayFromZero)
}

/// `a * b`, truncated.
#[inline]
pub fn mul(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, MathError> {
    a.checked_mul(b)
        .map(round_down)
        .ok_or(MathError::Overflow(what))
}

/// `a / b`, truncated.
#[inline]
pub fn div(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero(what));
    }
    a.checked_div(b)
        .map(round_down)
        .ok_or(MathError::Overflow(what))
}

/// `a / b`, rounded up.
#[inline]
pub fn div_up(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero(what));
    }
    a.checked_div(b)
        .map(round_up)
        .ok_or(MathError::Overflow(what))
}

/// `a - b` floored at zero.
#[inline]
pub fn sub_floor(a: Decimal, b: Decimal) -> Decimal {
    if b >= a {
        Decimal::ZERO
    } else {
        a - b
    }
}

/// Simple interest accrued on `principal` at `apy` over `elapsed_secs`.
pub fn simple_interest(principal: Decimal, apy: Decimal, elapsed_secs: u64) -> Result<Decimal, MathError> {
    if principal.is_zero() || apy.is_zero() || elapsed_secs == 0 {
        return Ok(Decimal::ZERO);
    }
    let per_year = mul(principal, apy, "interest per year")?;
    let scaled = mul(per_year, Decimal::from(elapsed_secs), "interest over period")?;
    div(scaled, Decimal::from(SECONDS_PER_YEAR), "interest pro-rata")
}
