//! Oracle type definitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the price source combines its upstream publishers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Median of all publishers (primary)
    #[default]
    Median,
    /// Arithmetic mean of all publishers (first fallback)
    Mean,
}

impl AggregationMode {
    /// Wire name used by price APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Mean => "mean",
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw answer from a price source, before validation.
///
/// `price` is an unsigned integer scaled by `10^decimals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrice {
    /// Scaled price
    pub price: u128,
    /// Decimal exponent of `price`
    pub decimals: u32,
    /// Unix timestamp of the last upstream update
    pub last_updated_timestamp: u64,
    /// Number of independent publishers aggregated
    pub num_sources: u32,
}

impl RawPrice {
    /// Convert the scaled integer into a decimal price.
    ///
    /// Returns `None` if the value cannot be represented.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let mantissa = i128::try_from(self.price).ok()?;
        if self.decimals <= 28 {
            return Decimal::try_from_i128_with_scale(mantissa, self.decimals).ok();
        }
        // Shed excess precision so the scale fits
        let excess = self.decimals - 28;
        let divisor = 10i128.checked_pow(excess)?;
        Decimal::try_from_i128_with_scale(mantissa / divisor, 28).ok()
    }

    /// Age in seconds relative to `now` (zero if the timestamp is in the future).
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_updated_timestamp)
    }
}

/// Validated price for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Asset symbol (e.g. "ETH")
    pub asset: String,
    /// Price in the quote currency
    pub price: Decimal,
    /// Decimal exponent reported by the source
    pub decimals: u32,
    /// Source timestamp (unix seconds)
    pub timestamp: u64,
    /// Number of independent sources aggregated
    pub num_sources: u32,
    /// Aggregation used to produce this price
    pub aggregation: AggregationMode,
    /// Served from the local cache without a network call
    pub cached: bool,
    /// Served as a last-resort cached value after live sources failed
    pub fallback: bool,
}

impl PriceQuote {
    /// Build a fresh (non-cached) quote from a validated raw answer.
    pub fn from_raw(asset: &str, raw: &RawPrice, price: Decimal, aggregation: AggregationMode) -> Self {
        Self {
            asset: asset.to_string(),
            price,
            decimals: raw.decimals,
            timestamp: raw.last_updated_timestamp,
            num_sources: raw.num_sources,
            aggregation,
            cached: false,
            fallback: false,
        }
    }

    /// Age in seconds relative to `now`.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    /// Source timestamp as a UTC datetime.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp as i64, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_raw_price_conversion() {
        let raw = RawPrice {
            price: 200_000_000_000, // $2000 with 8 decimals
            decimals: 8,
            last_updated_timestamp: 1_700_000_000,
            num_sources: 5,
        };
        assert_eq!(raw.to_decimal(), Some(dec!(2000)));
    }

    #[test]
    fn test_raw_price_excess_decimals() {
        let raw = RawPrice {
            price: 10u128.pow(30), // 1.0 with 30 decimals
            decimals: 30,
            last_updated_timestamp: 0,
            num_sources: 1,
        };
        assert_eq!(raw.to_decimal(), Some(dec!(1)));
    }

    #[test]
    fn test_raw_price_unrepresentable() {
        let raw = RawPrice {
            price: u128::MAX,
            decimals: 0,
            last_updated_timestamp: 0,
            num_sources: 1,
        };
        assert_eq!(raw.to_decimal(), None);
    }

    #[test]
    fn test_age() {
        let raw = RawPrice {
            price: 1,
            decimals: 0,
            last_updated_timestamp: 1_700_000_000,
            num_sources: 3,
        };
        assert_eq!(raw.age_secs(1_700_000_301), 301);
        assert_eq!(raw.age_secs(1_699_999_000), 0);
    }

    #[test]
    fn test_aggregation_wire_names() {
        assert_eq!(AggregationMode::Median.as_str(), "median");
        assert_eq!(AggregationMode::Mean.to_string(), "mean");
    }
}
