//! Oracle error types.

use thiserror::Error;

use super::AggregationMode;

/// Failure to obtain a usable price for an asset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// No source id configured for the asset symbol
    #[error("no price source configured for asset {asset}")]
    UnknownAsset { asset: String },

    /// Source returned zero (or an unrepresentable value)
    #[error("invalid price {price} for {asset} ({decimals} decimals)")]
    InvalidPrice {
        asset: String,
        price: u128,
        decimals: u32,
    },

    /// Quote older than the staleness tolerance
    #[error("stale price for {asset}: age {age_secs}s exceeds tolerance {tolerance_secs}s")]
    Stale {
        asset: String,
        age_secs: u64,
        tolerance_secs: u64,
    },

    /// Too few publishers behind the aggregate
    #[error("insufficient sources for {asset}: {num_sources} < {min_sources}")]
    InsufficientSources {
        asset: String,
        num_sources: u32,
        min_sources: u32,
    },

    /// Source did not answer within the request timeout
    #[error("price request for {asset} timed out after {timeout_ms}ms")]
    Timeout { asset: String, timeout_ms: u64 },

    /// Transport or decoding failure inside the source
    #[error("price source error for {asset}: {reason}")]
    Source { asset: String, reason: String },

    /// Every fallback tier failed and nothing was cached
    #[error("all price methods failed for {asset}: {}", format_attempts(.attempts))]
    Exhausted {
        asset: String,
        attempts: Vec<(AggregationMode, String)>,
    },
}

fn format_attempts(attempts: &[(AggregationMode, String)]) -> String {
    let mut parts: Vec<String> = attempts
        .iter()
        .map(|(mode, reason)| format!("{mode}: {reason}"))
        .collect();
    parts.push("cache: no cached value".to_string());
    parts.join("; ")
}

impl OracleError {
    /// Asset the error refers to.
    pub fn asset(&self) -> &str {
        match self {
            Self::UnknownAsset { asset }
            | Self::InvalidPrice { asset, .. }
            | Self::Stale { asset, .. }
            | Self::InsufficientSources { asset, .. }
            | Self::Timeout { asset, .. }
            | Self::Source { asset, .. }
            | Self::Exhausted { asset, .. } => asset,
        }
    }

    /// Whether retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownAsset { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_lists_every_attempt() {
        let err = OracleError::Exhausted {
            asset: "ETH".to_string(),
            attempts: vec![
                (AggregationMode::Median, "insufficient sources".to_string()),
                (AggregationMode::Mean, "timed out".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("median: insufficient sources"));
        assert!(msg.contains("mean: timed out"));
        assert!(msg.contains("cache: no cached value"));
        assert_eq!(err.asset(), "ETH");
    }

    #[test]
    fn test_retryable() {
        assert!(!OracleError::UnknownAsset { asset: "X".into() }.is_retryable());
        assert!(OracleError::Timeout { asset: "X".into(), timeout_ms: 5000 }.is_retryable());
    }
}
