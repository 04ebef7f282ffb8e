//! Price oracle layer.
//!
//! This module provides the [`PriceSource`] seam to the external price feed
//! and the [`PriceOracleAdapter`] that the engine and monitor consume.
//!
//! # Architecture
//!
//! - [`PriceSource`]: raw queries by source id and aggregation mode
//! - [`PriceOracleAdapter`]: validation, TTL caching, batch fetches and the
//!   median -> mean -> last cached fallback chain
//! - [`OracleSettings`]: staleness, source-count, TTL and timeout limits
//!
//! # Example
//!
//! ```rust,ignore
//! use lending_chain::oracle::{OracleSettings, PriceOracleAdapter};
//!
//! let oracle = PriceOracleAdapter::new(source, OracleSettings::default(), clock);
//!
//! // Median price, cached for the configured TTL
//! let eth = oracle.get_price("ETH").await?;
//!
//! // Degrades gracefully during source outages
//! let usdc = oracle.get_price_with_fallback("USDC").await?;
//! ```

mod adapter;
mod cache;
mod config;
mod error;
mod types;

pub use adapter::PriceOracleAdapter;
pub use cache::{CachedPrice, PriceCache};
pub use config::OracleSettings;
pub use error::OracleError;
pub use types::{AggregationMode, PriceQuote, RawPrice};

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// External price feed.
///
/// Implementations return the raw aggregate for a source-specific id; all
/// validation happens in [`PriceOracleAdapter`].
#[async_trait]
pub trait PriceSource: Send + Sync + Debug {
    /// Human-readable source name for logs.
    fn name(&self) -> &str;

    /// Query the aggregate price for `source_id` (e.g. "ETH/USD").
    async fn query(&self, source_id: &str, aggregation: AggregationMode) -> Result<RawPrice>;
}
