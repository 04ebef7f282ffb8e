//! Oracle configuration for TOML-based setup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Validation, caching and timeout settings for the price oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Maximum quote age before it is rejected (seconds)
    #[serde(default = "default_staleness_tolerance")]
    pub staleness_tolerance_secs: u64,

    /// Minimum number of publishers behind an aggregate
    #[serde(default = "default_min_sources")]
    pub min_sources: u32,

    /// How long a validated quote is served from cache (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Bound on a single price source query (milliseconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Asset symbol to source-specific identifier (e.g. "ETH" -> "ETH/USD")
    #[serde(default = "default_asset_ids")]
    pub asset_ids: HashMap<String, String>,
}

fn default_staleness_tolerance() -> u64 {
    300
}
fn default_min_sources() -> u32 {
    3
}
fn default_cache_ttl() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    5_000
}
fn default_asset_ids() -> HashMap<String, String> {
    ["ETH", "BTC", "STRK", "USDC", "USDT", "DAI", "WSTETH"]
        .iter()
        .map(|symbol| (symbol.to_string(), format!("{symbol}/USD")))
        .collect()
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            staleness_tolerance_secs: default_staleness_tolerance(),
            min_sources: default_min_sources(),
            cache_ttl_secs: default_cache_ttl(),
            request_timeout_ms: default_request_timeout(),
            asset_ids: default_asset_ids(),
        }
    }
}

impl OracleSettings {
    /// Load from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse oracle settings: {}", e))
    }

    pub fn staleness_tolerance(&self) -> Duration {
        Duration::from_secs(self.staleness_tolerance_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Source identifier for an asset symbol (case-insensitive).
    pub fn source_id(&self, asset: &str) -> Option<&str> {
        self.asset_ids
            .get(asset)
            .or_else(|| self.asset_ids.get(&asset.to_uppercase()))
            .map(String::as_str)
    }

    /// Register or replace the source identifier for an asset.
    pub fn with_asset(mut self, asset: impl Into<String>, source_id: impl Into<String>) -> Self {
        self.asset_ids.insert(asset.into(), source_id.into());
        self
    }
}
