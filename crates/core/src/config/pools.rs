//! Pool set loading from TOML files.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::pool::{Pool, PoolId};

/// Pool configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolsConfig {
    /// List of pools
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

/// Individual pool configuration (TOML-loadable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool identifier (e.g. "eth-usdc")
    pub id: String,
    /// Collateral asset symbol
    pub collateral_asset: String,
    /// Debt asset symbol
    pub debt_asset: String,
    /// Origination LTV limit, e.g. "0.80"
    pub max_ltv: Decimal,
    /// Health factor collateral discount, e.g. "0.85"
    pub liquidation_threshold: Decimal,
    #[serde(default)]
    pub supply_apy: Decimal,
    #[serde(default)]
    pub borrow_apy: Decimal,
    /// Debt-asset liquidity available at startup
    #[serde(default)]
    pub initial_liquidity: Decimal,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl PoolConfig {
    pub fn to_pool(&self) -> Pool {
        Pool {
            id: PoolId::from(self.id.as_str()),
            collateral_asset: self.collateral_asset.clone(),
            debt_asset: self.debt_asset.clone(),
            total_supplied: self.initial_liquidity,
            total_borrowed: Decimal::ZERO,
            total_collateral: Decimal::ZERO,
            max_ltv: self.max_ltv,
            liquidation_threshold: self.liquidation_threshold,
            supply_apy: self.supply_apy,
            borrow_apy: self.borrow_apy,
            active: self.active,
        }
    }
}

impl PoolsConfig {
    /// Load from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.as_ref().display(), e))?;
        Self::from_toml(&content)
    }

    /// Load from TOML content.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse pools config: {}", e))
    }

    /// Load from the file named by POOLS_CONFIG, or an empty set.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("POOLS_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Build validated pool records, rejecting duplicate ids.
    pub fn to_pools(&self) -> anyhow::Result<Vec<Pool>> {
        let mut seen = HashSet::new();
        let mut pools = Vec::with_capacity(self.pools.len());
        for config in &self.pools {
            if !seen.insert(config.id.as_str()) {
                anyhow::bail!("Duplicate pool id '{}'", config.id);
            }
            let pool = config.to_pool();
            pool.validate().map_err(|e| anyhow::anyhow!(e))?;
            pools.push(pool);
        }
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const POOLS: &str = r#"
        [[pools]]
        id = "eth-usdc"
        collateral_asset = "ETH"
        debt_asset = "USDC"
        max_ltv = "0.80"
        liquidation_threshold = "0.85"
        borrow_apy = "0.05"
        initial_liquidity = "1000000"

        [[pools]]
        id = "btc-usdc"
        collateral_asset = "BTC"
        debt_asset = "USDC"
        max_ltv = "0.70"
        liquidation_threshold = "0.75"
        active = false
    "#;

    #[test]
    fn test_load_pools() {
        let pools = PoolsConfig::from_toml(POOLS).unwrap().to_pools().unwrap();
        assert_eq!(pools.len(), 2);

        let eth = &pools[0];
        assert_eq!(eth.id, PoolId::from("eth-usdc"));
        assert_eq!(eth.total_supplied, dec!(1000000));
        assert_eq!(eth.borrow_apy, dec!(0.05));
        assert_eq!(eth.supply_apy, Decimal::ZERO);
        assert!(eth.active);
        assert!(!pools[1].active);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_parameters() {
        let mut config = PoolsConfig::from_toml(POOLS).unwrap();
        config.pools[1].id = "eth-usdc".to_string();
        assert!(config.to_pools().is_err());

        let inverted = r#"
            [[pools]]
            id = "bad"
            collateral_asset = "ETH"
            debt_asset = "USDC"
            max_ltv = "0.90"
            liquidation_threshold = "0.85"
        "#;
        assert!(PoolsConfig::from_toml(inverted).unwrap().to_pools().is_err());
    }

    #[test]
    fn test_empty_file() {
        assert!(PoolsConfig::from_toml("").unwrap().pools.is_empty());
    }
}
