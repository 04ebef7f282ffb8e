//! Engine configuration with profile support.
//!
//! Provides the oracle, lending and monitor settings with named profiles
//! (default, testing, production) and TOML overrides.

use lending_chain::OracleSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::health::HealthThresholds;

/// Main configuration structure passed into every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Price validation, caching and timeouts
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Lending operation behaviour
    #[serde(default)]
    pub lending: LendingSettings,

    /// Background health monitoring
    #[serde(default)]
    pub monitor: MonitorSettings,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Lending engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingSettings {
    /// Bound on every executor call (milliseconds)
    #[serde(default = "default_executor_timeout")]
    pub executor_timeout_ms: u64,

    /// Use the median -> mean -> cache fallback chain for borrow/withdraw prices
    #[serde(default = "default_true")]
    pub use_price_fallback: bool,

    /// Apply simple interest to outstanding debt before each operation
    #[serde(default = "default_true")]
    pub accrue_interest: bool,
}

fn default_executor_timeout() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}

impl Default for LendingSettings {
    fn default() -> Self {
        Self {
            executor_timeout_ms: default_executor_timeout(),
            use_price_fallback: default_true(),
            accrue_interest: default_true(),
        }
    }
}

impl LendingSettings {
    pub fn executor_timeout(&self) -> Duration {
        Duration::from_millis(self.executor_timeout_ms)
    }
}

/// Position monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Cycle interval (seconds)
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,

    /// HF below which a position is at risk
    #[serde(default = "default_at_risk_hf")]
    pub at_risk_hf: Decimal,

    /// HF below which a position is critical
    #[serde(default = "default_critical_hf")]
    pub critical_hf: Decimal,

    /// HF below which a position is liquidatable
    #[serde(default = "default_liquidation_hf")]
    pub liquidation_hf: Decimal,

    /// Minimum gap between repeated alerts for an unchanged class (seconds)
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,

    /// Capacity of the liquidation candidate channel
    #[serde(default = "default_liquidation_channel_capacity")]
    pub liquidation_channel_capacity: usize,
}

fn default_monitor_interval() -> u64 {
    60
}
fn default_at_risk_hf() -> Decimal {
    dec!(1.2)
}
fn default_critical_hf() -> Decimal {
    dec!(1.05)
}
fn default_liquidation_hf() -> Decimal {
    Decimal::ONE
}
fn default_alert_cooldown() -> u64 {
    300
}
fn default_liquidation_channel_capacity() -> usize {
    256
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            at_risk_hf: default_at_risk_hf(),
            critical_hf: default_critical_hf(),
            liquidation_hf: default_liquidation_hf(),
            alert_cooldown_secs: default_alert_cooldown(),
            liquidation_channel_capacity: default_liquidation_channel_capacity(),
        }
    }
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            at_risk_hf: self.at_risk_hf,
            critical_hf: self.critical_hf,
            liquidation_hf: self.liquidation_hf,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            oracle: OracleSettings::default(),
            lending: LendingSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a testing profile: single-source prices, fast cycles.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            oracle: OracleSettings {
                min_sources: 1,
                cache_ttl_secs: 5,
                request_timeout_ms: 2_000,
                ..Default::default()
            },
            lending: LendingSettings {
                executor_timeout_ms: 2_000,
                ..Default::default()
            },
            monitor: MonitorSettings {
                interval_secs: 5,
                alert_cooldown_secs: 30,
                ..Default::default()
            },
        }
    }

    /// Create a production profile with tighter price freshness.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            oracle: OracleSettings {
                staleness_tolerance_secs: 120,
                cache_ttl_secs: 30,
                ..Default::default()
            },
            lending: LendingSettings::default(),
            monitor: MonitorSettings {
                interval_secs: 30,
                ..Default::default()
            },
        }
    }

    /// Profile by name. Supported values: testing, production; anything else is default.
    pub fn profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Get profile from environment variable LENDING_PROFILE, or default.
    pub fn from_env() -> Self {
        let profile = std::env::var("LENDING_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::profile(&profile)
    }

    /// File from LENDING_CONFIG when set, otherwise the LENDING_PROFILE profile.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("LENDING_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load engine config '{}': {}", path, e)),
            _ => Ok(Self::from_env()),
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.monitor
            .thresholds()
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;
        if self.monitor.interval_secs == 0 {
            anyhow::bail!("monitor.interval_secs must be positive");
        }
        if self.monitor.liquidation_channel_capacity == 0 {
            anyhow::bail!("monitor.liquidation_channel_capacity must be positive");
        }
        if self.oracle.min_sources == 0 {
            anyhow::bail!("oracle.min_sources must be at least 1");
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            staleness_tolerance_secs = self.oracle.staleness_tolerance_secs,
            min_sources = self.oracle.min_sources,
            cache_ttl_secs = self.oracle.cache_ttl_secs,
            request_timeout_ms = self.oracle.request_timeout_ms,
            assets = self.oracle.asset_ids.len(),
            "Oracle settings"
        );
        tracing::info!(
            executor_timeout_ms = self.lending.executor_timeout_ms,
            use_price_fallback = self.lending.use_price_fallback,
            accrue_interest = self.lending.accrue_interest,
            "Lending settings"
        );
        tracing::info!(
            interval_secs = self.monitor.interval_secs,
            at_risk_hf = %self.monitor.at_risk_hf,
            critical_hf = %self.monitor.critical_hf,
            liquidation_hf = %self.monitor.liquidation_hf,
            alert_cooldown_secs = self.monitor.alert_cooldown_secs,
            "Monitor settings"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.oracle.staleness_tolerance_secs, 300);
        assert_eq!(config.oracle.min_sources, 3);
        assert_eq!(config.lending.executor_timeout(), Duration::from_secs(5));
        assert!(config.lending.use_price_fallback);
        assert_eq!(config.monitor.thresholds(), HealthThresholds::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profiles() {
        assert_eq!(EngineConfig::profile("test").oracle.min_sources, 1);
        assert_eq!(EngineConfig::profile("PROD").oracle.staleness_tolerance_secs, 120);
        assert_eq!(EngineConfig::profile("unknown").profile, "default");
        assert!(EngineConfig::testing().validate().is_ok());
        assert!(EngineConfig::production().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml(
            r#"
            profile = "custom"

            [oracle]
            min_sources = 2

            [monitor]
            at_risk_hf = "1.3"
            "#,
        )
        .unwrap();

        assert_eq!(config.profile, "custom");
        assert_eq!(config.oracle.min_sources, 2);
        assert_eq!(config.oracle.staleness_tolerance_secs, 300);
        assert_eq!(config.monitor.at_risk_hf, dec!(1.3));
        assert_eq!(config.monitor.critical_hf, dec!(1.05));
        assert!(config.lending.accrue_interest);
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let err = EngineConfig::from_toml(
            r#"
            [monitor]
            at_risk_hf = "1.0"
            critical_hf = "1.1"
            "#,
        );
        assert!(err.is_err());
    }
}
