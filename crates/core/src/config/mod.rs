//! Configuration for the lending engine.
//!
//! This module provides:
//! - Engine runtime configuration (profiles, oracle limits, monitor thresholds)
//! - Pool set configuration loaded at startup

mod engine;
mod pools;

pub use engine::{EngineConfig, LendingSettings, MonitorSettings};
pub use pools::{PoolConfig, PoolsConfig};
