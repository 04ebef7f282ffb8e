//! Lending engine API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Price API: raw aggregated prices behind the oracle adapter
//! - Relayer: transaction submission, status and vault exchange rates

mod price_api;
mod relayer;

pub use price_api::HttpPriceSource;
pub use relayer::RelayerClient;
