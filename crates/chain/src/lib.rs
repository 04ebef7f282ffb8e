//! Lending engine external-dependency layer.
//!
//! This crate provides:
//! - The price source seam and the price oracle adapter (validation,
//!   TTL caching, concurrent batch fetches, median/mean/cache fallback)
//! - The transaction executor seam with timeout-bounded, typed calls
//! - An injectable clock shared by the oracle and the engine

pub mod clock;
pub mod executor;
pub mod oracle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{
    ExecutionStatus, ExecutorError, OperationType, SubmitRequest, TimedExecutor, TransactionExecutor,
};
pub use oracle::{
    AggregationMode, CachedPrice, OracleError, OracleSettings, PriceCache, PriceOracleAdapter,
    PriceQuote, PriceSource, RawPrice,
};
