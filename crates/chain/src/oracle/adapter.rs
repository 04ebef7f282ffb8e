//! Price oracle adapter: validated, cached and fallback-aware price access.

use futures::future::join_all;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{AggregationMode, OracleError, OracleSettings, PriceCache, PriceQuote, PriceSource, RawPrice};
use crate::clock::Clock;

/// Aggregations tried by [`PriceOracleAdapter::get_price_with_fallback`], in order.
const FALLBACK_CHAIN: [AggregationMode; 2] = [AggregationMode::Median, AggregationMode::Mean];

/// Fetches, validates and caches asset prices from a [`PriceSource`].
pub struct PriceOracleAdapter {
    source: Arc<dyn PriceSource>,
    cache: PriceCache,
    settings: OracleSettings,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for PriceOracleAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceOracleAdapter")
            .field("source", &self.source.name())
            .field("cache_size", &self.cache.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl PriceOracleAdapter {
    /// Create a new adapter.
    pub fn new(source: Arc<dyn PriceSource>, settings: OracleSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            cache: PriceCache::new(settings.cache_ttl_secs, clock.clone()),
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    /// Whether the asset symbol maps to a configured source id.
    pub fn supports(&self, asset: &str) -> bool {
        self.settings.source_id(asset).is_some()
    }

    /// Get the median price for an asset, served from cache within the TTL.
    #[instrument(skip(self))]
    pub async fn get_price(&self, asset: &str) -> Result<PriceQuote, OracleError> {
        if let Some(cached) = self.cache.get(asset) {
            debug!(asset, price = %cached.price, "Price cache hit");
            return Ok(cached);
        }
        self.fetch_validated(asset, AggregationMode::Median).await
    }

    /// Get prices for a set of assets.
    ///
    /// Cache hits are answered immediately and misses are fetched
    /// concurrently. Each asset carries its own result so one failure never
    /// fails the batch.
    pub async fn get_prices<S: AsRef<str>>(
        &self,
        assets: &[S],
    ) -> HashMap<String, Result<PriceQuote, OracleError>> {
        let mut results = HashMap::with_capacity(assets.len());
        let mut misses: Vec<&str> = Vec::new();

        for asset in assets.iter().map(AsRef::as_ref) {
            if results.contains_key(asset) || misses.contains(&asset) {
                continue;
            }
            match self.cache.get(asset) {
                Some(hit) => {
                    results.insert(asset.to_string(), Ok(hit));
                }
                None => misses.push(asset),
            }
        }

        let fetched = join_all(
            misses
                .iter()
                .map(|asset| self.fetch_validated(asset, AggregationMode::Median)),
        )
        .await;

        for (asset, result) in misses.into_iter().zip(fetched) {
            if let Err(e) = &result {
                warn!(asset, error = %e, "Batch price fetch failed");
            }
            results.insert(asset.to_string(), result);
        }

        results
    }

    /// Get a price, degrading median -> mean -> last cached value.
    ///
    /// The cached tier ignores the quote's own staleness and marks the
    /// result `fallback`. If nothing was ever cached the error lists every
    /// attempted method.
    #[instrument(skip(self))]
    pub async fn get_price_with_fallback(&self, asset: &str) -> Result<PriceQuote, OracleError> {
        if let Some(cached) = self.cache.get(asset) {
            return Ok(cached);
        }

        let mut attempts: SmallVec<[(AggregationMode, String); 2]> = SmallVec::new();
        for mode in FALLBACK_CHAIN {
            match self.fetch_validated(asset, mode).await {
                Ok(quote) => {
                    if !attempts.is_empty() {
                        warn!(asset, aggregation = %mode, "Price served by fallback aggregation");
                    }
                    return Ok(quote);
                }
                // No point walking the chain for an asset we cannot address
                Err(e @ OracleError::UnknownAsset { .. }) => return Err(e),
                Err(e) => {
                    debug!(asset, aggregation = %mode, error = %e, "Price method failed");
                    attempts.push((mode, e.to_string()));
                }
            }
        }

        if let Some(last) = self.cache.last_known(asset) {
            warn!(
                asset,
                price = %last.quote.price,
                cached_at = last.cached_at,
                "Live price methods failed, serving last cached price"
            );
            let mut quote = last.quote;
            quote.cached = true;
            quote.fallback = true;
            return Ok(quote);
        }

        Err(OracleError::Exhausted {
            asset: asset.to_string(),
            attempts: attempts.into_vec(),
        })
    }

    /// Validate a raw answer: positive price, fresh enough, enough publishers.
    pub fn validate(&self, asset: &str, raw: &RawPrice) -> Result<Decimal, OracleError> {
        let price = raw
            .to_decimal()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| OracleError::InvalidPrice {
                asset: asset.to_string(),
                price: raw.price,
                decimals: raw.decimals,
            })?;

        let age_secs = raw.age_secs(self.clock.unix_now());
        if age_secs > self.settings.staleness_tolerance_secs {
            return Err(OracleError::Stale {
                asset: asset.to_string(),
                age_secs,
                tolerance_secs: self.settings.staleness_tolerance_secs,
            });
        }

        if raw.num_sources < self.settings.min_sources {
            return Err(OracleError::InsufficientSources {
                asset: asset.to_string(),
                num_sources: raw.num_sources,
                min_sources: self.settings.min_sources,
            });
        }

        Ok(price)
    }

    /// Query the source once with a timeout, validate, and cache on success.
    async fn fetch_validated(&self, asset: &str, mode: AggregationMode) -> Result<PriceQuote, OracleError> {
        let source_id = self
            .settings
            .source_id(asset)
            .ok_or_else(|| OracleError::UnknownAsset {
                asset: asset.to_string(),
            })?;

        let raw = tokio::time::timeout(
            self.settings.request_timeout(),
            self.source.query(source_id, mode),
        )
        .await
        .map_err(|_| OracleError::Timeout {
            asset: asset.to_string(),
            timeout_ms: self.settings.request_timeout_ms,
        })?
        .map_err(|e| OracleError::Source {
            asset: asset.to_string(),
            reason: e.to_string(),
        })?;

        let price = self.validate(asset, &raw)?;
        let quote = PriceQuote::from_raw(asset, &raw, price, mode);

        debug!(
            asset,
            source_id,
            aggregation = %mode,
            price = %quote.price,
            num_sources = quote.num_sources,
            "Fetched price"
        );

        self.cache.insert(quote.clone());
        Ok(quote)
    }

    /// Assets currently holding a fresh cache entry.
    pub fn cached_assets(&self) -> Vec<String> {
        self.cache.cached_assets()
    }

    /// Clear the price cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
