//! TTL price cache with a last-known-good shadow for fallback reads.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use super::PriceQuote;
use crate::clock::Clock;

/// Price cache entry.
#[derive(Debug, Clone)]
pub struct CachedPrice {
    /// Cached quote
    pub quote: PriceQuote,
    /// When the quote was cached (unix seconds)
    pub cached_at: u64,
}

impl CachedPrice {
    /// Check if the entry is older than `ttl_secs` at `now`.
    pub fn is_expired(&self, ttl_secs: u64, now: u64) -> bool {
        now.saturating_sub(self.cached_at) >= ttl_secs
    }
}

/// Price cache keyed by asset symbol.
///
/// Fresh entries expire after the TTL and are evicted lazily by the next
/// read. Every stored quote is also kept as the asset's last known good
/// value, which survives eviction and backs the final fallback tier.
#[derive(Debug)]
pub struct PriceCache {
    fresh: DashMap<String, CachedPrice>,
    last_good: DashMap<String, CachedPrice>,
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl PriceCache {
    /// Create an empty cache.
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            fresh: DashMap::new(),
            last_good: DashMap::new(),
            ttl_secs,
            clock,
        }
    }

    /// Fresh quote for an asset, flagged `cached`.
    ///
    /// An entry past its TTL is removed and `None` is returned.
    pub fn get(&self, asset: &str) -> Option<PriceQuote> {
        let now = self.clock.unix_now();
        let expired = {
            let entry = self.fresh.get(asset)?;
            if !entry.is_expired(self.ttl_secs, now) {
                let mut quote = entry.quote.clone();
                quote.cached = true;
                return Some(quote);
            }
            entry.cached_at
        };

        // Only evict the entry we judged expired; a concurrent writer may
        // already have replaced it.
        self.fresh
            .remove_if(asset, |_, entry| entry.cached_at == expired);
        trace!(asset, "Evicted expired price cache entry");
        None
    }

    /// Last known good quote regardless of age.
    pub fn last_known(&self, asset: &str) -> Option<CachedPrice> {
        self.last_good.get(asset).map(|e| e.clone())
    }

    /// Store a validated quote.
    pub fn insert(&self, quote: PriceQuote) {
        let entry = CachedPrice {
            cached_at: self.clock.unix_now(),
            quote,
        };
        self.last_good
            .insert(entry.quote.asset.clone(), entry.clone());
        self.fresh.insert(entry.quote.asset.clone(), entry);
    }

    /// Assets with a fresh entry.
    pub fn cached_assets(&self) -> Vec<String> {
        let now = self.clock.unix_now();
        self.fresh
            .iter()
            .filter(|e| !e.value().is_expired(self.ttl_secs, now))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of fresh entries currently held (expired ones included until read).
    pub fn len(&self) -> usize {
        self.fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty()
    }

    /// Drop every entry, including last known good values.
    pub fn clear(&self) {
        self.fresh.clear();
        self.last_good.clear();
    }
}
