//! Short-lived ticker price cache.
//!
//! Keyed by `symbol + productType`. Entries expire after a fixed TTL; there
//! is no other invalidation. Concurrent refreshes of the same key are
//! last-write-wins.

use dashmap::DashMap;
use sigrelay_core::Price;
use std::sync::Arc;

use crate::clock::Clock;

/// Default time-to-live for a cached price.
pub const DEFAULT_PRICE_TTL_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: Price,
    stored_at_ms: u64,
}

/// Ticker price cache with an injectable clock.
pub struct PriceCache {
    entries: DashMap<String, CachedPrice>,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl PriceCache {
    pub fn new(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms,
            clock,
        }
    }

    /// Cache key for a symbol within a product type.
    pub fn key(symbol: &str, product_type: &str) -> String {
        format!("{symbol}:{product_type}")
    }

    /// Fresh price for `key`, or `None` when absent or expired.
    pub fn get(&self, key: &str) -> Option<Price> {
        let entry = *self.entries.get(key)?;
        let age = self.clock.now_ms().saturating_sub(entry.stored_at_ms);
        if age < self.ttl_ms {
            Some(entry.price)
        } else {
            None
        }
    }

    pub fn put(&self, key: impl Into<String>, price: Price) {
        self.entries.insert(
            key.into(),
            CachedPrice {
                price,
                stored_at_ms: self.clock.now_ms(),
            },
        );
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
