//! Exchange client configuration.

use serde::{Deserialize, Serialize};
use sigrelay_core::{DEFAULT_MARGIN_COIN, DEFAULT_PRODUCT_TYPE};
use std::time::Duration;

use crate::price_cache::DEFAULT_PRICE_TTL_MS;

/// `[exchange]` section of the application config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSettings {
    /// REST base URL. Default: https://api.bitget.com
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request HTTP timeout (ms). Default: 10,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Ticker price cache TTL (ms). Default: 5,000.
    #[serde(default = "default_price_cache_ttl_ms")]
    pub price_cache_ttl_ms: u64,
    /// Default product type for subscriptions that do not set one.
    #[serde(default = "default_product_type")]
    pub product_type: String,
    #[serde(default = "default_margin_coin")]
    pub margin_coin: String,
    /// `isolated` or `crossed`. Default: isolated.
    #[serde(default = "default_margin_mode")]
    pub margin_mode: String,
    /// Value of the `locale` header. Default: en-US.
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_base_url() -> String {
    "https://api.bitget.com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_price_cache_ttl_ms() -> u64 {
    DEFAULT_PRICE_TTL_MS
}

fn default_product_type() -> String {
    DEFAULT_PRODUCT_TYPE.to_string()
}

fn default_margin_coin() -> String {
    DEFAULT_MARGIN_COIN.to_string()
}

fn default_margin_mode() -> String {
    "isolated".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            price_cache_ttl_ms: default_price_cache_ttl_ms(),
            product_type: default_product_type(),
            margin_coin: default_margin_coin(),
            margin_mode: default_margin_mode(),
            locale: default_locale(),
        }
    }
}

impl ExchangeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
