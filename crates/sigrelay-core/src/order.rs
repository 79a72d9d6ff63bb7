//! Order-related types and identifiers.
//!
//! Provides order side, position direction, order type, and the client order
//! id used as the exchange-facing idempotency key.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Maximum clientOid length accepted by the exchange.
pub const CLIENT_OID_MAX_LEN: usize = 64;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Position direction opened by an order on this side.
    pub fn hold_side(&self) -> HoldSide {
        match self {
            Self::Buy => HoldSide::Long,
            Self::Sell => HoldSide::Short,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = CoreError;

    /// Accepts `buy/sell` as well as the charting platform's `long/short`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(Self::Buy),
            "sell" | "short" => Ok(Self::Sell),
            _ => Err(CoreError::InvalidSide(s.to_string())),
        }
    }
}

/// Exchange-side position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldSide {
    Long,
    Short,
}

impl HoldSide {
    /// Side of the order that reduces a position in this direction.
    pub fn closing_side(&self) -> Side {
        match self {
            Self::Long => Side::Sell,
            Self::Short => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for HoldSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            _ => Err(CoreError::InvalidSide(s.to_string())),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
    /// Conditional stop-loss / take-profit order.
    Trigger,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
            Self::Trigger => write!(f, "trigger"),
        }
    }
}

/// Client order id for exchange-side idempotency.
///
/// Format: `<prefix>_<symbolPrefix8>_<epochMillis>_<random4digits>`,
/// truncated to [`CLIENT_OID_MAX_LEN`] characters. One id per logical
/// attempt; reusing it across retries of the same attempt is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOid(String);

impl ClientOid {
    /// Generate a fresh id for `prefix` and `symbol` using the wall clock.
    pub fn generate(prefix: &str, symbol: &str) -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let nonce: u16 = rand::thread_rng().gen_range(1000..10000);
        Self::from_parts(prefix, symbol, ts, nonce)
    }

    /// Build an id from explicit parts (deterministic; used by tests and replays).
    pub fn from_parts(prefix: &str, symbol: &str, epoch_ms: i64, nonce: u16) -> Self {
        let symbol_prefix: String = symbol
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect();
        let mut raw = format!("{prefix}_{symbol_prefix}_{epoch_ms}_{nonce:04}");
        raw.truncate(CLIENT_OID_MAX_LEN);
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClientOid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
