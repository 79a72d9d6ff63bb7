//! Strategy, subscription and credential types owned by external
//! collaborators and consumed here read-only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Default exchange market segment.
pub const DEFAULT_PRODUCT_TYPE: &str = "USDT-FUTURES";
/// Default collateral coin.
pub const DEFAULT_MARGIN_COIN: &str = "USDT";

pub fn default_product_type() -> String {
    DEFAULT_PRODUCT_TYPE.to_string()
}

pub fn default_margin_coin() -> String {
    DEFAULT_MARGIN_COIN.to_string()
}

/// A signal strategy that webhooks address by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Strategy {
    /// Case-insensitive, trimmed name comparison.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// A user's subscription to a strategy: which account to trade and how big.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub credential_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Margin committed per entry, in the margin coin.
    pub position_size_usdt: Decimal,
    pub leverage: u32,
    /// Split take-profit into 50% partial + 50% final.
    #[serde(default = "default_true")]
    pub partial_take_profit: bool,
    #[serde(default = "default_product_type")]
    pub product_type: String,
    #[serde(default = "default_margin_coin")]
    pub margin_coin: String,
}

fn default_true() -> bool {
    true
}

/// Decrypted exchange API credential, supplied by the credential store.
///
/// Secret material is zeroized on drop and never printed.
#[derive(Clone)]
pub struct Credential {
    pub id: String,
    pub user_id: String,
    pub api_key: String,
    pub secret: Zeroizing<String>,
    pub passphrase: Zeroizing<String>,
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            api_key: api_key.into(),
            secret: Zeroizing::new(secret.into()),
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}
