//! Application configuration.
//!
//! Strategies, subscriptions, credentials and mass-trade configs belong to
//! external services; the file seeds them so the relay can run standalone.
//! Credentials only name environment variables, never the secrets.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigrelay_core::{Credential, MassTradeConfig, Strategy, Subscription, MAX_LEVERAGE};
use sigrelay_exchange::ExchangeSettings;
use sigrelay_gateway::ServerConfig;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionEntry>,
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
    /// Keys use the API's camelCase names.
    #[serde(default)]
    pub mass_trade_configs: Vec<MassTradeConfig>,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory of the JSON Lines journal.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "./data/journal".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Subscription as written in the file. Market scope falls back to the
/// `[exchange]` defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub credential_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub position_size_usdt: Decimal,
    pub leverage: u32,
    #[serde(default = "default_true")]
    pub partial_take_profit: bool,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub margin_coin: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SubscriptionEntry {
    pub fn to_subscription(&self, exchange: &ExchangeSettings) -> Subscription {
        Subscription {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            strategy_id: self.strategy_id.clone(),
            credential_id: self.credential_id.clone(),
            enabled: self.enabled,
            position_size_usdt: self.position_size_usdt,
            leverage: self.leverage,
            partial_take_profit: self.partial_take_profit,
            product_type: self
                .product_type
                .clone()
                .unwrap_or_else(|| exchange.product_type.clone()),
            margin_coin: self
                .margin_coin
                .clone()
                .unwrap_or_else(|| exchange.margin_coin.clone()),
        }
    }
}

/// Credential reference. Each `*_env` field names the environment variable
/// holding the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub id: String,
    pub user_id: String,
    pub api_key_env: String,
    pub secret_env: String,
    pub passphrase_env: String,
}

impl CredentialEntry {
    pub fn resolve(&self) -> AppResult<Credential> {
        let read = |var: &str| {
            std::env::var(var).map_err(|_| {
                AppError::Config(format!(
                    "credential {}: environment variable {var} is not set",
                    self.id
                ))
            })
        };
        Ok(Credential::new(
            &self.id,
            &self.user_id,
            read(&self.api_key_env)?,
            read(&self.secret_env)?,
            read(&self.passphrase_env)?,
        ))
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-check the seeded records.
    pub fn validate(&self) -> AppResult<()> {
        if self.server.body_limit_bytes == 0 {
            return Err(AppError::Config("server.body_limit_bytes must be > 0".into()));
        }
        if self.exchange.timeout_ms == 0 {
            return Err(AppError::Config("exchange.timeout_ms must be > 0".into()));
        }

        unique_ids("strategy", self.strategies.iter().map(|s| s.id.as_str()))?;
        unique_ids("subscription", self.subscriptions.iter().map(|s| s.id.as_str()))?;
        unique_ids("credential", self.credentials.iter().map(|c| c.id.as_str()))?;
        unique_ids(
            "mass trade config",
            self.mass_trade_configs.iter().map(|c| c.id.as_str()),
        )?;

        let strategy_ids: HashSet<&str> = self.strategies.iter().map(|s| s.id.as_str()).collect();
        let credential_ids: HashSet<&str> =
            self.credentials.iter().map(|c| c.id.as_str()).collect();

        for sub in &self.subscriptions {
            if !strategy_ids.contains(sub.strategy_id.as_str()) {
                return Err(AppError::Config(format!(
                    "subscription {}: unknown strategy {}",
                    sub.id, sub.strategy_id
                )));
            }
            if !credential_ids.contains(sub.credential_id.as_str()) {
                return Err(AppError::Config(format!(
                    "subscription {}: unknown credential {}",
                    sub.id, sub.credential_id
                )));
            }
            if !(1..=MAX_LEVERAGE).contains(&sub.leverage) {
                return Err(AppError::Config(format!(
                    "subscription {}: leverage must be within 1..={MAX_LEVERAGE}",
                    sub.id
                )));
            }
            if sub.position_size_usdt <= Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "subscription {}: position_size_usdt must be positive",
                    sub.id
                )));
            }
        }

        for config in &self.mass_trade_configs {
            config
                .validate()
                .map_err(|e| AppError::Config(e.to_string()))?;
            if !credential_ids.contains(config.credential_id.as_str()) {
                return Err(AppError::Config(format!(
                    "mass trade config {}: unknown credential {}",
                    config.id, config.credential_id
                )));
            }
        }
        Ok(())
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .map(|s| s.to_subscription(&self.exchange))
            .collect()
    }

    /// Credentials whose environment variables are all set. Missing ones are
    /// skipped with a warning; their subscribers fail individually.
    pub fn resolve_credentials(&self) -> Vec<Credential> {
        self.credentials
            .iter()
            .filter_map(|entry| match entry.resolve() {
                Ok(credential) => Some(credential),
                Err(e) => {
                    warn!(credential_id = %entry.id, error = %e, "Skipping credential");
                    None
                }
            })
            .collect()
    }
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> AppResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(AppError::Config(format!("duplicate {kind} id: {id}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
[server]
port = 9000

[exchange]
product_type = "USDC-FUTURES"
margin_coin = "USDC"

[persistence]
data_dir = "/tmp/sigrelay"

[[strategies]]
id = "s1"
name = "Alpha"

[[credentials]]
id = "c1"
user_id = "u1"
api_key_env = "SIGRELAY_TEST_KEY"
secret_env = "SIGRELAY_TEST_SECRET"
passphrase_env = "SIGRELAY_TEST_PASSPHRASE"

[[subscriptions]]
id = "sub1"
user_id = "u1"
strategy_id = "s1"
credential_id = "c1"
position_size_usdt = "100"
leverage = 10

[[subscriptions]]
id = "sub2"
user_id = "u1"
strategy_id = "s1"
credential_id = "c1"
position_size_usdt = "50"
leverage = 3
product_type = "USDT-FUTURES"
margin_coin = "USDT"

[[mass_trade_configs]]
id = "cfg-1"
userId = "u1"
name = "majors"
credentialId = "c1"
side = "buy"
leverage = 5
stopLossPercent = "2"
takeProfitPercent = "4"
positionSizeUsdt = "10"
symbols = [{ symbol = "BTCUSDT" }, { symbol = "ETHUSDT", slPercent = "3" }]
"#;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.exchange.base_url, "https://api.bitget.com");
        assert_eq!(config.persistence.data_dir, "./data/journal");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.exchange.timeout_ms, 10_000);
        assert_eq!(config.exchange.price_cache_ttl_ms, 5_000);
        assert!(config.strategies.is_empty());
    }

    #[test]
    fn test_sample_config() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.strategies[0].name, "Alpha");
        assert!(config.strategies[0].active);

        let subs = config.subscriptions();
        assert_eq!(subs[0].product_type, "USDC-FUTURES");
        assert_eq!(subs[0].margin_coin, "USDC");
        assert_eq!(subs[0].position_size_usdt, dec!(100));
        assert!(subs[0].partial_take_profit);
        assert_eq!(subs[1].product_type, "USDT-FUTURES");

        let mt = &config.mass_trade_configs[0];
        assert_eq!(mt.symbols.len(), 2);
        assert_eq!(mt.symbols[1].sl_percent, Some(dec!(3)));
    }

    #[test]
    fn test_shipped_default_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let config = AppConfig::from_file(path).unwrap();
        assert_eq!(config.mass_trade_configs[0].symbols.len(), 3);
        assert_eq!(config.subscriptions()[0].product_type, "USDT-FUTURES");
    }

    #[test]
    fn test_unknown_strategy_reference_rejected() {
        let broken = SAMPLE.replacen("strategy_id = \"s1\"", "strategy_id = \"nope\"", 1);
        let err = AppConfig::from_toml(&broken).unwrap_err();
        assert!(err.to_string().contains("unknown strategy"));
    }

    #[test]
    fn test_mass_trade_leverage_out_of_range_rejected() {
        let broken = SAMPLE.replace("leverage = 5", "leverage = 200");
        let err = AppConfig::from_toml(&broken).unwrap_err();
        assert!(err.to_string().contains("leverage"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let broken = SAMPLE.replace("id = \"sub2\"", "id = \"sub1\"");
        let err = AppConfig::from_toml(&broken).unwrap_err();
        assert!(err.to_string().contains("duplicate subscription id"));
    }

    #[test]
    fn test_credentials_resolve_from_env() {
        let entry = CredentialEntry {
            id: "c9".into(),
            user_id: "u9".into(),
            api_key_env: "SIGRELAY_CFG_TEST_KEY".into(),
            secret_env: "SIGRELAY_CFG_TEST_SECRET".into(),
            passphrase_env: "SIGRELAY_CFG_TEST_PASS".into(),
        };
        assert!(entry.resolve().is_err());

        std::env::set_var("SIGRELAY_CFG_TEST_KEY", "key");
        std::env::set_var("SIGRELAY_CFG_TEST_SECRET", "secret");
        std::env::set_var("SIGRELAY_CFG_TEST_PASS", "pass");
        let credential = entry.resolve().unwrap();
        assert_eq!(credential.api_key, "key");
        assert_eq!(credential.secret.as_str(), "secret");
        assert_eq!(credential.user_id, "u9");
    }

    #[test]
    fn test_missing_credential_env_is_skipped() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        // SIGRELAY_TEST_* are never set
        assert!(config.resolve_credentials().is_empty());
    }
}
