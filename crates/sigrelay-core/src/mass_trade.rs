//! Mass-trade configuration and run summaries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::{default_margin_coin, default_product_type};
use crate::error::{CoreError, Result};
use crate::order::Side;

/// Upper bound on symbols in one config.
pub const MAX_MASS_TRADE_SYMBOLS: usize = 20;
/// Highest leverage the exchange accepts.
pub const MAX_LEVERAGE: u32 = 125;

/// One symbol of a mass-trade config, with optional per-symbol overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MassTradeSymbol {
    pub symbol: String,
    #[serde(default)]
    pub sl_percent: Option<Decimal>,
    #[serde(default)]
    pub tp_percent: Option<Decimal>,
}

/// User-owned template fanned out across up to 20 symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MassTradeConfig {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub credential_id: String,
    pub side: Side,
    pub leverage: u32,
    pub stop_loss_percent: Decimal,
    #[serde(default)]
    pub take_profit_percent: Option<Decimal>,
    /// Margin per symbol, in the margin coin.
    pub position_size_usdt: Decimal,
    pub symbols: Vec<MassTradeSymbol>,
    #[serde(default = "default_product_type")]
    pub product_type: String,
    #[serde(default = "default_margin_coin")]
    pub margin_coin: String,
}

impl MassTradeConfig {
    /// Check the structural invariants of the config.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() || self.symbols.len() > MAX_MASS_TRADE_SYMBOLS {
            return Err(CoreError::InvalidConfig(format!(
                "config {}: symbols must contain 1..={} entries, got {}",
                self.id,
                MAX_MASS_TRADE_SYMBOLS,
                self.symbols.len()
            )));
        }
        if !(1..=MAX_LEVERAGE).contains(&self.leverage) {
            return Err(CoreError::InvalidConfig(format!(
                "config {}: leverage must be within 1..={}, got {}",
                self.id, MAX_LEVERAGE, self.leverage
            )));
        }
        if self.position_size_usdt <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "config {}: positionSizeUsdt must be positive",
                self.id
            )));
        }
        if self.stop_loss_percent <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "config {}: stopLossPercent must be positive",
                self.id
            )));
        }
        if matches!(self.take_profit_percent, Some(tp) if tp <= Decimal::ZERO) {
            return Err(CoreError::InvalidConfig(format!(
                "config {}: takeProfitPercent must be positive",
                self.id
            )));
        }
        Ok(())
    }

    /// Entries to run. `None` means the whole config; otherwise only the
    /// named symbols, in config order.
    pub fn select(&self, subset: Option<&[String]>) -> Vec<MassTradeSymbol> {
        match subset {
            None => self.symbols.clone(),
            Some(names) => self
                .symbols
                .iter()
                .filter(|entry| names.iter().any(|n| n.eq_ignore_ascii_case(&entry.symbol)))
                .cloned()
                .collect(),
        }
    }

    /// Names in `subset` that the config does not contain.
    pub fn unknown_symbols(&self, subset: &[String]) -> Vec<String> {
        subset
            .iter()
            .filter(|n| !self.symbols.iter().any(|e| e.symbol.eq_ignore_ascii_case(n)))
            .cloned()
            .collect()
    }
}

/// Outcome of one symbol within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolResult {
    pub symbol: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl SymbolResult {
    pub fn ok(symbol: impl Into<String>, order_id: Option<String>) -> Self {
        Self {
            symbol: symbol.into(),
            success: true,
            order_id,
            error: None,
        }
    }

    pub fn failed(symbol: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            success: false,
            order_id: None,
            error: Some(error.into()),
        }
    }
}

/// Immutable summary of one mass-trade run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MassTradeExecution {
    pub id: Uuid,
    pub config_id: String,
    pub user_id: String,
    pub side: Side,
    pub leverage: u32,
    pub symbols_count: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SymbolResult>,
    pub executed_at: DateTime<Utc>,
}

impl MassTradeExecution {
    pub fn from_results(config: &MassTradeConfig, results: Vec<SymbolResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            id: Uuid::new_v4(),
            config_id: config.id.clone(),
            user_id: config.user_id.clone(),
            side: config.side,
            leverage: config.leverage,
            symbols_count: results.len(),
            successful,
            failed: results.len() - successful,
            results,
            executed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config(symbols: &[&str]) -> MassTradeConfig {
        MassTradeConfig {
            id: "cfg-1".into(),
            user_id: "u1".into(),
            name: "alts".into(),
            credential_id: "cred-1".into(),
            side: Side::Buy,
            leverage: 10,
            stop_loss_percent: dec!(2),
            take_profit_percent: Some(dec!(4)),
            position_size_usdt: dec!(10),
            symbols: symbols
                .iter()
                .map(|s| MassTradeSymbol {
                    symbol: s.to_string(),
                    sl_percent: None,
                    tp_percent: None,
                })
                .collect(),
            product_type: default_product_type(),
            margin_coin: default_margin_coin(),
        }
    }

    #[test]
    fn test_validate_symbol_bounds() {
        assert!(config(&["BTCUSDT"]).validate().is_ok());
        assert!(config(&[]).validate().is_err());
        let many: Vec<String> = (0..21).map(|i| format!("S{i}USDT")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        assert!(config(&refs).validate().is_err());
    }

    #[test]
    fn test_validate_leverage_bounds() {
        let mut cfg = config(&["BTCUSDT"]);
        cfg.leverage = 0;
        assert!(cfg.validate().is_err());
        cfg.leverage = 125;
        assert!(cfg.validate().is_ok());
        cfg.leverage = 126;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_select_subset_keeps_config_order() {
        let cfg = config(&["AUSDT", "BUSDT", "CUSDT"]);
        let picked = cfg.select(Some(&["cusdt".to_string(), "AUSDT".to_string()]));
        let names: Vec<_> = picked.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(names, vec!["AUSDT", "CUSDT"]);
        assert_eq!(cfg.select(None).len(), 3);
        assert_eq!(cfg.unknown_symbols(&["XUSDT".to_string()]), vec!["XUSDT"]);
    }

    #[test]
    fn test_execution_summary_counts() {
        let cfg = config(&["AUSDT", "BUSDT"]);
        let exec = MassTradeExecution::from_results(
            &cfg,
            vec![
                SymbolResult::ok("AUSDT", Some("o1".into())),
                SymbolResult::failed("BUSDT", "boom"),
            ],
        );
        assert_eq!(exec.symbols_count, 2);
        assert_eq!(exec.successful, 1);
        assert_eq!(exec.failed, 1);
    }
}
