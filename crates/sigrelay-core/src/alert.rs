//! Inbound alert parsing and classification.
//!
//! Webhook payloads come from user-edited charting templates, so field names
//! and value shapes drift: numbers arrive as strings, sides as `LONG/SHORT`,
//! symbols with exchange prefixes. Everything is normalized here into a
//! strict [`Alert`]; core logic never sees the untyped payload.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::decimal::Price;
use crate::error::{CoreError, Result};
use crate::order::Side;

const STRATEGY_KEYS: &[&str] = &["strategy", "strategyName", "strategy_name"];
const SYMBOL_KEYS: &[&str] = &["symbol", "ticker"];
const SIDE_KEYS: &[&str] = &["side", "action", "direction"];
const ALERT_TYPE_KEYS: &[&str] = &["alertType", "alert_type", "type"];
const ENTRY_KEYS: &[&str] = &["entryPrice", "entry_price", "entry", "price"];
const STOP_LOSS_KEYS: &[&str] = &["stopLoss", "stop_loss", "sl"];
const TAKE_PROFIT_KEYS: &[&str] = &["takeProfit", "take_profit", "tp"];
const BREAKEVEN_KEYS: &[&str] = &["breakeven", "breakEven", "break_even", "be"];
const TRADE_ID_KEYS: &[&str] = &["tradeId", "trade_id"];
const TIMEFRAME_KEYS: &[&str] = &["timeframe", "interval"];

/// The four signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Entry,
    Breakeven,
    StopLoss,
    TakeProfit,
}

impl AlertType {
    /// Classify a raw type label.
    ///
    /// Case, surrounding whitespace and `-`/space separators are ignored, so
    /// `take-profit`, `Take_Profit` and `TP` all map to `TakeProfit`.
    pub fn from_label(label: &str) -> Option<Self> {
        let canon = label.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match canon.as_str() {
            "ENTRY" | "OPEN" => Some(Self::Entry),
            "BREAKEVEN" | "BREAK_EVEN" | "BE" => Some(Self::Breakeven),
            "STOP_LOSS" | "STOPLOSS" | "SL" => Some(Self::StopLoss),
            "TAKE_PROFIT" | "TAKEPROFIT" | "TP" => Some(Self::TakeProfit),
            _ => None,
        }
    }

    /// Closing alerts. Audited only after the close ran.
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::StopLoss | Self::TakeProfit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Breakeven => "BREAKEVEN",
            Self::StopLoss => "STOP_LOSS",
            Self::TakeProfit => "TAKE_PROFIT",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_label(s).ok_or_else(|| CoreError::UnknownAlertType(s.to_string()))
    }
}

/// A parsed, normalized webhook alert. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub strategy_name: String,
    pub symbol: String,
    pub side: Option<Side>,
    pub alert_type: AlertType,
    pub entry_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub breakeven: Option<Price>,
    pub trade_id: Option<String>,
    pub timeframe: Option<String>,
}

/// Fields an ENTRY alert must carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryParams {
    pub side: Side,
    pub entry_price: Price,
    pub stop_loss: Price,
    pub take_profit: Price,
}

/// Fields a BREAKEVEN alert must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakevenParams {
    pub trade_id: String,
    pub entry_price: Price,
    /// New stop price: the explicit breakeven level, else the entry price.
    pub stop_price: Price,
}

/// Pull the strategy name out of a raw payload, trimmed. `None` when absent
/// or blank.
pub fn extract_strategy_name(payload: &Value) -> Option<String> {
    let obj = payload.as_object()?;
    text_field(obj, STRATEGY_KEYS)
}

/// Normalize a charting-platform symbol to the exchange form.
///
/// `BINANCE:BTCUSDT.P` -> `BTCUSDT`, `ethusdt` -> `ETHUSDT`.
pub fn normalize_symbol(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_venue = trimmed.rsplit(':').next().unwrap_or(trimmed);
    let upper = without_venue.to_ascii_uppercase();
    upper
        .strip_suffix(".P")
        .unwrap_or(&upper)
        .trim()
        .to_string()
}

impl Alert {
    /// Parse and normalize a raw webhook payload.
    ///
    /// A missing `alertType` classifies as ENTRY (legacy templates never
    /// sent one). A present but unrecognized type is rejected rather than
    /// guessed at.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let obj = payload.as_object().ok_or(CoreError::InvalidField {
            field: "payload",
            reason: "expected a JSON object".to_string(),
        })?;

        let strategy_name =
            text_field(obj, STRATEGY_KEYS).ok_or(CoreError::MissingField("strategy"))?;
        let symbol = text_field(obj, SYMBOL_KEYS)
            .map(|s| normalize_symbol(&s))
            .filter(|s| !s.is_empty())
            .ok_or(CoreError::MissingField("symbol"))?;

        let alert_type = match text_field(obj, ALERT_TYPE_KEYS) {
            None => AlertType::Entry,
            Some(label) => label.parse()?,
        };

        let side = text_field(obj, SIDE_KEYS)
            .map(|s| s.parse::<Side>())
            .transpose()?;

        Ok(Self {
            strategy_name,
            symbol,
            side,
            alert_type,
            entry_price: price_field(obj, ENTRY_KEYS, "entryPrice")?,
            stop_loss: price_field(obj, STOP_LOSS_KEYS, "stopLoss")?,
            take_profit: price_field(obj, TAKE_PROFIT_KEYS, "takeProfit")?,
            breakeven: price_field(obj, BREAKEVEN_KEYS, "breakeven")?,
            trade_id: text_field(obj, TRADE_ID_KEYS),
            timeframe: text_field(obj, TIMEFRAME_KEYS),
        })
    }

    /// Validate the fields an ENTRY needs.
    pub fn entry_params(&self) -> Result<EntryParams> {
        Ok(EntryParams {
            side: self.side.ok_or(CoreError::MissingField("side"))?,
            entry_price: self.entry_price.ok_or(CoreError::MissingField("entryPrice"))?,
            stop_loss: self.stop_loss.ok_or(CoreError::MissingField("stopLoss"))?,
            take_profit: self
                .take_profit
                .ok_or(CoreError::MissingField("takeProfit"))?,
        })
    }

    /// Validate the fields a BREAKEVEN needs.
    pub fn breakeven_params(&self) -> Result<BreakevenParams> {
        let trade_id = self
            .trade_id
            .clone()
            .ok_or(CoreError::MissingField("tradeId"))?;
        let entry_price = self.entry_price.ok_or(CoreError::MissingField("entryPrice"))?;
        Ok(BreakevenParams {
            trade_id,
            entry_price,
            stop_price: self.breakeven.unwrap_or(entry_price),
        })
    }
}

/// First non-blank value among `keys`, rendered as text. Numbers are
/// accepted so numeric trade ids survive.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn price_field(
    obj: &Map<String, Value>,
    keys: &[&str],
    field: &'static str,
) -> Result<Option<Price>> {
    let Some(value) = keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(other),
    }) else {
        return Ok(None);
    };

    let parsed = match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    };

    match parsed {
        Some(d) if d.is_sign_positive() && !d.is_zero() => Ok(Some(Price::new(d))),
        _ => Err(CoreError::InvalidField {
            field,
            reason: format!("expected a positive number, got {value}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_full_entry_payload() {
        let payload = json!({
            "strategy": "Trend Rider",
            "symbol": "BINANCE:BTCUSDT.P",
            "side": "LONG",
            "alertType": "entry",
            "entryPrice": "50000",
            "stopLoss": 49000,
            "takeProfit": 52000.5,
            "trade_id": "t1",
            "timeframe": "15"
        });
        let alert = Alert::from_payload(&payload).unwrap();
        assert_eq!(alert.strategy_name, "Trend Rider");
        assert_eq!(alert.symbol, "BTCUSDT");
        assert_eq!(alert.side, Some(Side::Buy));
        assert_eq!(alert.alert_type, AlertType::Entry);
        assert_eq!(alert.entry_price, Some(Price::new(dec!(50000))));
        assert_eq!(alert.take_profit, Some(Price::new(dec!(52000.5))));
        assert_eq!(alert.trade_id.as_deref(), Some("t1"));

        let params = alert.entry_params().unwrap();
        assert_eq!(params.stop_loss, Price::new(dec!(49000)));
    }

    #[test]
    fn test_missing_alert_type_defaults_to_entry() {
        let payload = json!({"strategy": "s", "symbol": "ETHUSDT"});
        let alert = Alert::from_payload(&payload).unwrap();
        assert_eq!(alert.alert_type, AlertType::Entry);
    }

    #[test]
    fn test_non_canonical_exit_casing_is_classified() {
        for label in ["take_profit", "Take-Profit", " TP ", "takeprofit"] {
            assert_eq!(AlertType::from_label(label), Some(AlertType::TakeProfit));
        }
        for label in ["stop_loss", "Stop Loss", "sl"] {
            assert_eq!(AlertType::from_label(label), Some(AlertType::StopLoss));
        }
        assert!(AlertType::TakeProfit.is_exit());
        assert!(!AlertType::Breakeven.is_exit());
    }

    #[test]
    fn test_unknown_alert_type_rejected() {
        let payload = json!({"strategy": "s", "symbol": "BTCUSDT", "alertType": "REVERSE"});
        let err = Alert::from_payload(&payload).unwrap_err();
        assert!(matches!(err, CoreError::UnknownAlertType(t) if t == "REVERSE"));
    }

    #[test]
    fn test_aliases_and_numeric_trade_id() {
        let payload = json!({
            "strategy_name": "s",
            "ticker": "solusdt",
            "action": "sell",
            "type": "BREAKEVEN",
            "entry_price": 150.25,
            "break_even": "151",
            "trade_id": 77
        });
        let alert = Alert::from_payload(&payload).unwrap();
        assert_eq!(alert.symbol, "SOLUSDT");
        assert_eq!(alert.side, Some(Side::Sell));
        assert_eq!(alert.trade_id.as_deref(), Some("77"));

        let be = alert.breakeven_params().unwrap();
        assert_eq!(be.stop_price, Price::new(dec!(151)));
        assert_eq!(be.entry_price, Price::new(dec!(150.25)));
    }

    #[test]
    fn test_entry_params_require_all_fields() {
        let payload = json!({"strategy": "s", "symbol": "BTCUSDT", "side": "buy", "entryPrice": 1});
        let alert = Alert::from_payload(&payload).unwrap();
        assert!(matches!(
            alert.entry_params(),
            Err(CoreError::MissingField("stopLoss"))
        ));
    }

    #[test]
    fn test_breakeven_defaults_stop_to_entry() {
        let payload = json!({"strategy": "s", "symbol": "BTCUSDT", "alertType": "BE",
            "tradeId": "t9", "entryPrice": "100"});
        let be = Alert::from_payload(&payload).unwrap().breakeven_params().unwrap();
        assert_eq!(be.stop_price, Price::new(dec!(100)));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let payload = json!({"strategy": "s", "symbol": "BTCUSDT", "stopLoss": "abc"});
        assert!(matches!(
            Alert::from_payload(&payload),
            Err(CoreError::InvalidField { field: "stopLoss", .. })
        ));
    }

    #[test]
    fn test_extract_strategy_name() {
        assert_eq!(
            extract_strategy_name(&json!({"strategyName": "  Alpha "})),
            Some("Alpha".to_string())
        );
        assert_eq!(extract_strategy_name(&json!({"strategy": ""})), None);
        assert_eq!(extract_strategy_name(&json!([1, 2])), None);
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("BYBIT:ethusdt.p"), "ETHUSDT");
        assert_eq!(normalize_symbol(" XRPUSDT "), "XRPUSDT");
    }
}
