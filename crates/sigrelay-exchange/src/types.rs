//! Wire types for the exchange's v2 mix REST API.
//!
//! The exchange sends every number as a string; raw types keep them as
//! strings and the `parse` helpers convert into domain types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigrelay_core::{ContractSpec, HoldSide, Price, Side, Size};
use std::str::FromStr;

use crate::error::{ExchangeError, ExchangeResult};

/// Business code of a successful response.
pub const SUCCESS_CODE: &str = "00000";

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub request_time: Option<i64>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

pub(crate) fn parse_decimal(field: &str, raw: &str) -> ExchangeResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| ExchangeError::Decode(format!("{field}: {raw:?} is not a decimal: {e}")))
}

fn parse_opt_decimal(raw: Option<&str>) -> Option<Decimal> {
    raw.filter(|s| !s.trim().is_empty())
        .and_then(|s| Decimal::from_str(s.trim()).ok())
}

// ============================================================================
// Market data
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    pub symbol: String,
    #[serde(default)]
    pub last_pr: Option<String>,
    #[serde(default)]
    pub mark_price: Option<String>,
}

impl RawTicker {
    /// Last traded price, falling back to the mark price.
    pub fn price(&self) -> ExchangeResult<Price> {
        let raw = self
            .last_pr
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.mark_price.as_deref())
            .ok_or_else(|| ExchangeError::Decode(format!("{}: ticker has no price", self.symbol)))?;
        let price = Price::new(parse_decimal("lastPr", raw)?);
        if !price.is_positive() {
            return Err(ExchangeError::Decode(format!(
                "{}: non-positive ticker price {raw}",
                self.symbol
            )));
        }
        Ok(price)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    pub symbol: String,
    pub min_trade_num: String,
    pub size_multiplier: String,
    pub volume_place: String,
    pub price_place: String,
}

impl RawContract {
    pub fn to_spec(&self) -> ExchangeResult<ContractSpec> {
        let places = |field: &str, raw: &str| -> ExchangeResult<u32> {
            raw.trim()
                .parse::<u32>()
                .map_err(|e| ExchangeError::Decode(format!("{field}: {raw:?}: {e}")))
        };
        Ok(ContractSpec {
            min_trade_size: Size::new(parse_decimal("minTradeNum", &self.min_trade_num)?),
            size_increment: Size::new(parse_decimal("sizeMultiplier", &self.size_multiplier)?),
            volume_decimals: places("volumePlace", &self.volume_place)?,
            price_decimals: places("pricePlace", &self.price_place)?,
        })
    }
}

// ============================================================================
// Orders
// ============================================================================

/// Entry or close order for `place-order`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub product_type: String,
    pub margin_mode: String,
    pub margin_coin: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub side: Side,
    /// `market` or `limit`.
    pub order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<String>,
    pub client_oid: String,
    /// `YES` on close orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<String>,
}

/// Trigger-order kind for `place-tpsl-order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    ProfitPlan,
    LossPlan,
}

/// Stop-loss or take-profit trigger for `place-tpsl-order`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TpslOrderRequest {
    pub margin_coin: String,
    pub product_type: String,
    pub symbol: String,
    pub plan_type: PlanType,
    pub trigger_price: String,
    /// Always `mark_price`.
    pub trigger_type: String,
    /// `0` executes at market on trigger.
    pub execute_price: String,
    pub hold_side: HoldSide,
    pub size: String,
    pub client_oid: String,
}

/// Acknowledgement for a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: String,
    #[serde(default)]
    pub client_oid: Option<String>,
}

/// Outstanding trigger order returned by `orders-plan-pending`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPlanOrder {
    pub order_id: String,
    #[serde(default)]
    pub client_oid: Option<String>,
    pub symbol: String,
    pub plan_type: String,
    #[serde(default)]
    pub trigger_price: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntrustedList<T> {
    pub entrusted_list: Option<Vec<T>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderIdRef {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_oid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CancelPlanRequest {
    pub symbol: String,
    pub product_type: String,
    pub margin_coin: String,
    pub plan_type: String,
    pub order_id_list: Vec<OrderIdRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CancelPlanResponse {
    #[serde(default)]
    pub success_list: Vec<serde_json::Value>,
    #[serde(default)]
    pub failure_list: Vec<CancelFailure>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CancelFailure {
    #[serde(default)]
    pub error_msg: Option<String>,
}

/// Past order from `orders-history`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalOrder {
    pub order_id: String,
    #[serde(default)]
    pub client_oid: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub price_avg: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub c_time: Option<String>,
}

// ============================================================================
// Positions and account
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub symbol: String,
    pub hold_side: HoldSide,
    pub total: String,
    #[serde(default)]
    pub available: Option<String>,
    #[serde(default)]
    pub open_price_avg: Option<String>,
    #[serde(default)]
    pub leverage: Option<String>,
    #[serde(default)]
    pub margin_mode: Option<String>,
    #[serde(default, rename = "unrealizedPL")]
    pub unrealized_pl: Option<String>,
}

/// An open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub hold_side: HoldSide,
    pub size: Size,
    pub available: Size,
    pub entry_price: Option<Price>,
    pub leverage: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
}

impl RawPosition {
    pub fn to_position(&self) -> ExchangeResult<Position> {
        let size = Size::new(parse_decimal("total", &self.total)?);
        Ok(Position {
            symbol: self.symbol.clone(),
            hold_side: self.hold_side,
            size,
            available: parse_opt_decimal(self.available.as_deref())
                .map(Size::new)
                .unwrap_or(size),
            entry_price: parse_opt_decimal(self.open_price_avg.as_deref()).map(Price::new),
            leverage: parse_opt_decimal(self.leverage.as_deref()),
            unrealized_pnl: parse_opt_decimal(self.unrealized_pl.as_deref()),
        })
    }
}

/// Closed position from `history-position`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPosition {
    #[serde(default)]
    pub position_id: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub hold_side: Option<String>,
    #[serde(default)]
    pub open_avg_price: Option<String>,
    #[serde(default)]
    pub close_avg_price: Option<String>,
    #[serde(default)]
    pub net_profit: Option<String>,
    #[serde(default)]
    pub c_time: Option<String>,
    #[serde(default)]
    pub u_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PositionHistoryList {
    #[serde(default)]
    pub list: Option<Vec<HistoricalPosition>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetLeverageRequest {
    pub symbol: String,
    pub product_type: String,
    pub margin_coin: String,
    pub leverage: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    pub margin_coin: String,
    pub available: String,
    #[serde(default)]
    pub account_equity: Option<String>,
    #[serde(default)]
    pub isolated_max_available: Option<String>,
    #[serde(default)]
    pub crossed_max_available: Option<String>,
}

/// Margin account balance for one coin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub margin_coin: String,
    pub available: Decimal,
    pub equity: Option<Decimal>,
}

impl RawAccount {
    pub fn to_balance(&self) -> ExchangeResult<AccountBalance> {
        Ok(AccountBalance {
            margin_coin: self.margin_coin.clone(),
            available: parse_decimal("available", &self.available)?,
            equity: parse_opt_decimal(self.account_equity.as_deref()),
        })
    }
}

/// Tally of a best-effort trigger cancellation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTally {
    pub cancelled: usize,
    pub failed: usize,
    /// Orders still outstanding after the sweep.
    pub remaining: usize,
}
