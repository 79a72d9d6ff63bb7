//! Persisted audit and trade records.
//!
//! These rows are written by the gateway, orchestrator and exchange client
//! and read back by the idempotency ledger. Indexed fields of a signal log
//! entry are denormalized out of the raw payload at write time so lookups do
//! not re-parse JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::alert::{Alert, AlertType};
use crate::decimal::{Price, Size};
use crate::order::{OrderType, Side};

/// Outcome recorded for an inbound signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Success,
    Failed,
    Invalid,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Audit row for one processed webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalLogEntry {
    pub id: Uuid,
    pub strategy_id: Option<String>,
    pub raw_payload: Value,
    pub signature: Option<String>,
    pub status: SignalStatus,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub alert_type: Option<AlertType>,
    #[serde(default)]
    pub trade_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

impl SignalLogEntry {
    /// Build a log entry, copying the lookup keys out of `alert` when the
    /// payload got far enough to be parsed.
    pub fn new(
        strategy_id: Option<String>,
        raw_payload: Value,
        signature: Option<String>,
        status: SignalStatus,
        alert: Option<&Alert>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy_id,
            raw_payload,
            signature,
            status,
            processed_at: Utc::now(),
            alert_type: alert.map(|a| a.alert_type),
            trade_id: alert.and_then(|a| a.trade_id.clone()),
            symbol: alert.map(|a| a.symbol.clone()),
        }
    }
}

/// Lifecycle of a placed order as far as this system knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Filled,
    Cancelled,
    Failed,
}

impl TradeStatus {
    /// Pending or filled orders count as a live entry for the ledger.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Filled)
    }
}

/// What a placed order was for inside its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRole {
    Entry,
    StopLoss,
    /// 50% take-profit at the partial level.
    TakeProfitPartial,
    /// Remaining 50% take-profit at the final level.
    TakeProfitFinal,
    /// Single 100% take-profit.
    TakeProfit,
    Breakeven,
    Close,
}

impl OrderRole {
    /// clientOid prefix for this role.
    pub fn oid_prefix(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::StopLoss => "sl",
            Self::TakeProfitPartial => "tp1",
            Self::TakeProfitFinal => "tp2",
            Self::TakeProfit => "tp",
            Self::Breakeven => "be",
            Self::Close => "close",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::StopLoss => "stop_loss",
            Self::TakeProfitPartial => "take_profit_partial",
            Self::TakeProfitFinal => "take_profit_final",
            Self::TakeProfit => "take_profit",
            Self::Breakeven => "breakeven",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per order accepted by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: Uuid,
    pub user_id: String,
    pub strategy_id: Option<String>,
    pub exchange_order_id: String,
    pub client_oid: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub role: OrderRole,
    pub size: Size,
    pub price: Option<Price>,
    pub status: TradeStatus,
    pub trade_id: Option<String>,
    pub entry_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub breakeven: Option<Price>,
    /// Alert kind that caused the order (ENTRY for every leg of an open).
    pub alert_type: AlertType,
    pub created_at: DateTime<Utc>,
}

/// Kind of exchange call recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    PlaceOrder,
    PlaceTpslOrder,
    PendingPlanOrders,
    CancelPlanOrder,
    OrdersHistory,
    AllPositions,
    HistoryPositions,
    SetLeverage,
    GetAccounts,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlaceOrder => "place_order",
            Self::PlaceTpslOrder => "place_tpsl_order",
            Self::PendingPlanOrders => "pending_plan_orders",
            Self::CancelPlanOrder => "cancel_plan_order",
            Self::OrdersHistory => "orders_history",
            Self::AllPositions => "all_positions",
            Self::HistoryPositions => "history_positions",
            Self::SetLeverage => "set_leverage",
            Self::GetAccounts => "get_accounts",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row for one private exchange call, written regardless of outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLog {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub strategy_id: Option<String>,
    pub symbol: Option<String>,
    pub operation_type: OperationType,
    pub http_method: String,
    pub endpoint: String,
    pub full_url: String,
    pub request_payload: Option<Value>,
    /// Header map with secret-bearing values redacted.
    pub request_headers: Value,
    pub response_data: Option<Value>,
    pub response_status: Option<u16>,
    pub success: bool,
    pub error_message: Option<String>,
    pub order_id: Option<String>,
    pub client_oid: Option<String>,
    /// HTTP 200 with an exchange success code needs no operator review.
    pub reviewed: bool,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}
