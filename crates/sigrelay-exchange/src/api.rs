//! Exchange API abstraction.
//!
//! Orchestration code only sees [`ExchangeApi`]; the REST client and the test
//! mock both implement it. A client instance is bound to one credential and
//! one market scope, so methods take only per-call parameters.

use std::pin::Pin;
use std::sync::Arc;

use sigrelay_core::{ClientOid, ContractSpec, Credential, HoldSide, OrderType, Price, Side, Size};

use crate::error::ExchangeResult;
use crate::types::{
    AccountBalance, HistoricalOrder, HistoricalPosition, OrderAck, PendingPlanOrder, PlanType,
    Position,
};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Market segment and collateral a client trades in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketScope {
    pub product_type: String,
    pub margin_coin: String,
}

impl MarketScope {
    pub fn new(product_type: impl Into<String>, margin_coin: impl Into<String>) -> Self {
        Self {
            product_type: product_type.into(),
            margin_coin: margin_coin.into(),
        }
    }
}

/// Entry or close order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    /// `Market` or `Limit`.
    pub order_type: OrderType,
    pub size: Size,
    /// Required for limit orders.
    pub price: Option<Price>,
    pub client_oid: ClientOid,
    pub reduce_only: bool,
}

/// Stop-loss or take-profit trigger order.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRequest {
    pub symbol: String,
    pub plan_type: PlanType,
    pub trigger_price: Price,
    pub hold_side: HoldSide,
    pub size: Size,
    pub client_oid: ClientOid,
}

/// Calls the orchestrator and batch executor make against the exchange.
pub trait ExchangeApi: Send + Sync {
    /// Current price, served from the short-lived cache when fresh.
    fn ticker_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<Price>>;

    /// Contract rules, fetched fresh on every call.
    fn contract_spec<'a>(&'a self, symbol: &'a str)
        -> BoxFuture<'a, ExchangeResult<ContractSpec>>;

    fn place_order(&self, order: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderAck>>;

    fn place_trigger_order(
        &self,
        order: TriggerRequest,
    ) -> BoxFuture<'_, ExchangeResult<OrderAck>>;

    /// Outstanding stop-loss/take-profit triggers for a symbol.
    fn pending_trigger_orders<'a>(
        &'a self,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<PendingPlanOrder>>>;

    fn cancel_trigger_order<'a>(
        &'a self,
        order: &'a PendingPlanOrder,
    ) -> BoxFuture<'a, ExchangeResult<()>>;

    /// Every open position in the scope.
    fn positions(&self) -> BoxFuture<'_, ExchangeResult<Vec<Position>>>;

    fn set_leverage<'a>(&'a self, symbol: &'a str, leverage: u32)
        -> BoxFuture<'a, ExchangeResult<()>>;

    /// Balance of the scope's margin coin.
    fn account_balance(&self) -> BoxFuture<'_, ExchangeResult<AccountBalance>>;

    fn orders_history<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<HistoricalOrder>>>;

    fn history_positions<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<HistoricalPosition>>>;
}

/// Arc wrapper for ExchangeApi trait objects.
pub type DynExchange = Arc<dyn ExchangeApi>;

/// Creates clients bound to a credential.
pub trait ExchangeConnector: Send + Sync {
    /// `strategy_id` is copied into every audit row the client writes.
    fn connect(
        &self,
        credential: &Credential,
        scope: &MarketScope,
        strategy_id: Option<&str>,
    ) -> ExchangeResult<DynExchange>;
}

pub type DynConnector = Arc<dyn ExchangeConnector>;
