//! In-memory exchange for tests.
//!
//! Records every call, tracks positions and pending triggers the way the
//! exchange would, and fails on demand per operation and symbol.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use sigrelay_core::{ContractSpec, Credential, OrderType, Price, Size};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::api::{
    BoxFuture, DynExchange, ExchangeApi, ExchangeConnector, MarketScope, OrderRequest,
    TriggerRequest,
};
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{
    AccountBalance, HistoricalOrder, HistoricalPosition, OrderAck, PendingPlanOrder, PlanType,
    Position,
};

/// Operation a failure rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Ticker,
    Contract,
    PlaceOrder,
    PlaceStopLoss,
    PlaceTakeProfit,
    PendingTriggers,
    CancelTrigger,
    Positions,
    SetLeverage,
    Balance,
    OrdersHistory,
    HistoryPositions,
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: MockOp,
    symbol: Option<String>,
    error: ExchangeError,
}

/// Recording mock implementing [`ExchangeApi`].
#[derive(Debug)]
pub struct MockExchange {
    prices: Mutex<HashMap<String, Price>>,
    contracts: Mutex<HashMap<String, ContractSpec>>,
    positions: Mutex<Vec<Position>>,
    pending: Mutex<Vec<PendingPlanOrder>>,
    balance: Mutex<Option<AccountBalance>>,
    failures: Mutex<Vec<FailureRule>>,
    orders: Mutex<Vec<OrderRequest>>,
    triggers: Mutex<Vec<TriggerRequest>>,
    cancelled: Mutex<Vec<String>>,
    leverage_calls: Mutex<Vec<(String, u32)>>,
    calls: Mutex<Vec<String>>,
    next_order_id: Mutex<u64>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            contracts: Mutex::new(HashMap::new()),
            positions: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            balance: Mutex::new(None),
            failures: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            triggers: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            leverage_calls: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_order_id: Mutex::new(1),
        }
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().insert(symbol.to_string(), Price::new(price));
    }

    pub fn set_contract(&self, symbol: &str, spec: ContractSpec) {
        self.contracts.lock().insert(symbol.to_string(), spec);
    }

    pub fn set_position(&self, position: Position) {
        let mut positions = self.positions.lock();
        positions.retain(|p| !(p.symbol == position.symbol && p.hold_side == position.hold_side));
        positions.push(position);
    }

    pub fn add_pending_trigger(&self, order: PendingPlanOrder) {
        self.pending.lock().push(order);
    }

    pub fn set_balance(&self, available: Decimal) {
        *self.balance.lock() = Some(AccountBalance {
            margin_coin: "USDT".to_string(),
            available,
            equity: Some(available),
        });
    }

    /// Fail `op`, optionally only for `symbol`.
    pub fn fail(&self, op: MockOp, symbol: Option<&str>, error: ExchangeError) {
        self.failures.lock().push(FailureRule {
            op,
            symbol: symbol.map(str::to_string),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }

    pub fn triggers(&self) -> Vec<TriggerRequest> {
        self.triggers.lock().clone()
    }

    /// Order ids of cancelled triggers.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.leverage_calls.lock().clone()
    }

    /// Call log as `op:symbol` entries in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.lock().clone()
    }

    pub fn pending_triggers(&self) -> Vec<PendingPlanOrder> {
        self.pending.lock().clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn enter(&self, op: MockOp, symbol: Option<&str>) -> ExchangeResult<()> {
        self.calls
            .lock()
            .push(format!("{op:?}:{}", symbol.unwrap_or("*")));
        let failures = self.failures.lock();
        let hit = failures.iter().find(|rule| {
            rule.op == op
                && match (&rule.symbol, symbol) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want.eq_ignore_ascii_case(got),
                    (Some(_), None) => false,
                }
        });
        match hit {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> String {
        let mut next = self.next_order_id.lock();
        let id = *next;
        *next += 1;
        format!("mock-{id}")
    }

    fn apply_fill(&self, order: &OrderRequest) {
        if order.order_type != OrderType::Market {
            return;
        }
        let mut positions = self.positions.lock();
        if order.reduce_only {
            let hold_side = order.side.opposite().hold_side();
            positions.retain(|p| !(p.symbol == order.symbol && p.hold_side == hold_side));
            return;
        }

        let hold_side = order.side.hold_side();
        if let Some(pos) = positions
            .iter_mut()
            .find(|p| p.symbol == order.symbol && p.hold_side == hold_side)
        {
            pos.size = pos.size + order.size;
            pos.available = pos.size;
        } else {
            positions.push(Position {
                symbol: order.symbol.clone(),
                hold_side,
                size: order.size,
                available: order.size,
                entry_price: order
                    .price
                    .or_else(|| self.prices.lock().get(&order.symbol).copied()),
                leverage: None,
                unrealized_pnl: None,
            });
        }
    }
}

impl ExchangeApi for MockExchange {
    fn ticker_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<Price>> {
        Box::pin(async move {
            self.enter(MockOp::Ticker, Some(symbol))?;
            self.prices
                .lock()
                .get(symbol)
                .copied()
                .ok_or_else(|| ExchangeError::NotFound(format!("ticker for {symbol}")))
        })
    }

    fn contract_spec<'a>(
        &'a self,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<ContractSpec>> {
        Box::pin(async move {
            self.enter(MockOp::Contract, Some(symbol))?;
            self.contracts
                .lock()
                .get(symbol)
                .copied()
                .ok_or_else(|| ExchangeError::NotFound(format!("contract {symbol}")))
        })
    }

    fn place_order(&self, order: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderAck>> {
        Box::pin(async move {
            self.enter(MockOp::PlaceOrder, Some(&order.symbol))?;
            let ack = OrderAck {
                order_id: self.next_id(),
                client_oid: Some(order.client_oid.to_string()),
            };
            self.apply_fill(&order);
            self.orders.lock().push(order);
            Ok(ack)
        })
    }

    fn place_trigger_order(
        &self,
        order: TriggerRequest,
    ) -> BoxFuture<'_, ExchangeResult<OrderAck>> {
        Box::pin(async move {
            let op = match order.plan_type {
                PlanType::LossPlan => MockOp::PlaceStopLoss,
                PlanType::ProfitPlan => MockOp::PlaceTakeProfit,
            };
            self.enter(op, Some(&order.symbol))?;
            let order_id = self.next_id();
            self.pending.lock().push(PendingPlanOrder {
                order_id: order_id.clone(),
                client_oid: Some(order.client_oid.to_string()),
                symbol: order.symbol.clone(),
                plan_type: match order.plan_type {
                    PlanType::LossPlan => "loss_plan".to_string(),
                    PlanType::ProfitPlan => "profit_plan".to_string(),
                },
                trigger_price: Some(order.trigger_price.to_string()),
                size: Some(order.size.to_string()),
            });
            let ack = OrderAck {
                order_id,
                client_oid: Some(order.client_oid.to_string()),
            };
            self.triggers.lock().push(order);
            Ok(ack)
        })
    }

    fn pending_trigger_orders<'a>(
        &'a self,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<PendingPlanOrder>>> {
        Box::pin(async move {
            self.enter(MockOp::PendingTriggers, Some(symbol))?;
            Ok(self
                .pending
                .lock()
                .iter()
                .filter(|o| o.symbol == symbol)
                .cloned()
                .collect())
        })
    }

    fn cancel_trigger_order<'a>(
        &'a self,
        order: &'a PendingPlanOrder,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move {
            self.enter(MockOp::CancelTrigger, Some(&order.symbol))?;
            self.pending.lock().retain(|o| o.order_id != order.order_id);
            self.cancelled.lock().push(order.order_id.clone());
            Ok(())
        })
    }

    fn positions(&self) -> BoxFuture<'_, ExchangeResult<Vec<Position>>> {
        Box::pin(async move {
            self.enter(MockOp::Positions, None)?;
            Ok(self.positions.lock().clone())
        })
    }

    fn set_leverage<'a>(
        &'a self,
        symbol: &'a str,
        leverage: u32,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move {
            self.enter(MockOp::SetLeverage, Some(symbol))?;
            self.leverage_calls.lock().push((symbol.to_string(), leverage));
            Ok(())
        })
    }

    fn account_balance(&self) -> BoxFuture<'_, ExchangeResult<AccountBalance>> {
        Box::pin(async move {
            self.enter(MockOp::Balance, None)?;
            self.balance
                .lock()
                .clone()
                .ok_or_else(|| ExchangeError::NotFound("USDT margin account".to_string()))
        })
    }

    fn orders_history<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<HistoricalOrder>>> {
        Box::pin(async move {
            self.enter(MockOp::OrdersHistory, symbol)?;
            Ok(self
                .orders
                .lock()
                .iter()
                .filter(|o| symbol.map_or(true, |s| s == o.symbol))
                .enumerate()
                .map(|(i, o)| HistoricalOrder {
                    order_id: format!("mock-hist-{}", i + 1),
                    client_oid: Some(o.client_oid.to_string()),
                    symbol: o.symbol.clone(),
                    side: Some(o.side.to_string()),
                    size: Some(o.size.to_string()),
                    price_avg: o.price.map(|p| p.to_string()),
                    status: Some("filled".to_string()),
                    c_time: None,
                })
                .collect())
        })
    }

    fn history_positions<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<HistoricalPosition>>> {
        Box::pin(async move {
            self.enter(MockOp::HistoryPositions, symbol)?;
            Ok(Vec::new())
        })
    }
}

/// Connector handing out one shared [`MockExchange`].
pub struct MockConnector {
    exchange: Arc<MockExchange>,
    failing_credentials: Mutex<HashSet<String>>,
    connections: Mutex<Vec<(String, Option<String>)>>,
}

impl MockConnector {
    pub fn new(exchange: Arc<MockExchange>) -> Self {
        Self {
            exchange,
            failing_credentials: Mutex::new(HashSet::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn exchange(&self) -> &Arc<MockExchange> {
        &self.exchange
    }

    /// Make `connect` fail for a credential id.
    pub fn fail_credential(&self, credential_id: &str) {
        self.failing_credentials
            .lock()
            .insert(credential_id.to_string());
    }

    /// `(credential_id, strategy_id)` for every successful connect.
    pub fn connections(&self) -> Vec<(String, Option<String>)> {
        self.connections.lock().clone()
    }
}

impl ExchangeConnector for MockConnector {
    fn connect(
        &self,
        credential: &Credential,
        _scope: &MarketScope,
        strategy_id: Option<&str>,
    ) -> ExchangeResult<DynExchange> {
        if self.failing_credentials.lock().contains(&credential.id) {
            return Err(ExchangeError::Client(format!(
                "credential {} rejected",
                credential.id
            )));
        }
        self.connections
            .lock()
            .push((credential.id.clone(), strategy_id.map(str::to_string)));
        Ok(self.exchange.clone())
    }
}

/// Open position with no entry price, for test setup.
pub fn position(symbol: &str, hold_side: sigrelay_core::HoldSide, size: Decimal) -> Position {
    Position {
        symbol: symbol.to_string(),
        hold_side,
        size: Size::new(size),
        available: Size::new(size),
        entry_price: None,
        leverage: None,
        unrealized_pnl: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigrelay_core::{ClientOid, HoldSide, Side};

    fn market(symbol: &str, side: Side, size: Decimal, reduce_only: bool) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            size: Size::new(size),
            price: None,
            client_oid: ClientOid::generate("entry", symbol),
            reduce_only,
        }
    }

    #[tokio::test]
    async fn test_market_orders_track_positions() {
        let mock = MockExchange::new();
        mock.set_price("BTCUSDT", dec!(50000));

        mock.place_order(market("BTCUSDT", Side::Buy, dec!(0.002), false))
            .await
            .unwrap();
        let positions = mock.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].hold_side, HoldSide::Long);

        mock.place_order(market("BTCUSDT", Side::Sell, dec!(0.002), true))
            .await
            .unwrap();
        assert!(mock.positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_rule_scoped_to_symbol() {
        let mock = MockExchange::new();
        mock.fail(
            MockOp::PlaceOrder,
            Some("ETHUSDT"),
            ExchangeError::Api {
                code: "40762".into(),
                message: "balance".into(),
            },
        );

        assert!(mock
            .place_order(market("ETHUSDT", Side::Buy, dec!(1), false))
            .await
            .is_err());
        assert!(mock
            .place_order(market("BTCUSDT", Side::Buy, dec!(1), false))
            .await
            .is_ok());
        assert_eq!(mock.orders().len(), 1);
        assert_eq!(mock.calls(), vec!["PlaceOrder:ETHUSDT", "PlaceOrder:BTCUSDT"]);
    }

    #[tokio::test]
    async fn test_triggers_become_pending_until_cancelled() {
        let mock = MockExchange::new();
        mock.place_trigger_order(TriggerRequest {
            symbol: "BTCUSDT".into(),
            plan_type: PlanType::LossPlan,
            trigger_price: Price::new(dec!(49000)),
            hold_side: HoldSide::Long,
            size: Size::new(dec!(0.002)),
            client_oid: ClientOid::generate("sl", "BTCUSDT"),
        })
        .await
        .unwrap();

        let pending = mock.pending_trigger_orders("BTCUSDT").await.unwrap();
        assert_eq!(pending.len(), 1);
        mock.cancel_trigger_order(&pending[0]).await.unwrap();
        assert!(mock.pending_trigger_orders("BTCUSDT").await.unwrap().is_empty());
    }

    #[test]
    fn test_connector_rejects_flagged_credential() {
        let connector = MockConnector::new(Arc::new(MockExchange::new()));
        connector.fail_credential("bad");
        let scope = MarketScope::new("USDT-FUTURES", "USDT");
        let bad = Credential::new("bad", "u1", "k", "s", "p");
        assert!(connector.connect(&bad, &scope, None).is_err());
        let good = Credential::new("good", "u1", "k", "s", "p");
        assert!(connector.connect(&good, &scope, Some("s1")).is_ok());
        assert_eq!(
            connector.connections(),
            vec![("good".to_string(), Some("s1".to_string()))]
        );
    }
}
