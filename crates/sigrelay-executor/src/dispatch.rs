//! Fan-out of one classified signal to every enabled subscriber.
//!
//! Each subscriber trades through its own credential. A failure for one
//! subscriber is captured in its result and never stops the others.

use rust_decimal::Decimal;
use serde::Serialize;
use sigrelay_core::{
    Alert, BreakevenParams, ContractSpec, EntryParams, Price, Strategy, Subscription,
};
use sigrelay_exchange::{translate_error, DynConnector, MarketScope};
use sigrelay_persistence::{CredentialStore, StrategyStore, TradeRecordStore};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::orchestrator::{
    BreakevenOutcome, OpenPlan, OrderOrchestrator, ProtectionReport, RecordContext,
};
use crate::sizing::compute_size;

/// What to do for each subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalAction {
    Open(EntryParams),
    MoveStop(BreakevenParams),
    /// Close protocol for an exit signal.
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberResult {
    pub user_id: String,
    pub subscription_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protection: Option<ProtectionReport>,
}

impl SubscriberResult {
    fn new(subscription: &Subscription, success: bool) -> Self {
        Self {
            user_id: subscription.user_id.clone(),
            subscription_id: subscription.id.clone(),
            success,
            order_id: None,
            message: None,
            error: None,
            protection: None,
        }
    }

    fn failed(subscription: &Subscription, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(subscription, false)
        }
    }
}

/// Aggregate over every subscriber of the strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SubscriberResult>,
}

impl DispatchSummary {
    fn push(&mut self, result: SubscriberResult) {
        self.processed += 1;
        if result.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }
}

pub struct SignalDispatcher {
    connector: DynConnector,
    strategies: Arc<dyn StrategyStore>,
    credentials: Arc<dyn CredentialStore>,
    trade_records: Arc<dyn TradeRecordStore>,
}

impl SignalDispatcher {
    pub fn new(
        connector: DynConnector,
        strategies: Arc<dyn StrategyStore>,
        credentials: Arc<dyn CredentialStore>,
        trade_records: Arc<dyn TradeRecordStore>,
    ) -> Self {
        Self {
            connector,
            strategies,
            credentials,
            trade_records,
        }
    }

    /// Run `action` for every enabled subscriber of `strategy`, one at a time.
    pub async fn dispatch(
        &self,
        strategy: &Strategy,
        alert: &Alert,
        action: &SignalAction,
    ) -> ExecutorResult<DispatchSummary> {
        let subscriptions = self.strategies.enabled_subscriptions(&strategy.id)?;
        let mut summary = DispatchSummary::default();

        for subscription in &subscriptions {
            let result = match self.run_one(strategy, subscription, alert, action).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        strategy = %strategy.name,
                        user_id = %subscription.user_id,
                        symbol = %alert.symbol,
                        error = %e,
                        "Signal execution failed for subscriber"
                    );
                    SubscriberResult::failed(subscription, e.user_message())
                }
            };
            summary.push(result);
        }

        info!(
            strategy = %strategy.name,
            symbol = %alert.symbol,
            alert_type = %alert.alert_type,
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            "Signal dispatched"
        );
        Ok(summary)
    }

    async fn run_one(
        &self,
        strategy: &Strategy,
        subscription: &Subscription,
        alert: &Alert,
        action: &SignalAction,
    ) -> ExecutorResult<SubscriberResult> {
        let credential = self
            .credentials
            .credential(&subscription.credential_id)?
            .ok_or_else(|| ExecutorError::CredentialNotFound(subscription.credential_id.clone()))?;
        let scope = MarketScope::new(&subscription.product_type, &subscription.margin_coin);
        let exchange = self
            .connector
            .connect(&credential, &scope, Some(&strategy.id))?;

        let context = RecordContext {
            user_id: subscription.user_id.clone(),
            strategy_id: Some(strategy.id.clone()),
            trade_id: alert.trade_id.clone(),
            alert_type: alert.alert_type,
            entry_price: alert.entry_price,
            stop_loss: alert.stop_loss,
            take_profit: alert.take_profit,
            breakeven: alert.breakeven,
        };
        let orchestrator = OrderOrchestrator::new(exchange, self.trade_records.clone(), context);

        match action {
            SignalAction::Open(params) => {
                self.open(&orchestrator, subscription, alert, params).await
            }
            SignalAction::MoveStop(params) => {
                let spec = orchestrator.contract_spec(&alert.symbol).await;
                let outcome = orchestrator
                    .move_stop(&alert.symbol, alert.side, params.stop_price, &spec)
                    .await;
                Ok(match outcome {
                    BreakevenOutcome::Placed { order_id, .. } => SubscriberResult {
                        order_id: Some(order_id),
                        ..SubscriberResult::new(subscription, true)
                    },
                    BreakevenOutcome::NoPosition => {
                        SubscriberResult::failed(subscription, translate_error("no position"))
                    }
                    BreakevenOutcome::Failed { error } => {
                        SubscriberResult::failed(subscription, error)
                    }
                })
            }
            SignalAction::Close => {
                // Only the leg the alert's side opened; both legs when unsided.
                let hold_side = alert.side.map(|s| s.hold_side());
                let outcome = orchestrator
                    .close_position(&alert.symbol, hold_side)
                    .await?;
                if outcome.no_position() {
                    return Ok(SubscriberResult {
                        message: Some(translate_error("no position")),
                        ..SubscriberResult::new(subscription, true)
                    });
                }
                let error = outcome
                    .legs
                    .iter()
                    .find_map(|l| l.error.clone());
                Ok(SubscriberResult {
                    order_id: outcome.first_order_id(),
                    error,
                    ..SubscriberResult::new(subscription, outcome.all_closed())
                })
            }
        }
    }

    async fn open(
        &self,
        orchestrator: &OrderOrchestrator,
        subscription: &Subscription,
        alert: &Alert,
        params: &EntryParams,
    ) -> ExecutorResult<SubscriberResult> {
        let symbol = &alert.symbol;
        let exchange = orchestrator.exchange();
        let spec = orchestrator.contract_spec(symbol).await;

        if let Err(e) = exchange.set_leverage(symbol, subscription.leverage).await {
            warn!(symbol = %symbol, leverage = subscription.leverage, error = %e, "Set leverage failed, continuing");
        }

        let price = match exchange.ticker_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Ticker unavailable, sizing from signal entry price");
                params.entry_price
            }
        };

        let notional = subscription.position_size_usdt * Decimal::from(subscription.leverage);
        let size = compute_size(symbol, notional, price, &spec)?;

        let plan = OpenPlan {
            symbol: symbol.clone(),
            side: params.side,
            size,
            limit_price: None,
            stop_loss: spec.round_price(params.stop_loss),
            take_profit: Some(spec.round_price(params.take_profit)),
            partial_take_profit: subscription
                .partial_take_profit
                .then(|| partial_price(params, alert.breakeven, &spec)),
            entry_prefix: "entry",
        };

        let outcome = orchestrator.open_position(&plan, &spec).await?;
        Ok(SubscriberResult {
            order_id: Some(outcome.entry_order_id),
            error: outcome.protection.failure_summary(),
            protection: Some(outcome.protection),
            ..SubscriberResult::new(subscription, true)
        })
    }
}

/// Partial take-profit level: the signal's breakeven price, else halfway to
/// the final target.
fn partial_price(params: &EntryParams, breakeven: Option<Price>, spec: &ContractSpec) -> Price {
    let raw = breakeven.unwrap_or_else(|| {
        Price::new((params.entry_price.inner() + params.take_profit.inner()) / Decimal::TWO)
    });
    spec.round_price(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use sigrelay_core::{Credential, HoldSide, Side, Size};
    use sigrelay_exchange::{position, MockConnector, MockExchange, PlanType};
    use sigrelay_persistence::JournaledStore;

    fn subscription(id: &str, user: &str, credential: &str, partial: bool) -> Subscription {
        Subscription {
            id: id.into(),
            user_id: user.into(),
            strategy_id: "s1".into(),
            credential_id: credential.into(),
            enabled: true,
            position_size_usdt: dec!(100),
            leverage: 10,
            partial_take_profit: partial,
            product_type: "USDT-FUTURES".into(),
            margin_coin: "USDT".into(),
        }
    }

    fn strategy() -> Strategy {
        Strategy {
            id: "s1".into(),
            name: "Alpha".into(),
            active: true,
        }
    }

    fn setup(
        subs: Vec<Subscription>,
    ) -> (Arc<MockExchange>, Arc<MockConnector>, Arc<JournaledStore>, SignalDispatcher) {
        let mock = Arc::new(MockExchange::new());
        mock.set_price("BTCUSDT", dec!(50000));
        mock.set_contract(
            "BTCUSDT",
            ContractSpec {
                min_trade_size: Size::new(dec!(0.001)),
                size_increment: Size::new(dec!(0.001)),
                volume_decimals: 3,
                price_decimals: 1,
            },
        );
        let connector = Arc::new(MockConnector::new(mock.clone()));
        let store = Arc::new(JournaledStore::in_memory());
        store.seed_strategies(vec![strategy()]);
        store.seed_subscriptions(subs);
        store.seed_credentials(vec![
            Credential::new("c1", "u1", "k", "s", "p"),
            Credential::new("c2", "u2", "k", "s", "p"),
        ]);
        let dispatcher =
            SignalDispatcher::new(connector.clone(), store.clone(), store.clone(), store.clone());
        (mock, connector, store, dispatcher)
    }

    fn entry_alert() -> Alert {
        Alert::from_payload(&json!({
            "strategy": "Alpha", "symbol": "BTCUSDT", "side": "buy", "alertType": "ENTRY",
            "entryPrice": 50000, "stopLoss": 49000, "takeProfit": 52000, "tradeId": "t1"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_entry_fans_out_per_subscriber() {
        let (mock, connector, store, dispatcher) = setup(vec![
            subscription("sub1", "u1", "c1", false),
            subscription("sub2", "u2", "c2", false),
        ]);
        let alert = entry_alert();
        let action = SignalAction::Open(alert.entry_params().unwrap());

        let summary = dispatcher.dispatch(&strategy(), &alert, &action).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.successful, 2);
        assert_eq!(connector.connections().len(), 2);
        assert_eq!(mock.leverage_calls(), vec![("BTCUSDT".to_string(), 10), ("BTCUSDT".to_string(), 10)]);

        // 100 USDT x 10 / 50000 = 0.02
        assert!(mock.orders().iter().all(|o| o.size == Size::new(dec!(0.02))));
        // entry + sl + tp per subscriber
        assert_eq!(store.trade_record_count(), 6);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_only_that_subscriber() {
        let (_mock, _connector, _store, dispatcher) = setup(vec![
            subscription("sub1", "u1", "c1", false),
            subscription("sub3", "u3", "missing", false),
        ]);
        let alert = entry_alert();
        let action = SignalAction::Open(alert.entry_params().unwrap());

        let summary = dispatcher.dispatch(&strategy(), &alert, &action).await.unwrap();
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.results[1].error.is_some());
    }

    #[tokio::test]
    async fn test_partial_subscriber_gets_two_take_profits() {
        let (mock, _connector, _store, dispatcher) =
            setup(vec![subscription("sub1", "u1", "c1", true)]);
        let alert = entry_alert();
        let action = SignalAction::Open(alert.entry_params().unwrap());

        dispatcher.dispatch(&strategy(), &alert, &action).await.unwrap();
        let tps: Vec<_> = mock
            .triggers()
            .into_iter()
            .filter(|t| t.plan_type == PlanType::ProfitPlan)
            .collect();
        assert_eq!(tps.len(), 2);
        // halfway between 50000 and 52000
        assert!(tps.iter().any(|t| t.trigger_price == Price::new(dec!(51000))));
    }

    #[tokio::test]
    async fn test_close_without_position_is_successful_noop() {
        let (mock, _connector, _store, dispatcher) =
            setup(vec![subscription("sub1", "u1", "c1", false)]);
        let alert = Alert::from_payload(&json!({
            "strategy": "Alpha", "symbol": "BTCUSDT", "alertType": "STOP_LOSS", "tradeId": "t1"
        }))
        .unwrap();

        let summary = dispatcher
            .dispatch(&strategy(), &alert, &SignalAction::Close)
            .await
            .unwrap();
        assert_eq!(summary.successful, 1);
        assert!(summary.results[0].message.is_some());
        assert!(mock.orders().is_empty());
    }

    #[tokio::test]
    async fn test_sided_close_leaves_opposite_leg() {
        let (mock, _connector, _store, dispatcher) =
            setup(vec![subscription("sub1", "u1", "c1", false)]);
        mock.set_position(position("BTCUSDT", HoldSide::Long, dec!(0.02)));
        mock.set_position(position("BTCUSDT", HoldSide::Short, dec!(0.3)));
        let alert = Alert::from_payload(&json!({
            "strategy": "Alpha", "symbol": "BTCUSDT", "side": "buy", "alertType": "STOP_LOSS",
            "tradeId": "t1"
        }))
        .unwrap();

        let summary = dispatcher
            .dispatch(&strategy(), &alert, &SignalAction::Close)
            .await
            .unwrap();
        assert_eq!(summary.successful, 1);

        let closes = mock.orders();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].side, Side::Sell);
        assert_eq!(closes[0].size, Size::new(dec!(0.02)));
        assert!(closes[0].reduce_only);

        let open = mock.open_positions();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].hold_side, HoldSide::Short);
    }

    #[tokio::test]
    async fn test_move_stop_on_open_position() {
        let (mock, _connector, _store, dispatcher) =
            setup(vec![subscription("sub1", "u1", "c1", false)]);
        mock.set_position(position("BTCUSDT", HoldSide::Long, dec!(0.02)));
        let alert = Alert::from_payload(&json!({
            "strategy": "Alpha", "symbol": "BTCUSDT", "side": "buy", "alertType": "BREAKEVEN",
            "tradeId": "t1", "entryPrice": 50000
        }))
        .unwrap();
        let action = SignalAction::MoveStop(alert.breakeven_params().unwrap());

        let summary = dispatcher.dispatch(&strategy(), &alert, &action).await.unwrap();
        assert_eq!(summary.successful, 1);
        let trigger = &mock.triggers()[0];
        assert_eq!(trigger.plan_type, PlanType::LossPlan);
        assert_eq!(trigger.trigger_price, Price::new(dec!(50000)));
    }
}
