//! Order execution orchestrator.
//!
//! Drives one exchange client through the open, breakeven and close
//! protocols and writes a trade record for every order it places.
//!
//! # Open protocol
//!
//! 1. Entry order. Failure aborts the operation.
//! 2. Stop-loss and take-profit triggers, placed concurrently. Each trigger
//!    is its own failure domain and is reported in [`ProtectionReport`].
//!
//! # Close protocol
//!
//! 1. Cancel every pending trigger for the symbol (best effort, tallied).
//! 2. Reduce-only market order on the opposite side for each open leg.

use futures_util::future::join_all;
use serde::Serialize;
use sigrelay_core::{
    AlertType, ClientOid, ContractSpec, HoldSide, OrderRole, OrderType, Price, Side, Size,
    TradeRecord, TradeStatus,
};
use sigrelay_exchange::{
    translate, CancelTally, DynExchange, OrderRequest, PlanType, Position, TriggerRequest,
};
use sigrelay_persistence::TradeRecordStore;
use sigrelay_telemetry::Metrics;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ExecutorResult;
use crate::sizing::split_half;

// ============================================================================
// Inputs
// ============================================================================

/// Who an order belongs to and what signal produced it. Copied into every
/// trade record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordContext {
    pub user_id: String,
    pub strategy_id: Option<String>,
    pub trade_id: Option<String>,
    pub alert_type: AlertType,
    pub entry_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub breakeven: Option<Price>,
}

impl RecordContext {
    pub fn for_user(user_id: impl Into<String>, alert_type: AlertType) -> Self {
        Self {
            user_id: user_id.into(),
            strategy_id: None,
            trade_id: None,
            alert_type,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            breakeven: None,
        }
    }
}

/// Fully computed open-position request.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPlan {
    pub symbol: String,
    pub side: Side,
    pub size: Size,
    /// Limit price; market order when `None`.
    pub limit_price: Option<Price>,
    pub stop_loss: Price,
    pub take_profit: Option<Price>,
    /// When set, half the position takes profit here and the rest at
    /// `take_profit`.
    pub partial_take_profit: Option<Price>,
    /// clientOid prefix of the entry order.
    pub entry_prefix: &'static str,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of one protective trigger placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionResult {
    pub role: OrderRole,
    pub trigger_price: Price,
    pub size: Size,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProtectionReport {
    pub results: Vec<ProtectionResult>,
}

impl ProtectionReport {
    pub fn all_placed(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProtectionResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// One-line summary of failed triggers, `None` when all were placed.
    pub fn failure_summary(&self) -> Option<String> {
        let parts: Vec<String> = self
            .failures()
            .map(|r| format!("{}: {}", r.role, r.error.as_deref().unwrap_or("unknown")))
            .collect();
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOutcome {
    pub symbol: String,
    pub entry_order_id: String,
    pub size: Size,
    pub protection: ProtectionReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BreakevenOutcome {
    Placed {
        order_id: String,
        stop_price: Price,
        size: Size,
    },
    NoPosition,
    Failed {
        error: String,
    },
}

/// One closed (or not) position leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseLeg {
    pub hold_side: HoldSide,
    pub size: Size,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub symbol: String,
    pub cancelled: CancelTally,
    pub legs: Vec<CloseLeg>,
}

impl CloseOutcome {
    pub fn no_position(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn all_closed(&self) -> bool {
        !self.legs.is_empty() && self.legs.iter().all(|l| l.success)
    }

    /// Order id of the first successful close leg.
    pub fn first_order_id(&self) -> Option<String> {
        self.legs.iter().find_map(|l| l.order_id.clone())
    }
}

// ============================================================================
// OrderOrchestrator
// ============================================================================

pub struct OrderOrchestrator {
    exchange: DynExchange,
    trade_records: Arc<dyn TradeRecordStore>,
    context: RecordContext,
}

impl OrderOrchestrator {
    pub fn new(
        exchange: DynExchange,
        trade_records: Arc<dyn TradeRecordStore>,
        context: RecordContext,
    ) -> Self {
        Self {
            exchange,
            trade_records,
            context,
        }
    }

    pub fn exchange(&self) -> &DynExchange {
        &self.exchange
    }

    /// Contract rules for `symbol`, falling back to defaults when the lookup
    /// fails.
    pub async fn contract_spec(&self, symbol: &str) -> ContractSpec {
        match self.exchange.contract_spec(symbol).await {
            Ok(spec) => spec,
            Err(e) => {
                warn!(symbol, error = %e, "Contract lookup failed, using fallback spec");
                ContractSpec::fallback()
            }
        }
    }

    /// Entry order followed by concurrent protective triggers.
    pub async fn open_position(
        &self,
        plan: &OpenPlan,
        spec: &ContractSpec,
    ) -> ExecutorResult<OpenOutcome> {
        let order_type = if plan.limit_price.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        };
        let client_oid = ClientOid::generate(plan.entry_prefix, &plan.symbol);
        let entry = OrderRequest {
            symbol: plan.symbol.clone(),
            side: plan.side,
            order_type,
            size: plan.size,
            price: plan.limit_price,
            client_oid: client_oid.clone(),
            reduce_only: false,
        };

        let ack = match self.exchange.place_order(entry).await {
            Ok(ack) => {
                Metrics::order(OrderRole::Entry.as_str(), true);
                ack
            }
            Err(e) => {
                Metrics::order(OrderRole::Entry.as_str(), false);
                warn!(symbol = %plan.symbol, side = %plan.side, error = %e, "Entry order failed");
                return Err(e.into());
            }
        };
        self.record(
            &plan.symbol,
            plan.side,
            order_type,
            OrderRole::Entry,
            plan.size,
            plan.limit_price,
            &ack.order_id,
            &client_oid,
        );

        let hold_side = plan.side.hold_side();
        let mut triggers = vec![(
            OrderRole::StopLoss,
            PlanType::LossPlan,
            plan.stop_loss,
            plan.size,
        )];
        if let Some(take_profit) = plan.take_profit {
            match plan
                .partial_take_profit
                .and_then(|partial| split_half(plan.size, spec).map(|halves| (partial, halves)))
            {
                Some((partial, (first, second))) => {
                    triggers.push((
                        OrderRole::TakeProfitPartial,
                        PlanType::ProfitPlan,
                        partial,
                        first,
                    ));
                    triggers.push((
                        OrderRole::TakeProfitFinal,
                        PlanType::ProfitPlan,
                        take_profit,
                        second,
                    ));
                }
                None => {
                    if plan.partial_take_profit.is_some() {
                        debug!(symbol = %plan.symbol, size = %plan.size, "Position too small to split, single take-profit");
                    }
                    triggers.push((
                        OrderRole::TakeProfit,
                        PlanType::ProfitPlan,
                        take_profit,
                        plan.size,
                    ));
                }
            }
        }

        let placements = triggers
            .into_iter()
            .map(|(role, plan_type, price, size)| {
                self.place_trigger(&plan.symbol, hold_side, role, plan_type, price, size)
            });
        let protection = ProtectionReport {
            results: join_all(placements).await,
        };

        info!(
            symbol = %plan.symbol,
            side = %plan.side,
            size = %plan.size,
            order_id = %ack.order_id,
            triggers_ok = protection.results.iter().filter(|r| r.success).count(),
            triggers_failed = protection.failures().count(),
            "Position opened"
        );

        Ok(OpenOutcome {
            symbol: plan.symbol.clone(),
            entry_order_id: ack.order_id,
            size: plan.size,
            protection,
        })
    }

    /// New stop-loss at `stop_price` covering the current position.
    ///
    /// `side` selects the position leg; any leg of the symbol when `None`.
    /// The previous stop is left in place.
    pub async fn move_stop(
        &self,
        symbol: &str,
        side: Option<Side>,
        stop_price: Price,
        spec: &ContractSpec,
    ) -> BreakevenOutcome {
        let positions = match self.exchange.positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(symbol, error = %e, "Position lookup failed for breakeven");
                return BreakevenOutcome::Failed {
                    error: translate(&e),
                };
            }
        };
        let Some(position) = find_leg(&positions, symbol, side.map(|s| s.hold_side())) else {
            info!(symbol, "No open position to move stop on");
            return BreakevenOutcome::NoPosition;
        };

        let stop_price = spec.round_price(stop_price);
        let result = self
            .place_trigger(
                symbol,
                position.hold_side,
                OrderRole::Breakeven,
                PlanType::LossPlan,
                stop_price,
                position.size,
            )
            .await;

        match result.order_id {
            Some(order_id) if result.success => BreakevenOutcome::Placed {
                order_id,
                stop_price,
                size: position.size,
            },
            _ => BreakevenOutcome::Failed {
                error: result.error.unwrap_or_default(),
            },
        }
    }

    /// Cancel pending triggers, then market-close every open leg of `symbol`.
    ///
    /// No open position is a normal outcome with no legs.
    pub async fn close_position(
        &self,
        symbol: &str,
        hold_side: Option<HoldSide>,
    ) -> ExecutorResult<CloseOutcome> {
        let cancelled = self.cancel_pending_triggers(symbol).await;

        let positions = self.exchange.positions().await?;
        let legs: Vec<&Position> = positions
            .iter()
            .filter(|p| {
                p.symbol.eq_ignore_ascii_case(symbol)
                    && hold_side.map_or(true, |h| p.hold_side == h)
                    && p.size.is_positive()
            })
            .collect();

        if legs.is_empty() {
            info!(symbol, ?hold_side, "No open position to close");
        }

        let mut closed = Vec::with_capacity(legs.len());
        for position in legs {
            closed.push(self.close_leg(position).await);
        }

        Ok(CloseOutcome {
            symbol: symbol.to_string(),
            cancelled,
            legs: closed,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn cancel_pending_triggers(&self, symbol: &str) -> CancelTally {
        let pending = match self.exchange.pending_trigger_orders(symbol).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(symbol, error = %e, "Pending trigger lookup failed, skipping cancel sweep");
                return CancelTally::default();
            }
        };

        let mut tally = CancelTally::default();
        for order in &pending {
            match self.exchange.cancel_trigger_order(order).await {
                Ok(()) => tally.cancelled += 1,
                Err(e) => {
                    warn!(symbol, order_id = %order.order_id, error = %e, "Trigger cancel failed");
                    tally.failed += 1;
                }
            }
        }
        tally.remaining = pending.len() - tally.cancelled;
        debug!(symbol, ?tally, "Trigger cancel sweep done");
        tally
    }

    async fn close_leg(&self, position: &Position) -> CloseLeg {
        let side = position.hold_side.closing_side();
        let client_oid = ClientOid::generate(OrderRole::Close.oid_prefix(), &position.symbol);
        let order = OrderRequest {
            symbol: position.symbol.clone(),
            side,
            order_type: OrderType::Market,
            size: position.size,
            price: None,
            client_oid: client_oid.clone(),
            reduce_only: true,
        };

        match self.exchange.place_order(order).await {
            Ok(ack) => {
                Metrics::order(OrderRole::Close.as_str(), true);
                self.record(
                    &position.symbol,
                    side,
                    OrderType::Market,
                    OrderRole::Close,
                    position.size,
                    None,
                    &ack.order_id,
                    &client_oid,
                );
                info!(
                    symbol = %position.symbol,
                    hold_side = %position.hold_side,
                    size = %position.size,
                    order_id = %ack.order_id,
                    "Position closed"
                );
                CloseLeg {
                    hold_side: position.hold_side,
                    size: position.size,
                    success: true,
                    order_id: Some(ack.order_id),
                    error: None,
                }
            }
            Err(e) => {
                Metrics::order(OrderRole::Close.as_str(), false);
                warn!(symbol = %position.symbol, hold_side = %position.hold_side, error = %e, "Close order failed");
                CloseLeg {
                    hold_side: position.hold_side,
                    size: position.size,
                    success: false,
                    order_id: None,
                    error: Some(translate(&e)),
                }
            }
        }
    }

    async fn place_trigger(
        &self,
        symbol: &str,
        hold_side: HoldSide,
        role: OrderRole,
        plan_type: PlanType,
        trigger_price: Price,
        size: Size,
    ) -> ProtectionResult {
        let client_oid = ClientOid::generate(role.oid_prefix(), symbol);
        let request = TriggerRequest {
            symbol: symbol.to_string(),
            plan_type,
            trigger_price,
            hold_side,
            size,
            client_oid: client_oid.clone(),
        };

        match self.exchange.place_trigger_order(request).await {
            Ok(ack) => {
                Metrics::order(role.as_str(), true);
                self.record(
                    symbol,
                    hold_side.closing_side(),
                    OrderType::Trigger,
                    role,
                    size,
                    Some(trigger_price),
                    &ack.order_id,
                    &client_oid,
                );
                ProtectionResult {
                    role,
                    trigger_price,
                    size,
                    success: true,
                    order_id: Some(ack.order_id),
                    error: None,
                }
            }
            Err(e) => {
                Metrics::order(role.as_str(), false);
                warn!(symbol, %role, %trigger_price, error = %e, "Trigger order failed");
                ProtectionResult {
                    role,
                    trigger_price,
                    size,
                    success: false,
                    order_id: None,
                    error: Some(translate(&e)),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        role: OrderRole,
        size: Size,
        price: Option<Price>,
        order_id: &str,
        client_oid: &ClientOid,
    ) {
        let status = match order_type {
            OrderType::Market => TradeStatus::Filled,
            OrderType::Limit | OrderType::Trigger => TradeStatus::Pending,
        };
        let ctx = &self.context;
        let record = TradeRecord {
            id: Uuid::new_v4(),
            user_id: ctx.user_id.clone(),
            strategy_id: ctx.strategy_id.clone(),
            exchange_order_id: order_id.to_string(),
            client_oid: client_oid.to_string(),
            symbol: symbol.to_string(),
            side,
            order_type,
            role,
            size,
            price,
            status,
            trade_id: ctx.trade_id.clone(),
            entry_price: ctx.entry_price,
            stop_loss: ctx.stop_loss,
            take_profit: ctx.take_profit,
            breakeven: ctx.breakeven,
            alert_type: if role == OrderRole::Entry {
                AlertType::Entry
            } else {
                ctx.alert_type
            },
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self.trade_records.insert_trade_record(record) {
            warn!(symbol, %role, order_id, error = %e, "Failed to write trade record");
        }
    }
}

fn find_leg<'a>(
    positions: &'a [Position],
    symbol: &str,
    hold_side: Option<HoldSide>,
) -> Option<&'a Position> {
    positions.iter().find(|p| {
        p.symbol.eq_ignore_ascii_case(symbol)
            && hold_side.map_or(true, |h| p.hold_side == h)
            && p.size.is_positive()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigrelay_exchange::{position, ExchangeError, MockExchange, MockOp};
    use sigrelay_persistence::{JournaledStore, TradeRecordFilter};

    fn spec() -> ContractSpec {
        ContractSpec {
            min_trade_size: Size::new(dec!(0.001)),
            size_increment: Size::new(dec!(0.001)),
            volume_decimals: 3,
            price_decimals: 1,
        }
    }

    fn setup() -> (Arc<MockExchange>, Arc<JournaledStore>, OrderOrchestrator) {
        let mock = Arc::new(MockExchange::new());
        mock.set_price("BTCUSDT", dec!(50000));
        let store = Arc::new(JournaledStore::in_memory());
        let mut ctx = RecordContext::for_user("u1", AlertType::Entry);
        ctx.strategy_id = Some("s1".into());
        ctx.trade_id = Some("t1".into());
        let orch = OrderOrchestrator::new(mock.clone(), store.clone(), ctx);
        (mock, store, orch)
    }

    fn plan(partial: Option<Price>) -> OpenPlan {
        OpenPlan {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            size: Size::new(dec!(0.02)),
            limit_price: None,
            stop_loss: Price::new(dec!(49000)),
            take_profit: Some(Price::new(dec!(52000))),
            partial_take_profit: partial,
            entry_prefix: "entry",
        }
    }

    fn api_error(message: &str) -> ExchangeError {
        ExchangeError::Api {
            code: "40000".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn test_open_places_entry_then_triggers() {
        let (mock, store, orch) = setup();
        let outcome = orch.open_position(&plan(None), &spec()).await.unwrap();

        assert!(outcome.protection.all_placed());
        assert_eq!(outcome.protection.results.len(), 2);

        let calls = mock.calls();
        assert_eq!(calls[0], "PlaceOrder:BTCUSDT");
        assert_eq!(calls.len(), 3);

        let triggers = mock.triggers();
        let sl = triggers
            .iter()
            .find(|t| t.plan_type == PlanType::LossPlan)
            .unwrap();
        assert_eq!(sl.size, Size::new(dec!(0.02)));
        assert_eq!(sl.hold_side, HoldSide::Long);
        assert!(sl.client_oid.as_str().starts_with("sl_"));

        // entry + sl + tp
        assert_eq!(store.trade_record_count(), 3);
        let entries = store
            .find_trade_records(&TradeRecordFilter {
                alert_type: Some(AlertType::Entry),
                ..Default::default()
            })
            .unwrap();
        assert!(entries
            .iter()
            .any(|r| r.role == OrderRole::Entry && r.status == TradeStatus::Filled));
    }

    #[tokio::test]
    async fn test_partial_mode_splits_take_profit() {
        let (mock, _store, orch) = setup();
        let outcome = orch
            .open_position(&plan(Some(Price::new(dec!(51000)))), &spec())
            .await
            .unwrap();

        assert_eq!(outcome.protection.results.len(), 3);
        let tps: Vec<_> = mock
            .triggers()
            .into_iter()
            .filter(|t| t.plan_type == PlanType::ProfitPlan)
            .collect();
        assert_eq!(tps.len(), 2);
        let total = tps.iter().fold(Size::ZERO, |acc, t| acc + t.size);
        assert_eq!(total, Size::new(dec!(0.02)));
        assert!(tps.iter().any(|t| t.client_oid.as_str().starts_with("tp1_")));
        assert!(tps.iter().any(|t| t.client_oid.as_str().starts_with("tp2_")));
    }

    #[tokio::test]
    async fn test_entry_failure_is_fatal() {
        let (mock, store, orch) = setup();
        mock.fail(MockOp::PlaceOrder, None, api_error("insufficient balance"));

        assert!(orch.open_position(&plan(None), &spec()).await.is_err());
        assert!(mock.triggers().is_empty());
        assert_eq!(store.trade_record_count(), 0);
    }

    #[tokio::test]
    async fn test_trigger_failure_does_not_abort() {
        let (mock, _store, orch) = setup();
        mock.fail(MockOp::PlaceStopLoss, None, api_error("trigger price invalid"));

        let outcome = orch.open_position(&plan(None), &spec()).await.unwrap();
        assert!(!outcome.protection.all_placed());
        let failed: Vec<_> = outcome.protection.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].role, OrderRole::StopLoss);
        assert_eq!(mock.open_positions().len(), 1);
        assert!(outcome.protection.failure_summary().is_some());
    }

    #[tokio::test]
    async fn test_move_stop_uses_position_size() {
        let (mock, _store, orch) = setup();
        mock.set_position(position("BTCUSDT", HoldSide::Long, dec!(0.03)));

        let outcome = orch
            .move_stop("BTCUSDT", Some(Side::Buy), Price::new(dec!(50000.04)), &spec())
            .await;
        match outcome {
            BreakevenOutcome::Placed {
                stop_price, size, ..
            } => {
                assert_eq!(stop_price, Price::new(dec!(50000)));
                assert_eq!(size, Size::new(dec!(0.03)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(mock.triggers()[0].client_oid.as_str().starts_with("be_"));
    }

    #[tokio::test]
    async fn test_move_stop_without_position() {
        let (_mock, _store, orch) = setup();
        let outcome = orch
            .move_stop("BTCUSDT", None, Price::new(dec!(50000)), &spec())
            .await;
        assert_eq!(outcome, BreakevenOutcome::NoPosition);
    }

    #[tokio::test]
    async fn test_close_cancels_then_closes() {
        let (mock, _store, orch) = setup();
        orch.open_position(&plan(None), &spec()).await.unwrap();
        assert_eq!(mock.pending_triggers().len(), 2);

        let outcome = orch.close_position("BTCUSDT", None).await.unwrap();
        assert_eq!(outcome.cancelled.cancelled, 2);
        assert_eq!(outcome.cancelled.remaining, 0);
        assert!(outcome.all_closed());

        let close = mock.orders().pop().unwrap();
        assert!(close.reduce_only);
        assert_eq!(close.side, Side::Sell);
        assert_eq!(close.size, Size::new(dec!(0.02)));
        assert!(mock.open_positions().is_empty());
    }

    #[tokio::test]
    async fn test_close_without_position_is_not_error() {
        let (_mock, _store, orch) = setup();
        let outcome = orch.close_position("BTCUSDT", None).await.unwrap();
        assert!(outcome.no_position());
        assert!(!outcome.all_closed());
    }

    #[tokio::test]
    async fn test_close_tallies_failed_cancels() {
        let (mock, _store, orch) = setup();
        orch.open_position(&plan(None), &spec()).await.unwrap();
        mock.fail(MockOp::CancelTrigger, None, api_error("order not exist"));

        let outcome = orch.close_position("BTCUSDT", None).await.unwrap();
        assert_eq!(outcome.cancelled.failed, 2);
        assert_eq!(outcome.cancelled.remaining, 2);
        assert!(outcome.all_closed());
    }

    #[tokio::test]
    async fn test_contract_spec_falls_back() {
        let (mock, _store, orch) = setup();
        mock.fail(MockOp::Contract, None, api_error("boom"));
        assert_eq!(orch.contract_spec("BTCUSDT").await, ContractSpec::fallback());
    }
}
