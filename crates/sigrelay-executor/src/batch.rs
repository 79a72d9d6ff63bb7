//! Mass-trade batch executor.
//!
//! Runs one user-owned [`MassTradeConfig`] across its symbols and reports
//! progress as a sequence of [`ProgressEvent`]s on an mpsc channel.
//!
//! # Phases (execute)
//!
//! 1. `start`
//! 2. `balance`: non-fatal; warns when the balance covers fewer trades than
//!    requested but proceeds anyway
//! 3. `leverage`: all symbols concurrently, failures logged only
//! 4. `trades`: strictly sequential in config order, one `trade_done` per
//!    symbol as soon as it finishes
//! 5. `complete`: summary persisted as a [`MassTradeExecution`]
//!
//! When the receiver is dropped the run stops before the next symbol and
//! persists what it has.

use futures_util::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sigrelay_core::{
    AlertType, CoreError, MassTradeConfig, MassTradeExecution, MassTradeSymbol, Side,
    SymbolResult,
};
use sigrelay_exchange::{translate, translate_error, DynExchange};
use sigrelay_persistence::{MassTradeStore, TradeRecordStore};
use sigrelay_telemetry::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ExecutorError, ExecutorResult};
use crate::orchestrator::{OpenPlan, OrderOrchestrator, RecordContext};
use crate::sizing::{compute_size, stop_loss_price, take_profit_price};

/// clientOid prefix of mass-trade entry orders.
const MASS_TRADE_PREFIX: &str = "mt";

// ============================================================================
// ProgressEvent
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Execute,
    CloseAll,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::CloseAll => "close_all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Balance,
    Leverage,
    Trades,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
    pub kind: RunKind,
    pub config_id: String,
    pub config_name: String,
    pub total: usize,
    pub side: Side,
    pub leverage: u32,
    pub is_retry: bool,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseData {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceData {
    pub margin_coin: String,
    pub available: Decimal,
    pub required: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceWarningData {
    pub available: Decimal,
    pub required: Decimal,
    pub max_trades: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStartData {
    pub symbol: String,
    /// 1-based position in the run.
    pub index: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteData {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SymbolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorData {
    pub message: String,
}

/// One progress event. The transport maps [`ProgressEvent::name`] to the
/// event name and [`ProgressEvent::data`] to its JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Start(StartData),
    Phase(PhaseData),
    Balance(BalanceData),
    BalanceWarning(BalanceWarningData),
    TradeStart(TradeStartData),
    TradeDone(SymbolResult),
    Complete(CompleteData),
    Error(ErrorData),
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Phase(_) => "phase",
            Self::Balance(_) => "balance",
            Self::BalanceWarning(_) => "balance_warning",
            Self::TradeStart(_) => "trade_start",
            Self::TradeDone(_) => "trade_done",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }

    pub fn data(&self) -> Value {
        let value = match self {
            Self::Start(d) => serde_json::to_value(d),
            Self::Phase(d) => serde_json::to_value(d),
            Self::Balance(d) => serde_json::to_value(d),
            Self::BalanceWarning(d) => serde_json::to_value(d),
            Self::TradeStart(d) => serde_json::to_value(d),
            Self::TradeDone(d) => serde_json::to_value(d),
            Self::Complete(d) => serde_json::to_value(d),
            Self::Error(d) => serde_json::to_value(d),
        };
        value.unwrap_or(Value::Null)
    }

    fn phase(phase: Phase) -> Self {
        Self::Phase(PhaseData {
            phase,
            message: None,
        })
    }
}

// ============================================================================
// ProgressSink
// ============================================================================

/// Sender side of the progress stream, tracking whether anything was sent
/// and whether the consumer went away.
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
    started: bool,
    disconnected: bool,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            started: false,
            disconnected: false,
        }
    }

    /// Send an event. Returns false once the receiver has been dropped.
    pub async fn emit(&mut self, event: ProgressEvent) -> bool {
        if self.disconnected {
            return false;
        }
        self.started = true;
        debug!(event = event.name(), "Progress event");
        if self.tx.send(event).await.is_err() {
            warn!("Progress consumer disconnected");
            self.disconnected = true;
            return false;
        }
        true
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn disconnected(&self) -> bool {
        self.disconnected || self.tx.is_closed()
    }
}

// ============================================================================
// BatchExecutor
// ============================================================================

pub struct BatchExecutor {
    exchange: DynExchange,
    mass_trades: Arc<dyn MassTradeStore>,
    trade_records: Arc<dyn TradeRecordStore>,
}

impl BatchExecutor {
    pub fn new(
        exchange: DynExchange,
        mass_trades: Arc<dyn MassTradeStore>,
        trade_records: Arc<dyn TradeRecordStore>,
    ) -> Self {
        Self {
            exchange,
            mass_trades,
            trade_records,
        }
    }

    /// Open positions for the selected symbols of `config`.
    ///
    /// `subset` replays only those symbols with the config's parameters.
    pub async fn execute(
        &self,
        config: &MassTradeConfig,
        subset: Option<&[String]>,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> ExecutorResult<MassTradeExecution> {
        let selection = selection(config, subset)?;
        let mut sink = ProgressSink::new(tx);

        info!(
            config_id = %config.id,
            symbols = selection.len(),
            side = %config.side,
            leverage = config.leverage,
            retry = subset.is_some(),
            "Mass trade run starting"
        );

        let result = self
            .run_execute(config, &selection, subset.is_some(), &mut sink)
            .await;
        finish(RunKind::Execute, result, &mut sink).await
    }

    /// Market-close every open leg of the selected symbols. Not persisted.
    pub async fn close_all(
        &self,
        config: &MassTradeConfig,
        subset: Option<&[String]>,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> ExecutorResult<Vec<SymbolResult>> {
        let selection = selection(config, subset)?;
        let mut sink = ProgressSink::new(tx);

        info!(config_id = %config.id, symbols = selection.len(), "Mass close starting");

        let result = self
            .run_close_all(config, &selection, subset.is_some(), &mut sink)
            .await;
        finish(RunKind::CloseAll, result, &mut sink).await
    }

    async fn run_execute(
        &self,
        config: &MassTradeConfig,
        selection: &[MassTradeSymbol],
        is_retry: bool,
        sink: &mut ProgressSink,
    ) -> ExecutorResult<MassTradeExecution> {
        let total = selection.len();
        sink.emit(start_event(RunKind::Execute, config, selection, is_retry))
            .await;

        // balance
        sink.emit(ProgressEvent::phase(Phase::Balance)).await;
        self.check_balance(config, total, sink).await;

        // leverage
        sink.emit(ProgressEvent::phase(Phase::Leverage)).await;
        self.apply_leverage(config, selection).await;

        // trades
        sink.emit(ProgressEvent::phase(Phase::Trades)).await;
        let orchestrator = OrderOrchestrator::new(
            self.exchange.clone(),
            self.trade_records.clone(),
            RecordContext::for_user(&config.user_id, AlertType::Entry),
        );
        let mut results = Vec::with_capacity(total);
        for (i, entry) in selection.iter().enumerate() {
            if sink.disconnected() {
                warn!(
                    config_id = %config.id,
                    done = results.len(),
                    total,
                    "Consumer gone, stopping mass trade early"
                );
                break;
            }
            sink.emit(ProgressEvent::TradeStart(TradeStartData {
                symbol: entry.symbol.clone(),
                index: i + 1,
                total,
            }))
            .await;

            let result = self.trade_symbol(config, entry, &orchestrator).await;
            sink.emit(ProgressEvent::TradeDone(result.clone())).await;
            results.push(result);
        }

        let execution = MassTradeExecution::from_results(config, results);
        self.mass_trades.insert_execution(execution.clone())?;

        sink.emit(ProgressEvent::Complete(CompleteData {
            total: execution.symbols_count,
            successful: execution.successful,
            failed: execution.failed,
            results: execution.results.clone(),
            execution_id: Some(execution.id),
        }))
        .await;

        info!(
            config_id = %config.id,
            execution_id = %execution.id,
            successful = execution.successful,
            failed = execution.failed,
            "Mass trade run complete"
        );
        Ok(execution)
    }

    async fn run_close_all(
        &self,
        config: &MassTradeConfig,
        selection: &[MassTradeSymbol],
        is_retry: bool,
        sink: &mut ProgressSink,
    ) -> ExecutorResult<Vec<SymbolResult>> {
        let total = selection.len();
        sink.emit(start_event(RunKind::CloseAll, config, selection, is_retry))
            .await;
        sink.emit(ProgressEvent::phase(Phase::Trades)).await;

        // Manual closes are recorded as stop-outs.
        let orchestrator = OrderOrchestrator::new(
            self.exchange.clone(),
            self.trade_records.clone(),
            RecordContext::for_user(&config.user_id, AlertType::StopLoss),
        );
        let mut results = Vec::with_capacity(total);
        for (i, entry) in selection.iter().enumerate() {
            if sink.disconnected() {
                warn!(config_id = %config.id, done = results.len(), total, "Consumer gone, stopping mass close early");
                break;
            }
            sink.emit(ProgressEvent::TradeStart(TradeStartData {
                symbol: entry.symbol.clone(),
                index: i + 1,
                total,
            }))
            .await;

            let result = match orchestrator.close_position(&entry.symbol, None).await {
                Ok(outcome) if outcome.no_position() => {
                    SymbolResult::failed(&entry.symbol, translate_error("no position"))
                }
                Ok(outcome) if outcome.all_closed() => {
                    SymbolResult::ok(&entry.symbol, outcome.first_order_id())
                }
                Ok(outcome) => SymbolResult::failed(
                    &entry.symbol,
                    outcome
                        .legs
                        .iter()
                        .find_map(|l| l.error.clone())
                        .unwrap_or_default(),
                ),
                Err(e) => SymbolResult::failed(&entry.symbol, e.user_message()),
            };
            sink.emit(ProgressEvent::TradeDone(result.clone())).await;
            results.push(result);
        }

        let successful = results.iter().filter(|r| r.success).count();
        sink.emit(ProgressEvent::Complete(CompleteData {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results: results.clone(),
            execution_id: None,
        }))
        .await;

        info!(config_id = %config.id, successful, failed = results.len() - successful, "Mass close complete");
        Ok(results)
    }

    async fn check_balance(&self, config: &MassTradeConfig, total: usize, sink: &mut ProgressSink) {
        let required = config.position_size_usdt * Decimal::from(total as u64);
        match self.exchange.account_balance().await {
            Ok(balance) => {
                sink.emit(ProgressEvent::Balance(BalanceData {
                    margin_coin: balance.margin_coin.clone(),
                    available: balance.available,
                    required,
                }))
                .await;

                if balance.available < required {
                    let max_trades = max_affordable(balance.available, config.position_size_usdt);
                    warn!(
                        config_id = %config.id,
                        available = %balance.available,
                        %required,
                        max_trades,
                        "Balance covers fewer trades than requested"
                    );
                    sink.emit(ProgressEvent::BalanceWarning(BalanceWarningData {
                        available: balance.available,
                        required,
                        max_trades,
                        message: format!(
                            "Saldo insuficiente para {total} operaciones; alcanza para {max_trades}"
                        ),
                    }))
                    .await;
                }
            }
            Err(e) => {
                warn!(config_id = %config.id, error = %e, "Balance check failed, continuing");
                sink.emit(ProgressEvent::Phase(PhaseData {
                    phase: Phase::Balance,
                    message: Some(translate(&e)),
                }))
                .await;
            }
        }
    }

    async fn apply_leverage(&self, config: &MassTradeConfig, selection: &[MassTradeSymbol]) {
        let calls = selection.iter().map(|entry| async move {
            let outcome = self
                .exchange
                .set_leverage(&entry.symbol, config.leverage)
                .await;
            (entry.symbol.as_str(), outcome)
        });
        for (symbol, outcome) in join_all(calls).await {
            if let Err(e) = outcome {
                warn!(symbol, leverage = config.leverage, error = %e, "Set leverage failed");
            }
        }
    }

    async fn trade_symbol(
        &self,
        config: &MassTradeConfig,
        entry: &MassTradeSymbol,
        orchestrator: &OrderOrchestrator,
    ) -> SymbolResult {
        let symbol = &entry.symbol;
        let spec = orchestrator.contract_spec(symbol).await;

        let price = match self.exchange.ticker_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No price, skipping symbol");
                return SymbolResult::failed(symbol, translate(&e));
            }
        };

        let notional = config.position_size_usdt * Decimal::from(config.leverage);
        let size = match compute_size(symbol, notional, price, &spec) {
            Ok(size) => size,
            Err(e) => return SymbolResult::failed(symbol, e.user_message()),
        };

        let sl_pct = entry.sl_percent.unwrap_or(config.stop_loss_percent);
        let tp_pct = entry.tp_percent.or(config.take_profit_percent);
        let plan = OpenPlan {
            symbol: symbol.clone(),
            side: config.side,
            size,
            limit_price: None,
            stop_loss: stop_loss_price(price, sl_pct, config.side, &spec),
            take_profit: tp_pct.map(|pct| take_profit_price(price, pct, config.side, &spec)),
            partial_take_profit: None,
            entry_prefix: MASS_TRADE_PREFIX,
        };

        match orchestrator.open_position(&plan, &spec).await {
            Ok(outcome) => SymbolResult {
                symbol: symbol.clone(),
                success: true,
                order_id: Some(outcome.entry_order_id),
                error: outcome.protection.failure_summary(),
            },
            Err(e) => SymbolResult::failed(symbol, e.user_message()),
        }
    }
}

fn selection(
    config: &MassTradeConfig,
    subset: Option<&[String]>,
) -> ExecutorResult<Vec<MassTradeSymbol>> {
    let selection = config.select(subset);
    if selection.is_empty() {
        return Err(ExecutorError::Invalid(CoreError::InvalidConfig(
            "no symbols selected".to_string(),
        )));
    }
    Ok(selection)
}

fn start_event(
    kind: RunKind,
    config: &MassTradeConfig,
    selection: &[MassTradeSymbol],
    is_retry: bool,
) -> ProgressEvent {
    ProgressEvent::Start(StartData {
        kind,
        config_id: config.id.clone(),
        config_name: config.name.clone(),
        total: selection.len(),
        side: config.side,
        leverage: config.leverage,
        is_retry,
        symbols: selection.iter().map(|e| e.symbol.clone()).collect(),
    })
}

/// Trades the balance can fund at `per_trade` each.
fn max_affordable(available: Decimal, per_trade: Decimal) -> usize {
    if per_trade <= Decimal::ZERO || available <= Decimal::ZERO {
        return 0;
    }
    (available / per_trade).floor().to_usize().unwrap_or(0)
}

/// Turn a top-level failure after streaming began into a final `error`
/// event, and record the run outcome.
async fn finish<T>(
    kind: RunKind,
    result: ExecutorResult<T>,
    sink: &mut ProgressSink,
) -> ExecutorResult<T> {
    match result {
        Ok(value) => {
            let outcome = if sink.disconnected() {
                "disconnected"
            } else {
                "completed"
            };
            Metrics::mass_trade_run(kind.as_str(), outcome);
            Ok(value)
        }
        Err(e) => {
            Metrics::mass_trade_run(kind.as_str(), "error");
            warn!(kind = kind.as_str(), error = %e, "Mass trade run failed");
            if sink.started() {
                let message = e.user_message();
                sink.emit(ProgressEvent::Error(ErrorData {
                    message: message.clone(),
                }))
                .await;
                Err(ExecutorError::StreamAlreadyStarted(message))
            } else {
                Err(e)
            }
        }
    }
}
