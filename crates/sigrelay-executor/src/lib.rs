//! Order execution for sigrelay.
//!
//! # Key Components
//!
//! - [`IdempotencyLedger`]: decides whether an exit signal has a prior entry
//! - [`OrderOrchestrator`]: open, breakeven and close protocols against one
//!   exchange client
//! - [`SignalDispatcher`]: runs a classified signal for every enabled
//!   subscriber of a strategy
//! - [`BatchExecutor`]: mass-trade runs with streamed [`ProgressEvent`]s
//!
//! # Failure domains
//!
//! - Entry order and size computation are fatal for their symbol only.
//! - Each protective trigger fails independently and is reported, never
//!   rolled back.
//! - Batch runs never abort on a single symbol.

pub mod batch;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod sizing;

pub use batch::{
    BalanceData, BalanceWarningData, BatchExecutor, CompleteData, ErrorData, Phase, PhaseData,
    ProgressEvent, ProgressSink, RunKind, StartData, TradeStartData,
};
pub use dispatch::{DispatchSummary, SignalAction, SignalDispatcher, SubscriberResult};
pub use error::{ExecutorError, ExecutorResult};
pub use ledger::{EntryMatch, IdempotencyLedger};
pub use orchestrator::{
    BreakevenOutcome, CloseLeg, CloseOutcome, OpenOutcome, OpenPlan, OrderOrchestrator,
    ProtectionReport, ProtectionResult, RecordContext,
};
pub use sizing::{compute_size, split_half, stop_loss_price, take_profit_price};
