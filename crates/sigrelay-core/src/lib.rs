//! Core domain types for the sigrelay signal execution engine.
//!
//! This crate provides the types shared by every other crate:
//! - `Alert`, `AlertType`: normalized webhook signals
//! - `Price`, `Size`: precision-safe numeric types
//! - `ContractSpec`: per-symbol size and price rules
//! - `Side`, `HoldSide`, `OrderType`, `ClientOid`: order vocabulary
//! - persisted records for the audit log, trades and mass-trade runs

pub mod account;
pub mod alert;
pub mod contract;
pub mod decimal;
pub mod error;
pub mod mass_trade;
pub mod order;
pub mod records;

pub use account::{
    default_margin_coin, default_product_type, Credential, Strategy, Subscription,
    DEFAULT_MARGIN_COIN, DEFAULT_PRODUCT_TYPE,
};
pub use alert::{
    extract_strategy_name, normalize_symbol, Alert, AlertType, BreakevenParams, EntryParams,
};
pub use contract::ContractSpec;
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use mass_trade::{
    MassTradeConfig, MassTradeExecution, MassTradeSymbol, SymbolResult, MAX_LEVERAGE,
    MAX_MASS_TRADE_SYMBOLS,
};
pub use order::{ClientOid, HoldSide, OrderType, Side, CLIENT_OID_MAX_LEN};
pub use records::{
    OperationLog, OperationType, OrderRole, SignalLogEntry, SignalStatus, TradeRecord,
    TradeStatus,
};
