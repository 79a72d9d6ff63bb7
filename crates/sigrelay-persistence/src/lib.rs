//! Record stores for sigrelay.
//!
//! Signal logs, trade records, operation logs and mass-trade runs are kept in
//! memory and journaled to JSON Lines files (one file per table per day) so
//! the idempotency ledger survives restarts.

pub mod error;
pub mod journal;
pub mod journaled;
pub mod store;

pub use error::{PersistenceError, PersistenceResult};
pub use journal::JsonLinesJournal;
pub use journaled::JournaledStore;
pub use store::{
    CredentialStore, MassTradeStore, OperationLogStore, SignalLogFilter, SignalLogStore,
    StrategyStore, TradeRecordFilter, TradeRecordStore,
};
