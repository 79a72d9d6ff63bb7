//! Shared handler state.

use std::sync::Arc;

use sigrelay_exchange::DynConnector;
use sigrelay_executor::{IdempotencyLedger, SignalDispatcher};
use sigrelay_persistence::{
    CredentialStore, MassTradeStore, SignalLogStore, StrategyStore, TradeRecordStore,
};

use crate::config::ServerConfig;

/// State cloned into every handler. All fields are cheap `Arc` clones.
#[derive(Clone)]
pub struct AppState {
    pub signal_logs: Arc<dyn SignalLogStore>,
    pub trade_records: Arc<dyn TradeRecordStore>,
    pub strategies: Arc<dyn StrategyStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub mass_trades: Arc<dyn MassTradeStore>,
    pub connector: DynConnector,
    pub ledger: Arc<IdempotencyLedger>,
    pub dispatcher: Arc<SignalDispatcher>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build the state from one store backing every table.
    pub fn new<S>(store: Arc<S>, connector: DynConnector, config: ServerConfig) -> Self
    where
        S: SignalLogStore
            + TradeRecordStore
            + StrategyStore
            + CredentialStore
            + MassTradeStore
            + 'static,
    {
        let ledger = IdempotencyLedger::new(store.clone(), store.clone(), store.clone());
        let dispatcher = SignalDispatcher::new(
            connector.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        Self {
            signal_logs: store.clone(),
            trade_records: store.clone(),
            strategies: store.clone(),
            credentials: store.clone(),
            mass_trades: store,
            connector,
            ledger: Arc::new(ledger),
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
        }
    }
}
