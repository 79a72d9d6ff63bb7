//! In-memory store backed by per-table JSON Lines journals.
//!
//! Append-only tables (signal logs, trade records, operation logs, mass-trade
//! executions) are journaled and replayed on open. Strategies, subscriptions,
//! credentials and mass-trade configs belong to external collaborators and
//! are seeded at startup without a journal.

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use sigrelay_core::{
    Credential, MassTradeConfig, MassTradeExecution, OperationLog, SignalLogEntry, Strategy,
    Subscription, TradeRecord,
};

use crate::error::PersistenceResult;
use crate::journal::JsonLinesJournal;
use crate::store::{
    CredentialStore, MassTradeStore, OperationLogStore, SignalLogFilter, SignalLogStore,
    StrategyStore, TradeRecordFilter, TradeRecordStore,
};

pub const SIGNAL_LOG_TABLE: &str = "signal_logs";
pub const TRADE_RECORD_TABLE: &str = "trade_records";
pub const OPERATION_LOG_TABLE: &str = "operation_logs";
pub const EXECUTION_TABLE: &str = "mass_trade_executions";

/// One append-only table with an optional journal.
struct Table<T> {
    rows: RwLock<Vec<T>>,
    journal: Option<Mutex<JsonLinesJournal>>,
}

impl<T: Serialize + DeserializeOwned + Clone> Table<T> {
    fn in_memory() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            journal: None,
        }
    }

    fn open(data_dir: &Path, name: &'static str) -> PersistenceResult<Self> {
        let rows = JsonLinesJournal::replay(data_dir, name)?;
        Ok(Self {
            rows: RwLock::new(rows),
            journal: Some(Mutex::new(JsonLinesJournal::new(data_dir, name)?)),
        })
    }

    /// Journal first, so a row visible in memory is always durable. The
    /// journal lock covers only the line write; readers never wait on it.
    fn insert(&self, row: T) -> PersistenceResult<()> {
        if let Some(journal) = &self.journal {
            let line = JsonLinesJournal::encode(&row)?;
            journal.lock().append_line(&line)?;
        }
        self.rows.write().push(row);
        Ok(())
    }

    fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.read().iter().filter(|r| pred(r)).cloned().collect()
    }

    fn len(&self) -> usize {
        self.rows.read().len()
    }
}

/// Store used by the running service.
pub struct JournaledStore {
    signal_logs: Table<SignalLogEntry>,
    trade_records: Table<TradeRecord>,
    operation_logs: Table<OperationLog>,
    executions: Table<MassTradeExecution>,
    strategies: RwLock<Vec<Strategy>>,
    subscriptions: RwLock<Vec<Subscription>>,
    credentials: RwLock<HashMap<String, Credential>>,
    configs: RwLock<HashMap<String, MassTradeConfig>>,
}

impl JournaledStore {
    /// Store with no journal. Used in tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            signal_logs: Table::in_memory(),
            trade_records: Table::in_memory(),
            operation_logs: Table::in_memory(),
            executions: Table::in_memory(),
            strategies: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(Vec::new()),
            credentials: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Open the journal under `data_dir`, replaying every table.
    pub fn open(data_dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let dir = data_dir.as_ref();
        let store = Self {
            signal_logs: Table::open(dir, SIGNAL_LOG_TABLE)?,
            trade_records: Table::open(dir, TRADE_RECORD_TABLE)?,
            operation_logs: Table::open(dir, OPERATION_LOG_TABLE)?,
            executions: Table::open(dir, EXECUTION_TABLE)?,
            ..Self::in_memory()
        };

        info!(
            data_dir = %dir.display(),
            signal_logs = store.signal_logs.len(),
            trade_records = store.trade_records.len(),
            operation_logs = store.operation_logs.len(),
            executions = store.executions.len(),
            "Opened journaled store"
        );
        Ok(store)
    }

    pub fn seed_strategies(&self, strategies: Vec<Strategy>) {
        *self.strategies.write() = strategies;
    }

    pub fn seed_subscriptions(&self, subscriptions: Vec<Subscription>) {
        *self.subscriptions.write() = subscriptions;
    }

    pub fn seed_credentials(&self, credentials: Vec<Credential>) {
        let mut map = self.credentials.write();
        map.clear();
        map.extend(credentials.into_iter().map(|c| (c.id.clone(), c)));
    }

    pub fn seed_mass_trade_configs(&self, configs: Vec<MassTradeConfig>) {
        let mut map = self.configs.write();
        map.clear();
        map.extend(configs.into_iter().map(|c| (c.id.clone(), c)));
    }

    pub fn signal_log_count(&self) -> usize {
        self.signal_logs.len()
    }

    pub fn trade_record_count(&self) -> usize {
        self.trade_records.len()
    }
}

impl SignalLogStore for JournaledStore {
    fn insert_signal_log(&self, entry: SignalLogEntry) -> PersistenceResult<()> {
        self.signal_logs.insert(entry)
    }

    fn find_signal_logs(&self, filter: &SignalLogFilter) -> PersistenceResult<Vec<SignalLogEntry>> {
        Ok(self.signal_logs.filter(|e| filter.matches(e)))
    }

    fn signal_log_exists(&self, filter: &SignalLogFilter) -> PersistenceResult<bool> {
        Ok(self.signal_logs.rows.read().iter().any(|e| filter.matches(e)))
    }
}

impl TradeRecordStore for JournaledStore {
    fn insert_trade_record(&self, record: TradeRecord) -> PersistenceResult<()> {
        self.trade_records.insert(record)
    }

    fn find_trade_records(
        &self,
        filter: &TradeRecordFilter,
    ) -> PersistenceResult<Vec<TradeRecord>> {
        Ok(self.trade_records.filter(|r| filter.matches(r)))
    }

    fn trade_record_exists(&self, filter: &TradeRecordFilter) -> PersistenceResult<bool> {
        Ok(self.trade_records.rows.read().iter().any(|r| filter.matches(r)))
    }
}

impl StrategyStore for JournaledStore {
    fn active_strategies(&self) -> PersistenceResult<Vec<Strategy>> {
        Ok(self
            .strategies
            .read()
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    fn enabled_subscriptions(&self, strategy_id: &str) -> PersistenceResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.enabled && s.strategy_id == strategy_id)
            .cloned()
            .collect())
    }
}

impl CredentialStore for JournaledStore {
    fn credential(&self, credential_id: &str) -> PersistenceResult<Option<Credential>> {
        Ok(self.credentials.read().get(credential_id).cloned())
    }
}

impl MassTradeStore for JournaledStore {
    fn mass_trade_config(&self, config_id: &str) -> PersistenceResult<Option<MassTradeConfig>> {
        Ok(self.configs.read().get(config_id).cloned())
    }

    fn insert_execution(&self, execution: MassTradeExecution) -> PersistenceResult<()> {
        self.executions.insert(execution)
    }

    fn executions_for_config(
        &self,
        config_id: &str,
    ) -> PersistenceResult<Vec<MassTradeExecution>> {
        let mut runs = self.executions.filter(|e| e.config_id == config_id);
        // insertion order breaks timestamp ties
        runs.reverse();
        runs.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(runs)
    }
}

impl OperationLogStore for JournaledStore {
    fn insert_operation_log(&self, log: OperationLog) -> PersistenceResult<()> {
        self.operation_logs.insert(log)
    }

    fn operation_logs(&self) -> PersistenceResult<Vec<OperationLog>> {
        Ok(self.operation_logs.rows.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use sigrelay_core::{
        Alert, AlertType, MassTradeSymbol, OrderRole, OrderType, Side, SignalStatus, Size,
        SymbolResult, TradeStatus,
    };
    use tempfile::TempDir;

    fn entry_log(strategy: &str, trade_id: &str) -> SignalLogEntry {
        let payload = json!({"strategy": "s", "symbol": "BTCUSDT", "tradeId": trade_id});
        let alert = Alert::from_payload(&payload).unwrap();
        SignalLogEntry::new(
            Some(strategy.into()),
            payload,
            None,
            SignalStatus::Success,
            Some(&alert),
        )
    }

    fn trade(user: &str, status: TradeStatus) -> TradeRecord {
        TradeRecord {
            id: uuid::Uuid::new_v4(),
            user_id: user.into(),
            strategy_id: Some("s1".into()),
            exchange_order_id: "1".into(),
            client_oid: "entry_BTCUSDT_1_1000".into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            role: OrderRole::Entry,
            size: Size::new(dec!(0.01)),
            price: None,
            status,
            trade_id: Some("t1".into()),
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            breakeven: None,
            alert_type: AlertType::Entry,
            created_at: chrono::Utc::now(),
        }
    }

    fn config(id: &str) -> MassTradeConfig {
        MassTradeConfig {
            id: id.into(),
            user_id: "u1".into(),
            name: "n".into(),
            credential_id: "c1".into(),
            side: Side::Sell,
            leverage: 5,
            stop_loss_percent: dec!(1),
            take_profit_percent: None,
            position_size_usdt: dec!(10),
            symbols: vec![MassTradeSymbol {
                symbol: "BTCUSDT".into(),
                sl_percent: None,
                tp_percent: None,
            }],
            product_type: "USDT-FUTURES".into(),
            margin_coin: "USDT".into(),
        }
    }

    #[test]
    fn test_signal_logs_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = JournaledStore::open(temp_dir.path()).unwrap();
            store.insert_signal_log(entry_log("s1", "t1")).unwrap();
            store.insert_signal_log(entry_log("s1", "t2")).unwrap();
        }

        let store = JournaledStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.signal_log_count(), 2);
        let filter = SignalLogFilter {
            strategy_id: Some("s1".into()),
            trade_id: Some("t2".into()),
            ..Default::default()
        };
        assert!(store.signal_log_exists(&filter).unwrap());
    }

    #[test]
    fn test_trade_record_live_filter() {
        let store = JournaledStore::in_memory();
        store
            .insert_trade_record(trade("u1", TradeStatus::Cancelled))
            .unwrap();
        let filter = TradeRecordFilter {
            user_id: Some("u1".into()),
            live_only: true,
            ..Default::default()
        };
        assert!(!store.trade_record_exists(&filter).unwrap());

        store.insert_trade_record(trade("u1", TradeStatus::Filled)).unwrap();
        assert!(store.trade_record_exists(&filter).unwrap());
    }

    #[test]
    fn test_seeded_strategies_and_subscriptions() {
        let store = JournaledStore::in_memory();
        store.seed_strategies(vec![
            Strategy {
                id: "s1".into(),
                name: "Alpha".into(),
                active: true,
            },
            Strategy {
                id: "s2".into(),
                name: "Beta".into(),
                active: false,
            },
        ]);
        let active = store.active_strategies().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "s1");

        store.seed_subscriptions(vec![Subscription {
            id: "sub1".into(),
            user_id: "u1".into(),
            strategy_id: "s1".into(),
            credential_id: "c1".into(),
            enabled: false,
            position_size_usdt: dec!(10),
            leverage: 5,
            partial_take_profit: true,
            product_type: "USDT-FUTURES".into(),
            margin_coin: "USDT".into(),
        }]);
        assert!(store.enabled_subscriptions("s1").unwrap().is_empty());
    }

    #[test]
    fn test_executions_most_recent_first() {
        let store = JournaledStore::in_memory();
        store.seed_mass_trade_configs(vec![config("cfg")]);
        assert!(store.mass_trade_config("cfg").unwrap().is_some());

        let cfg = config("cfg");
        let mut first = MassTradeExecution::from_results(&cfg, vec![SymbolResult::ok("BTCUSDT", None)]);
        first.executed_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        let second = MassTradeExecution::from_results(&cfg, vec![]);
        store.insert_execution(first.clone()).unwrap();
        store.insert_execution(second.clone()).unwrap();

        let runs = store.executions_for_config("cfg").unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert!(store.executions_for_config("other").unwrap().is_empty());
    }

    #[test]
    fn test_reads_do_not_wait_on_journal_writer() {
        let temp_dir = TempDir::new().unwrap();
        let store = JournaledStore::open(temp_dir.path()).unwrap();
        store.insert_signal_log(entry_log("s1", "t1")).unwrap();

        let journal = store.signal_logs.journal.as_ref().unwrap();
        let _writer = journal.lock();
        assert_eq!(store.signal_log_count(), 1);
        assert_eq!(
            store
                .find_signal_logs(&SignalLogFilter::default())
                .unwrap()
                .len(),
            1
        );
    }
}
