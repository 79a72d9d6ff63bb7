//! Idempotency ledger for exit signals.
//!
//! An exit (stop-loss, take-profit, breakeven) only acts on a trade whose
//! ENTRY was recorded as successful. Lookup order, first hit wins:
//!
//! 1. Signal log by `strategy + tradeId`
//! 2. Signal log by `strategy + symbol`
//! 3. Live trade records of every enabled subscriber of the strategy
//!
//! Any store error is treated as "not found".

use sigrelay_core::{AlertType, SignalStatus};
use sigrelay_persistence::{
    SignalLogFilter, SignalLogStore, StrategyStore, TradeRecordFilter, TradeRecordStore,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ExecutorResult;

/// Which source confirmed the prior entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMatch {
    SignalByTradeId,
    SignalBySymbol,
    TradeRecord,
}

pub struct IdempotencyLedger {
    signal_logs: Arc<dyn SignalLogStore>,
    trade_records: Arc<dyn TradeRecordStore>,
    strategies: Arc<dyn StrategyStore>,
}

impl IdempotencyLedger {
    pub fn new(
        signal_logs: Arc<dyn SignalLogStore>,
        trade_records: Arc<dyn TradeRecordStore>,
        strategies: Arc<dyn StrategyStore>,
    ) -> Self {
        Self {
            signal_logs,
            trade_records,
            strategies,
        }
    }

    /// Whether a successful ENTRY exists for the strategy and trade.
    pub fn has_prior_entry(
        &self,
        strategy_id: &str,
        trade_id: Option<&str>,
        symbol: Option<&str>,
    ) -> bool {
        match self.find_prior_entry(strategy_id, trade_id, symbol) {
            Ok(found) => {
                debug!(strategy_id, ?trade_id, ?symbol, ?found, "Prior entry lookup");
                found.is_some()
            }
            Err(e) => {
                warn!(
                    strategy_id,
                    ?trade_id,
                    ?symbol,
                    error = %e,
                    "Prior entry lookup failed, treating as not found"
                );
                false
            }
        }
    }

    /// Lookup returning the matching source.
    pub fn find_prior_entry(
        &self,
        strategy_id: &str,
        trade_id: Option<&str>,
        symbol: Option<&str>,
    ) -> ExecutorResult<Option<EntryMatch>> {
        let entry_filter = |trade_id: Option<&str>, symbol: Option<&str>| SignalLogFilter {
            strategy_id: Some(strategy_id.to_string()),
            trade_id: trade_id.map(str::to_string),
            symbol: symbol.map(str::to_string),
            alert_type: Some(AlertType::Entry),
            status: Some(SignalStatus::Success),
        };

        if let Some(trade_id) = trade_id {
            if self
                .signal_logs
                .signal_log_exists(&entry_filter(Some(trade_id), None))?
            {
                return Ok(Some(EntryMatch::SignalByTradeId));
            }
        }

        if let Some(symbol) = symbol {
            if self
                .signal_logs
                .signal_log_exists(&entry_filter(None, Some(symbol)))?
            {
                return Ok(Some(EntryMatch::SignalBySymbol));
            }
        }

        if trade_id.is_none() && symbol.is_none() {
            return Ok(None);
        }

        for subscription in self.strategies.enabled_subscriptions(strategy_id)? {
            let filter = TradeRecordFilter {
                user_id: Some(subscription.user_id.clone()),
                strategy_id: Some(strategy_id.to_string()),
                trade_id: trade_id.map(str::to_string),
                symbol: if trade_id.is_some() {
                    None
                } else {
                    symbol.map(str::to_string)
                },
                alert_type: Some(AlertType::Entry),
                live_only: true,
            };
            if self.trade_records.trade_record_exists(&filter)? {
                return Ok(Some(EntryMatch::TradeRecord));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use sigrelay_core::{
        Alert, Credential, OrderRole, OrderType, Side, Size, SignalLogEntry, Strategy,
        Subscription, TradeRecord, TradeStatus,
    };
    use sigrelay_persistence::{JournaledStore, PersistenceError, PersistenceResult};

    fn store() -> Arc<JournaledStore> {
        let store = Arc::new(JournaledStore::in_memory());
        store.seed_strategies(vec![Strategy {
            id: "s1".into(),
            name: "Alpha".into(),
            active: true,
        }]);
        store.seed_subscriptions(vec![Subscription {
            id: "sub1".into(),
            user_id: "u1".into(),
            strategy_id: "s1".into(),
            credential_id: "c1".into(),
            enabled: true,
            position_size_usdt: dec!(100),
            leverage: 10,
            partial_take_profit: false,
            product_type: "USDT-FUTURES".into(),
            margin_coin: "USDT".into(),
        }]);
        store.seed_credentials(vec![Credential::new("c1", "u1", "k", "s", "p")]);
        store
    }

    fn ledger(store: &Arc<JournaledStore>) -> IdempotencyLedger {
        IdempotencyLedger::new(store.clone(), store.clone(), store.clone())
    }

    fn log_entry(store: &JournaledStore, payload: serde_json::Value, status: SignalStatus) {
        let alert = Alert::from_payload(&payload).unwrap();
        store
            .insert_signal_log(SignalLogEntry::new(
                Some("s1".into()),
                payload,
                None,
                status,
                Some(&alert),
            ))
            .unwrap();
    }

    #[test]
    fn test_entry_found_by_trade_id() {
        let store = store();
        log_entry(
            &store,
            json!({"strategy": "Alpha", "symbol": "BTCUSDT", "alertType": "ENTRY", "tradeId": "t1"}),
            SignalStatus::Success,
        );
        let ledger = ledger(&store);
        assert_eq!(
            ledger.find_prior_entry("s1", Some("t1"), None).unwrap(),
            Some(EntryMatch::SignalByTradeId)
        );
        assert!(!ledger.has_prior_entry("s1", Some("t2"), None));
        assert!(!ledger.has_prior_entry("s2", Some("t1"), None));
    }

    #[test]
    fn test_entry_found_by_symbol() {
        let store = store();
        log_entry(
            &store,
            json!({"strategy": "Alpha", "symbol": "ETHUSDT"}),
            SignalStatus::Success,
        );
        let ledger = ledger(&store);
        assert_eq!(
            ledger
                .find_prior_entry("s1", Some("unknown"), Some("ETHUSDT"))
                .unwrap(),
            Some(EntryMatch::SignalBySymbol)
        );
    }

    #[test]
    fn test_failed_entry_does_not_count() {
        let store = store();
        log_entry(
            &store,
            json!({"strategy": "Alpha", "symbol": "BTCUSDT", "tradeId": "t1"}),
            SignalStatus::Failed,
        );
        assert!(!ledger(&store).has_prior_entry("s1", Some("t1"), Some("BTCUSDT")));
    }

    #[test]
    fn test_falls_back_to_trade_records() {
        let store = store();
        store
            .insert_trade_record(TradeRecord {
                id: uuid::Uuid::new_v4(),
                user_id: "u1".into(),
                strategy_id: Some("s1".into()),
                exchange_order_id: "o1".into(),
                client_oid: "entry_SOLUSDT_1_1000".into(),
                symbol: "SOLUSDT".into(),
                side: Side::Buy,
                order_type: OrderType::Market,
                role: OrderRole::Entry,
                size: Size::new(dec!(1)),
                price: None,
                status: TradeStatus::Filled,
                trade_id: Some("t9".into()),
                entry_price: None,
                stop_loss: None,
                take_profit: None,
                breakeven: None,
                alert_type: AlertType::Entry,
                created_at: chrono::Utc::now(),
            })
            .unwrap();
        let ledger = ledger(&store);
        assert_eq!(
            ledger.find_prior_entry("s1", Some("t9"), None).unwrap(),
            Some(EntryMatch::TradeRecord)
        );
        assert_eq!(
            ledger.find_prior_entry("s1", None, Some("SOLUSDT")).unwrap(),
            Some(EntryMatch::TradeRecord)
        );
        assert!(!ledger.has_prior_entry("s1", None, None));
    }

    struct BrokenLogs;

    impl SignalLogStore for BrokenLogs {
        fn insert_signal_log(&self, _entry: SignalLogEntry) -> PersistenceResult<()> {
            Err(PersistenceError::Unavailable("down".into()))
        }

        fn find_signal_logs(&self, _filter: &SignalLogFilter) -> PersistenceResult<Vec<SignalLogEntry>> {
            Err(PersistenceError::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_store_error_fails_closed() {
        let store = store();
        let ledger = IdempotencyLedger::new(Arc::new(BrokenLogs), store.clone(), store.clone());
        assert!(!ledger.has_prior_entry("s1", Some("t1"), Some("BTCUSDT")));
        assert!(ledger.find_prior_entry("s1", Some("t1"), None).is_err());
    }
}
