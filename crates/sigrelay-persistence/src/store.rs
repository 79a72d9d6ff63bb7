//! Store traits consumed by the gateway, executor and exchange client.
//!
//! Calls are synchronous and short. Implementations may serialize writers
//! of one table on its journal file, but reads must never wait on file I/O
//! and no lock may be held across an `.await`.

use sigrelay_core::{
    AlertType, Credential, MassTradeConfig, MassTradeExecution, OperationLog, SignalLogEntry,
    SignalStatus, Strategy, Subscription, TradeRecord,
};

use crate::error::PersistenceResult;

/// Filter over signal log entries. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalLogFilter {
    pub strategy_id: Option<String>,
    pub trade_id: Option<String>,
    pub symbol: Option<String>,
    pub alert_type: Option<AlertType>,
    pub status: Option<SignalStatus>,
}

impl SignalLogFilter {
    pub fn matches(&self, entry: &SignalLogEntry) -> bool {
        self.strategy_id
            .as_ref()
            .map_or(true, |id| entry.strategy_id.as_ref() == Some(id))
            && self
                .trade_id
                .as_ref()
                .map_or(true, |id| entry.trade_id.as_ref() == Some(id))
            && self
                .symbol
                .as_ref()
                .map_or(true, |s| entry.symbol.as_ref() == Some(s))
            && self.alert_type.map_or(true, |t| entry.alert_type == Some(t))
            && self.status.map_or(true, |s| entry.status == s)
    }
}

/// Filter over trade records. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeRecordFilter {
    pub user_id: Option<String>,
    pub strategy_id: Option<String>,
    pub trade_id: Option<String>,
    pub symbol: Option<String>,
    pub alert_type: Option<AlertType>,
    /// Only pending or filled orders.
    pub live_only: bool,
}

impl TradeRecordFilter {
    pub fn matches(&self, record: &TradeRecord) -> bool {
        self.user_id.as_ref().map_or(true, |id| &record.user_id == id)
            && self
                .strategy_id
                .as_ref()
                .map_or(true, |id| record.strategy_id.as_ref() == Some(id))
            && self
                .trade_id
                .as_ref()
                .map_or(true, |id| record.trade_id.as_ref() == Some(id))
            && self.symbol.as_ref().map_or(true, |s| &record.symbol == s)
            && self.alert_type.map_or(true, |t| record.alert_type == t)
            && (!self.live_only || record.status.is_live())
    }
}

pub trait SignalLogStore: Send + Sync {
    fn insert_signal_log(&self, entry: SignalLogEntry) -> PersistenceResult<()>;

    fn find_signal_logs(&self, filter: &SignalLogFilter) -> PersistenceResult<Vec<SignalLogEntry>>;

    fn signal_log_exists(&self, filter: &SignalLogFilter) -> PersistenceResult<bool> {
        Ok(!self.find_signal_logs(filter)?.is_empty())
    }
}

pub trait TradeRecordStore: Send + Sync {
    fn insert_trade_record(&self, record: TradeRecord) -> PersistenceResult<()>;

    fn find_trade_records(&self, filter: &TradeRecordFilter)
        -> PersistenceResult<Vec<TradeRecord>>;

    fn trade_record_exists(&self, filter: &TradeRecordFilter) -> PersistenceResult<bool> {
        Ok(!self.find_trade_records(filter)?.is_empty())
    }
}

/// Read-only view of strategies and their subscribers.
pub trait StrategyStore: Send + Sync {
    fn active_strategies(&self) -> PersistenceResult<Vec<Strategy>>;

    fn enabled_subscriptions(&self, strategy_id: &str) -> PersistenceResult<Vec<Subscription>>;
}

/// Decrypted credentials supplied by the external credential store.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, credential_id: &str) -> PersistenceResult<Option<Credential>>;
}

pub trait MassTradeStore: Send + Sync {
    fn mass_trade_config(&self, config_id: &str) -> PersistenceResult<Option<MassTradeConfig>>;

    fn insert_execution(&self, execution: MassTradeExecution) -> PersistenceResult<()>;

    /// Runs of one config, most recent first.
    fn executions_for_config(&self, config_id: &str)
        -> PersistenceResult<Vec<MassTradeExecution>>;
}

pub trait OperationLogStore: Send + Sync {
    fn insert_operation_log(&self, log: OperationLog) -> PersistenceResult<()>;

    fn operation_logs(&self) -> PersistenceResult<Vec<OperationLog>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(strategy: &str, trade_id: Option<&str>, status: SignalStatus) -> SignalLogEntry {
        let mut payload = json!({"strategy": "s", "symbol": "BTCUSDT", "alertType": "ENTRY"});
        if let Some(t) = trade_id {
            payload["tradeId"] = json!(t);
        }
        let alert = sigrelay_core::Alert::from_payload(&payload).unwrap();
        SignalLogEntry::new(Some(strategy.into()), payload, None, status, Some(&alert))
    }

    #[test]
    fn test_signal_log_filter_by_trade_id() {
        let filter = SignalLogFilter {
            strategy_id: Some("s1".into()),
            trade_id: Some("t1".into()),
            alert_type: Some(AlertType::Entry),
            status: Some(SignalStatus::Success),
            ..Default::default()
        };
        assert!(filter.matches(&entry("s1", Some("t1"), SignalStatus::Success)));
        assert!(!filter.matches(&entry("s1", Some("t2"), SignalStatus::Success)));
        assert!(!filter.matches(&entry("s2", Some("t1"), SignalStatus::Success)));
        assert!(!filter.matches(&entry("s1", Some("t1"), SignalStatus::Failed)));
        assert!(!filter.matches(&entry("s1", None, SignalStatus::Success)));
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(SignalLogFilter::default().matches(&entry("s1", None, SignalStatus::Invalid)));
    }
}
