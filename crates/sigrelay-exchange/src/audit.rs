//! Operation-log rows for private exchange calls.
//!
//! One row per call regardless of outcome. Sink failures are logged and
//! dropped so they never change the result of the call being audited.

use serde_json::{json, Value};
use sigrelay_core::{OperationLog, OperationType};
use sigrelay_persistence::OperationLogStore;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub type OperationSink = Arc<dyn OperationLogStore>;

const REDACTED: &str = "[REDACTED]";

/// Header map as recorded in the audit row. Signature and passphrase are
/// never stored; the API key keeps a short prefix for correlation.
pub fn redacted_headers(api_key: &str, timestamp: &str, locale: &str) -> Value {
    let key_hint: String = api_key.chars().take(6).collect();
    json!({
        "ACCESS-KEY": format!("{key_hint}***"),
        "ACCESS-SIGN": REDACTED,
        "ACCESS-TIMESTAMP": timestamp,
        "ACCESS-PASSPHRASE": REDACTED,
        "locale": locale,
        "Content-Type": "application/json",
    })
}

/// Everything known about a finished call.
pub(crate) struct CallRecord<'a> {
    pub user_id: &'a str,
    pub strategy_id: Option<&'a str>,
    pub symbol: Option<&'a str>,
    pub operation_type: OperationType,
    pub http_method: &'a str,
    pub endpoint: &'a str,
    pub full_url: &'a str,
    pub request_payload: Option<Value>,
    pub request_headers: Value,
    pub response_data: Option<Value>,
    pub response_status: Option<u16>,
    pub error_message: Option<String>,
    pub order_id: Option<String>,
    pub client_oid: Option<&'a str>,
    pub duration_ms: u64,
}

impl CallRecord<'_> {
    pub(crate) fn into_log(self) -> OperationLog {
        let success = self.error_message.is_none();
        OperationLog {
            id: Uuid::new_v4(),
            user_id: Some(self.user_id.to_string()),
            strategy_id: self.strategy_id.map(str::to_string),
            symbol: self.symbol.map(str::to_string),
            operation_type: self.operation_type,
            http_method: self.http_method.to_string(),
            endpoint: self.endpoint.to_string(),
            full_url: self.full_url.to_string(),
            request_payload: self.request_payload,
            request_headers: self.request_headers,
            response_data: self.response_data,
            response_status: self.response_status,
            success,
            error_message: self.error_message,
            order_id: self.order_id,
            client_oid: self.client_oid.map(str::to_string),
            reviewed: success && self.response_status == Some(200),
            duration_ms: self.duration_ms,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Write a row, swallowing sink failures.
pub(crate) fn record(sink: &OperationSink, log: OperationLog) {
    let operation = log.operation_type;
    if let Err(e) = sink.insert_operation_log(log) {
        warn!(%operation, error = %e, "Failed to write operation log");
    }
}
