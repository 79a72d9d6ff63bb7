//! Webhook signal intake.
//!
//! Flow per delivery:
//! 1. Resolve the target strategy by name (404 when nothing matches)
//! 2. Parse and classify the alert
//! 3. BREAKEVEN / STOP_LOSS / TAKE_PROFIT: gate on a prior entry. Orphans are
//!    ignored without an audit row.
//! 4. ENTRY / BREAKEVEN: audit first, then execute for every subscriber.
//!    Matched STOP_LOSS / TAKE_PROFIT are closed and then audited.
//!
//! Anything that fails unexpectedly is audited as `failed` once, on a best
//! effort basis, and answered with 500.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use sigrelay_core::{
    extract_strategy_name, Alert, AlertType, CoreError, SignalLogEntry, SignalStatus,
};
use sigrelay_executor::{DispatchSummary, SignalAction};
use sigrelay_persistence::SignalLogStore;
use sigrelay_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// Headers that may carry the sender's signature. Recorded, not verified.
pub const SIGNATURE_HEADERS: &[&str] = &["x-signature", "x-tradingview-signature"];

/// Successful webhook outcomes.
#[derive(Debug)]
pub enum WebhookOutcome {
    Processed {
        message: String,
        summary: DispatchSummary,
    },
    /// Exit signal with no prior entry. Deliberate no-op.
    Ignored,
}

impl WebhookOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "success",
            Self::Ignored => "ignored",
        }
    }
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        let body = match self {
            Self::Processed { message, summary } => json!({
                "message": message,
                "processed": summary.processed,
                "successful": summary.successful,
                "failed": summary.failed,
                "results": summary.results,
            }),
            Self::Ignored => json!({
                "message": "ignored",
                "processed": 0,
                "ignored": true,
            }),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

// ============================================================================
// Signal audit
// ============================================================================

/// Writes at most one signal log row per delivery.
struct SignalAudit<'a> {
    logs: &'a dyn SignalLogStore,
    payload: &'a Value,
    signature: Option<String>,
    strategy_id: Option<String>,
    alert: Option<Alert>,
    logged: bool,
}

impl<'a> SignalAudit<'a> {
    fn new(logs: &'a dyn SignalLogStore, payload: &'a Value, signature: Option<String>) -> Self {
        Self {
            logs,
            payload,
            signature,
            strategy_id: None,
            alert: None,
            logged: false,
        }
    }

    fn record(&mut self, status: SignalStatus) -> GatewayResult<()> {
        if self.logged {
            return Ok(());
        }
        let entry = SignalLogEntry::new(
            self.strategy_id.clone(),
            self.payload.clone(),
            self.signature.clone(),
            status,
            self.alert.as_ref(),
        );
        self.logs.insert_signal_log(entry)?;
        self.logged = true;
        debug!(strategy_id = ?self.strategy_id, %status, "Signal logged");
        Ok(())
    }

    /// Record without letting a logging failure replace the caller's error.
    fn record_quietly(&mut self, status: SignalStatus) {
        if let Err(e) = self.record(status) {
            warn!(%status, error = %e, "Failed to write signal log");
        }
    }

    fn reject(&mut self, error: CoreError) -> GatewayError {
        self.record_quietly(SignalStatus::Invalid);
        GatewayError::Validation(error.to_string())
    }

    fn alert_type_label(&self) -> &'static str {
        self.alert
            .as_ref()
            .map(|a| a.alert_type.as_str())
            .unwrap_or("unknown")
    }
}

// ============================================================================
// Handler
// ============================================================================

/// `POST /webhook`
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<WebhookOutcome> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Validation(format!("Invalid JSON body: {e}")))?;
    let name = extract_strategy_name(&payload)
        .ok_or_else(|| GatewayError::Validation(CoreError::MissingField("strategy").to_string()))?;

    let mut audit = SignalAudit::new(
        state.signal_logs.as_ref(),
        &payload,
        signature_header(&headers),
    );

    let result = process(&state, &name, &mut audit).await;

    let outcome = match &result {
        Ok(outcome) => outcome.label(),
        Err(e) if e.status().is_server_error() => {
            warn!(strategy = %name, error = %e, "Signal processing failed");
            audit.record_quietly(SignalStatus::Failed);
            "failed"
        }
        Err(e) if e.status() == StatusCode::NOT_FOUND => "rejected",
        Err(_) => "invalid",
    };
    Metrics::signal(audit.alert_type_label(), outcome);

    result
}

async fn process(
    state: &AppState,
    name: &str,
    audit: &mut SignalAudit<'_>,
) -> GatewayResult<WebhookOutcome> {
    let strategies = state.strategies.active_strategies()?;
    if strategies.is_empty() {
        warn!(strategy = %name, "Signal received but no strategy is active");
        audit.record_quietly(SignalStatus::Failed);
        return Err(GatewayError::NoActiveStrategies);
    }

    let Some(strategy) = strategies.iter().find(|s| s.matches_name(name)).cloned() else {
        warn!(strategy = %name, "Signal for unknown strategy");
        audit.record_quietly(SignalStatus::Invalid);
        return Err(GatewayError::StrategyNotFound {
            name: name.to_string(),
            available: strategies.into_iter().map(|s| s.name).collect(),
        });
    };
    audit.strategy_id = Some(strategy.id.clone());

    let alert = Alert::from_payload(audit.payload).map_err(|e| audit.reject(e))?;
    audit.alert = Some(alert.clone());

    info!(
        strategy = %strategy.name,
        symbol = %alert.symbol,
        alert_type = %alert.alert_type,
        trade_id = ?alert.trade_id,
        "Signal received"
    );

    let action = match alert.alert_type {
        AlertType::Entry => SignalAction::Open(alert.entry_params().map_err(|e| audit.reject(e))?),
        AlertType::Breakeven => {
            let params = alert.breakeven_params().map_err(|e| audit.reject(e))?;
            if !has_prior_entry(state, &strategy.id, &alert) {
                return Ok(WebhookOutcome::Ignored);
            }
            SignalAction::MoveStop(params)
        }
        AlertType::StopLoss | AlertType::TakeProfit => {
            if !has_prior_entry(state, &strategy.id, &alert) {
                return Ok(WebhookOutcome::Ignored);
            }
            SignalAction::Close
        }
    };

    // Entry intent is audited before any order goes out; exits only after
    // the close protocol ran.
    if !alert.alert_type.is_exit() {
        audit.record(SignalStatus::Success)?;
    }
    let summary = state.dispatcher.dispatch(&strategy, &alert, &action).await?;
    if alert.alert_type.is_exit() {
        audit.record(SignalStatus::Success)?;
    }

    info!(
        strategy = %strategy.name,
        symbol = %alert.symbol,
        alert_type = %alert.alert_type,
        processed = summary.processed,
        successful = summary.successful,
        failed = summary.failed,
        "Signal processed"
    );

    Ok(WebhookOutcome::Processed {
        message: format!("{} signal processed", alert.alert_type),
        summary,
    })
}

/// Exit gate. Orphans are logged here and nowhere else.
fn has_prior_entry(state: &AppState, strategy_id: &str, alert: &Alert) -> bool {
    let found =
        state
            .ledger
            .has_prior_entry(strategy_id, alert.trade_id.as_deref(), Some(&alert.symbol));
    if !found {
        info!(
            strategy_id,
            symbol = %alert.symbol,
            alert_type = %alert.alert_type,
            trade_id = ?alert.trade_id,
            "Exit signal without a prior entry, ignoring"
        );
    }
    found
}

fn signature_header(headers: &HeaderMap) -> Option<String> {
    SIGNATURE_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}
