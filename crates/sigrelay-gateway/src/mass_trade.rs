//! Mass-trade routes.
//!
//! Runs stream their progress as server-sent events. Everything that can be
//! checked before the first event (ownership, credential, retry subset) is
//! answered with an ordinary HTTP error; after that only an `error` event
//! can report failure.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::Json;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use sigrelay_core::{normalize_symbol, MassTradeConfig, MassTradeExecution};
use sigrelay_exchange::{DynExchange, MarketScope};
use sigrelay_executor::{BatchExecutor, ProgressEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// Authenticated caller, set by the upstream proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Optional body of a run request.
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    /// Retry subset. Absent means the whole config.
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
}

/// A run that passed every pre-stream check.
struct PreparedRun {
    config: MassTradeConfig,
    subset: Option<Vec<String>>,
    exchange: DynExchange,
}

type ProgressStream = Sse<KeepAliveStream<BoxStream<'static, Result<Event, Infallible>>>>;

/// `POST /api/mass-trade/configs/{id}/execute`
pub async fn execute(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<ProgressStream> {
    let run = prepare(&state, &config_id, &headers, &body)?;
    let (tx, rx) = mpsc::channel(state.config.progress_buffer);
    let executor = BatchExecutor::new(
        run.exchange,
        state.mass_trades.clone(),
        state.trade_records.clone(),
    );

    tokio::spawn(async move {
        match executor.execute(&run.config, run.subset.as_deref(), tx).await {
            Ok(execution) => info!(
                config_id = %run.config.id,
                execution_id = %execution.id,
                successful = execution.successful,
                failed = execution.failed,
                "Mass trade run finished"
            ),
            Err(e) => warn!(config_id = %run.config.id, error = %e, "Mass trade run failed"),
        }
    });

    Ok(progress_stream(rx))
}

/// `POST /api/mass-trade/configs/{id}/close-all`
pub async fn close_all(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<ProgressStream> {
    let run = prepare(&state, &config_id, &headers, &body)?;
    let (tx, rx) = mpsc::channel(state.config.progress_buffer);
    let executor = BatchExecutor::new(
        run.exchange,
        state.mass_trades.clone(),
        state.trade_records.clone(),
    );

    tokio::spawn(async move {
        match executor.close_all(&run.config, run.subset.as_deref(), tx).await {
            Ok(results) => info!(
                config_id = %run.config.id,
                closed = results.iter().filter(|r| r.success).count(),
                total = results.len(),
                "Mass close finished"
            ),
            Err(e) => warn!(config_id = %run.config.id, error = %e, "Mass close failed"),
        }
    });

    Ok(progress_stream(rx))
}

/// `GET /api/mass-trade/configs/{id}/executions`
pub async fn executions(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
    headers: HeaderMap,
) -> GatewayResult<Json<Vec<MassTradeExecution>>> {
    let config = owned_config(&state, &config_id, &headers)?;
    let runs = state.mass_trades.executions_for_config(&config.id)?;
    Ok(Json(runs))
}

fn prepare(
    state: &AppState,
    config_id: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> GatewayResult<PreparedRun> {
    let config = owned_config(state, config_id, headers)?;
    let subset = parse_subset(&config, body)?;

    let credential = state
        .credentials
        .credential(&config.credential_id)?
        .filter(|c| c.user_id == config.user_id)
        .ok_or_else(|| GatewayError::CredentialNotFound(config.credential_id.clone()))?;

    let scope = MarketScope::new(&config.product_type, &config.margin_coin);
    let exchange = state.connector.connect(&credential, &scope, None)?;

    Ok(PreparedRun {
        config,
        subset,
        exchange,
    })
}

/// Load a config and check it belongs to the caller. Not-owned and missing
/// look the same to the caller.
fn owned_config(
    state: &AppState,
    config_id: &str,
    headers: &HeaderMap,
) -> GatewayResult<MassTradeConfig> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(GatewayError::Unauthenticated)?;

    state
        .mass_trades
        .mass_trade_config(config_id)?
        .filter(|c| c.user_id == user_id)
        .ok_or_else(|| GatewayError::ConfigNotFound(config_id.to_string()))
}

fn parse_subset(config: &MassTradeConfig, body: &Bytes) -> GatewayResult<Option<Vec<String>>> {
    let request: RunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::Validation(format!("Invalid JSON body: {e}")))?
    };

    let Some(symbols) = request.symbols else {
        return Ok(None);
    };
    let symbols: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
    if symbols.is_empty() {
        return Err(GatewayError::Validation(
            "symbols must not be empty".to_string(),
        ));
    }
    let unknown = config.unknown_symbols(&symbols);
    if !unknown.is_empty() {
        return Err(GatewayError::Validation(format!(
            "Symbols not in config: {}",
            unknown.join(", ")
        )));
    }
    Ok(Some(symbols))
}

fn progress_stream(rx: mpsc::Receiver<ProgressEvent>) -> ProgressStream {
    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(to_sse_event(&event)), rx))
    });
    Sse::new(events.boxed()).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event.data().to_string())
}
