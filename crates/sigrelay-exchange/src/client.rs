//! Signed REST client for the exchange's v2 mix (futures) API.
//!
//! Every private call is signed, timed, counted and written to the operation
//! log. Public market-data calls are unsigned and not audited. The client
//! never retries; callers decide.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sigrelay_core::{ContractSpec, Credential, OperationType, OrderType, Price};
use sigrelay_telemetry::Metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{
    BoxFuture, DynExchange, ExchangeApi, ExchangeConnector, MarketScope, OrderRequest,
    TriggerRequest,
};
use crate::audit::{self, redacted_headers, CallRecord, OperationSink};
use crate::clock::{Clock, SystemClock};
use crate::error::{ExchangeError, ExchangeResult};
use crate::price_cache::PriceCache;
use crate::settings::ExchangeSettings;
use crate::signer::RequestSigner;
use crate::types::{
    AccountBalance, CancelPlanRequest, CancelPlanResponse, EntrustedList, Envelope,
    HistoricalOrder, HistoricalPosition, OrderAck, OrderIdRef, PendingPlanOrder,
    PlaceOrderRequest, Position, PositionHistoryList, RawAccount, RawContract, RawPosition,
    RawTicker, SetLeverageRequest, TpslOrderRequest,
};

const TICKER_PATH: &str = "/api/v2/mix/market/ticker";
const CONTRACTS_PATH: &str = "/api/v2/mix/market/contracts";
const PLACE_ORDER_PATH: &str = "/api/v2/mix/order/place-order";
const PLACE_TPSL_PATH: &str = "/api/v2/mix/order/place-tpsl-order";
const PLAN_PENDING_PATH: &str = "/api/v2/mix/order/orders-plan-pending";
const CANCEL_PLAN_PATH: &str = "/api/v2/mix/order/cancel-plan-order";
const ORDERS_HISTORY_PATH: &str = "/api/v2/mix/order/orders-history";
const ALL_POSITION_PATH: &str = "/api/v2/mix/position/all-position";
const HISTORY_POSITION_PATH: &str = "/api/v2/mix/position/history-position";
const SET_LEVERAGE_PATH: &str = "/api/v2/mix/account/set-leverage";
const ACCOUNTS_PATH: &str = "/api/v2/mix/account/accounts";

/// Plan type covering every stop-loss/take-profit trigger.
const PROFIT_LOSS_PLAN: &str = "profit_loss";

/// Error bodies kept in messages are cut to this many characters.
const MAX_ERROR_BODY: usize = 500;

/// Build a reqwest client with the configured timeout.
pub fn build_http_client(settings: &ExchangeSettings) -> ExchangeResult<Client> {
    Client::builder()
        .timeout(settings.timeout())
        .build()
        .map_err(|e| ExchangeError::Client(format!("Failed to create HTTP client: {e}")))
}

/// Append an url-encoded query string to `path`.
pub(crate) fn with_query(path: &str, query: &[(&str, String)]) -> ExchangeResult<String> {
    if query.is_empty() {
        return Ok(path.to_string());
    }
    let encoded = serde_urlencoded::to_string(query)
        .map_err(|e| ExchangeError::Client(format!("Failed to encode query: {e}")))?;
    Ok(format!("{path}?{encoded}"))
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY).collect()
}

/// Turn a decoded response body into the envelope's `data` or an error.
pub(crate) fn interpret_envelope(status: StatusCode, body: &Value) -> ExchangeResult<Value> {
    let envelope: Envelope<Value> = match serde_json::from_value(body.clone()) {
        Ok(env) => env,
        Err(e) if status.is_success() => {
            return Err(ExchangeError::Decode(format!("Unexpected response shape: {e}")))
        }
        Err(_) => {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body: truncate(&body.to_string()),
            })
        }
    };

    if !envelope.is_success() {
        return Err(ExchangeError::Api {
            code: envelope.code,
            message: envelope.msg,
        });
    }
    if !status.is_success() {
        return Err(ExchangeError::Http {
            status: status.as_u16(),
            body: truncate(&body.to_string()),
        });
    }
    Ok(envelope.data.unwrap_or(Value::Null))
}

fn decode<T: DeserializeOwned>(data: Value) -> ExchangeResult<T> {
    serde_json::from_value(data).map_err(|e| ExchangeError::Decode(e.to_string()))
}

/// Raw result of one HTTP exchange, before typed decoding.
struct RawOutcome {
    status: Option<u16>,
    body: Option<Value>,
    data: ExchangeResult<Value>,
}

async fn execute(request: RequestBuilder) -> RawOutcome {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            let message = if e.is_timeout() {
                format!("request timed out: {e}")
            } else {
                e.to_string()
            };
            return RawOutcome {
                status: None,
                body: None,
                data: Err(ExchangeError::Transport(message)),
            };
        }
    };

    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            return RawOutcome {
                status: Some(status.as_u16()),
                body: None,
                data: Err(ExchangeError::Transport(format!("Failed to read body: {e}"))),
            }
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(body) => {
            let data = interpret_envelope(status, &body);
            RawOutcome {
                status: Some(status.as_u16()),
                body: Some(body),
                data,
            }
        }
        Err(_) => {
            let data = if status.is_success() {
                Err(ExchangeError::Decode(format!(
                    "Non-JSON response: {}",
                    truncate(&text)
                )))
            } else {
                Err(ExchangeError::Http {
                    status: status.as_u16(),
                    body: truncate(&text),
                })
            };
            RawOutcome {
                status: Some(status.as_u16()),
                body: Some(Value::String(truncate(&text))),
                data,
            }
        }
    }
}

/// A private call about to be made.
struct PrivateCall<'a> {
    operation: OperationType,
    method: Method,
    path: &'static str,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
    symbol: Option<&'a str>,
    client_oid: Option<&'a str>,
}

/// REST client bound to one credential and market scope.
pub struct BitgetClient {
    http: Client,
    settings: Arc<ExchangeSettings>,
    credential: Credential,
    scope: MarketScope,
    strategy_id: Option<String>,
    price_cache: Arc<PriceCache>,
    sink: OperationSink,
    clock: Arc<dyn Clock>,
}

impl BitgetClient {
    fn url(&self, request_path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), request_path)
    }

    /// Unsigned market-data GET.
    async fn public_get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &'static str,
        query: Vec<(&'static str, String)>,
    ) -> ExchangeResult<T> {
        let url = self.url(&with_query(path, &query)?);
        debug!(%url, "Exchange public request");

        let started = Instant::now();
        let outcome = execute(self.http.get(&url).header("locale", &self.settings.locale)).await;
        let result = outcome.data.and_then(decode::<T>);

        let outcome_label = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome_label(),
        };
        Metrics::exchange_request(
            endpoint,
            outcome_label,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        result
    }

    /// Signed call with audit row and metrics.
    async fn private<T: DeserializeOwned>(&self, call: PrivateCall<'_>) -> ExchangeResult<T> {
        let request_path = with_query(call.path, &call.query)?;
        let body = call
            .body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let timestamp = self.clock.now_ms().to_string();
        let signature = RequestSigner::new(&self.credential.secret).sign(
            &timestamp,
            call.method.as_str(),
            &request_path,
            &body,
        )?;
        let url = self.url(&request_path);

        let mut request = self
            .http
            .request(call.method.clone(), &url)
            .header("ACCESS-KEY", &self.credential.api_key)
            .header("ACCESS-SIGN", &signature)
            .header("ACCESS-TIMESTAMP", &timestamp)
            .header("ACCESS-PASSPHRASE", self.credential.passphrase.as_str())
            .header("locale", &self.settings.locale)
            .header(CONTENT_TYPE, "application/json");
        if !body.is_empty() {
            request = request.body(body);
        }

        debug!(
            operation = %call.operation,
            method = %call.method,
            path = %request_path,
            symbol = call.symbol.unwrap_or(""),
            "Exchange private request"
        );

        let started = Instant::now();
        let outcome = execute(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let order_id = outcome
            .data
            .as_ref()
            .ok()
            .and_then(|d| d.get("orderId"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let result = outcome.data.and_then(decode::<T>);
        let error_message = result.as_ref().err().map(ToString::to_string);

        match &result {
            Ok(_) => Metrics::exchange_request(call.operation.as_str(), "ok", duration_ms as f64),
            Err(e) => {
                warn!(
                    operation = %call.operation,
                    symbol = call.symbol.unwrap_or(""),
                    status = ?outcome.status,
                    error = %e,
                    "Exchange call failed"
                );
                Metrics::exchange_request(
                    call.operation.as_str(),
                    e.outcome_label(),
                    duration_ms as f64,
                );
            }
        }

        let row = CallRecord {
            user_id: &self.credential.user_id,
            strategy_id: self.strategy_id.as_deref(),
            symbol: call.symbol,
            operation_type: call.operation,
            http_method: call.method.as_str(),
            endpoint: call.path,
            full_url: &url,
            request_payload: call.body,
            request_headers: redacted_headers(
                &self.credential.api_key,
                &timestamp,
                &self.settings.locale,
            ),
            response_data: outcome.body,
            response_status: outcome.status,
            error_message,
            order_id,
            client_oid: call.client_oid,
            duration_ms,
        };
        audit::record(&self.sink, row.into_log());

        result
    }

    fn to_body<B: Serialize>(body: &B) -> ExchangeResult<Value> {
        serde_json::to_value(body).map_err(|e| ExchangeError::Client(e.to_string()))
    }

    fn scope_query(&self) -> Vec<(&'static str, String)> {
        vec![("productType", self.scope.product_type.clone())]
    }

    async fn fetch_ticker_price(&self, symbol: &str) -> ExchangeResult<Price> {
        let key = PriceCache::key(symbol, &self.scope.product_type);
        if let Some(price) = self.price_cache.get(&key) {
            Metrics::price_cache_hit();
            return Ok(price);
        }
        Metrics::price_cache_miss();

        let mut query = vec![("symbol", symbol.to_string())];
        query.extend(self.scope_query());
        let tickers: Vec<RawTicker> = self.public_get("ticker", TICKER_PATH, query).await?;
        let price = ticker_price_for(&tickers, symbol)?;

        self.price_cache.put(key, price);
        Ok(price)
    }

    async fn fetch_contract_spec(&self, symbol: &str) -> ExchangeResult<ContractSpec> {
        let mut query = self.scope_query();
        query.push(("symbol", symbol.to_string()));
        let contracts: Vec<RawContract> =
            self.public_get("contracts", CONTRACTS_PATH, query).await?;
        contracts
            .iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| ExchangeError::NotFound(format!("contract {symbol}")))?
            .to_spec()
    }

    async fn submit_order(&self, order: OrderRequest) -> ExchangeResult<OrderAck> {
        let is_limit = order.order_type == OrderType::Limit;
        let request = PlaceOrderRequest {
            symbol: order.symbol.clone(),
            product_type: self.scope.product_type.clone(),
            margin_mode: self.settings.margin_mode.clone(),
            margin_coin: self.scope.margin_coin.clone(),
            size: order.size.to_string(),
            price: if is_limit {
                order.price.map(|p| p.to_string())
            } else {
                None
            },
            side: order.side,
            order_type: if is_limit { "limit" } else { "market" }.to_string(),
            force: is_limit.then(|| "gtc".to_string()),
            client_oid: order.client_oid.to_string(),
            reduce_only: order.reduce_only.then(|| "YES".to_string()),
        };

        let ack: OrderAck = self
            .private(PrivateCall {
                operation: OperationType::PlaceOrder,
                method: Method::POST,
                path: PLACE_ORDER_PATH,
                query: Vec::new(),
                body: Some(Self::to_body(&request)?),
                symbol: Some(&order.symbol),
                client_oid: Some(order.client_oid.as_str()),
            })
            .await?;

        info!(
            symbol = %order.symbol,
            side = %order.side,
            size = %order.size,
            reduce_only = order.reduce_only,
            order_id = %ack.order_id,
            client_oid = %order.client_oid,
            "Order placed"
        );
        Ok(ack)
    }

    async fn submit_trigger(&self, order: TriggerRequest) -> ExchangeResult<OrderAck> {
        let request = TpslOrderRequest {
            margin_coin: self.scope.margin_coin.clone(),
            product_type: self.scope.product_type.clone(),
            symbol: order.symbol.clone(),
            plan_type: order.plan_type,
            trigger_price: order.trigger_price.to_string(),
            trigger_type: "mark_price".to_string(),
            execute_price: "0".to_string(),
            hold_side: order.hold_side,
            size: order.size.to_string(),
            client_oid: order.client_oid.to_string(),
        };

        let ack: OrderAck = self
            .private(PrivateCall {
                operation: OperationType::PlaceTpslOrder,
                method: Method::POST,
                path: PLACE_TPSL_PATH,
                query: Vec::new(),
                body: Some(Self::to_body(&request)?),
                symbol: Some(&order.symbol),
                client_oid: Some(order.client_oid.as_str()),
            })
            .await?;

        info!(
            symbol = %order.symbol,
            plan_type = ?order.plan_type,
            trigger_price = %order.trigger_price,
            size = %order.size,
            order_id = %ack.order_id,
            "Trigger order placed"
        );
        Ok(ack)
    }

    async fn fetch_pending_triggers(&self, symbol: &str) -> ExchangeResult<Vec<PendingPlanOrder>> {
        let mut query = self.scope_query();
        query.push(("planType", PROFIT_LOSS_PLAN.to_string()));
        query.push(("symbol", symbol.to_string()));
        let list: Option<EntrustedList<PendingPlanOrder>> = self
            .private(PrivateCall {
                operation: OperationType::PendingPlanOrders,
                method: Method::GET,
                path: PLAN_PENDING_PATH,
                query,
                body: None,
                symbol: Some(symbol),
                client_oid: None,
            })
            .await?;
        Ok(list.and_then(|l| l.entrusted_list).unwrap_or_default())
    }

    async fn cancel_trigger(&self, order: &PendingPlanOrder) -> ExchangeResult<()> {
        let request = CancelPlanRequest {
            symbol: order.symbol.clone(),
            product_type: self.scope.product_type.clone(),
            margin_coin: self.scope.margin_coin.clone(),
            plan_type: PROFIT_LOSS_PLAN.to_string(),
            order_id_list: vec![OrderIdRef {
                order_id: order.order_id.clone(),
                client_oid: order.client_oid.clone(),
            }],
        };
        let response: Option<CancelPlanResponse> = self
            .private(PrivateCall {
                operation: OperationType::CancelPlanOrder,
                method: Method::POST,
                path: CANCEL_PLAN_PATH,
                query: Vec::new(),
                body: Some(Self::to_body(&request)?),
                symbol: Some(&order.symbol),
                client_oid: order.client_oid.as_deref(),
            })
            .await?;

        match response.and_then(|r| r.failure_list.into_iter().next()) {
            Some(failure) => Err(ExchangeError::Api {
                code: "cancel_failed".to_string(),
                message: failure
                    .error_msg
                    .unwrap_or_else(|| format!("order {} not cancelled", order.order_id)),
            }),
            None => Ok(()),
        }
    }

    async fn fetch_positions(&self) -> ExchangeResult<Vec<Position>> {
        let mut query = self.scope_query();
        query.push(("marginCoin", self.scope.margin_coin.clone()));
        let raw: Option<Vec<RawPosition>> = self
            .private(PrivateCall {
                operation: OperationType::AllPositions,
                method: Method::GET,
                path: ALL_POSITION_PATH,
                query,
                body: None,
                symbol: None,
                client_oid: None,
            })
            .await?;

        let mut positions = Vec::new();
        for entry in raw.unwrap_or_default() {
            let position = entry.to_position()?;
            if position.size.is_positive() {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    async fn apply_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        let request = SetLeverageRequest {
            symbol: symbol.to_string(),
            product_type: self.scope.product_type.clone(),
            margin_coin: self.scope.margin_coin.clone(),
            leverage: leverage.to_string(),
        };
        let _: Value = self
            .private(PrivateCall {
                operation: OperationType::SetLeverage,
                method: Method::POST,
                path: SET_LEVERAGE_PATH,
                query: Vec::new(),
                body: Some(Self::to_body(&request)?),
                symbol: Some(symbol),
                client_oid: None,
            })
            .await?;
        debug!(symbol, leverage, "Leverage set");
        Ok(())
    }

    async fn fetch_balance(&self) -> ExchangeResult<AccountBalance> {
        let accounts: Option<Vec<RawAccount>> = self
            .private(PrivateCall {
                operation: OperationType::GetAccounts,
                method: Method::GET,
                path: ACCOUNTS_PATH,
                query: self.scope_query(),
                body: None,
                symbol: None,
                client_oid: None,
            })
            .await?;
        accounts
            .unwrap_or_default()
            .iter()
            .find(|a| a.margin_coin.eq_ignore_ascii_case(&self.scope.margin_coin))
            .ok_or_else(|| {
                ExchangeError::NotFound(format!("{} margin account", self.scope.margin_coin))
            })?
            .to_balance()
    }

    async fn fetch_orders_history(
        &self,
        symbol: Option<&str>,
    ) -> ExchangeResult<Vec<HistoricalOrder>> {
        let mut query = self.scope_query();
        if let Some(symbol) = symbol {
            query.push(("symbol", symbol.to_string()));
        }
        let list: Option<EntrustedList<HistoricalOrder>> = self
            .private(PrivateCall {
                operation: OperationType::OrdersHistory,
                method: Method::GET,
                path: ORDERS_HISTORY_PATH,
                query,
                body: None,
                symbol,
                client_oid: None,
            })
            .await?;
        Ok(list.and_then(|l| l.entrusted_list).unwrap_or_default())
    }

    async fn fetch_history_positions(
        &self,
        symbol: Option<&str>,
    ) -> ExchangeResult<Vec<HistoricalPosition>> {
        let mut query = self.scope_query();
        if let Some(symbol) = symbol {
            query.push(("symbol", symbol.to_string()));
        }
        let list: Option<PositionHistoryList> = self
            .private(PrivateCall {
                operation: OperationType::HistoryPositions,
                method: Method::GET,
                path: HISTORY_POSITION_PATH,
                query,
                body: None,
                symbol,
                client_oid: None,
            })
            .await?;
        Ok(list.and_then(|l| l.list).unwrap_or_default())
    }
}

impl ExchangeApi for BitgetClient {
    fn ticker_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<Price>> {
        Box::pin(self.fetch_ticker_price(symbol))
    }

    fn contract_spec<'a>(
        &'a self,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<ContractSpec>> {
        Box::pin(self.fetch_contract_spec(symbol))
    }

    fn place_order(&self, order: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderAck>> {
        Box::pin(self.submit_order(order))
    }

    fn place_trigger_order(
        &self,
        order: TriggerRequest,
    ) -> BoxFuture<'_, ExchangeResult<OrderAck>> {
        Box::pin(self.submit_trigger(order))
    }

    fn pending_trigger_orders<'a>(
        &'a self,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<PendingPlanOrder>>> {
        Box::pin(self.fetch_pending_triggers(symbol))
    }

    fn cancel_trigger_order<'a>(
        &'a self,
        order: &'a PendingPlanOrder,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(self.cancel_trigger(order))
    }

    fn positions(&self) -> BoxFuture<'_, ExchangeResult<Vec<Position>>> {
        Box::pin(self.fetch_positions())
    }

    fn set_leverage<'a>(
        &'a self,
        symbol: &'a str,
        leverage: u32,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(self.apply_leverage(symbol, leverage))
    }

    fn account_balance(&self) -> BoxFuture<'_, ExchangeResult<AccountBalance>> {
        Box::pin(self.fetch_balance())
    }

    fn orders_history<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<HistoricalOrder>>> {
        Box::pin(self.fetch_orders_history(symbol))
    }

    fn history_positions<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<HistoricalPosition>>> {
        Box::pin(self.fetch_history_positions(symbol))
    }
}

/// Creates [`BitgetClient`]s sharing one HTTP pool, price cache and audit sink.
pub struct BitgetConnector {
    http: Client,
    settings: Arc<ExchangeSettings>,
    price_cache: Arc<PriceCache>,
    sink: OperationSink,
    clock: Arc<dyn Clock>,
}

impl BitgetConnector {
    pub fn new(settings: ExchangeSettings, sink: OperationSink) -> ExchangeResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let http = build_http_client(&settings)?;
        let price_cache = Arc::new(PriceCache::new(settings.price_cache_ttl_ms, clock.clone()));

        info!(
            base_url = %settings.base_url,
            timeout_ms = settings.timeout_ms,
            price_cache_ttl_ms = settings.price_cache_ttl_ms,
            "Exchange connector ready"
        );

        Ok(Self {
            http,
            settings: Arc::new(settings),
            price_cache,
            sink,
            clock,
        })
    }

    pub fn price_cache(&self) -> &Arc<PriceCache> {
        &self.price_cache
    }
}

impl ExchangeConnector for BitgetConnector {
    fn connect(
        &self,
        credential: &Credential,
        scope: &MarketScope,
        strategy_id: Option<&str>,
    ) -> ExchangeResult<DynExchange> {
        Ok(Arc::new(BitgetClient {
            http: self.http.clone(),
            settings: self.settings.clone(),
            credential: credential.clone(),
            scope: scope.clone(),
            strategy_id: strategy_id.map(str::to_string),
            price_cache: self.price_cache.clone(),
            sink: self.sink.clone(),
            clock: self.clock.clone(),
        }))
    }
}

/// Price of `symbol` in a ticker response. Another symbol's ticker is never
/// taken as a stand-in.
fn ticker_price_for(tickers: &[RawTicker], symbol: &str) -> ExchangeResult<Price> {
    tickers
        .iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
        .ok_or_else(|| ExchangeError::NotFound(format!("ticker for {symbol}")))?
        .price()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ticker_for_other_symbol_is_not_used() {
        let tickers: Vec<RawTicker> = serde_json::from_value(json!([
            {"symbol": "ETHUSDT", "lastPr": "2500"},
            {"symbol": "btcusdt", "lastPr": "50000.5"}
        ]))
        .unwrap();
        assert_eq!(
            ticker_price_for(&tickers, "BTCUSDT").unwrap(),
            Price::new(rust_decimal_macros::dec!(50000.5))
        );

        let only_eth = &tickers[..1];
        assert!(matches!(
            ticker_price_for(only_eth, "BTCUSDT"),
            Err(ExchangeError::NotFound(_))
        ));
    }

    #[test]
    fn test_with_query_encodes_pairs() {
        let path = with_query(
            ACCOUNTS_PATH,
            &[("productType", "USDT-FUTURES".to_string())],
        )
        .unwrap();
        assert_eq!(path, "/api/v2/mix/account/accounts?productType=USDT-FUTURES");
        assert_eq!(with_query(TICKER_PATH, &[]).unwrap(), TICKER_PATH);
    }

    #[test]
    fn test_envelope_success_returns_data() {
        let body = json!({"code": "00000", "msg": "success", "data": {"orderId": "1"}});
        let data = interpret_envelope(StatusCode::OK, &body).unwrap();
        assert_eq!(data["orderId"], "1");
    }

    #[test]
    fn test_envelope_business_error() {
        let body = json!({"code": "40762", "msg": "The order amount exceeds the balance", "data": null});
        let err = interpret_envelope(StatusCode::BAD_REQUEST, &body).unwrap_err();
        assert_eq!(
            err,
            ExchangeError::Api {
                code: "40762".into(),
                message: "The order amount exceeds the balance".into()
            }
        );
    }

    #[test]
    fn test_non_envelope_error_status() {
        let body = json!({"error": "gateway"});
        let err = interpret_envelope(StatusCode::BAD_GATEWAY, &body).unwrap_err();
        assert!(matches!(err, ExchangeError::Http { status: 502, .. }));
    }

    #[test]
    fn test_null_data_decodes_as_option() {
        let data = interpret_envelope(
            StatusCode::OK,
            &json!({"code": "00000", "msg": "success", "data": null}),
        )
        .unwrap();
        let decoded: Option<Vec<RawPosition>> = decode(data).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_connector_shares_price_cache() {
        let sink: OperationSink = Arc::new(sigrelay_persistence::JournaledStore::in_memory());
        let connector = BitgetConnector::new(ExchangeSettings::default(), sink).unwrap();
        let credential = Credential::new("c1", "u1", "key", "secret", "pass");
        let scope = MarketScope::new("USDT-FUTURES", "USDT");
        assert!(connector.connect(&credential, &scope, Some("s1")).is_ok());
        assert!(connector.price_cache().is_empty());
    }
}
