//! Shared harness: the real router over an in-memory store and a mock
//! exchange.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::Value;
use sigrelay_core::{
    ContractSpec, Credential, MassTradeConfig, MassTradeSymbol, Side, Size, Strategy,
    Subscription,
};
use sigrelay_exchange::{MockConnector, MockExchange};
use sigrelay_gateway::{create_router, AppState, ServerConfig};
use sigrelay_persistence::JournaledStore;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<JournaledStore>,
    pub mock: Arc<MockExchange>,
    pub connector: Arc<MockConnector>,
}

impl TestApp {
    /// One active strategy "Alpha" with one subscriber, and one mass-trade
    /// config owned by `u1` over BTCUSDT, ETHUSDT and SOLUSDT.
    pub fn new() -> Self {
        let app = Self::empty();
        app.store.seed_strategies(vec![Strategy {
            id: "s1".into(),
            name: "Alpha".into(),
            active: true,
        }]);
        app.store.seed_subscriptions(vec![Subscription {
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
        app.store
            .seed_mass_trade_configs(vec![mass_config(&["BTCUSDT", "ETHUSDT", "SOLUSDT"])]);
        app
    }

    /// No strategies or configs; the exchange is primed.
    pub fn empty() -> Self {
        let mock = Arc::new(MockExchange::new());
        for (symbol, price) in [
            ("BTCUSDT", dec!(50000)),
            ("ETHUSDT", dec!(2500)),
            ("SOLUSDT", dec!(100)),
        ] {
            mock.set_price(symbol, price);
            mock.set_contract(
                symbol,
                ContractSpec {
                    min_trade_size: Size::new(dec!(0.001)),
                    size_increment: Size::new(dec!(0.001)),
                    volume_decimals: 3,
                    price_decimals: 2,
                },
            );
        }
        mock.set_balance(dec!(1000));

        let connector = Arc::new(MockConnector::new(mock.clone()));
        let store = Arc::new(JournaledStore::in_memory());
        store.seed_credentials(vec![
            Credential::new("c1", "u1", "key", "secret", "pass"),
            Credential::new("c2", "u2", "key", "secret", "pass"),
        ]);

        let state = AppState::new(store.clone(), connector.clone(), ServerConfig::default());
        Self {
            router: create_router(state),
            store,
            mock,
            connector,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let (status, text) = self.post_raw(path, body.to_string(), headers).await;
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    pub async fn post_raw(
        &self,
        path: &str,
        body: String,
        headers: &[(&str, &str)],
    ) -> (StatusCode, String) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> (StatusCode, String) {
        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

pub fn mass_config(symbols: &[&str]) -> MassTradeConfig {
    MassTradeConfig {
        id: "cfg-1".into(),
        user_id: "u1".into(),
        name: "majors".into(),
        credential_id: "c1".into(),
        side: Side::Buy,
        leverage: 5,
        stop_loss_percent: dec!(2),
        take_profit_percent: Some(dec!(4)),
        position_size_usdt: dec!(10),
        symbols: symbols
            .iter()
            .map(|s| MassTradeSymbol {
                symbol: s.to_string(),
                sl_percent: None,
                tp_percent: None,
            })
            .collect(),
        product_type: "USDT-FUTURES".into(),
        margin_coin: "USDT".into(),
    }
}

/// Parsed server-sent event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub name: String,
    pub data: Value,
}

/// Split an SSE body into events, skipping keep-alive comments.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push_str(v.trim_start());
                }
            }
            Some(SseEvent {
                name: name?,
                data: serde_json::from_str(&data).unwrap_or(Value::Null),
            })
        })
        .collect()
}
