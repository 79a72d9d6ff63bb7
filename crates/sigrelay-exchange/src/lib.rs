//! Futures exchange client for sigrelay.
//!
//! Signs and sends REST calls to the exchange's v2 mix API, caches ticker
//! prices for a few seconds, writes one operation-log row per private call
//! and translates vendor errors into user-facing messages.
//!
//! Callers depend on [`ExchangeApi`]; [`BitgetClient`] is the live
//! implementation and [`MockExchange`] the in-memory one used in tests.

pub mod api;
pub mod audit;
pub mod client;
pub mod clock;
pub mod error;
pub mod mock;
pub mod price_cache;
pub mod settings;
pub mod signer;
pub mod translate;
pub mod types;

pub use api::{
    BoxFuture, DynConnector, DynExchange, ExchangeApi, ExchangeConnector, MarketScope,
    OrderRequest, TriggerRequest,
};
pub use audit::{redacted_headers, OperationSink};
pub use client::{build_http_client, BitgetClient, BitgetConnector};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ExchangeError, ExchangeResult};
pub use mock::{position, MockConnector, MockExchange, MockOp};
pub use price_cache::{PriceCache, DEFAULT_PRICE_TTL_MS};
pub use settings::ExchangeSettings;
pub use signer::RequestSigner;
pub use translate::{translate, translate_error};
pub use types::{
    AccountBalance, CancelTally, Envelope, HistoricalOrder, HistoricalPosition, OrderAck,
    PendingPlanOrder, PlanType, Position, SUCCESS_CODE,
};
