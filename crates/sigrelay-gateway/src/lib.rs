//! sigrelay-gateway - HTTP entry point for trading signals and mass trades.
//!
//! # Routes
//!
//! ```text
//! POST /webhook, /api/webhook                  → signal intake
//! POST /api/mass-trade/configs/{id}/execute    → SSE progress stream
//! POST /api/mass-trade/configs/{id}/close-all  → SSE progress stream
//! GET  /api/mass-trade/configs/{id}/executions → run history
//! GET  /health                                 → liveness
//! GET  /metrics                                → Prometheus text format
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sigrelay_gateway::{run_server, AppState, ServerConfig};
//!
//! let state = AppState::new(store, connector, ServerConfig::default());
//! run_server(state, shutdown_signal()).await?;
//! ```

pub mod config;
pub mod error;
pub mod mass_trade;
pub mod server;
pub mod state;
pub mod webhook;

pub use config::ServerConfig;
pub use error::{GatewayError, GatewayResult};
pub use mass_trade::{RunRequest, USER_ID_HEADER};
pub use server::{create_router, run_server};
pub use state::AppState;
pub use webhook::{WebhookOutcome, SIGNATURE_HEADERS};
