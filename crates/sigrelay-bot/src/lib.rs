//! sigrelay - trading signal relay.
//!
//! Wires the components into one service:
//! - Journaled record store (signal audit, trades, mass-trade runs)
//! - Bitget REST connector
//! - HTTP gateway for webhooks and mass-trade streams

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, CredentialEntry, PersistenceConfig, SubscriptionEntry};
pub use error::{AppError, AppResult};
