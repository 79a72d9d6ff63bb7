//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] sigrelay_exchange::ExchangeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sigrelay_persistence::PersistenceError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] sigrelay_gateway::GatewayError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigrelay_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
