//! Gateway error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sigrelay_exchange::{translate, ExchangeError};
use sigrelay_executor::ExecutorError;
use sigrelay_persistence::PersistenceError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed request input.
    #[error("{0}")]
    Validation(String),

    #[error("No active strategy named '{name}'")]
    StrategyNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("There are no active strategies")]
    NoActiveStrategies,

    /// Caller identity header missing.
    #[error("Missing caller identity")]
    Unauthenticated,

    #[error("Mass trade config not found: {0}")]
    ConfigNotFound(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Execution error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::StrategyNotFound { .. }
            | Self::NoActiveStrategies
            | Self::ConfigNotFound(_)
            | Self::CredentialNotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Executor(ExecutorError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Exchange(_) | Self::Executor(_) | Self::Persistence(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label for the `error` field.
    fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation error",
            Self::StrategyNotFound { .. } => "Strategy not found",
            Self::NoActiveStrategies => "No active strategies",
            Self::Unauthenticated => "Unauthorized",
            Self::ConfigNotFound(_) => "Mass trade config not found",
            Self::CredentialNotFound(_) => "Credential not found",
            Self::Executor(ExecutorError::Invalid(_)) => "Validation error",
            _ => "Internal server error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::StrategyNotFound { available, .. } => json!({
                "error": self.label(),
                "message": self.to_string(),
                "availableStrategies": available,
            }),
            Self::Exchange(e) => {
                error!(error = %e, "Request failed on exchange call");
                json!({ "error": translate(e) })
            }
            Self::Executor(ExecutorError::Invalid(e)) => json!({
                "error": self.label(),
                "message": e.to_string(),
            }),
            Self::Executor(e) => {
                error!(error = %e, "Request failed during execution");
                json!({ "error": e.user_message() })
            }
            Self::Persistence(_) | Self::Internal(_) => {
                error!(error = %self, "Request failed");
                json!({ "error": self.label() })
            }
            _ => json!({
                "error": self.label(),
                "message": self.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
