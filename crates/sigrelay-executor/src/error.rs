//! Executor error types.

use sigrelay_core::{CoreError, Size};
use sigrelay_exchange::{translate, ExchangeError};
use sigrelay_persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Computed order size is below the contract minimum.
    #[error("Order size {size} for {symbol} is below the minimum {min}")]
    SizeTooSmall { symbol: String, size: Size, min: Size },

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid input: {0}")]
    Invalid(#[from] CoreError),

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    /// Top-level failure after the progress stream already emitted events.
    #[error("Failed after streaming began: {0}")]
    StreamAlreadyStarted(String),
}

impl ExecutorError {
    /// Message safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Exchange(e) => translate(e),
            Self::SizeTooSmall { .. } => {
                "El tamaño de la orden es menor que el mínimo permitido".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
