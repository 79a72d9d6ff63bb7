//! Exchange client error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The exchange answered with a non-success business code.
    #[error("Exchange API error {code}: {message}")]
    Api { code: String, message: String },

    /// Non-2xx HTTP status without a decodable error envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    /// Connection failure or timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    /// The call succeeded but returned nothing for the requested item.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ExchangeError {
    /// Raw vendor message, used for error translation.
    pub fn vendor_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Http { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }

    /// Label used in the request counter.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Api { .. } => "api_error",
            Self::Http { .. } => "http_error",
            Self::Decode(_) => "decode_error",
            Self::Transport(_) => "transport_error",
            Self::Signing(_) | Self::Client(_) => "client_error",
            Self::NotFound(_) => "not_found",
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
