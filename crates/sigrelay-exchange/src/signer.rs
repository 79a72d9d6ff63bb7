//! HMAC-SHA256 request signing.
//!
//! Prehash is `timestamp + METHOD + requestPath + body`, where `requestPath`
//! carries the query string (`?a=b`) for GET calls. The digest is
//! base64-encoded and sent as `ACCESS-SIGN`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

/// Signs requests with one credential's secret.
pub struct RequestSigner<'a> {
    secret: &'a str,
}

impl<'a> RequestSigner<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { secret }
    }

    /// Build the string that gets signed.
    pub fn prehash(timestamp_ms: &str, method: &str, request_path: &str, body: &str) -> String {
        format!(
            "{}{}{}{}",
            timestamp_ms,
            method.to_ascii_uppercase(),
            request_path,
            body
        )
    }

    /// Sign a request. Deterministic for identical inputs.
    pub fn sign(
        &self,
        timestamp_ms: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> ExchangeResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        mac.update(Self::prehash(timestamp_ms, method, request_path, body).as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}
