//! User-facing translation of exchange error messages.
//!
//! Raw vendor text never reaches API callers: known failures map to a fixed
//! Spanish message, anything else has its vendor prefix stripped.

use crate::error::ExchangeError;

/// Lowercase substring → localized message. First match wins.
const TRANSLATIONS: &[(&[&str], &str)] = &[
    (
        &["insufficient balance", "exceeds the balance", "40762", "not enough balance"],
        "Saldo insuficiente para abrir esta posición",
    ),
    (
        &["minimum order", "min size", "less than the minimum", "minimum amount", "45110"],
        "El tamaño de la orden es menor que el mínimo permitido",
    ),
    (
        &["leverage exceeded", "exceeds the maximum leverage", "leverage is too high"],
        "El apalancamiento supera el máximo permitido para este símbolo",
    ),
    (
        &["symbol does not exist", "symbol not exist", "40034"],
        "El símbolo no existe en el exchange",
    ),
    (
        &["no position", "position not exist", "no open position", "22002"],
        "No hay posición abierta para cerrar",
    ),
    (
        &["timed out", "timeout"],
        "El exchange tardó demasiado en responder, inténtalo de nuevo",
    ),
    (
        &["sign signature error", "apikey", "api key", "passphrase", "40009", "40012"],
        "Credenciales de API inválidas o sin permisos",
    ),
    (
        &["too many requests", "rate limit", "429"],
        "Demasiadas solicitudes al exchange, espera unos segundos",
    ),
    (
        &["trigger price", "43023"],
        "El precio de activación no es válido para la posición actual",
    ),
    (
        &["price out of range", "price is too", "exceeds the limit price"],
        "El precio está fuera del rango permitido",
    ),
    (
        &["maintenance", "system upgrade"],
        "El exchange está en mantenimiento",
    ),
];

const VENDOR_PREFIXES: &[&str] = &[
    "bitget api error:",
    "bitget error:",
    "bitget:",
    "exchange api error",
    "api error:",
    "error:",
];

/// Translate a raw error message.
pub fn translate_error(raw: &str) -> String {
    let lower = raw.to_lowercase();
    for (needles, message) in TRANSLATIONS {
        if needles.iter().any(|n| lower.contains(n)) {
            return (*message).to_string();
        }
    }
    strip_vendor_prefix(raw)
}

/// Translate an exchange error, matching on both its code and message.
pub fn translate(err: &ExchangeError) -> String {
    match err {
        ExchangeError::Api { code, message } => translate_error(&format!("{code} {message}")),
        ExchangeError::Transport(message) => translate_error(message),
        other => translate_error(&other.vendor_message()),
    }
}

fn strip_vendor_prefix(raw: &str) -> String {
    let mut rest = raw.trim();
    loop {
        let lower = rest.to_lowercase();
        let Some(prefix) = VENDOR_PREFIXES.iter().find(|p| lower.starts_with(*p)) else {
            break;
        };
        rest = rest[prefix.len()..].trim_start_matches([' ', ':']);
    }
    rest.to_string()
}
