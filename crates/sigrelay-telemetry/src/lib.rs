//! Prometheus metrics and structured logging for sigrelay.
//!
//! - Prometheus counters and histograms for signals, exchange calls, orders,
//!   the price cache and mass-trade runs
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather_text, Metrics};
