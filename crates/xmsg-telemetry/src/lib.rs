//! # Xmsg Telemetry
//!
//! Logging and metrics for the orchestration node.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an env filter and a pretty or JSON formatter
//! - **Metrics**: Prometheus counters, rendered in text exposition format
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xmsg_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Logs and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `XC_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `XC_JSON_LOGS` | `false` | JSON formatted logs |
//! | `XC_SERVICE_NAME` | `xmsg-node` | Service name attached to logs |

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, BALLOTS_FINALIZED, DISPATCH_FAILURES,
    EVENTS_APPLIED, NONCES_ALLOCATED, OUTBOUNDS_DISPATCHED, XMSGS_CREATED, XMSG_TRANSITIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A metric could not be registered or encoded.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// The returned guard must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(&config)?;
    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        "Telemetry initialized"
    );
    Ok(TelemetryGuard { _metrics: metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
