//! Structured logging.
//!
//! JSON output carries `timestamp`, `level`, `target` and the structured
//! fields of each event, so a log shipper can index Xmsg indices and chain
//! ids without parsing messages.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global log subscriber.
///
/// Fails if the filter directive is invalid or a subscriber is already set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level '{}': {}", config.log_level, e)))?;

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .compact()
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Log an Xmsg lifecycle event with the Xmsg index under `xmsg`.
///
/// ```rust,ignore
/// log_xmsg_event!(warn, "Signer refused outbound", index.short(), chain_id = 101u64);
/// ```
#[macro_export]
macro_rules! log_xmsg_event {
    ($level:ident, $msg:expr, $index:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            xmsg = %$index,
            $($($field)*,)?
            $msg
        )
    };
}
