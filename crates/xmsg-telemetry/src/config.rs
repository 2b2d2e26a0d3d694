//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Logging and metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error, or a full `EnvFilter` string)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "xmsg-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `XC_SERVICE_NAME`: Service name (default: xmsg-node)
    /// - `XC_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `XC_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config
    }

    /// Replace the fields whose variables are set.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("XC_SERVICE_NAME") {
            self.service_name = name;
        }
        if let Some(level) = lookup("XC_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            self.log_level = level;
        }
        if let Some(json) = lookup("XC_JSON_LOGS") {
            self.json_logs = json.eq_ignore_ascii_case("true") || json == "1";
        }
    }

    /// Configuration for one subsystem of the node, e.g. `("02", "crosschain")`.
    pub fn for_subsystem(subsystem_id: &str, subsystem_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = format!("xc-{}-{}", subsystem_id, subsystem_name);
        config
    }
}
