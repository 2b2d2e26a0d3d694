//! # Node Configuration
//!
//! Unified configuration for the subsystems and the replay runtime.
//!
//! ## Loading Order
//!
//! 1. Built-in defaults (devnet genesis)
//! 2. JSON file named by `XC_CONFIG`, if set
//! 3. Environment overrides: `XC_EVENT_LOG`, `XC_OUTBOUND_TIMEOUT`,
//!    `XC_THRESHOLD` (`numerator/denominator`) and the telemetry variables

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xc_01_observer::{ObserverConfig, Threshold};
use xc_02_crosschain::OrchestratorConfig;
use xmsg_telemetry::TelemetryConfig;

use crate::genesis::{GenesisBuilder, GenesisConfig, GenesisError};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`NodeConfig`].
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },

    /// The default ballot threshold has a zero denominator.
    #[error("Default ballot threshold has a zero denominator")]
    ZeroDenominator,

    /// The genesis section is invalid.
    #[error("Invalid genesis: {0}")]
    Genesis(#[from] GenesisError),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Logging configuration.
    pub telemetry: TelemetryConfig,
    /// Observer (xc-01) configuration.
    pub observer: ObserverConfig,
    /// Orchestrator (xc-02) configuration.
    pub orchestrator: OrchestratorConfig,
    /// Replay configuration.
    pub replay: ReplayConfig,
    /// Initial state.
    pub genesis: GenesisConfig,
}

/// Event log replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// JSON-lines event log; `None` replays nothing.
    pub event_log: Option<PathBuf>,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
    /// Print the Prometheus exposition after the summary.
    pub print_metrics: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            event_log: None,
            event_capacity: 1024,
            print_metrics: true,
        }
    }
}

impl NodeConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("XC_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.telemetry.apply_overrides(&lookup);
        config.apply_env(&lookup)?;
        Ok(config)
    }

    /// Parse a JSON config file; missing sections keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(path) = lookup("XC_EVENT_LOG") {
            self.replay.event_log = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("XC_OUTBOUND_TIMEOUT") {
            self.orchestrator.outbound_timeout_blocks =
                value.parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "XC_OUTBOUND_TIMEOUT",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("XC_THRESHOLD") {
            self.observer.ballot.default_threshold =
                parse_threshold(&value).ok_or(ConfigError::InvalidEnv {
                    var: "XC_THRESHOLD",
                    value: value.clone(),
                })?;
        }
        Ok(())
    }

    /// Validate the configuration before any state is written.
    ///
    /// # Errors
    ///
    /// - `ZeroDenominator` for a default threshold of `n/0`
    /// - `Genesis` for an empty relayer set, duplicate chain ids or a zero
    ///   denominator in a chain override
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.observer.ballot.default_threshold.denominator == 0 {
            return Err(ConfigError::ZeroDenominator);
        }
        GenesisBuilder::new(self.genesis.clone()).build()?;
        Ok(())
    }
}

/// Parse `numerator/denominator`. The denominator is checked by
/// [`NodeConfig::validate`], not here.
fn parse_threshold(value: &str) -> Option<Threshold> {
    let (numerator, denominator) = value.split_once('/')?;
    Some(Threshold {
        numerator: numerator.trim().parse().ok()?,
        denominator: denominator.trim().parse().ok()?,
    })
}
