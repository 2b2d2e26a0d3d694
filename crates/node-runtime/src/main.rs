//! # Xmsg Node Runtime
//!
//! Runs the observer (xc-01) and crosschain (xc-02) subsystems over an
//! in-memory store and replays the home chain's ordered event log.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, `XC_CONFIG` file, environment)
//! 2. Initialize logging and metrics
//! 3. Validate configuration and write genesis
//! 4. Replay the event log named by `XC_EVENT_LOG`
//! 5. Print the JSON summary and the Prometheus exposition
//!
//! ## Event Flow
//!
//! ```text
//! event log ──→ Observer(1) ballots ──approved──→ Cross-Chain(2)
//!                                                     │
//!                          ┌──────────────────────────┼───────────────┐
//!                          ↓                          ↓               ↓
//!                  NonceAllocator(1)           LoggingSigner     Event channel
//!                                                                     │
//!                                                                     ↓
//!                                                              MetricsRecorder
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use node_runtime::container::{NodeConfig, SubsystemContainer};
use node_runtime::replay::{read_event_log, EventReplayer, ReplaySummary};
use xmsg_telemetry::{encode_metrics, init_telemetry};

/// The node runtime: subsystems plus the replayer.
struct NodeRuntime {
    container: Arc<SubsystemContainer>,
}

impl NodeRuntime {
    /// Create the subsystems and write genesis.
    fn new(config: NodeConfig) -> Result<Self> {
        info!("===========================================");
        info!("  Xmsg Node Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");
        let container =
            SubsystemContainer::new(config).context("Failed to initialize subsystems")?;
        Ok(Self {
            container: Arc::new(container),
        })
    }

    /// Replay the configured event log.
    async fn run(&self) -> Result<ReplaySummary> {
        let mut replayer = EventReplayer::new(Arc::clone(&self.container));
        let Some(path) = self.container.config.replay.event_log.clone() else {
            info!("No event log configured (set XC_EVENT_LOG); nothing to replay");
            return Ok(replayer.summary());
        };

        let entries = read_event_log(&path)
            .with_context(|| format!("Failed to load event log {}", path.display()))?;
        info!(path = %path.display(), entries = entries.len(), "Replaying event log");
        Ok(replayer.run(entries).await)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load().context("Failed to load configuration")?;
    let _telemetry =
        init_telemetry(config.telemetry.clone()).context("Failed to initialize telemetry")?;
    let print_metrics = config.replay.print_metrics;

    let runtime = NodeRuntime::new(config)?;
    let summary = runtime.run().await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to encode summary")?
    );
    if print_metrics {
        print!("{}", encode_metrics().context("Failed to encode metrics")?);
    }

    if let Some(reason) = summary.halted {
        bail!("Replay halted: {}", reason);
    }
    Ok(())
}
