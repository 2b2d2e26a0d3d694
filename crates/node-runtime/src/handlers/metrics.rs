//! # Lifecycle Metrics Handler
//!
//! Drains the crosschain event channel after each applied entry and turns
//! lifecycle events into Prometheus counters and summary tallies.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;
use xc_02_crosschain::XmsgEvent;
use xmsg_telemetry::{
    log_xmsg_event, metric_inc, DISPATCH_FAILURES, NONCES_ALLOCATED, OUTBOUNDS_DISPATCHED, XMSGS_CREATED,
    XMSG_TRANSITIONS,
};

/// Counts observed through the event channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleTally {
    /// Xmsgs created.
    pub created: u64,
    /// Transitions by target status.
    pub transitions: BTreeMap<String, u64>,
    /// Xmsgs that reached a terminal status.
    pub terminal: u64,
    /// Attempts accepted by the signer.
    pub dispatched: u64,
    /// Attempts the signer refused.
    pub dispatch_failures: u64,
    /// Events lost because the channel lagged.
    pub lagged: u64,
}

/// Subscriber turning lifecycle events into metrics.
pub struct MetricsRecorder {
    receiver: broadcast::Receiver<XmsgEvent>,
    tally: LifecycleTally,
}

impl MetricsRecorder {
    /// Record from `receiver`.
    pub fn new(receiver: broadcast::Receiver<XmsgEvent>) -> Self {
        Self {
            receiver,
            tally: LifecycleTally::default(),
        }
    }

    /// Process every event currently queued. Returns how many were seen.
    pub fn drain(&mut self) -> usize {
        let mut seen = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.record(&event);
                    seen += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Metrics recorder lagged behind the event channel");
                    self.tally.lagged += missed;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
            }
        }
    }

    fn record(&mut self, event: &XmsgEvent) {
        match event {
            XmsgEvent::XmsgCreated { .. } => {
                metric_inc!(XMSGS_CREATED);
                self.tally.created += 1;
            }
            XmsgEvent::StatusChanged {
                index, to, height, ..
            } => {
                metric_inc!(XMSG_TRANSITIONS, &[to.as_str()]);
                *self.tally.transitions.entry(to.as_str().to_string()).or_default() += 1;
                if to.is_terminal() {
                    self.tally.terminal += 1;
                    log_xmsg_event!(
                        info,
                        "Xmsg finished",
                        index.short(),
                        status = to.as_str(),
                        height = *height
                    );
                }
            }
            XmsgEvent::OutboundDispatched { .. } => {
                metric_inc!(NONCES_ALLOCATED);
                metric_inc!(OUTBOUNDS_DISPATCHED);
                self.tally.dispatched += 1;
            }
            XmsgEvent::DispatchFailed {
                index,
                chain_id,
                nonce,
                reason,
            } => {
                metric_inc!(NONCES_ALLOCATED);
                metric_inc!(DISPATCH_FAILURES);
                self.tally.dispatch_failures += 1;
                log_xmsg_event!(
                    warn,
                    "Signer refused outbound",
                    index.short(),
                    chain_id = *chain_id,
                    nonce = *nonce,
                    reason = %reason
                );
            }
        }
    }

    /// Counts so far.
    pub fn tally(&self) -> &LifecycleTally {
        &self.tally
    }
}
