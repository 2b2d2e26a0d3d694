//! Prometheus metrics for the orchestration node.

use crate::TelemetryError;
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BALLOT METRICS (xc-01)
    // =========================================================================

    /// Ballots finalized, by outcome
    pub static ref BALLOTS_FINALIZED: CounterVec = CounterVec::new(
        Opts::new("xc_ballots_finalized_total", "Ballots finalized by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Outbound nonces allocated
    pub static ref NONCES_ALLOCATED: Counter = Counter::new(
        "xc_nonces_allocated_total",
        "Outbound nonces allocated"
    ).expect("metric creation failed");

    // =========================================================================
    // XMSG METRICS (xc-02)
    // =========================================================================

    /// Xmsgs created from approved inbound ballots
    pub static ref XMSGS_CREATED: Counter = Counter::new(
        "xc_xmsgs_created_total",
        "Xmsgs created"
    ).expect("metric creation failed");

    /// Status transitions, by target status
    pub static ref XMSG_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new("xc_xmsg_status_total", "Xmsg status transitions by target status"),
        &["status"]
    ).expect("metric creation failed");

    /// Outbound instructions accepted by the signer
    pub static ref OUTBOUNDS_DISPATCHED: Counter = Counter::new(
        "xc_outbounds_dispatched_total",
        "Outbound instructions handed to the signer"
    ).expect("metric creation failed");

    /// Outbound instructions the signer refused
    pub static ref DISPATCH_FAILURES: Counter = Counter::new(
        "xc_dispatch_failures_total",
        "Outbound instructions the signer refused"
    ).expect("metric creation failed");

    // =========================================================================
    // RUNTIME METRICS
    // =========================================================================

    /// Replayed log events, by result
    pub static ref EVENTS_APPLIED: CounterVec = CounterVec::new(
        Opts::new("xc_events_applied_total", "Replayed events by result"),
        &["result"]
    ).expect("metric creation failed");
}

/// Keeps the registry alive for the metrics consumer.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Registering twice is an error.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BALLOTS_FINALIZED.clone()),
        Box::new(NONCES_ALLOCATED.clone()),
        Box::new(XMSGS_CREATED.clone()),
        Box::new(XMSG_TRANSITIONS.clone()),
        Box::new(OUTBOUNDS_DISPATCHED.clone()),
        Box::new(DISPATCH_FAILURES.clone()),
        Box::new(EVENTS_APPLIED.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all registered metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_encode() {
        // May already be registered by another test in this binary
        let _ = register_metrics();
        XMSG_TRANSITIONS.with_label_values(&["outbound_mined"]).inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("xc_xmsg_status_total"));
        assert!(text.contains(r#"status="outbound_mined""#));
    }

    #[test]
    fn test_second_registration_fails() {
        let _ = register_metrics();
        assert!(matches!(
            register_metrics(),
            Err(TelemetryError::MetricsInit(_))
        ));
    }

    #[test]
    fn test_counter_vec_labels_are_independent() {
        EVENTS_APPLIED.with_label_values(&["ok"]).inc();
        EVENTS_APPLIED.with_label_values(&["ok"]).inc();
        EVENTS_APPLIED.with_label_values(&["error"]).inc();
        assert!(EVENTS_APPLIED.with_label_values(&["ok"]).get() >= 2.0);
        assert!(EVENTS_APPLIED.with_label_values(&["error"]).get() >= 1.0);
    }
}
