//! # Event Handlers
//!
//! Subscribers to the crosschain lifecycle event channel.

pub mod metrics;

pub use metrics::{LifecycleTally, MetricsRecorder};
