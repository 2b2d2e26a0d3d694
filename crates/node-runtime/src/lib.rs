//! # Node Runtime Library
//!
//! This library exposes the internal modules of the node runtime for testing.
//! The main entry point is the `main.rs` binary.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and subsystem wiring
//! - `genesis/` - Initial observer state
//! - `replay/` - Ordered event log format and replayer
//! - `handlers/` - Lifecycle event subscribers (metrics)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod genesis;
pub mod handlers;
pub mod replay;

pub use container::{ConfigError, NodeConfig, SubsystemContainer};
pub use replay::{EventReplayer, LogEntry, LogEvent, ReplaySummary};
