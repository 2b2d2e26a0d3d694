//! # Xmsg Test Suite
//!
//! Multi-component tests for the observer and crosschain subsystems.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs     # Node wiring over real adapters
//!     ├── pipeline.rs     # Inbound → outbound → mined / reverted / aborted
//!     ├── concurrency.rs  # Parallel nonce allocation and ballots
//!     ├── rotation.rs     # Keygen, fund migration, address update
//!     └── replay.rs       # Node runtime event log replay
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p xc-tests
//! cargo test -p xc-tests integration::concurrency::
//!
//! # Benchmarks
//! cargo bench -p xc-tests
//! ```

#![allow(dead_code)]

pub mod integration;
