//! # XC-01 Observer Consensus
//!
//! Weighted observer voting over external-chain events, and the state that
//! voting depends on.
//!
//! **Subsystem ID:** 1  
//! **Architecture:** Hexagonal (Domain / Ports / Service)
//!
//! ## Components
//!
//! | Component | Responsibility |
//! |-----------|----------------|
//! | `BallotBox` | weighted votes, supermajority and exhaustion rules |
//! | `RelayerSetManager` | height-versioned relayer snapshots, node accounts, blame |
//! | `TssRegistry` | key-group history, fund-migration records |
//! | `NonceAllocator` | per (chain, key) outbound nonces |
//! | `ChainStateTracker` | external chain tips, confirmations, chain params, gas price median |
//!
//! ## Atomicity
//!
//! Every event is applied through a [`shared_types::StoreTx`]; the per-key
//! locks it takes (ballot, nonce pair) are held until the batch commits.
//! Lock order is ballot, then Xmsg, then nonce pair.
//!
//! ## Module Structure
//!
//! ```text
//! xc-01-observer/
//! ├── domain/          # Ballot, RelayerSet, Tss, nonces, chain state
//! ├── ports/           # ObserverApi
//! └── service/         # components + ObserverService facade
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

// Re-exports
pub use domain::{
    Ballot, BallotStatus, Blame, BlockObservation, ChainNonces, ChainParams, ChainState,
    CrosschainFlags, GasPrice, GasPriceEntry, GasPriceObservation, KeygenObservation,
    KeygenStatus, NodeAccount, NodeStatus, NonceToXmsg, ObservationType, PendingNonces,
    RelayerSet, Threshold, Tss, TssFundMigration, Vote, VoteOutcome,
};
pub use error::{ObserverError, ObserverResult};
pub use ports::ObserverApi;
pub use service::{
    BallotBox, BallotConfig, BallotUpdateResult, BlameOutcome, ChainStateTracker, NonceAllocator,
    ObserverConfig, ObserverGenesis, ObserverService, RelayerSetConfig, RelayerSetManager,
    TssRegistry, VoteRequest, HOME_CHAIN_ID,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
