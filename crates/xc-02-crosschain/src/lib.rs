//! # XC-02 Cross-Chain Messaging
//!
//! Xmsg lifecycle orchestration: finalized observer ballots and home-chain
//! block ticks in, signing instructions and lifecycle events out.
//!
//! **Subsystem ID:** 2
//! **Architecture:** Hexagonal (Domain / Ports / Adapters / Service)
//!
//! ## Lifecycle
//!
//! | Event | Effect |
//! |-------|--------|
//! | inbound ballot approved | Xmsg created `PendingInbound`, eligibility evaluated |
//! | eligible | nonce allocated, attempt appended, `PendingOutbound` |
//! | outbound approved as success | `OutboundMined` (or `Reverted` for a revert) |
//! | outbound approved as failure / timeout | `PendingRevert` and a revert attempt, or `Aborted` |
//! | block tick | deferred inbounds re-evaluated, timeouts applied |
//!
//! ## Key rotation
//!
//! A later keygen parks its key as generated. `migrate_tss_funds` moves the
//! funds of one chain to it (inbound must be disabled and the chain drained),
//! and `update_tss_address` registers it once every supported chain has a
//! mined migration.
//!
//! ## Module Structure
//!
//! ```text
//! xc-02-crosschain/
//! ├── domain/          # Xmsg, observations, lifecycle events
//! ├── ports/
//! │   ├── inbound.rs   # CrossChainApi
//! │   └── outbound.rs  # XmsgPolicy, OutboundSigner, XmsgEventPublisher
//! ├── adapters/        # DefaultXmsgPolicy, LoggingSigner, BroadcastEventPublisher
//! └── service/         # CrossChainService
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{BroadcastEventPublisher, DefaultXmsgPolicy, LoggingSigner};
pub use domain::{
    InboundObservation, InboundParams, OutboundInstruction, OutboundObservation, OutboundParams,
    ReceiveStatus, RevertOptions, Status, TxFinalizationStatus, Xmsg, XmsgEvent, XmsgKind,
    XmsgStatus,
};
pub use error::{CrossChainError, CrossChainResult};
pub use ports::{
    CrossChainApi, Eligibility, MockPolicy, MockSigner, OutboundSigner, RecordingPublisher,
    RevertFeasibility, SignerError, XmsgEventPublisher, XmsgPolicy,
};
pub use service::{BlockReport, CrossChainService, OrchestratorConfig, XmsgVoteResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
