//! Error types for the Cross-Chain subsystem

use shared_types::{ChainId, StoreError, XmsgIndex};
use thiserror::Error;
use xc_01_observer::ObserverError;

/// Cross-chain subsystem errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrossChainError {
    /// Observer consensus error (voting, nonces, TSS)
    #[error(transparent)]
    Observer(#[from] ObserverError),

    /// Xmsg does not exist
    #[error("Xmsg not found: {index}")]
    XmsgNotFound { index: XmsgIndex },

    /// Event targets an Xmsg whose status does not allow it
    #[error("Invalid Xmsg transition for {index}: {from} -> {to}")]
    InvalidTransition {
        index: XmsgIndex,
        from: String,
        to: String,
    },

    /// Governance abort targets an Xmsg that is already terminal
    #[error("Xmsg {index} is not pending (status {status})")]
    XmsgNotPending { index: XmsgIndex, status: String },

    /// Outbound observation does not match the Xmsg's in-flight attempt
    #[error("Outbound mismatch for {index}: chain {chain_id} nonce {nonce} is not the attempt in flight")]
    OutboundMismatch {
        index: XmsgIndex,
        chain_id: ChainId,
        nonce: u64,
    },

    /// A new attempt was appended while another is still in flight
    #[error("Xmsg {index} already has an outbound attempt in flight")]
    OutboundInFlight { index: XmsgIndex },

    /// TSS address update preconditions not met
    #[error("Cannot update TSS address: {reason}")]
    TssUpdateBlocked { reason: String },

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CrossChainError {
    /// Unrecoverable conditions: event application must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            CrossChainError::Observer(e) => e.is_fatal(),
            CrossChainError::Store(StoreError::Corruption { .. }) => true,
            _ => false,
        }
    }
}

/// Result type for Cross-Chain operations
pub type CrossChainResult<T> = Result<T, CrossChainError>;
