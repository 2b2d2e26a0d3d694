//! Error types for the Observer subsystem

use crate::domain::BallotStatus;
use shared_types::{Address, BallotIndex, ChainId, Height, StoreError, XmsgIndex};
use thiserror::Error;

/// Observer subsystem errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObserverError {
    /// Voter is not a member of the authorized relayer set
    #[error("Unauthorized voter {voter} on ballot {ballot}")]
    UnauthorizedVoter { voter: Address, ballot: BallotIndex },

    /// Reporter is not in the relayer set in force
    #[error("{voter} is not an observer at height {height}")]
    NotAnObserver { voter: Address, height: Height },

    /// Voter already voted on this ballot
    #[error("Duplicate vote by {voter} on ballot {ballot} (conflicting: {conflicting})")]
    DuplicateVote {
        voter: Address,
        ballot: BallotIndex,
        /// The re-vote claimed a different value than the recorded vote.
        conflicting: bool,
    },

    /// Vote arrived after the decision; kept for audit only
    #[error("Ballot {ballot} already finalized as {decision}")]
    BallotAlreadyFinalized {
        ballot: BallotIndex,
        decision: BallotStatus,
    },

    /// Ballot does not exist
    #[error("Ballot not found: {ballot}")]
    BallotNotFound { ballot: BallotIndex },

    /// A nonce about to be assigned is already mapped to an Xmsg
    #[error("Nonce conflict: nonce {nonce} on chain {chain_id} key {tss_pubkey} already owned by {existing}")]
    NonceConflict {
        chain_id: ChainId,
        tss_pubkey: String,
        nonce: u64,
        existing: XmsgIndex,
    },

    /// Nonce is not outstanding for the pair
    #[error("Nonce {nonce} is not pending on chain {chain_id} key {tss_pubkey}")]
    NonceNotPending {
        chain_id: ChainId,
        tss_pubkey: String,
        nonce: u64,
    },

    /// Chain has no params or is not supported
    #[error("Unsupported chain: {chain_id}")]
    UnsupportedChain { chain_id: ChainId },

    /// Block header older than the tracked tip
    #[error("Stale chain state for chain {chain_id}: height {height} <= latest {latest}")]
    StaleChainState {
        chain_id: ChainId,
        height: Height,
        latest: Height,
    },

    /// No TSS is active at the height
    #[error("No TSS active at height {height}")]
    TssNotFound { height: Height },

    /// TSS pubkey already in history
    #[error("TSS already registered: {pubkey}")]
    TssAlreadyRegistered { pubkey: String },

    /// TSS finalization heights must increase
    #[error("TSS finalized at {finalized_height} must be after latest {latest}")]
    TssOutOfOrder {
        finalized_height: Height,
        latest: Height,
    },

    /// No relayer set snapshot covers the height
    #[error("No relayer set at height {height}")]
    NoRelayerSet { height: Height },

    /// Relayer set update would leave no voting power
    #[error("Relayer set has no voting power")]
    EmptyRelayerSet,

    /// Fund migration preconditions not met
    #[error("Fund migration blocked on chain {chain_id}: {reason}")]
    MigrationBlocked { chain_id: ChainId, reason: String },

    /// Inbound observations are disabled by the crosschain flags
    #[error("Inbound observations are disabled")]
    InboundDisabled,

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ObserverError {
    /// Unrecoverable conditions that indicate a broken invariant or store.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ObserverError::NonceConflict { .. }
                | ObserverError::Store(StoreError::Corruption { .. })
        )
    }
}

/// Result type for Observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;
