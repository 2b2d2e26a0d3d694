//! # Xmsg
//!
//! One cross-chain message, tracked from its finalized inbound event to a
//! terminal outbound outcome.
//!
//! ## Lifecycle
//!
//! ```text
//! PendingInbound ──► PendingOutbound ──► OutboundMined
//!       │                  │
//!       │                  ▼
//!       │            PendingRevert ──► Reverted
//!       │                  │
//!       └──────────────────┴─────────► Aborted
//! ```
//!
//! Outbound attempts are append-only. Only their observation fields and
//! finalization status change after they are appended.

use crate::error::{CrossChainError, CrossChainResult};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BallotIndex, ChainId, Height, XmsgIndex};
use std::fmt;

/// Xmsg lifecycle status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XmsgStatus {
    /// Inbound finalized, outbound not yet scheduled.
    #[default]
    PendingInbound,
    /// Outbound attempt handed to the signer.
    PendingOutbound,
    /// Outbound executed on the receiver chain.
    OutboundMined,
    /// Outbound failed, revert attempt scheduled or being decided.
    PendingRevert,
    /// Revert executed on the origin chain.
    Reverted,
    /// Gave up; no further attempts.
    Aborted,
}

impl XmsgStatus {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: XmsgStatus) -> bool {
        match (self, next) {
            (Self::PendingInbound, Self::PendingOutbound) => true,
            (Self::PendingInbound, Self::Aborted) => true, // Rejected by policy
            (Self::PendingOutbound, Self::OutboundMined) => true,
            (Self::PendingOutbound, Self::PendingRevert) => true,
            (Self::PendingRevert, Self::Reverted) => true,
            (Self::PendingRevert, Self::Aborted) => true,
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::OutboundMined | Self::Reverted | Self::Aborted)
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingInbound => "pending_inbound",
            Self::PendingOutbound => "pending_outbound",
            Self::OutboundMined => "outbound_mined",
            Self::PendingRevert => "pending_revert",
            Self::Reverted => "reverted",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for XmsgStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finalization of an inbound event or outbound attempt.
///
/// Only moves forward: `NotFinalized → Finalized → Executed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TxFinalizationStatus {
    /// Not yet decided by observers.
    #[default]
    NotFinalized,
    /// Decided by observers (or timed out).
    Finalized,
    /// Executed successfully on the target chain.
    Executed,
}

impl TxFinalizationStatus {
    /// Move to `next` if it is further along. Returns whether it moved.
    pub fn advance_to(&mut self, next: TxFinalizationStatus) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

/// What an Xmsg is for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmsgKind {
    /// User transfer observed on an external chain.
    #[default]
    Transfer,
    /// Funds moving from an outgoing TSS key to its successor.
    TssMigration,
}

/// Current status with its context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Lifecycle status.
    pub status: XmsgStatus,
    /// Human-readable reason for the last change.
    pub message: String,
    /// Block timestamp of the event that caused the last change.
    pub last_update_timestamp: u64,
}

/// How to return funds when the outbound fails.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertOptions {
    /// Recipient of the revert; the inbound sender when absent.
    pub revert_address: Option<Address>,
    /// Gas limit for the revert; the origin chain's default when absent.
    pub revert_gas_limit: Option<u64>,
}

/// Inbound side of an Xmsg. Immutable once the Xmsg exists, except for the
/// finalization status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundParams {
    /// Origin chain.
    pub sender_chain_id: ChainId,
    /// Sender on the origin chain.
    pub sender: Address,
    /// Transaction origin on the origin chain.
    pub tx_origin: Address,
    /// Requested destination chain.
    pub receiver_chain_id: ChainId,
    /// Requested recipient.
    pub receiver: Address,
    /// Transferred amount.
    pub amount: u128,
    /// Opaque message forwarded to the receiver.
    pub message: String,
    /// Inbound transaction hash.
    pub tx_hash: String,
    /// External height of the inbound transaction.
    pub tx_height: Height,
    /// Index of the event within the transaction.
    pub event_index: u64,
    /// Ballot that approved the inbound event.
    pub ballot_index: BallotIndex,
    /// Home-chain height at which the inbound ballot finalized.
    pub finalized_height: Height,
    /// Finalization of the inbound event.
    pub tx_finalization_status: TxFinalizationStatus,
    /// Revert instructions; absent means the transfer cannot be reverted.
    pub revert_options: Option<RevertOptions>,
}

/// One outbound attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundParams {
    /// Target chain.
    pub receiver_chain_id: ChainId,
    /// Recipient on the target chain.
    pub receiver: Address,
    /// Amount to deliver.
    pub amount: u128,
    /// Nonce under `tss_pubkey` on the target chain.
    pub nonce: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price.
    pub gas_price: u128,
    /// Signing key.
    pub tss_pubkey: String,
    /// Home-chain height at which the attempt was appended.
    pub created_at: Height,
    /// The attempt returns funds to the origin chain.
    pub is_revert: bool,
    /// Mined transaction hash, once observed.
    pub tx_hash: Option<String>,
    /// Ballot that decided the attempt, once observed.
    pub ballot_index: Option<BallotIndex>,
    /// External height of the mined transaction, once observed.
    pub external_height: Option<Height>,
    /// Gas used, once observed.
    pub gas_used: Option<u64>,
    /// Finalization of the attempt.
    pub tx_finalization_status: TxFinalizationStatus,
}

impl OutboundParams {
    /// Whether observers have not yet decided this attempt.
    pub fn is_in_flight(&self) -> bool {
        self.tx_finalization_status == TxFinalizationStatus::NotFinalized
    }
}

/// Cross-chain message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xmsg {
    /// Deterministic index derived from the inbound event.
    pub index: XmsgIndex,
    /// What the Xmsg is for.
    pub kind: XmsgKind,
    /// Current status.
    pub status: Status,
    /// Inbound side.
    pub inbound: InboundParams,
    /// Outbound attempts in append order.
    pub outbound: Vec<OutboundParams>,
}

impl Xmsg {
    /// New Xmsg in `PendingInbound`.
    pub fn new(index: XmsgIndex, kind: XmsgKind, inbound: InboundParams, timestamp: u64) -> Self {
        Self {
            index,
            kind,
            status: Status {
                status: XmsgStatus::PendingInbound,
                message: "inbound finalized".to_string(),
                last_update_timestamp: timestamp,
            },
            inbound,
            outbound: Vec::new(),
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> XmsgStatus {
        self.status.status
    }

    /// Whether the Xmsg reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.status.is_terminal()
    }

    /// Latest outbound attempt.
    pub fn current_outbound(&self) -> Option<&OutboundParams> {
        self.outbound.last()
    }

    /// Latest outbound attempt, mutable.
    pub fn current_outbound_mut(&mut self) -> Option<&mut OutboundParams> {
        self.outbound.last_mut()
    }

    /// Latest outbound attempt if observers have not decided it yet.
    pub fn in_flight(&self) -> Option<&OutboundParams> {
        self.current_outbound().filter(|o| o.is_in_flight())
    }

    /// Chain the Xmsg is currently waiting on.
    pub fn target_chain(&self) -> ChainId {
        self.current_outbound()
            .map(|o| o.receiver_chain_id)
            .unwrap_or(self.inbound.receiver_chain_id)
    }

    /// Transition to `next`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the state machine has no such edge.
    pub fn transition_to(
        &mut self,
        next: XmsgStatus,
        message: impl Into<String>,
        timestamp: u64,
    ) -> CrossChainResult<()> {
        let from = self.status.status;
        if !from.can_transition_to(next) {
            return Err(CrossChainError::InvalidTransition {
                index: self.index,
                from: format!("{:?}", from),
                to: format!("{:?}", next),
            });
        }
        self.status = Status {
            status: next,
            message: message.into(),
            last_update_timestamp: timestamp,
        };
        Ok(())
    }

    /// Move a pending Xmsg straight to `Aborted`, outside the regular
    /// transition rules. Governance uses this for Xmsgs no ballot will ever
    /// decide.
    ///
    /// # Errors
    ///
    /// `XmsgNotPending` once the Xmsg is terminal.
    pub fn abort_stuck(&mut self, message: impl Into<String>, timestamp: u64) -> CrossChainResult<()> {
        let from = self.status.status;
        if from.is_terminal() {
            return Err(CrossChainError::XmsgNotPending {
                index: self.index,
                status: format!("{:?}", from),
            });
        }
        self.status = Status {
            status: XmsgStatus::Aborted,
            message: message.into(),
            last_update_timestamp: timestamp,
        };
        Ok(())
    }

    /// Append an outbound attempt.
    ///
    /// # Errors
    ///
    /// `OutboundInFlight` while the previous attempt is undecided.
    pub fn append_outbound(&mut self, params: OutboundParams) -> CrossChainResult<()> {
        if self.in_flight().is_some() {
            return Err(CrossChainError::OutboundInFlight { index: self.index });
        }
        self.outbound.push(params);
        Ok(())
    }
}
