//! # Outbound Ports
//!
//! Traits for what the orchestrator depends on outside the store: business
//! rules, the signer/broadcaster, and the lifecycle event sink.

use crate::domain::{OutboundInstruction, Xmsg, XmsgEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use xc_01_observer::ChainParams;

/// Outcome of an inbound eligibility check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Eligibility {
    /// Schedule the outbound now.
    Eligible,
    /// Keep the Xmsg pending and check again on the next block.
    Deferred(String),
    /// The outbound can never be built; abort.
    Rejected(String),
}

/// Outcome of a revert feasibility check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevertFeasibility {
    /// Send the funds back.
    Feasible {
        /// Recipient on the origin chain.
        receiver: Address,
        /// Gas limit of the revert attempt.
        gas_limit: u64,
        /// Refund left after the revert fee.
        amount: u128,
    },
    /// Abort without a revert attempt.
    Infeasible(String),
}

/// Business rules - outbound port.
///
/// Pure functions of their arguments so every replica decides alike.
pub trait XmsgPolicy: Send + Sync {
    /// Whether the inbound of `xmsg` may be served on its receiver chain.
    fn check_inbound(&self, xmsg: &Xmsg, receiver_params: Option<&ChainParams>) -> Eligibility;

    /// Whether a failed `xmsg` can be returned to its origin chain.
    fn check_revert(&self, xmsg: &Xmsg, origin_params: Option<&ChainParams>) -> RevertFeasibility;
}

/// Signer errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    /// Signer could not be reached.
    #[error("Signer unavailable: {message}")]
    Unavailable {
        /// Details.
        message: String,
    },
    /// Signer refused the instruction.
    #[error("Signer rejected instruction: {message}")]
    Rejected {
        /// Details.
        message: String,
    },
}

/// Signer/broadcaster - outbound port.
///
/// Invoked only after the attempt has been committed.
#[async_trait]
pub trait OutboundSigner: Send + Sync {
    /// Sign and broadcast; returns the broadcast transaction hash.
    async fn sign_and_broadcast(&self, instruction: &OutboundInstruction)
        -> Result<String, SignerError>;
}

/// Lifecycle event sink - outbound port.
#[async_trait]
pub trait XmsgEventPublisher: Send + Sync {
    /// Publish an event; returns the number of receivers.
    async fn publish(&self, event: XmsgEvent) -> usize;

    /// Total events published.
    fn events_published(&self) -> u64;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock signer recording every instruction.
#[derive(Default)]
pub struct MockSigner {
    /// Instructions received, in order.
    pub instructions: Mutex<Vec<OutboundInstruction>>,
    /// Should fail?
    pub should_fail: bool,
}

impl MockSigner {
    /// Signer that refuses everything.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Copy of the instructions received so far.
    pub fn received(&self) -> Vec<OutboundInstruction> {
        self.instructions.lock().clone()
    }
}

#[async_trait]
impl OutboundSigner for MockSigner {
    async fn sign_and_broadcast(
        &self,
        instruction: &OutboundInstruction,
    ) -> Result<String, SignerError> {
        self.instructions.lock().push(instruction.clone());
        if self.should_fail {
            return Err(SignerError::Unavailable {
                message: "Mock failure".to_string(),
            });
        }
        Ok(format!(
            "0xmock-{}-{}-{}",
            instruction.chain_id, instruction.tss_pubkey, instruction.nonce
        ))
    }
}

/// Mock policy with fixed answers.
#[derive(Clone, Debug)]
pub struct MockPolicy {
    /// Answer to every eligibility check.
    pub eligibility: Eligibility,
    /// Whether reverts are feasible.
    pub revert_feasible: bool,
    /// Gas limit of feasible reverts.
    pub revert_gas_limit: u64,
}

impl Default for MockPolicy {
    fn default() -> Self {
        Self {
            eligibility: Eligibility::Eligible,
            revert_feasible: true,
            revert_gas_limit: 100_000,
        }
    }
}

impl XmsgPolicy for MockPolicy {
    fn check_inbound(&self, _xmsg: &Xmsg, _receiver_params: Option<&ChainParams>) -> Eligibility {
        self.eligibility.clone()
    }

    fn check_revert(&self, xmsg: &Xmsg, _origin_params: Option<&ChainParams>) -> RevertFeasibility {
        if self.revert_feasible {
            RevertFeasibility::Feasible {
                receiver: xmsg.inbound.sender.clone(),
                gas_limit: self.revert_gas_limit,
                amount: xmsg.inbound.amount,
            }
        } else {
            RevertFeasibility::Infeasible("Mock infeasible".to_string())
        }
    }
}

/// Publisher keeping every event in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<XmsgEvent>>,
    published: AtomicU64,
}

impl RecordingPublisher {
    /// Copy of the events published so far.
    pub fn events(&self) -> Vec<XmsgEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl XmsgEventPublisher for RecordingPublisher {
    async fn publish(&self, event: XmsgEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.events.lock().push(event);
        1
    }

    fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
