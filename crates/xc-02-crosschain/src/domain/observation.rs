//! Observer claims about external chains and the signing instructions the
//! orchestrator emits in response.

use super::xmsg::{InboundParams, OutboundParams, RevertOptions, TxFinalizationStatus, Xmsg};
use serde::{Deserialize, Serialize};
use shared_types::{encode, Address, BallotIndex, ChainId, Digest, Height, StoreError, XmsgIndex};

/// Inbound cross-chain event as claimed by an observer.
///
/// Every field is part of the vote value, so observers that disagree on any
/// of them split the ballot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundObservation {
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
    #[serde(default)]
    pub message: String,
    /// Inbound transaction hash.
    pub tx_hash: String,
    /// External height of the inbound transaction.
    pub tx_height: Height,
    /// Index of the event within the transaction.
    #[serde(default)]
    pub event_index: u64,
    /// Revert instructions; absent means the transfer cannot be reverted.
    #[serde(default)]
    pub revert_options: Option<RevertOptions>,
}

impl InboundObservation {
    fn identity(&self) -> [Vec<u8>; 3] {
        [
            self.sender_chain_id.to_be_bytes().to_vec(),
            self.tx_hash.as_bytes().to_vec(),
            self.event_index.to_be_bytes().to_vec(),
        ]
    }

    /// Index of the Xmsg this event creates.
    pub fn xmsg_index(&self) -> XmsgIndex {
        let [chain, hash, event] = self.identity();
        Digest::of("xmsg", &[&chain, &hash, &event])
    }

    /// Index of the ballot deciding this event.
    pub fn ballot_index(&self) -> BallotIndex {
        let [chain, hash, event] = self.identity();
        Digest::of("inbound-ballot", &[&chain, &hash, &event])
    }

    /// Inbound params of the Xmsg created when the ballot approves.
    pub fn into_inbound_params(self, ballot_index: BallotIndex, finalized_height: Height) -> InboundParams {
        InboundParams {
            sender_chain_id: self.sender_chain_id,
            sender: self.sender,
            tx_origin: self.tx_origin,
            receiver_chain_id: self.receiver_chain_id,
            receiver: self.receiver,
            amount: self.amount,
            message: self.message,
            tx_hash: self.tx_hash,
            tx_height: self.tx_height,
            event_index: self.event_index,
            ballot_index,
            finalized_height,
            tx_finalization_status: TxFinalizationStatus::Finalized,
            revert_options: self.revert_options,
        }
    }
}

/// Result of an outbound transaction on its target chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiveStatus {
    /// Executed.
    Success,
    /// Mined but reverted, or dropped.
    Failed,
}

/// Mined outbound attempt as claimed by an observer.
///
/// Observers must agree on the transaction hash and the result. The gas
/// used and the external height are reported alongside but left out of the
/// vote value, since observers sampling different nodes may see them
/// differ; the first report of the winning value is the one recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundObservation {
    /// Xmsg the attempt belongs to.
    pub xmsg_index: XmsgIndex,
    /// Chain the attempt was sent to.
    pub chain_id: ChainId,
    /// Nonce of the attempt.
    pub nonce: u64,
    /// Mined transaction hash.
    pub tx_hash: String,
    /// External height of the mined transaction.
    pub external_height: Height,
    /// Gas used.
    #[serde(default)]
    pub gas_used: u64,
    /// Execution result.
    pub status: ReceiveStatus,
}

impl OutboundObservation {
    /// Index of the ballot deciding this attempt.
    ///
    /// Independent of the claimed result so that success and failure claims
    /// compete in one ballot.
    pub fn ballot_index(&self) -> BallotIndex {
        Digest::of(
            "outbound-ballot",
            &[
                self.xmsg_index.as_bytes(),
                &self.chain_id.to_be_bytes(),
                &self.nonce.to_be_bytes(),
            ],
        )
    }

    /// Bytes the vote value is computed from.
    pub fn vote_key(&self) -> Result<Vec<u8>, StoreError> {
        encode(&(
            &self.xmsg_index,
            self.chain_id,
            self.nonce,
            &self.tx_hash,
            self.status,
        ))
    }
}

/// Signing instruction handed to the signer after an attempt is committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundInstruction {
    /// Xmsg being served.
    pub xmsg_index: XmsgIndex,
    /// Target chain.
    pub chain_id: ChainId,
    /// Recipient.
    pub receiver: Address,
    /// Amount.
    pub amount: u128,
    /// Nonce under `tss_pubkey`.
    pub nonce: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price.
    pub gas_price: u128,
    /// Signing key.
    pub tss_pubkey: String,
    /// Message forwarded to the receiver.
    pub message: String,
    /// Returns funds to the origin chain.
    pub is_revert: bool,
}

impl OutboundInstruction {
    /// Instruction for `attempt` of `xmsg`.
    pub fn for_attempt(xmsg: &Xmsg, attempt: &OutboundParams) -> Self {
        Self {
            xmsg_index: xmsg.index,
            chain_id: attempt.receiver_chain_id,
            receiver: attempt.receiver.clone(),
            amount: attempt.amount,
            nonce: attempt.nonce,
            gas_limit: attempt.gas_limit,
            gas_price: attempt.gas_price,
            tss_pubkey: attempt.tss_pubkey.clone(),
            message: if attempt.is_revert {
                String::new()
            } else {
                xmsg.inbound.message.clone()
            },
            is_revert: attempt.is_revert,
        }
    }
}
