//! # TSS Key Groups

use super::nonce::NonceToXmsg;
use super::value_objects::KeygenStatus;
use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId, Digest, Height, XmsgIndex};

/// A threshold-signature key generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tss {
    /// Group public key.
    pub pubkey: String,
    /// Participant signer pubkeys, in keygen order.
    pub participants: Vec<String>,
    /// Operator addresses of the participants.
    pub operators: Vec<Address>,
    /// Home-chain height from which this key is the signer.
    pub finalized_height: Height,
    /// Home-chain height at which keygen ran.
    pub keygen_height: Height,
}

/// Keygen outcome claimed by one node account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenObservation {
    /// Resulting group pubkey (empty on failure).
    pub pubkey: String,
    /// Height at which keygen ran.
    pub keygen_height: Height,
    /// Reported result.
    pub status: KeygenStatus,
}

impl KeygenObservation {
    /// Ballot index shared by every node reporting on this keygen round.
    pub fn ballot_index(&self) -> Digest {
        Digest::of("tss-keygen", &[&self.keygen_height.to_be_bytes()])
    }
}

/// Nonces carried from an outgoing key to an incoming one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TssFundMigration {
    /// Chain whose funds move.
    pub chain_id: ChainId,
    /// Outgoing key.
    pub from_pubkey: String,
    /// Incoming key.
    pub to_pubkey: String,
    /// Outstanding allocations under the outgoing key, unchanged.
    pub carried: Vec<NonceToXmsg>,
    /// Xmsg moving the funds, once created.
    pub migration_xmsg: Option<XmsgIndex>,
    /// Home-chain height of the migration.
    pub height: Height,
}
