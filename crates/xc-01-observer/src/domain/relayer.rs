//! # Relayer Set
//!
//! Height-versioned observer roster, node accounts and blame records.

use super::value_objects::NodeStatus;
use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId, Digest, Height};
use std::collections::BTreeMap;

/// Authorized relayers and their voting weights, effective from `height`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerSet {
    /// First home-chain height at which this snapshot applies.
    pub height: Height,
    /// Relayer address → voting weight.
    pub members: BTreeMap<Address, u64>,
}

impl RelayerSet {
    /// Create a snapshot, dropping zero-weight entries.
    pub fn new(height: Height, members: BTreeMap<Address, u64>) -> Self {
        let members = members.into_iter().filter(|(_, w)| *w > 0).collect();
        Self { height, members }
    }

    /// Total voting power.
    pub fn total_power(&self) -> u64 {
        self.members
            .values()
            .fold(0u64, |acc, w| acc.saturating_add(*w))
    }

    /// Whether `address` may vote.
    pub fn contains(&self, address: &str) -> bool {
        self.members.contains_key(address)
    }

    /// Voting weight of `address`.
    pub fn weight_of(&self, address: &str) -> Option<u64> {
        self.members.get(address).copied()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Copy of this set without `address`, effective from `height`.
    pub fn without(&self, address: &str, height: Height) -> Self {
        let mut members = self.members.clone();
        members.remove(address);
        Self { height, members }
    }
}

/// A node operator account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAccount {
    /// Operator address (also the relayer address).
    pub operator: Address,
    /// Signer pubkey granted to the TSS process.
    pub granted_pubkey: String,
    /// Membership state.
    pub status: NodeStatus,
}

impl NodeAccount {
    /// Create an active account.
    pub fn new(operator: impl Into<Address>, granted_pubkey: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            granted_pubkey: granted_pubkey.into(),
            status: NodeStatus::Active,
        }
    }

    /// Whether the account may take part in keygen and voting.
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

/// Record of detected misbehaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blame {
    /// Chain the misbehaviour was observed on.
    pub chain_id: ChainId,
    /// Relayers held responsible.
    pub offenders: Vec<Address>,
    /// Free-form reason.
    pub reason: String,
    /// Ballot or event the blame refers to.
    pub subject: Digest,
    /// Home-chain height at which the blame was recorded.
    pub height: Height,
}

impl Blame {
    /// Deterministic index of this blame record.
    pub fn index(&self) -> Digest {
        let offenders = self.offenders.join(",");
        Digest::of(
            "blame",
            &[
                &self.chain_id.to_be_bytes(),
                self.subject.as_bytes(),
                offenders.as_bytes(),
                self.reason.as_bytes(),
            ],
        )
    }
}
