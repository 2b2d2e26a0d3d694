//! # Outbound Nonces
//!
//! Per (chain, TSS pubkey) counters and the reverse index back to Xmsgs.

use serde::{Deserialize, Serialize};
use shared_types::{ChainId, XmsgIndex};
use std::collections::BTreeSet;

/// Next nonce to hand out for a (chain, key) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNonces {
    /// Target chain.
    pub chain_id: ChainId,
    /// Signing key.
    pub tss_pubkey: String,
    /// Next value `allocate` returns.
    pub next_nonce: u64,
}

impl ChainNonces {
    /// Fresh sequence starting at zero.
    pub fn new(chain_id: ChainId, tss_pubkey: &str) -> Self {
        Self {
            chain_id,
            tss_pubkey: tss_pubkey.to_string(),
            next_nonce: 0,
        }
    }
}

/// Window of allocated but unfinished nonces.
///
/// `nonce_low` is the lowest outstanding nonce (or `nonce_high` when none
/// is outstanding); `nonce_high` is one past the last allocated nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNonces {
    /// Target chain.
    pub chain_id: ChainId,
    /// Signing key.
    pub tss_pubkey: String,
    /// Lowest outstanding nonce.
    pub nonce_low: u64,
    /// One past the highest allocated nonce.
    pub nonce_high: u64,
    /// Every outstanding nonce.
    pub outstanding: BTreeSet<u64>,
}

impl PendingNonces {
    /// Empty window.
    pub fn new(chain_id: ChainId, tss_pubkey: &str) -> Self {
        Self {
            chain_id,
            tss_pubkey: tss_pubkey.to_string(),
            nonce_low: 0,
            nonce_high: 0,
            outstanding: BTreeSet::new(),
        }
    }

    /// Track a newly allocated nonce.
    pub fn push(&mut self, nonce: u64) {
        self.outstanding.insert(nonce);
        self.nonce_high = self.nonce_high.max(nonce + 1);
        self.recompute_low();
    }

    /// Stop tracking `nonce`. Returns false if it was not outstanding.
    pub fn remove(&mut self, nonce: u64) -> bool {
        let removed = self.outstanding.remove(&nonce);
        self.recompute_low();
        removed
    }

    /// Whether anything is outstanding.
    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    fn recompute_low(&mut self) {
        self.nonce_low = self
            .outstanding
            .first()
            .copied()
            .unwrap_or(self.nonce_high);
    }
}

/// Reverse index entry: which Xmsg owns a nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceToXmsg {
    /// Target chain.
    pub chain_id: ChainId,
    /// Signing key.
    pub tss_pubkey: String,
    /// Allocated nonce.
    pub nonce: u64,
    /// Owner.
    pub xmsg_index: XmsgIndex,
}
