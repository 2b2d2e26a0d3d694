//! Store key layout for observer entities.
//!
//! Heights and chain ids are zero-padded so lexicographic key order equals
//! numeric order in prefix scans.

use shared_types::{ChainId, Digest, Height};

pub(crate) const RELAYER_SET_PREFIX: &str = "relayer_set/";
pub(crate) const NODE_ACCOUNT_PREFIX: &str = "node_account/";
pub(crate) const BLAME_PREFIX: &str = "blame/";
pub(crate) const TSS_HISTORY_PREFIX: &str = "tss/history/";
pub(crate) const TSS_MIGRATION_PREFIX: &str = "tss/migration/";
pub(crate) const TSS_GENERATED_PREFIX: &str = "tss/generated/";
pub(crate) const CHAIN_PARAMS_PREFIX: &str = "chain_params/";
pub(crate) const CROSSCHAIN_FLAGS: &str = "crosschain_flags";
pub(crate) const GAS_PRICE_PREFIX: &str = "gas_price/";

/// Newest relayer snapshot, kept beside the history so lookups at the tip
/// skip the scan.
pub(crate) const RELAYER_SET_LATEST: &str = "latest/relayer_set";
/// Newest registered key group.
pub(crate) const TSS_LATEST: &str = "latest/tss";

pub(crate) fn ballot(index: &Digest) -> Vec<u8> {
    format!("ballot/{}", index).into_bytes()
}

pub(crate) fn ballot_height_prefix(height: Height) -> Vec<u8> {
    format!("ballot_height/{:020}/", height).into_bytes()
}

pub(crate) fn ballot_height(height: Height, index: &Digest) -> Vec<u8> {
    format!("ballot_height/{:020}/{}", height, index).into_bytes()
}

pub(crate) fn relayer_set(height: Height) -> Vec<u8> {
    format!("{}{:020}", RELAYER_SET_PREFIX, height).into_bytes()
}

pub(crate) fn node_account(operator: &str) -> Vec<u8> {
    format!("{}{}", NODE_ACCOUNT_PREFIX, operator).into_bytes()
}

pub(crate) fn blame(index: &Digest) -> Vec<u8> {
    format!("{}{}", BLAME_PREFIX, index).into_bytes()
}

pub(crate) fn blame_count(address: &str) -> Vec<u8> {
    format!("blame_count/{}", address).into_bytes()
}

pub(crate) fn tss_history(finalized_height: Height) -> Vec<u8> {
    format!("{}{:020}", TSS_HISTORY_PREFIX, finalized_height).into_bytes()
}

pub(crate) fn tss_generated(pubkey: &str) -> Vec<u8> {
    format!("{}{}", TSS_GENERATED_PREFIX, pubkey).into_bytes()
}

pub(crate) fn tss_migration(chain_id: ChainId) -> Vec<u8> {
    format!("{}{:020}", TSS_MIGRATION_PREFIX, chain_id).into_bytes()
}

pub(crate) fn chain_nonces(chain_id: ChainId, tss_pubkey: &str) -> Vec<u8> {
    format!("nonce/chain/{:020}/{}", chain_id, tss_pubkey).into_bytes()
}

pub(crate) fn pending_nonces(chain_id: ChainId, tss_pubkey: &str) -> Vec<u8> {
    format!("nonce/pending/{:020}/{}", chain_id, tss_pubkey).into_bytes()
}

pub(crate) fn pending_nonces_chain_prefix(chain_id: ChainId) -> Vec<u8> {
    format!("nonce/pending/{:020}/", chain_id).into_bytes()
}

pub(crate) fn nonce_to_xmsg(chain_id: ChainId, tss_pubkey: &str, nonce: u64) -> Vec<u8> {
    format!("nonce/xmsg/{:020}/{}/{:020}", chain_id, tss_pubkey, nonce).into_bytes()
}

pub(crate) fn chain_state(chain_id: ChainId) -> Vec<u8> {
    format!("chain_state/{:020}", chain_id).into_bytes()
}

pub(crate) fn gas_price(chain_id: ChainId) -> Vec<u8> {
    format!("{}{:020}", GAS_PRICE_PREFIX, chain_id).into_bytes()
}

pub(crate) fn chain_params(chain_id: ChainId) -> Vec<u8> {
    format!("{}{:020}", CHAIN_PARAMS_PREFIX, chain_id).into_bytes()
}

/// Lock name for a ballot.
pub(crate) fn ballot_lock(index: &Digest) -> String {
    format!("ballot/{}", index)
}

/// Lock name for a nonce pair.
pub(crate) fn nonce_pair_lock(chain_id: ChainId, tss_pubkey: &str) -> String {
    format!("nonce/{}/{}", chain_id, tss_pubkey)
}
