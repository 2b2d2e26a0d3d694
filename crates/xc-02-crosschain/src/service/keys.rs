//! Store key layout for Xmsg entities.

use shared_types::{ChainId, Digest};

pub(crate) const XMSG_PREFIX: &str = "xmsg/";
pub(crate) const XMSG_PENDING_PREFIX: &str = "xmsg_pending/";

pub(crate) fn xmsg(index: &Digest) -> Vec<u8> {
    format!("{}{}", XMSG_PREFIX, index).into_bytes()
}

/// Marker present while the Xmsg is not terminal.
pub(crate) fn xmsg_pending(index: &Digest) -> Vec<u8> {
    format!("{}{}", XMSG_PENDING_PREFIX, index).into_bytes()
}

pub(crate) fn inbound_hash_prefix(chain_id: ChainId, tx_hash: &str) -> Vec<u8> {
    format!("inbound_hash/{:020}/{}/", chain_id, tx_hash).into_bytes()
}

pub(crate) fn inbound_hash(chain_id: ChainId, tx_hash: &str, event_index: u64) -> Vec<u8> {
    format!("inbound_hash/{:020}/{}/{:020}", chain_id, tx_hash, event_index).into_bytes()
}

/// Lock name for an Xmsg.
pub(crate) fn xmsg_lock(index: &Digest) -> String {
    format!("xmsg/{}", index)
}
