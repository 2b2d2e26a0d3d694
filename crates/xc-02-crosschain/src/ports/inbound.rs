//! # Inbound Ports
//!
//! API trait defining what the Cross-Chain subsystem exposes to the node.

use crate::domain::{InboundObservation, OutboundObservation, Xmsg};
use crate::error::CrossChainResult;
use crate::service::{BlockReport, XmsgVoteResult};
use async_trait::async_trait;
use shared_types::{Address, BlockContext, ChainId, XmsgIndex};
use xc_01_observer::Tss;

/// Cross-chain API - inbound port.
///
/// Each mutating call is one ordered event. Signing instructions and
/// lifecycle events are handed out after the event has committed.
#[async_trait]
pub trait CrossChainApi: Send + Sync {
    /// Vote on an inbound event; approval creates the Xmsg.
    async fn vote_inbound(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: InboundObservation,
    ) -> CrossChainResult<XmsgVoteResult>;

    /// Vote on the result of an outbound attempt.
    async fn vote_outbound(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: OutboundObservation,
    ) -> CrossChainResult<XmsgVoteResult>;

    /// Home-chain block tick: deferred inbounds and attempt timeouts.
    async fn on_block(&self, ctx: BlockContext) -> CrossChainResult<BlockReport>;

    /// Move funds on `chain_id` from the current key to a generated one.
    async fn migrate_tss_funds(
        &self,
        ctx: BlockContext,
        chain_id: ChainId,
        new_pubkey: String,
        amount: u128,
    ) -> CrossChainResult<Xmsg>;

    /// Make a migrated key current.
    async fn update_tss_address(&self, ctx: BlockContext, pubkey: String) -> CrossChainResult<Tss>;

    /// Abort a pending Xmsg that will never be decided.
    async fn abort_stuck_xmsg(&self, ctx: BlockContext, index: XmsgIndex) -> CrossChainResult<Xmsg>;

    /// Xmsg by index.
    fn get_xmsg_by_index(&self, index: &XmsgIndex) -> CrossChainResult<Option<Xmsg>>;

    /// Xmsgs created from an inbound transaction.
    fn get_xmsg_by_inbound(&self, chain_id: ChainId, tx_hash: &str) -> CrossChainResult<Vec<Xmsg>>;

    /// Non-terminal Xmsgs, optionally only those waiting on `chain_id`.
    fn list_pending_xmsgs(&self, chain_id: Option<ChainId>) -> CrossChainResult<Vec<Xmsg>>;
}
