//! # Inbound Ports
//!
//! API trait defining what the Observer subsystem exposes to the node.

use crate::domain::{
    Ballot, Blame, BlockObservation, ChainState, GasPrice, GasPriceObservation, KeygenObservation,
    PendingNonces, RelayerSet, Tss,
};
use crate::error::ObserverResult;
use crate::service::BallotUpdateResult;
use async_trait::async_trait;
use shared_types::{Address, BallotIndex, BlockContext, ChainId, Height};
use std::collections::BTreeMap;

/// Observer API - inbound port.
///
/// Vote methods are applied as one committed event each. Queries are
/// read-only and safe to poll concurrently with event application.
#[async_trait]
pub trait ObserverApi: Send + Sync {
    /// Vote on an external block header.
    async fn vote_block_header(
        &self,
        ctx: BlockContext,
        voter: Address,
        block: BlockObservation,
    ) -> ObserverResult<BallotUpdateResult>;

    /// Vote on a TSS keygen result.
    async fn vote_keygen(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: KeygenObservation,
    ) -> ObserverResult<BallotUpdateResult>;

    /// Vote on a blame record.
    async fn vote_blame(
        &self,
        ctx: BlockContext,
        voter: Address,
        blame: Blame,
    ) -> ObserverResult<BallotUpdateResult>;

    /// Report an observer's gas price for a chain.
    async fn vote_gas_price(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: GasPriceObservation,
    ) -> ObserverResult<GasPrice>;

    /// Replace the relayer set from `ctx.height` on.
    async fn update_relayer_set(
        &self,
        ctx: BlockContext,
        members: BTreeMap<Address, u64>,
    ) -> ObserverResult<RelayerSet>;

    /// Ballot by index.
    fn get_ballot_by_index(&self, index: &BallotIndex) -> ObserverResult<Option<Ballot>>;

    /// Relayer set in force at `height`.
    fn relayer_set_at(&self, height: Height) -> ObserverResult<RelayerSet>;

    /// Key group signing at `height`.
    fn get_current_tss(&self, height: Height) -> ObserverResult<Tss>;

    /// Tracked tip of an external chain.
    fn get_chain_state(&self, chain_id: ChainId) -> ObserverResult<Option<ChainState>>;

    /// Pending nonce windows of every key on a chain.
    fn get_pending_nonces_by_chain(&self, chain_id: ChainId) -> ObserverResult<Vec<PendingNonces>>;
}
