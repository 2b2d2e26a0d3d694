//! Observer Service - ballots, relayers, TSS, nonces and chain state
//!
//! The components are stateless over the shared store; every mutation goes
//! through a [`StoreTx`] so one event commits as one batch. Methods taking a
//! `tx` compose into a caller's transaction (the crosschain orchestrator
//! uses them that way). The remaining methods open and commit their own.

mod ballot_box;
mod chain_state;
mod keys;
mod nonces;
mod relayer_set;
mod tss;


pub use ballot_box::{BallotBox, BallotConfig, BallotUpdateResult, VoteRequest};
pub use chain_state::ChainStateTracker;
pub use nonces::NonceAllocator;
pub use relayer_set::{BlameOutcome, RelayerSetConfig, RelayerSetManager};
pub use tss::TssRegistry;

use crate::domain::{
    Ballot, Blame, BlockObservation, ChainParams, ChainState, CrosschainFlags, GasPrice,
    GasPriceObservation, KeygenObservation, KeygenStatus, NodeAccount, ObservationType,
    PendingNonces, RelayerSet, Threshold, Tss,
};
use crate::error::{ObserverError, ObserverResult};
use crate::ports::ObserverApi;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{
    decode, encode, Address, BallotIndex, BlockContext, ChainId, Height, KeyValueStore, StoreTx,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chain id used for observations about the home chain itself (keygen).
pub const HOME_CHAIN_ID: ChainId = 0;

/// Observer subsystem configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Ballot settings.
    pub ballot: BallotConfig,
    /// Relayer set settings.
    pub relayer_set: RelayerSetConfig,
}

/// Initial observer state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverGenesis {
    /// Relayer address → voting weight.
    pub relayers: BTreeMap<Address, u64>,
    /// Node accounts taking part in keygen.
    pub node_accounts: Vec<NodeAccount>,
    /// Connected chains.
    pub chain_params: Vec<ChainParams>,
    /// Global switches.
    pub flags: CrosschainFlags,
    /// Key group active from genesis.
    pub tss: Option<Tss>,
}

/// Observer consensus facade over one store.
pub struct ObserverService<S: KeyValueStore> {
    store: Arc<RwLock<S>>,
    /// Ballot accumulation.
    pub ballots: BallotBox,
    /// Outbound nonces.
    pub nonces: NonceAllocator,
    /// TSS key groups.
    pub tss: TssRegistry,
    /// Relayer roster.
    pub relayers: RelayerSetManager,
    /// External chain tips and params.
    pub chains: ChainStateTracker,
}

impl<S: KeyValueStore> ObserverService<S> {
    /// Create a service over `store`.
    pub fn new(store: Arc<RwLock<S>>, config: ObserverConfig) -> Self {
        Self {
            store,
            ballots: BallotBox::new(config.ballot),
            nonces: NonceAllocator::new(),
            tss: TssRegistry::new(),
            relayers: RelayerSetManager::new(config.relayer_set),
            chains: ChainStateTracker::new(),
        }
    }

    /// Shared store handle.
    pub fn store(&self) -> &Arc<RwLock<S>> {
        &self.store
    }

    /// Open a transaction over the store.
    pub fn begin(&self) -> StoreTx<'_, S> {
        StoreTx::begin(self.store.as_ref())
    }

    /// Write the genesis state at `ctx.height`.
    pub fn init_genesis(&self, ctx: &BlockContext, genesis: ObserverGenesis) -> ObserverResult<()> {
        let mut tx = self.begin();
        self.relayers.update_set(&mut tx, ctx, genesis.relayers)?;
        for account in &genesis.node_accounts {
            self.relayers.upsert_node_account(&mut tx, account)?;
        }
        for params in &genesis.chain_params {
            self.chains.set_params(&mut tx, params)?;
        }
        self.chains.set_flags(&mut tx, genesis.flags)?;
        if let Some(tss) = genesis.tss {
            self.tss.register(&mut tx, tss)?;
        }
        let written = tx.commit()?;
        info!(height = ctx.height, written, "[xc-01] Genesis state initialized");
        Ok(())
    }

    // === VOTING ===

    /// Cast a vote inside the caller's transaction.
    ///
    /// Picks the voter set and threshold for the observation: keygen ballots
    /// are decided unanimously by active node accounts, everything else by the
    /// relayer set at `ctx.height` with the chain's threshold override.
    pub fn cast_vote(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        request: VoteRequest,
    ) -> ObserverResult<BallotUpdateResult> {
        let (voters, threshold) = match request.observation_type {
            ObservationType::TssKeygen => (
                self.relayers.keygen_voters(tx, ctx.height)?,
                Some(Threshold::UNANIMOUS),
            ),
            _ => {
                let voters = self.relayers.set_at(tx, ctx.height)?;
                let threshold = self
                    .chains
                    .params(tx, request.chain_id)?
                    .and_then(|p| p.ballot_threshold);
                (voters, threshold)
            }
        };
        self.ballots
            .cast_vote(tx, ctx, request, &voters, threshold)
    }

    /// Record a blame when `err` is a conflicting re-vote.
    ///
    /// Runs in its own transaction since the vote's transaction is discarded.
    pub fn record_conflict(
        &self,
        ctx: &BlockContext,
        request: &VoteRequest,
        err: &ObserverError,
    ) -> ObserverResult<()> {
        if !matches!(err, ObserverError::DuplicateVote { conflicting: true, .. }) {
            return Ok(());
        }
        let blame = Blame {
            chain_id: request.chain_id,
            offenders: vec![request.voter.clone()],
            reason: format!("conflicting vote on {}", request.observation_type),
            subject: request.ballot_index,
            height: ctx.height,
        };
        let mut tx = self.begin();
        self.relayers.record_blame(&mut tx, ctx, blame)?;
        tx.commit()?;
        Ok(())
    }

    /// Cast a vote in a fresh transaction and commit it.
    ///
    /// `on_decided` runs inside the same transaction when this vote finalizes
    /// the ballot. Late votes are committed for audit and then reported as
    /// `BallotAlreadyFinalized`.
    fn vote_and_commit<F>(
        &self,
        ctx: &BlockContext,
        request: VoteRequest,
        on_decided: F,
    ) -> ObserverResult<BallotUpdateResult>
    where
        F: FnOnce(&mut StoreTx<'_, S>, &BallotUpdateResult) -> ObserverResult<()>,
    {
        let mut tx = self.begin();
        let result = match self.cast_vote(&mut tx, ctx, request.clone()) {
            Ok(result) => result,
            Err(err) => {
                drop(tx);
                if let Err(blame_err) = self.record_conflict(ctx, &request, &err) {
                    warn!(error = %blame_err, "[xc-01] Failed to record conflicting vote");
                }
                return Err(err);
            }
        };
        if result.finalized_now {
            on_decided(&mut tx, &result)?;
        }
        tx.commit()?;
        result.into_result()
    }

    /// Vote on an external block header; an approved header advances the
    /// chain tip.
    ///
    /// # Errors
    ///
    /// - `InboundDisabled` while inbound observation is switched off
    /// - `UnsupportedChain` for chains without supported params
    pub fn vote_block_header(
        &self,
        ctx: &BlockContext,
        voter: &str,
        block: BlockObservation,
    ) -> ObserverResult<BallotUpdateResult> {
        {
            let tx = self.begin();
            if !self.chains.flags(&tx)?.inbound_enabled {
                return Err(ObserverError::InboundDisabled);
            }
            self.chains.supported_params(&tx, block.chain_id)?;
        }

        let request = VoteRequest {
            ballot_index: block.ballot_index(),
            observation_type: ObservationType::InboundBlock,
            chain_id: block.chain_id,
            voter: voter.to_string(),
            payload: encode(&block)?,
            value_key: None,
        };

        self.vote_and_commit(ctx, request, |tx, result| {
            let Some(payload) = result.approved_payload.as_deref() else {
                return Ok(());
            };
            let approved: BlockObservation = decode(b"block-observation", payload)?;
            match self.chains.apply_block(tx, ctx, &approved) {
                Ok(_) => Ok(()),
                Err(ObserverError::StaleChainState {
                    chain_id,
                    height,
                    latest,
                }) => {
                    debug!(chain_id, height, latest, "[xc-01] Ignoring stale block header");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Vote on a keygen result.
    ///
    /// Unanimous success registers the first key group effective from
    /// `ctx.height`; later key groups are parked as generated.
    pub fn vote_keygen(
        &self,
        ctx: &BlockContext,
        voter: &str,
        observation: KeygenObservation,
    ) -> ObserverResult<BallotUpdateResult> {
        let request = VoteRequest {
            ballot_index: observation.ballot_index(),
            observation_type: ObservationType::TssKeygen,
            chain_id: HOME_CHAIN_ID,
            voter: voter.to_string(),
            payload: encode(&observation)?,
            value_key: None,
        };

        self.vote_and_commit(ctx, request, |tx, result| {
            let Some(payload) = result.approved_payload.as_deref() else {
                warn!(
                    keygen_height = observation.keygen_height,
                    "[xc-01] Keygen ballot rejected"
                );
                return Ok(());
            };
            let approved: KeygenObservation = decode(b"keygen-observation", payload)?;
            if approved.status == KeygenStatus::Failed {
                warn!(
                    keygen_height = approved.keygen_height,
                    "[xc-01] Keygen reported failed"
                );
                return Ok(());
            }

            let accounts: Vec<NodeAccount> = self
                .relayers
                .node_accounts(tx)?
                .into_iter()
                .filter(NodeAccount::is_active)
                .collect();
            let tss = Tss {
                pubkey: approved.pubkey,
                participants: accounts.iter().map(|a| a.granted_pubkey.clone()).collect(),
                operators: accounts.into_iter().map(|a| a.operator).collect(),
                finalized_height: ctx.height,
                keygen_height: approved.keygen_height,
            };
            // Only the first key group becomes current directly; later ones
            // wait for fund migration and an address update.
            if self.tss.history(tx)?.is_empty() {
                self.tss.register(tx, tss)
            } else {
                self.tss.record_generated(tx, &tss)
            }
        })
    }

    /// Vote on a blame record; approval stores it and applies ejections.
    pub fn vote_blame(
        &self,
        ctx: &BlockContext,
        voter: &str,
        blame: Blame,
    ) -> ObserverResult<BallotUpdateResult> {
        let request = VoteRequest {
            ballot_index: blame.index(),
            observation_type: ObservationType::Blame,
            chain_id: blame.chain_id,
            voter: voter.to_string(),
            payload: encode(&blame)?,
            value_key: None,
        };

        self.vote_and_commit(ctx, request, |tx, result| {
            let Some(payload) = result.approved_payload.as_deref() else {
                return Ok(());
            };
            let mut approved: Blame = decode(b"blame", payload)?;
            approved.height = ctx.height;
            self.relayers.record_blame(tx, ctx, approved).map(|_| ())
        })
    }

    /// Record an observer's gas price for a chain.
    ///
    /// Not a ballot: each observer keeps one standing report and outbound
    /// attempts are priced at the median.
    ///
    /// # Errors
    ///
    /// - `NotAnObserver` unless `voter` is in the relayer set at `ctx.height`
    /// - `UnsupportedChain` for chains without supported params
    pub fn vote_gas_price(
        &self,
        ctx: &BlockContext,
        voter: &str,
        observation: GasPriceObservation,
    ) -> ObserverResult<GasPrice> {
        let mut tx = self.begin();
        if !self.relayers.set_at(&tx, ctx.height)?.contains(voter) {
            return Err(ObserverError::NotAnObserver {
                voter: voter.to_string(),
                height: ctx.height,
            });
        }
        let gas = self
            .chains
            .report_gas_price(&mut tx, ctx, voter, &observation)?;
        tx.commit()?;
        Ok(gas)
    }

    // === POLICY UPDATES ===

    /// Write a relayer set snapshot effective from `ctx.height`.
    pub fn update_relayer_set(
        &self,
        ctx: &BlockContext,
        members: BTreeMap<Address, u64>,
    ) -> ObserverResult<RelayerSet> {
        let mut tx = self.begin();
        let set = self.relayers.update_set(&mut tx, ctx, members)?;
        tx.commit()?;
        Ok(set)
    }

    /// Insert or replace a node account.
    pub fn upsert_node_account(&self, account: &NodeAccount) -> ObserverResult<()> {
        let mut tx = self.begin();
        self.relayers.upsert_node_account(&mut tx, account)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace chain params.
    pub fn upsert_chain_params(&self, params: &ChainParams) -> ObserverResult<()> {
        let mut tx = self.begin();
        self.chains.set_params(&mut tx, params)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the crosschain flags.
    pub fn set_crosschain_flags(&self, flags: CrosschainFlags) -> ObserverResult<()> {
        let mut tx = self.begin();
        self.chains.set_flags(&mut tx, flags)?;
        tx.commit()?;
        Ok(())
    }

    // === QUERIES ===

    /// Ballot by index.
    pub fn get_ballot_by_index(&self, index: &BallotIndex) -> ObserverResult<Option<Ballot>> {
        self.ballots.get(&self.begin(), index)
    }

    /// Ballots created at a home-chain height.
    pub fn ballots_created_at(&self, height: Height) -> ObserverResult<Vec<Ballot>> {
        self.ballots.ballots_created_at(&self.begin(), height)
    }

    /// Relayer set in force at `height`.
    pub fn relayer_set_at(&self, height: Height) -> ObserverResult<RelayerSet> {
        self.relayers.set_at(&self.begin(), height)
    }

    /// Key group signing at `height`.
    pub fn get_current_tss(&self, height: Height) -> ObserverResult<Tss> {
        self.tss.current(&self.begin(), height)
    }

    /// Every registered key group, oldest first.
    pub fn get_tss_history(&self) -> ObserverResult<Vec<Tss>> {
        self.tss.history(&self.begin())
    }

    /// Tracked tip of an external chain.
    pub fn get_chain_state(&self, chain_id: ChainId) -> ObserverResult<Option<ChainState>> {
        self.chains.state(&self.begin(), chain_id)
    }

    /// Params of a chain.
    pub fn get_chain_params(&self, chain_id: ChainId) -> ObserverResult<Option<ChainParams>> {
        self.chains.params(&self.begin(), chain_id)
    }

    /// Gas price reports and median of a chain.
    pub fn get_gas_price(&self, chain_id: ChainId) -> ObserverResult<Option<GasPrice>> {
        self.chains.gas_price(&self.begin(), chain_id)
    }

    /// Current crosschain flags.
    pub fn get_crosschain_flags(&self) -> ObserverResult<CrosschainFlags> {
        self.chains.flags(&self.begin())
    }

    /// Stored blame records.
    pub fn get_blames(&self) -> ObserverResult<Vec<Blame>> {
        self.relayers.blames(&self.begin())
    }

    /// Node accounts.
    pub fn get_node_accounts(&self) -> ObserverResult<Vec<NodeAccount>> {
        self.relayers.node_accounts(&self.begin())
    }

    /// Pending nonce windows of every key on a chain.
    pub fn get_pending_nonces_by_chain(&self, chain_id: ChainId) -> ObserverResult<Vec<PendingNonces>> {
        self.nonces.pending_nonces_by_chain(&self.begin(), chain_id)
    }
}

#[async_trait]
impl<S: KeyValueStore + 'static> ObserverApi for ObserverService<S> {
    async fn vote_block_header(
        &self,
        ctx: BlockContext,
        voter: Address,
        block: BlockObservation,
    ) -> ObserverResult<BallotUpdateResult> {
        ObserverService::vote_block_header(self, &ctx, &voter, block)
    }

    async fn vote_keygen(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: KeygenObservation,
    ) -> ObserverResult<BallotUpdateResult> {
        ObserverService::vote_keygen(self, &ctx, &voter, observation)
    }

    async fn vote_blame(
        &self,
        ctx: BlockContext,
        voter: Address,
        blame: Blame,
    ) -> ObserverResult<BallotUpdateResult> {
        ObserverService::vote_blame(self, &ctx, &voter, blame)
    }

    async fn vote_gas_price(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: GasPriceObservation,
    ) -> ObserverResult<GasPrice> {
        ObserverService::vote_gas_price(self, &ctx, &voter, observation)
    }

    async fn update_relayer_set(
        &self,
        ctx: BlockContext,
        members: BTreeMap<Address, u64>,
    ) -> ObserverResult<RelayerSet> {
        ObserverService::update_relayer_set(self, &ctx, members)
    }

    fn get_ballot_by_index(&self, index: &BallotIndex) -> ObserverResult<Option<Ballot>> {
        ObserverService::get_ballot_by_index(self, index)
    }

    fn relayer_set_at(&self, height: Height) -> ObserverResult<RelayerSet> {
        ObserverService::relayer_set_at(self, height)
    }

    fn get_current_tss(&self, height: Height) -> ObserverResult<Tss> {
        ObserverService::get_current_tss(self, height)
    }

    fn get_chain_state(&self, chain_id: ChainId) -> ObserverResult<Option<ChainState>> {
        ObserverService::get_chain_state(self, chain_id)
    }

    fn get_pending_nonces_by_chain(&self, chain_id: ChainId) -> ObserverResult<Vec<PendingNonces>> {
        ObserverService::get_pending_nonces_by_chain(self, chain_id)
    }
}
