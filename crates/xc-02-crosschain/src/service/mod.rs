//! Cross-Chain Service - Xmsg lifecycle orchestration
//!
//! Consumes finalized inbound and outbound ballots plus home-chain block
//! ticks and moves Xmsgs through their state machine. Every event is applied
//! in one [`StoreTx`] shared with the observer components, so a ballot
//! decision, the Xmsg change and the nonce bookkeeping commit together.
//!
//! Signing instructions and lifecycle events are collected while the event
//! is applied and handed out only after the commit, with no lock held.

mod keys;


use crate::domain::{
    InboundObservation, InboundParams, OutboundInstruction, OutboundObservation, OutboundParams,
    ReceiveStatus, TxFinalizationStatus, Xmsg, XmsgEvent, XmsgKind, XmsgStatus,
};
use crate::error::{CrossChainError, CrossChainResult};
use crate::ports::{
    CrossChainApi, Eligibility, OutboundSigner, RevertFeasibility, XmsgEventPublisher, XmsgPolicy,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{
    decode, encode, Address, BallotIndex, BlockContext, ChainId, Digest, KeyValueStore, KeyedLocks,
    StoreTx, XmsgIndex,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use xc_01_observer::{
    BallotUpdateResult, ObservationType, ObserverError, ObserverService, Tss, VoteRequest,
    HOME_CHAIN_ID,
};

/// Orchestrator configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Home-chain blocks after which an undecided outbound attempt counts as
    /// failed. Zero disables the timeout.
    pub outbound_timeout_blocks: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            outbound_timeout_blocks: 100,
        }
    }
}

/// Outcome of an inbound or outbound vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmsgVoteResult {
    /// Ballot state after the vote.
    pub ballot: BallotUpdateResult,
    /// Xmsg as committed, when this vote approved the ballot.
    pub xmsg: Option<Xmsg>,
}

/// Summary of one block tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    /// Home-chain height.
    pub height: u64,
    /// Non-terminal Xmsgs visited.
    pub pending: usize,
    /// Outbound attempts scheduled.
    pub scheduled: usize,
    /// Attempts treated as failed after the timeout.
    pub timed_out: usize,
    /// Xmsgs aborted.
    pub aborted: usize,
    /// Xmsgs skipped because of a non-fatal error.
    pub errors: usize,
}

/// Side effects released after commit.
#[derive(Default)]
struct Effects {
    events: Vec<XmsgEvent>,
    instructions: Vec<OutboundInstruction>,
}

impl Effects {
    fn transition(
        &mut self,
        xmsg: &mut Xmsg,
        next: XmsgStatus,
        message: String,
        ctx: &BlockContext,
    ) -> CrossChainResult<()> {
        let from = xmsg.status();
        xmsg.transition_to(next, message.clone(), ctx.timestamp)?;
        info!(
            xmsg = %xmsg.index.short(),
            from = %from,
            to = %next,
            reason = %message,
            "[xc-02] Xmsg status changed"
        );
        self.events.push(XmsgEvent::StatusChanged {
            index: xmsg.index,
            from,
            to: next,
            message,
            height: ctx.height,
        });
        Ok(())
    }

    fn abort_stuck(
        &mut self,
        xmsg: &mut Xmsg,
        message: String,
        ctx: &BlockContext,
    ) -> CrossChainResult<()> {
        let from = xmsg.status();
        xmsg.abort_stuck(message.clone(), ctx.timestamp)?;
        warn!(
            xmsg = %xmsg.index.short(),
            from = %from,
            "[xc-02] Stuck Xmsg aborted"
        );
        self.events.push(XmsgEvent::StatusChanged {
            index: xmsg.index,
            from,
            to: XmsgStatus::Aborted,
            message,
            height: ctx.height,
        });
        Ok(())
    }

    fn schedule(&mut self, xmsg: &mut Xmsg, attempt: OutboundParams) -> CrossChainResult<()> {
        let instruction = OutboundInstruction::for_attempt(xmsg, &attempt);
        xmsg.append_outbound(attempt)?;
        self.instructions.push(instruction);
        Ok(())
    }

    fn append(&mut self, other: Effects) {
        self.events.extend(other.events);
        self.instructions.extend(other.instructions);
    }
}

fn defer(xmsg: &Xmsg, reason: &str) -> CrossChainResult<()> {
    debug!(xmsg = %xmsg.index.short(), reason, "[xc-02] Outbound deferred");
    Ok(())
}

/// Reject observations that do not target the Xmsg's in-flight attempt.
fn check_outbound_target(xmsg: &Xmsg, observation: &OutboundObservation) -> CrossChainResult<()> {
    if xmsg.is_terminal() {
        return Err(CrossChainError::InvalidTransition {
            index: xmsg.index,
            from: format!("{:?}", xmsg.status()),
            to: "OutboundObserved".to_string(),
        });
    }
    match xmsg.in_flight() {
        Some(attempt)
            if attempt.receiver_chain_id == observation.chain_id
                && attempt.nonce == observation.nonce =>
        {
            Ok(())
        }
        _ => Err(CrossChainError::OutboundMismatch {
            index: xmsg.index,
            chain_id: observation.chain_id,
            nonce: observation.nonce,
        }),
    }
}

/// Xmsg orchestrator over the observer components.
pub struct CrossChainService<S, G, P, E>
where
    S: KeyValueStore,
    G: OutboundSigner,
    P: XmsgPolicy,
    E: XmsgEventPublisher,
{
    observer: Arc<ObserverService<S>>,
    signer: Arc<G>,
    policy: P,
    publisher: Arc<E>,
    config: OrchestratorConfig,
    locks: KeyedLocks,
}

impl<S, G, P, E> CrossChainService<S, G, P, E>
where
    S: KeyValueStore,
    G: OutboundSigner,
    P: XmsgPolicy,
    E: XmsgEventPublisher,
{
    /// Create the orchestrator.
    pub fn new(
        observer: Arc<ObserverService<S>>,
        signer: Arc<G>,
        policy: P,
        publisher: Arc<E>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            observer,
            signer,
            policy,
            publisher,
            config,
            locks: KeyedLocks::new(),
        }
    }

    /// Observer components this orchestrator drives.
    pub fn observer(&self) -> &Arc<ObserverService<S>> {
        &self.observer
    }

    /// Lifecycle event sink.
    pub fn publisher(&self) -> &Arc<E> {
        &self.publisher
    }

    /// Configuration in use.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // === EVENTS ===

    /// Vote on an inbound event.
    ///
    /// # Errors
    ///
    /// - `InboundDisabled` while inbound observation is switched off
    /// - `UnsupportedChain` for an unsupported sender chain
    /// - ballot errors (`UnauthorizedVoter`, `DuplicateVote`,
    ///   `BallotAlreadyFinalized`)
    pub async fn vote_inbound(
        &self,
        ctx: &BlockContext,
        voter: &str,
        observation: InboundObservation,
    ) -> CrossChainResult<XmsgVoteResult> {
        let (result, effects) = self.apply_inbound(ctx, voter, observation)?;
        self.emit(effects).await;
        Ok(result)
    }

    /// Vote on the result of an outbound attempt.
    ///
    /// # Errors
    ///
    /// - `XmsgNotFound` for an unknown Xmsg
    /// - `InvalidTransition` when the Xmsg is terminal
    /// - `OutboundMismatch` unless chain and nonce match the attempt in flight
    /// - ballot errors as for [`vote_inbound`](Self::vote_inbound)
    pub async fn vote_outbound(
        &self,
        ctx: &BlockContext,
        voter: &str,
        observation: OutboundObservation,
    ) -> CrossChainResult<XmsgVoteResult> {
        let (result, effects) = self.apply_outbound(ctx, voter, observation)?;
        self.emit(effects).await;
        Ok(result)
    }

    /// Home-chain block tick.
    ///
    /// Re-evaluates deferred inbounds and fails attempts that exceeded the
    /// timeout. Each Xmsg is its own event; non-fatal errors are logged and
    /// counted, a fatal one stops the sweep.
    pub async fn on_block(&self, ctx: &BlockContext) -> CrossChainResult<BlockReport> {
        let (report, effects) = self.sweep(ctx)?;
        self.emit(effects).await;
        Ok(report)
    }

    /// Move the funds on `chain_id` from the current key to `new_pubkey`.
    ///
    /// # Errors
    ///
    /// `MigrationBlocked` while inbound is enabled, while the chain has
    /// outstanding nonces under the current key, or when `new_pubkey` is not
    /// a generated key.
    pub async fn migrate_tss_funds(
        &self,
        ctx: &BlockContext,
        chain_id: ChainId,
        new_pubkey: &str,
        amount: u128,
    ) -> CrossChainResult<Xmsg> {
        let (xmsg, effects) = self.apply_migration(ctx, chain_id, new_pubkey, amount)?;
        self.emit(effects).await;
        Ok(xmsg)
    }

    /// Make `pubkey` the current key from `ctx.height`.
    ///
    /// # Errors
    ///
    /// `TssUpdateBlocked` unless every supported chain has a mined fund
    /// migration to `pubkey`.
    pub fn update_tss_address(&self, ctx: &BlockContext, pubkey: &str) -> CrossChainResult<Tss> {
        let blocked = |reason: String| CrossChainError::TssUpdateBlocked { reason };
        let mut tx = self.observer.begin();

        if self.observer.tss.generated(&tx, pubkey)?.is_none() {
            return Err(blocked(format!("key {} was not generated", pubkey)));
        }

        let chains: Vec<ChainId> = self
            .observer
            .chains
            .all_params(&tx)?
            .into_iter()
            .filter(|p| p.is_supported && p.chain_id != HOME_CHAIN_ID)
            .map(|p| p.chain_id)
            .collect();
        for chain_id in chains {
            let Some(migration) = self.observer.tss.migration(&tx, chain_id)? else {
                return Err(blocked(format!("chain {} has no fund migration", chain_id)));
            };
            if migration.to_pubkey != pubkey {
                return Err(blocked(format!(
                    "chain {} migrated to {}",
                    chain_id, migration.to_pubkey
                )));
            }
            let mined = match migration.migration_xmsg {
                Some(index) => self
                    .get(&tx, &index)?
                    .map_or(false, |x| x.status() == XmsgStatus::OutboundMined),
                None => false,
            };
            if !mined {
                return Err(blocked(format!(
                    "fund migration on chain {} is not mined",
                    chain_id
                )));
            }
        }

        let tss = self.observer.tss.promote_generated(&mut tx, pubkey, ctx.height)?;
        self.observer.tss.clear_migrations(&mut tx)?;
        tx.commit()?;
        info!(
            pubkey = %tss.pubkey,
            height = ctx.height,
            "[xc-02] TSS address updated"
        );
        Ok(tss)
    }

    /// Governance abort of a pending Xmsg that will never be decided.
    ///
    /// An attempt still in flight is closed and its nonce leaves the pending
    /// window, so a later observation of it is refused.
    ///
    /// # Errors
    ///
    /// - `XmsgNotFound` for an unknown Xmsg
    /// - `XmsgNotPending` when the Xmsg is already terminal
    pub async fn abort_stuck_xmsg(
        &self,
        ctx: &BlockContext,
        index: &XmsgIndex,
    ) -> CrossChainResult<Xmsg> {
        let (xmsg, effects) = self.apply_abort_stuck(ctx, index)?;
        self.emit(effects).await;
        Ok(xmsg)
    }

    // === QUERIES ===

    /// Xmsg by index.
    pub fn get_xmsg_by_index(&self, index: &XmsgIndex) -> CrossChainResult<Option<Xmsg>> {
        self.get(&self.observer.begin(), index)
    }

    /// Xmsgs created from the events of one inbound transaction.
    pub fn get_xmsg_by_inbound(&self, chain_id: ChainId, tx_hash: &str) -> CrossChainResult<Vec<Xmsg>> {
        let tx = self.observer.begin();
        let indices: Vec<XmsgIndex> =
            tx.scan_typed(&keys::inbound_hash_prefix(chain_id, tx_hash))?;
        let mut found = Vec::with_capacity(indices.len());
        for index in indices {
            if let Some(xmsg) = self.get(&tx, &index)? {
                found.push(xmsg);
            }
        }
        Ok(found)
    }

    /// Non-terminal Xmsgs, optionally only those waiting on `chain_id`.
    pub fn list_pending_xmsgs(&self, chain_id: Option<ChainId>) -> CrossChainResult<Vec<Xmsg>> {
        let tx = self.observer.begin();
        let mut pending = Vec::new();
        for index in self.pending_indices(&tx)? {
            let xmsg = self.load(&tx, &index)?;
            if chain_id.map_or(true, |c| xmsg.target_chain() == c) {
                pending.push(xmsg);
            }
        }
        Ok(pending)
    }

    // === EVENT APPLICATION ===

    fn apply_inbound(
        &self,
        ctx: &BlockContext,
        voter: &str,
        observation: InboundObservation,
    ) -> CrossChainResult<(XmsgVoteResult, Effects)> {
        {
            let tx = self.observer.begin();
            if !self.observer.chains.flags(&tx)?.inbound_enabled {
                return Err(ObserverError::InboundDisabled.into());
            }
            self.observer
                .chains
                .supported_params(&tx, observation.sender_chain_id)?;
        }

        let ballot_index = observation.ballot_index();
        let request = VoteRequest {
            ballot_index,
            observation_type: ObservationType::InboundTx,
            chain_id: observation.sender_chain_id,
            voter: voter.to_string(),
            payload: encode(&observation)?,
            value_key: None,
        };

        self.apply_vote(ctx, request, |tx, payload, effects| {
            let approved: InboundObservation = decode(b"inbound-observation", payload)?;
            self.create_xmsg(tx, ctx, approved, ballot_index, effects)
        })
    }

    fn apply_outbound(
        &self,
        ctx: &BlockContext,
        voter: &str,
        observation: OutboundObservation,
    ) -> CrossChainResult<(XmsgVoteResult, Effects)> {
        {
            let tx = self.observer.begin();
            let xmsg = self.load(&tx, &observation.xmsg_index)?;
            if let Err(err) = check_outbound_target(&xmsg, &observation) {
                warn!(
                    xmsg = %observation.xmsg_index.short(),
                    voter,
                    error = %err,
                    "[xc-02] Outbound vote refused"
                );
                return Err(err);
            }
        }

        let request = VoteRequest {
            ballot_index: observation.ballot_index(),
            observation_type: ObservationType::OutboundTx,
            chain_id: observation.chain_id,
            voter: voter.to_string(),
            payload: encode(&observation)?,
            value_key: Some(observation.vote_key()?),
        };

        self.apply_vote(ctx, request, |tx, payload, effects| {
            let approved: OutboundObservation = decode(b"outbound-observation", payload)?;
            self.apply_outbound_result(tx, ctx, approved, effects)
        })
    }

    /// Cast a vote and, when it approves the ballot, run `on_approved` in the
    /// same transaction.
    ///
    /// A rejected ballot leaves the Xmsg untouched: a rejected inbound is
    /// discarded and a rejected outbound stays in flight until it times out.
    fn apply_vote<F>(
        &self,
        ctx: &BlockContext,
        request: VoteRequest,
        on_approved: F,
    ) -> CrossChainResult<(XmsgVoteResult, Effects)>
    where
        F: FnOnce(&mut StoreTx<'_, S>, &[u8], &mut Effects) -> CrossChainResult<Xmsg>,
    {
        let mut tx = self.observer.begin();
        let ballot = match self.observer.cast_vote(&mut tx, ctx, request.clone()) {
            Ok(ballot) => ballot,
            Err(err) => {
                drop(tx);
                if let Err(blame_err) = self.observer.record_conflict(ctx, &request, &err) {
                    warn!(error = %blame_err, "[xc-02] Failed to record conflicting vote");
                }
                return Err(err.into());
            }
        };

        let mut effects = Effects::default();
        let mut xmsg = None;
        if ballot.finalized_now {
            match ballot.approved_payload.as_deref() {
                Some(payload) => xmsg = Some(on_approved(&mut tx, payload, &mut effects)?),
                None => info!(
                    ballot = %ballot.ballot_index.short(),
                    observation = %request.observation_type,
                    "[xc-02] Ballot rejected, observation discarded"
                ),
            }
        }

        tx.commit()?;
        let ballot = ballot.into_result()?;
        Ok((XmsgVoteResult { ballot, xmsg }, effects))
    }

    fn create_xmsg(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        observation: InboundObservation,
        ballot_index: BallotIndex,
        effects: &mut Effects,
    ) -> CrossChainResult<Xmsg> {
        let index = observation.xmsg_index();
        tx.lock(&self.locks, keys::xmsg_lock(&index));
        if let Some(existing) = self.get(tx, &index)? {
            warn!(xmsg = %index.short(), "[xc-02] Xmsg already exists, inbound ignored");
            return Ok(existing);
        }

        let inbound = observation.into_inbound_params(ballot_index, ctx.height);
        tx.put_typed(
            keys::inbound_hash(inbound.sender_chain_id, &inbound.tx_hash, inbound.event_index),
            &index,
        )?;
        let mut xmsg = Xmsg::new(index, XmsgKind::Transfer, inbound, ctx.timestamp);
        info!(
            xmsg = %index.short(),
            sender_chain = xmsg.inbound.sender_chain_id,
            receiver_chain = xmsg.inbound.receiver_chain_id,
            amount = xmsg.inbound.amount,
            "[xc-02] Xmsg created"
        );
        effects.events.push(XmsgEvent::XmsgCreated {
            index,
            sender_chain_id: xmsg.inbound.sender_chain_id,
            height: ctx.height,
        });

        self.evaluate_inbound(tx, ctx, &mut xmsg, effects)?;
        self.save(tx, &xmsg)?;
        Ok(xmsg)
    }

    /// Schedule the outbound of a `PendingInbound` Xmsg if it is eligible.
    fn evaluate_inbound(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        xmsg: &mut Xmsg,
        effects: &mut Effects,
    ) -> CrossChainResult<()> {
        let receiver_chain = xmsg.inbound.receiver_chain_id;
        let receiver_params = self.observer.chains.outbound_params(tx, receiver_chain)?;
        match self.policy.check_inbound(xmsg, receiver_params.as_ref()) {
            Eligibility::Eligible => {}
            Eligibility::Deferred(reason) => return defer(xmsg, &reason),
            Eligibility::Rejected(reason) => {
                return effects.transition(xmsg, XmsgStatus::Aborted, reason, ctx)
            }
        }

        if !self.observer.chains.flags(tx)?.outbound_enabled {
            return defer(xmsg, "outbound disabled");
        }
        if !self.observer.chains.is_confirmed(
            tx,
            xmsg.inbound.sender_chain_id,
            xmsg.inbound.tx_height,
        )? {
            return defer(xmsg, "inbound not confirmed");
        }
        let Some(tss) = self.observer.tss.current_opt(tx, ctx.height)? else {
            return defer(xmsg, "no TSS");
        };
        let Some(params) = receiver_params else {
            return defer(xmsg, "receiver chain has no params");
        };

        let nonce = self
            .observer
            .nonces
            .allocate(tx, receiver_chain, &tss.pubkey, xmsg.index)?;
        let attempt = OutboundParams {
            receiver_chain_id: receiver_chain,
            receiver: xmsg.inbound.receiver.clone(),
            amount: xmsg.inbound.amount,
            nonce,
            gas_limit: params.outbound_gas_limit,
            gas_price: params.gas_price,
            tss_pubkey: tss.pubkey,
            created_at: ctx.height,
            is_revert: false,
            tx_hash: None,
            ballot_index: None,
            external_height: None,
            gas_used: None,
            tx_finalization_status: TxFinalizationStatus::NotFinalized,
        };
        effects.schedule(xmsg, attempt)?;
        effects.transition(
            xmsg,
            XmsgStatus::PendingOutbound,
            format!("outbound scheduled on chain {} nonce {}", receiver_chain, nonce),
            ctx,
        )
    }

    fn apply_outbound_result(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        observation: OutboundObservation,
        effects: &mut Effects,
    ) -> CrossChainResult<Xmsg> {
        tx.lock(&self.locks, keys::xmsg_lock(&observation.xmsg_index));
        let mut xmsg = self.load(tx, &observation.xmsg_index)?;
        check_outbound_target(&xmsg, &observation)?;
        self.lock_nonce_pairs(tx, ctx, &xmsg)?;

        let (chain_id, nonce) = self.finalize_attempt(tx, &mut xmsg, Some(&observation))?;
        match observation.status {
            ReceiveStatus::Success => {
                if let Some(attempt) = xmsg.current_outbound_mut() {
                    attempt
                        .tx_finalization_status
                        .advance_to(TxFinalizationStatus::Executed);
                }
                let next = if xmsg.status() == XmsgStatus::PendingRevert {
                    XmsgStatus::Reverted
                } else {
                    XmsgStatus::OutboundMined
                };
                effects.transition(
                    &mut xmsg,
                    next,
                    format!(
                        "outbound {} mined on chain {} nonce {}",
                        observation.tx_hash, chain_id, nonce
                    ),
                    ctx,
                )?;
            }
            ReceiveStatus::Failed => self.handle_failure(
                tx,
                ctx,
                &mut xmsg,
                format!("outbound failed on chain {} nonce {}", chain_id, nonce),
                effects,
            )?,
        }

        self.save(tx, &xmsg)?;
        Ok(xmsg)
    }

    /// Close the in-flight attempt: record what was observed, mark it
    /// finalized and take its nonce out of the pending window.
    fn finalize_attempt(
        &self,
        tx: &mut StoreTx<'_, S>,
        xmsg: &mut Xmsg,
        observed: Option<&OutboundObservation>,
    ) -> CrossChainResult<(ChainId, u64)> {
        let index = xmsg.index;
        let Some(attempt) = xmsg.current_outbound_mut().filter(|a| a.is_in_flight()) else {
            return Err(CrossChainError::OutboundMismatch {
                index,
                chain_id: observed.map_or(0, |o| o.chain_id),
                nonce: observed.map_or(0, |o| o.nonce),
            });
        };
        if let Some(observation) = observed {
            attempt.tx_hash = Some(observation.tx_hash.clone());
            attempt.ballot_index = Some(observation.ballot_index());
            attempt.external_height = Some(observation.external_height);
            attempt.gas_used = Some(observation.gas_used);
        }
        attempt
            .tx_finalization_status
            .advance_to(TxFinalizationStatus::Finalized);
        let (chain_id, nonce) = (attempt.receiver_chain_id, attempt.nonce);
        let tss_pubkey = attempt.tss_pubkey.clone();
        self.observer.nonces.complete(tx, chain_id, &tss_pubkey, nonce)?;
        Ok((chain_id, nonce))
    }

    /// Outbound failed (observed or timed out).
    fn handle_failure(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        xmsg: &mut Xmsg,
        reason: String,
        effects: &mut Effects,
    ) -> CrossChainResult<()> {
        match xmsg.status() {
            XmsgStatus::PendingOutbound => {
                effects.transition(xmsg, XmsgStatus::PendingRevert, reason, ctx)?;
                self.schedule_revert(tx, ctx, xmsg, effects)
            }
            XmsgStatus::PendingRevert => effects.transition(
                xmsg,
                XmsgStatus::Aborted,
                format!("revert failed: {}", reason),
                ctx,
            ),
            other => Err(CrossChainError::InvalidTransition {
                index: xmsg.index,
                from: format!("{:?}", other),
                to: format!("{:?}", XmsgStatus::PendingRevert),
            }),
        }
    }

    fn schedule_revert(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        xmsg: &mut Xmsg,
        effects: &mut Effects,
    ) -> CrossChainResult<()> {
        let abort = |effects: &mut Effects, xmsg: &mut Xmsg, reason: &str| {
            effects.transition(
                xmsg,
                XmsgStatus::Aborted,
                format!("revert not possible: {}", reason),
                ctx,
            )
        };
        if xmsg.kind == XmsgKind::TssMigration {
            return abort(effects, xmsg, "fund migrations are not reverted");
        }

        let origin = xmsg.inbound.sender_chain_id;
        let origin_params = self.observer.chains.outbound_params(tx, origin)?;
        let (receiver, gas_limit, amount) =
            match self.policy.check_revert(xmsg, origin_params.as_ref()) {
                RevertFeasibility::Feasible {
                    receiver,
                    gas_limit,
                    amount,
                } => (receiver, gas_limit, amount),
                RevertFeasibility::Infeasible(reason) => return abort(effects, xmsg, &reason),
            };
        let Some(tss) = self.observer.tss.current_opt(tx, ctx.height)? else {
            return abort(effects, xmsg, "no TSS");
        };

        let nonce = self
            .observer
            .nonces
            .allocate(tx, origin, &tss.pubkey, xmsg.index)?;
        let attempt = OutboundParams {
            receiver_chain_id: origin,
            receiver,
            amount,
            nonce,
            gas_limit,
            gas_price: origin_params.map(|p| p.gas_price).unwrap_or_default(),
            tss_pubkey: tss.pubkey,
            created_at: ctx.height,
            is_revert: true,
            tx_hash: None,
            ballot_index: None,
            external_height: None,
            gas_used: None,
            tx_finalization_status: TxFinalizationStatus::NotFinalized,
        };
        effects.schedule(xmsg, attempt)?;
        info!(
            xmsg = %xmsg.index.short(),
            chain_id = origin,
            nonce,
            "[xc-02] Revert scheduled"
        );
        Ok(())
    }

    /// Take every nonce pair the Xmsg's next step may touch, sorted, so a
    /// revert allocating on the origin chain cannot deadlock against another
    /// event completing there.
    fn lock_nonce_pairs(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        xmsg: &Xmsg,
    ) -> CrossChainResult<()> {
        let Some(attempt) = xmsg.in_flight() else {
            return Ok(());
        };
        let mut pairs = vec![(attempt.receiver_chain_id, attempt.tss_pubkey.clone())];
        if xmsg.status() == XmsgStatus::PendingOutbound {
            if let Some(tss) = self.observer.tss.current_opt(tx, ctx.height)? {
                pairs.push((xmsg.inbound.sender_chain_id, tss.pubkey));
            }
        }
        let pairs: Vec<(ChainId, &str)> = pairs.iter().map(|(c, p)| (*c, p.as_str())).collect();
        self.observer.nonces.lock_pairs(tx, &pairs);
        Ok(())
    }

    fn sweep(&self, ctx: &BlockContext) -> CrossChainResult<(BlockReport, Effects)> {
        let pending = self.pending_indices(&self.observer.begin())?;
        let mut report = BlockReport {
            height: ctx.height,
            pending: pending.len(),
            ..Default::default()
        };
        let mut effects = Effects::default();

        for index in pending {
            match self.process_pending(ctx, &index, &mut report) {
                Ok(step) => effects.append(step),
                Err(err) if err.is_fatal() => {
                    error!(xmsg = %index.short(), error = %err, "[xc-02] Fatal error in block sweep");
                    return Err(err);
                }
                Err(err) => {
                    report.errors += 1;
                    warn!(xmsg = %index.short(), error = %err, "[xc-02] Xmsg skipped in block sweep");
                }
            }
        }

        if report.scheduled > 0 || report.timed_out > 0 || report.aborted > 0 {
            info!(
                height = report.height,
                pending = report.pending,
                scheduled = report.scheduled,
                timed_out = report.timed_out,
                aborted = report.aborted,
                "[xc-02] Block processed"
            );
        }
        Ok((report, effects))
    }

    fn process_pending(
        &self,
        ctx: &BlockContext,
        index: &XmsgIndex,
        report: &mut BlockReport,
    ) -> CrossChainResult<Effects> {
        let mut tx = self.observer.begin();
        tx.lock(&self.locks, keys::xmsg_lock(index));
        let mut xmsg = self.load(&tx, index)?;
        let before = xmsg.clone();
        let mut effects = Effects::default();
        let mut timed_out = false;

        match xmsg.status() {
            XmsgStatus::PendingInbound => {
                self.evaluate_inbound(&mut tx, ctx, &mut xmsg, &mut effects)?
            }
            XmsgStatus::PendingOutbound | XmsgStatus::PendingRevert if self.is_timed_out(ctx, &xmsg) => {
                self.lock_nonce_pairs(&mut tx, ctx, &xmsg)?;
                let (chain_id, nonce) = self.finalize_attempt(&mut tx, &mut xmsg, None)?;
                warn!(
                    xmsg = %index.short(),
                    chain_id,
                    nonce,
                    timeout = self.config.outbound_timeout_blocks,
                    "[xc-02] Outbound attempt timed out"
                );
                self.handle_failure(
                    &mut tx,
                    ctx,
                    &mut xmsg,
                    format!("outbound timed out on chain {} nonce {}", chain_id, nonce),
                    &mut effects,
                )?;
                timed_out = true;
            }
            _ => {}
        }

        // Terminal Xmsgs still get saved so a stale pending marker is dropped.
        if xmsg == before && !xmsg.is_terminal() {
            return Ok(effects);
        }
        self.save(&mut tx, &xmsg)?;
        tx.commit()?;

        report.scheduled += effects.instructions.len();
        report.timed_out += usize::from(timed_out);
        if xmsg.status() == XmsgStatus::Aborted && before.status() != XmsgStatus::Aborted {
            report.aborted += 1;
        }
        Ok(effects)
    }

    fn apply_abort_stuck(
        &self,
        ctx: &BlockContext,
        index: &XmsgIndex,
    ) -> CrossChainResult<(Xmsg, Effects)> {
        let mut tx = self.observer.begin();
        tx.lock(&self.locks, keys::xmsg_lock(index));
        let mut xmsg = self.load(&tx, index)?;
        if xmsg.is_terminal() {
            return Err(CrossChainError::XmsgNotPending {
                index: *index,
                status: format!("{:?}", xmsg.status()),
            });
        }

        if xmsg.in_flight().is_some() {
            self.lock_nonce_pairs(&mut tx, ctx, &xmsg)?;
            self.finalize_attempt(&mut tx, &mut xmsg, None)?;
        }
        let mut effects = Effects::default();
        effects.abort_stuck(&mut xmsg, "aborted by governance".to_string(), ctx)?;
        self.save(&mut tx, &xmsg)?;
        tx.commit()?;
        Ok((xmsg, effects))
    }

    fn is_timed_out(&self, ctx: &BlockContext, xmsg: &Xmsg) -> bool {
        let timeout = self.config.outbound_timeout_blocks;
        timeout > 0
            && xmsg
                .in_flight()
                .map_or(false, |a| ctx.height >= a.created_at.saturating_add(timeout))
    }

    fn apply_migration(
        &self,
        ctx: &BlockContext,
        chain_id: ChainId,
        new_pubkey: &str,
        amount: u128,
    ) -> CrossChainResult<(Xmsg, Effects)> {
        let blocked = |reason: &str| {
            CrossChainError::from(ObserverError::MigrationBlocked {
                chain_id,
                reason: reason.to_string(),
            })
        };
        let index = Digest::of(
            "tss-migration",
            &[
                &chain_id.to_be_bytes(),
                new_pubkey.as_bytes(),
                &ctx.height.to_be_bytes(),
            ],
        );

        let mut tx = self.observer.begin();
        tx.lock(&self.locks, keys::xmsg_lock(&index));

        if self.observer.chains.flags(&tx)?.inbound_enabled {
            return Err(blocked("inbound must be disabled"));
        }
        let params = self.observer.chains.supported_outbound_params(&tx, chain_id)?;
        let current = self.observer.tss.current(&tx, ctx.height)?;
        if current.pubkey == new_pubkey {
            return Err(blocked("key is already current"));
        }
        if self.observer.tss.generated(&tx, new_pubkey)?.is_none() {
            return Err(blocked("key was not generated"));
        }
        if self.get(&tx, &index)?.is_some() {
            return Err(blocked("migration already recorded at this height"));
        }

        self.observer
            .nonces
            .lock_pairs(&mut tx, &[(chain_id, current.pubkey.as_str()), (chain_id, new_pubkey)]);
        let outstanding = self
            .observer
            .nonces
            .pending_nonces(&tx, chain_id, &current.pubkey)?
            .map_or(false, |p| !p.is_empty());
        if outstanding {
            return Err(blocked("outstanding nonces under the current key"));
        }

        let sender: Address = current.pubkey.clone();
        let inbound = InboundParams {
            sender_chain_id: HOME_CHAIN_ID,
            sender: sender.clone(),
            tx_origin: sender,
            receiver_chain_id: chain_id,
            receiver: new_pubkey.to_string(),
            amount,
            message: String::new(),
            tx_hash: index.to_string(),
            tx_height: ctx.height,
            event_index: 0,
            ballot_index: Digest::ZERO,
            finalized_height: ctx.height,
            tx_finalization_status: TxFinalizationStatus::Finalized,
            revert_options: None,
        };
        let mut xmsg = Xmsg::new(index, XmsgKind::TssMigration, inbound, ctx.timestamp);
        let mut effects = Effects::default();
        effects.events.push(XmsgEvent::XmsgCreated {
            index,
            sender_chain_id: HOME_CHAIN_ID,
            height: ctx.height,
        });

        let nonce = self
            .observer
            .nonces
            .allocate(&mut tx, chain_id, &current.pubkey, index)?;
        let attempt = OutboundParams {
            receiver_chain_id: chain_id,
            receiver: new_pubkey.to_string(),
            amount,
            nonce,
            gas_limit: params.outbound_gas_limit,
            gas_price: params.gas_price,
            tss_pubkey: current.pubkey.clone(),
            created_at: ctx.height,
            is_revert: false,
            tx_hash: None,
            ballot_index: None,
            external_height: None,
            gas_used: None,
            tx_finalization_status: TxFinalizationStatus::NotFinalized,
        };
        effects.schedule(&mut xmsg, attempt)?;
        effects.transition(
            &mut xmsg,
            XmsgStatus::PendingOutbound,
            format!("fund migration to {} scheduled", new_pubkey),
            ctx,
        )?;

        let mut migration =
            self.observer
                .nonces
                .migrate(&mut tx, chain_id, &current.pubkey, new_pubkey, ctx.height)?;
        migration.migration_xmsg = Some(index);
        self.observer.tss.record_migration(&mut tx, &migration)?;
        self.save(&mut tx, &xmsg)?;
        tx.commit()?;

        info!(
            xmsg = %index.short(),
            chain_id,
            from = %current.pubkey,
            to = %new_pubkey,
            amount,
            "[xc-02] TSS fund migration created"
        );
        Ok((xmsg, effects))
    }

    // === DISPATCH ===

    async fn emit(&self, effects: Effects) {
        for event in effects.events {
            self.publisher.publish(event).await;
        }
        for instruction in effects.instructions {
            self.dispatch(instruction).await;
        }
    }

    async fn dispatch(&self, instruction: OutboundInstruction) {
        let event = match self.signer.sign_and_broadcast(&instruction).await {
            Ok(tx_hash) => {
                info!(
                    xmsg = %instruction.xmsg_index.short(),
                    chain_id = instruction.chain_id,
                    nonce = instruction.nonce,
                    tx_hash = %tx_hash,
                    "[xc-02] Outbound dispatched"
                );
                XmsgEvent::OutboundDispatched {
                    index: instruction.xmsg_index,
                    chain_id: instruction.chain_id,
                    nonce: instruction.nonce,
                    tx_hash,
                }
            }
            Err(err) => {
                warn!(
                    xmsg = %instruction.xmsg_index.short(),
                    chain_id = instruction.chain_id,
                    nonce = instruction.nonce,
                    error = %err,
                    "[xc-02] Outbound dispatch failed"
                );
                XmsgEvent::DispatchFailed {
                    index: instruction.xmsg_index,
                    chain_id: instruction.chain_id,
                    nonce: instruction.nonce,
                    reason: err.to_string(),
                }
            }
        };
        self.publisher.publish(event).await;
    }

    // === STORAGE ===

    fn get(&self, tx: &StoreTx<'_, S>, index: &XmsgIndex) -> CrossChainResult<Option<Xmsg>> {
        Ok(tx.get_typed(&keys::xmsg(index))?)
    }

    fn load(&self, tx: &StoreTx<'_, S>, index: &XmsgIndex) -> CrossChainResult<Xmsg> {
        self.get(tx, index)?
            .ok_or(CrossChainError::XmsgNotFound { index: *index })
    }

    fn save(&self, tx: &mut StoreTx<'_, S>, xmsg: &Xmsg) -> CrossChainResult<()> {
        tx.put_typed(keys::xmsg(&xmsg.index), xmsg)?;
        if xmsg.is_terminal() {
            tx.delete(keys::xmsg_pending(&xmsg.index));
        } else {
            tx.put_typed(keys::xmsg_pending(&xmsg.index), &xmsg.index)?;
        }
        Ok(())
    }

    fn pending_indices(&self, tx: &StoreTx<'_, S>) -> CrossChainResult<Vec<XmsgIndex>> {
        Ok(tx.scan_typed(keys::XMSG_PENDING_PREFIX.as_bytes())?)
    }
}

#[async_trait]
impl<S, G, P, E> CrossChainApi for CrossChainService<S, G, P, E>
where
    S: KeyValueStore + 'static,
    G: OutboundSigner + 'static,
    P: XmsgPolicy + 'static,
    E: XmsgEventPublisher + 'static,
{
    async fn vote_inbound(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: InboundObservation,
    ) -> CrossChainResult<XmsgVoteResult> {
        CrossChainService::vote_inbound(self, &ctx, &voter, observation).await
    }

    async fn vote_outbound(
        &self,
        ctx: BlockContext,
        voter: Address,
        observation: OutboundObservation,
    ) -> CrossChainResult<XmsgVoteResult> {
        CrossChainService::vote_outbound(self, &ctx, &voter, observation).await
    }

    async fn on_block(&self, ctx: BlockContext) -> CrossChainResult<BlockReport> {
        CrossChainService::on_block(self, &ctx).await
    }

    async fn migrate_tss_funds(
        &self,
        ctx: BlockContext,
        chain_id: ChainId,
        new_pubkey: String,
        amount: u128,
    ) -> CrossChainResult<Xmsg> {
        CrossChainService::migrate_tss_funds(self, &ctx, chain_id, &new_pubkey, amount).await
    }

    async fn update_tss_address(&self, ctx: BlockContext, pubkey: String) -> CrossChainResult<Tss> {
        CrossChainService::update_tss_address(self, &ctx, &pubkey)
    }

    async fn abort_stuck_xmsg(&self, ctx: BlockContext, index: XmsgIndex) -> CrossChainResult<Xmsg> {
        CrossChainService::abort_stuck_xmsg(self, &ctx, &index).await
    }

    fn get_xmsg_by_index(&self, index: &XmsgIndex) -> CrossChainResult<Option<Xmsg>> {
        CrossChainService::get_xmsg_by_index(self, index)
    }

    fn get_xmsg_by_inbound(&self, chain_id: ChainId, tx_hash: &str) -> CrossChainResult<Vec<Xmsg>> {
        CrossChainService::get_xmsg_by_inbound(self, chain_id, tx_hash)
    }

    fn list_pending_xmsgs(&self, chain_id: Option<ChainId>) -> CrossChainResult<Vec<Xmsg>> {
        CrossChainService::list_pending_xmsgs(self, chain_id)
    }
}
