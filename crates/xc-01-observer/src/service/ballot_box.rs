//! # Ballot Box
//!
//! Accumulates observer votes into persisted [`Ballot`]s.
//!
//! Votes on one ballot serialize on the ballot's lock, which the enclosing
//! [`StoreTx`] keeps until commit. Votes on different ballots never contend.

use super::keys;
use crate::domain::{Ballot, BallotStatus, ObservationType, RelayerSet, Threshold, VoteOutcome};
use crate::error::{ObserverError, ObserverResult};
use serde::{Deserialize, Serialize};
use shared_types::{
    Address, BallotIndex, BlockContext, ChainId, Digest, KeyValueStore, KeyedLocks, StoreTx,
    VoteValue,
};
use tracing::{debug, info};

/// Ballot settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallotConfig {
    /// Threshold used unless the chain params override it.
    pub default_threshold: Threshold,
}

impl Default for BallotConfig {
    fn default() -> Self {
        Self {
            default_threshold: Threshold::SUPERMAJORITY,
        }
    }
}

/// A single observer vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRequest {
    /// Ballot the vote belongs to.
    pub ballot_index: BallotIndex,
    /// What is being decided.
    pub observation_type: ObservationType,
    /// Chain the observation belongs to.
    pub chain_id: ChainId,
    /// Voting relayer.
    pub voter: Address,
    /// Encoded claim, handed back when its value is approved.
    pub payload: Vec<u8>,
    /// Bytes the vote value is computed from when only part of the claim
    /// must agree; the whole payload when `None`.
    pub value_key: Option<Vec<u8>>,
}

impl VoteRequest {
    /// Vote value: digest of the value key, or of the payload.
    pub fn value(&self) -> VoteValue {
        Digest::of_bytes("vote", self.value_key.as_deref().unwrap_or(&self.payload))
    }
}

/// Outcome of [`BallotBox::cast_vote`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BallotUpdateResult {
    /// Ballot voted on.
    pub ballot_index: BallotIndex,
    /// Decision after the vote.
    pub status: BallotStatus,
    /// This vote produced the decision.
    pub finalized_now: bool,
    /// This vote created the ballot.
    pub is_new: bool,
    /// The vote arrived after the decision and was kept for audit only.
    pub late: bool,
    /// Payload of the approved claim when `finalized_now` and approved.
    pub approved_payload: Option<Vec<u8>>,
}

impl BallotUpdateResult {
    /// Whether this vote approved the ballot.
    pub fn approved_now(&self) -> bool {
        self.finalized_now && matches!(self.status, BallotStatus::Approved(_))
    }

    /// Whether this vote rejected the ballot.
    pub fn rejected_now(&self) -> bool {
        self.finalized_now && self.status == BallotStatus::Rejected
    }

    /// Turn a late vote into `BallotAlreadyFinalized`.
    ///
    /// Call after committing so the audit record is persisted.
    pub fn into_result(self) -> ObserverResult<Self> {
        if self.late {
            return Err(ObserverError::BallotAlreadyFinalized {
                ballot: self.ballot_index,
                decision: self.status,
            });
        }
        Ok(self)
    }
}

/// Ballot accumulation and finalization.
pub struct BallotBox {
    config: BallotConfig,
    locks: KeyedLocks,
}

impl BallotBox {
    /// Create a ballot box.
    pub fn new(config: BallotConfig) -> Self {
        Self {
            config,
            locks: KeyedLocks::new(),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &BallotConfig {
        &self.config
    }

    /// Record `request` on its ballot, creating the ballot on first vote.
    ///
    /// `voters` is the authorized set at `ctx.height`; a new ballot snapshots
    /// it. `threshold` overrides the configured default for new ballots.
    ///
    /// # Errors
    ///
    /// - `UnauthorizedVoter` if the voter is not in `voters` or in the
    ///   ballot's snapshot
    /// - `DuplicateVote` on a re-vote
    pub fn cast_vote<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        request: VoteRequest,
        voters: &RelayerSet,
        threshold: Option<Threshold>,
    ) -> ObserverResult<BallotUpdateResult> {
        let index = request.ballot_index;
        tx.lock(&self.locks, keys::ballot_lock(&index));

        if !voters.contains(&request.voter) {
            return Err(ObserverError::UnauthorizedVoter {
                voter: request.voter,
                ballot: index,
            });
        }

        let key = keys::ballot(&index);
        let (mut ballot, is_new) = match tx.get_typed::<Ballot>(&key)? {
            Some(existing) => (existing, false),
            None => {
                let ballot = Ballot::new(
                    index,
                    request.observation_type,
                    request.chain_id,
                    voters.members.clone(),
                    threshold.unwrap_or(self.config.default_threshold),
                    ctx.height,
                );
                debug!(
                    ballot = %index.short(),
                    observation = %request.observation_type,
                    voters = voters.len(),
                    "[xc-01] Ballot created"
                );
                (ballot, true)
            }
        };

        let value = request.value();
        let outcome = ballot.add_vote(&request.voter, value, request.payload, ctx.height)?;

        tx.put_typed(key, &ballot)?;
        if is_new {
            tx.put_typed(keys::ballot_height(ctx.height, &index), &index)?;
        }

        let (finalized_now, late) = match outcome {
            VoteOutcome::Counted { finalized_now } => (finalized_now, false),
            VoteOutcome::Late => (false, true),
        };

        if finalized_now {
            info!(
                ballot = %index.short(),
                observation = %ballot.observation_type,
                decision = %ballot.status,
                votes = ballot.votes.len(),
                height = ctx.height,
                "[xc-01] Ballot finalized"
            );
        } else if late {
            debug!(
                ballot = %index.short(),
                voter = %request.voter,
                "[xc-01] Late vote recorded for audit"
            );
        }

        let approved_payload = if finalized_now {
            ballot.approved_payload().map(<[u8]>::to_vec)
        } else {
            None
        };

        Ok(BallotUpdateResult {
            ballot_index: index,
            status: ballot.status,
            finalized_now,
            is_new,
            late,
            approved_payload,
        })
    }

    /// Load a ballot.
    pub fn get<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        index: &BallotIndex,
    ) -> ObserverResult<Option<Ballot>> {
        Ok(tx.get_typed(&keys::ballot(index))?)
    }

    /// Ballots created at a home-chain height.
    pub fn ballots_created_at<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        height: u64,
    ) -> ObserverResult<Vec<Ballot>> {
        let indices: Vec<BallotIndex> = tx.scan_typed(&keys::ballot_height_prefix(height))?;
        let mut ballots = Vec::with_capacity(indices.len());
        for index in indices {
            if let Some(ballot) = self.get(tx, &index)? {
                ballots.push(ballot);
            }
        }
        Ok(ballots)
    }
}

impl Default for BallotBox {
    fn default() -> Self {
        Self::new(BallotConfig::default())
    }
}
