//! # Ballot
//!
//! Weighted vote tally over one claimed external event.
//!
//! ## Decision Rule
//!
//! After each counted vote the power behind every distinct claimed value is
//! recomputed:
//!
//! - the leading value crosses the threshold → `Approved(value)`
//! - the leading value could not cross it even with every voter that has not
//!   voted yet → `Rejected`
//! - otherwise → `InProgress`
//!
//! The decision is written once and never reopened.

use super::value_objects::{BallotStatus, ObservationType, Threshold};
use crate::error::{ObserverError, ObserverResult};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BallotIndex, ChainId, Height, VoteValue};
use std::collections::BTreeMap;

/// One recorded vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Relayer that cast the vote.
    pub voter: Address,
    /// Claimed value.
    pub value: VoteValue,
    /// Home-chain height of the vote.
    pub height: Height,
}

/// What happened to a vote handed to [`Ballot::add_vote`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Counted towards the tally.
    Counted {
        /// This vote produced the decision.
        finalized_now: bool,
    },
    /// Arrived after the decision; kept in `late_votes` only.
    Late,
}

/// Consensus record for one observed event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Deterministic hash of the claimed event.
    pub index: BallotIndex,
    /// What is being decided.
    pub observation_type: ObservationType,
    /// Chain the observation belongs to.
    pub chain_id: ChainId,
    /// Voter snapshot taken at creation: identity → weight.
    pub voters: BTreeMap<Address, u64>,
    /// Counted votes in arrival order.
    pub votes: Vec<Vote>,
    /// Payload of every distinct claimed value (first claimant's bytes).
    pub claims: BTreeMap<VoteValue, Vec<u8>>,
    /// Required fraction of total power.
    pub threshold: Threshold,
    /// Decision.
    pub status: BallotStatus,
    /// Home-chain height of the first vote.
    pub created_at: Height,
    /// Home-chain height of the decision.
    pub finalized_at: Option<Height>,
    /// Votes received after the decision.
    pub late_votes: Vec<Vote>,
}

impl Ballot {
    /// Create an empty ballot over a voter snapshot.
    pub fn new(
        index: BallotIndex,
        observation_type: ObservationType,
        chain_id: ChainId,
        voters: BTreeMap<Address, u64>,
        threshold: Threshold,
        created_at: Height,
    ) -> Self {
        Self {
            index,
            observation_type,
            chain_id,
            voters,
            votes: Vec::new(),
            claims: BTreeMap::new(),
            threshold,
            status: BallotStatus::InProgress,
            created_at,
            finalized_at: None,
            late_votes: Vec::new(),
        }
    }

    /// Total voting power of the snapshot.
    pub fn total_power(&self) -> u64 {
        self.voters.values().fold(0u64, |acc, w| acc.saturating_add(*w))
    }

    /// Power already cast.
    pub fn voted_power(&self) -> u64 {
        self.votes
            .iter()
            .map(|v| self.weight_of(&v.voter))
            .fold(0u64, |acc, w| acc.saturating_add(w))
    }

    /// Power behind each claimed value.
    pub fn tally(&self) -> BTreeMap<VoteValue, u64> {
        let mut tally = BTreeMap::new();
        for vote in &self.votes {
            let entry = tally.entry(vote.value).or_insert(0u64);
            *entry = entry.saturating_add(self.weight_of(&vote.voter));
        }
        tally
    }

    /// Snapshot weight of `voter` (zero if absent).
    pub fn weight_of(&self, voter: &str) -> u64 {
        self.voters.get(voter).copied().unwrap_or(0)
    }

    /// Counted vote of `voter`, if any.
    pub fn vote_of(&self, voter: &str) -> Option<&Vote> {
        self.votes.iter().find(|v| v.voter == voter)
    }

    /// Whether the decision is final.
    pub fn is_finalized(&self) -> bool {
        self.status.is_finalized()
    }

    /// Payload of the approved value.
    pub fn approved_payload(&self) -> Option<&[u8]> {
        self.status
            .approved_value()
            .and_then(|v| self.claims.get(&v))
            .map(Vec::as_slice)
    }

    /// Record a vote.
    ///
    /// # Errors
    ///
    /// - `UnauthorizedVoter` if `voter` is not in the snapshot
    /// - `DuplicateVote` if `voter` already voted (counted or late)
    pub fn add_vote(
        &mut self,
        voter: &str,
        value: VoteValue,
        payload: Vec<u8>,
        height: Height,
    ) -> ObserverResult<VoteOutcome> {
        if !self.voters.contains_key(voter) {
            return Err(ObserverError::UnauthorizedVoter {
                voter: voter.to_string(),
                ballot: self.index,
            });
        }

        let previous = self
            .vote_of(voter)
            .or_else(|| self.late_votes.iter().find(|v| v.voter == voter));
        if let Some(previous) = previous {
            return Err(ObserverError::DuplicateVote {
                voter: voter.to_string(),
                ballot: self.index,
                conflicting: previous.value != value,
            });
        }

        let vote = Vote {
            voter: voter.to_string(),
            value,
            height,
        };

        if self.is_finalized() {
            self.late_votes.push(vote);
            return Ok(VoteOutcome::Late);
        }

        self.votes.push(vote);
        self.claims.entry(value).or_insert(payload);
        let finalized_now = self.evaluate(height);
        Ok(VoteOutcome::Counted { finalized_now })
    }

    /// Apply the decision rule. Returns true if the ballot finalized now.
    fn evaluate(&mut self, height: Height) -> bool {
        if self.is_finalized() {
            return false;
        }

        let total = self.total_power();
        // Ties resolve to the smaller digest so every replica picks the same leader.
        let leader = self
            .tally()
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
        let Some((leader_value, leader_power)) = leader else {
            return false;
        };

        if self.threshold.is_crossed(leader_power, total) {
            self.status = BallotStatus::Approved(leader_value);
        } else {
            let remaining = total.saturating_sub(self.voted_power());
            let best_case = leader_power.saturating_add(remaining);
            if self.threshold.is_crossed(best_case, total) {
                return false;
            }
            self.status = BallotStatus::Rejected;
        }

        self.finalized_at = Some(height);
        true
    }
}
