//! # Domain Value Objects
//!
//! Immutable value types for observer consensus.

use serde::{Deserialize, Serialize};
use shared_types::VoteValue;
use std::fmt;

/// Kind of external fact a ballot decides on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObservationType {
    /// An inbound cross-chain event on a connected chain.
    InboundTx,
    /// The mined result of an outbound transaction.
    OutboundTx,
    /// A confirmed block header of a connected chain.
    InboundBlock,
    /// The outcome of a TSS key generation.
    TssKeygen,
    /// A misbehaviour report against one or more relayers.
    Blame,
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObservationType::InboundTx => "inbound_tx",
            ObservationType::OutboundTx => "outbound_tx",
            ObservationType::InboundBlock => "inbound_block",
            ObservationType::TssKeygen => "tss_keygen",
            ObservationType::Blame => "blame",
        };
        f.write_str(name)
    }
}

/// Fraction of total voting power a claim must reach.
///
/// A fraction below one must be strictly exceeded (`2/3` means "more than
/// two thirds"). A fraction of one or more means unanimity: the claim needs
/// the entire voting power.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    /// Numerator.
    pub numerator: u64,
    /// Denominator, never zero.
    pub denominator: u64,
}

impl Threshold {
    /// More than two thirds of total power.
    pub const SUPERMAJORITY: Threshold = Threshold {
        numerator: 2,
        denominator: 3,
    };

    /// All voting power.
    pub const UNANIMOUS: Threshold = Threshold {
        numerator: 1,
        denominator: 1,
    };

    /// Build a threshold; `None` for a zero denominator.
    pub fn new(numerator: u64, denominator: u64) -> Option<Self> {
        (denominator > 0).then_some(Self {
            numerator,
            denominator,
        })
    }

    /// Whether `power` out of `total` satisfies this threshold.
    pub fn is_crossed(&self, power: u64, total: u64) -> bool {
        if total == 0 || self.denominator == 0 {
            return false;
        }
        if self.numerator >= self.denominator {
            return power >= total;
        }
        u128::from(power) * u128::from(self.denominator)
            > u128::from(total) * u128::from(self.numerator)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::SUPERMAJORITY
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Decision state of a ballot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallotStatus {
    /// Still collecting votes.
    #[default]
    InProgress,
    /// A claimed value reached the threshold.
    Approved(VoteValue),
    /// No claimed value can reach the threshold any more.
    Rejected,
}

impl BallotStatus {
    /// Whether the decision is final.
    pub fn is_finalized(&self) -> bool {
        !matches!(self, BallotStatus::InProgress)
    }

    /// Approved value, if any.
    pub fn approved_value(&self) -> Option<VoteValue> {
        match self {
            BallotStatus::Approved(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for BallotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BallotStatus::InProgress => f.write_str("in_progress"),
            BallotStatus::Approved(v) => write!(f, "approved({})", v.short()),
            BallotStatus::Rejected => f.write_str("rejected"),
        }
    }
}

/// Membership state of a node account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Eligible to vote and sign.
    #[default]
    Active,
    /// Removed after accumulating blame.
    Ejected,
}

/// Reported result of a TSS key generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeygenStatus {
    /// Keygen produced a usable key.
    Success,
    /// Keygen failed.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supermajority_of_five_needs_four() {
        let t = Threshold::SUPERMAJORITY;
        assert!(!t.is_crossed(3, 5));
        assert!(t.is_crossed(4, 5));
    }

    #[test]
    fn test_exact_two_thirds_is_not_enough() {
        assert!(!Threshold::SUPERMAJORITY.is_crossed(2, 3));
        assert!(Threshold::SUPERMAJORITY.is_crossed(3, 3));
    }

    #[test]
    fn test_unanimous() {
        assert!(!Threshold::UNANIMOUS.is_crossed(4, 5));
        assert!(Threshold::UNANIMOUS.is_crossed(5, 5));
    }

    #[test]
    fn test_zero_total_never_crosses() {
        assert!(!Threshold::SUPERMAJORITY.is_crossed(0, 0));
        assert!(Threshold::new(1, 0).is_none());
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let t = Threshold::SUPERMAJORITY;
        assert!(t.is_crossed(u64::MAX, u64::MAX));
    }
}
