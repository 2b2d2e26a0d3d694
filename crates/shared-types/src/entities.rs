//! # Core Entities
//!
//! Identifiers and context values used by every subsystem.
//!
//! ## Clusters
//!
//! - **Identity**: [`Digest`], [`XmsgIndex`], [`BallotIndex`], [`VoteValue`]
//! - **Chains**: [`ChainId`], [`Height`], [`Address`]
//! - **Ordering**: [`BlockContext`]

use crate::errors::DigestParseError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest as _, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Numeric identifier of an external (or the home) chain.
pub type ChainId = u64;

/// Block height, either on the home chain or on an external chain.
pub type Height = u64;

/// Account, relayer or contract address in its chain-native text form.
pub type Address = String;

/// A 32-byte Keccak-256 digest.
///
/// Serialized as a `0x`-prefixed hex string so that event logs and query
/// responses stay human readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest(pub [u8; 32]);

/// Index of an Xmsg, derived from its inbound event.
pub type XmsgIndex = Digest;

/// Index of a ballot, derived from the claimed event.
pub type BallotIndex = Digest;

/// Digest of the payload an observer claims to have seen.
pub type VoteValue = Digest;

impl Digest {
    /// Zero digest.
    pub const ZERO: Digest = Digest([0u8; 32]);

    /// Hash `parts` under a domain tag.
    ///
    /// Each part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
    /// never collide.
    pub fn of(domain: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update((domain.len() as u64).to_be_bytes());
        hasher.update(domain.as_bytes());
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        Digest(hasher.finalize().into())
    }

    /// Hash an arbitrary byte payload under a domain tag.
    pub fn of_bytes(domain: &str, payload: &[u8]) -> Self {
        Self::of(domain, &[payload])
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short form for log lines (first 4 bytes).
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| DigestParseError::InvalidHex {
            message: e.to_string(),
        })?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| DigestParseError::InvalidLength { got: b.len() })?;
        Ok(Digest(array))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct DigestVisitor;

impl<'de> Visitor<'de> for DigestVisitor {
    type Value = Digest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 0x-prefixed 32-byte hex string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Digest, E> {
        Digest::from_str(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(DigestVisitor)
    }
}

/// Position of the event being applied in the replicated home-chain log.
///
/// Every state change is stamped with this context instead of wall-clock
/// time so that all replicas reach byte-identical state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Home-chain block height.
    pub height: Height,
    /// Home-chain block timestamp (unix seconds).
    pub timestamp: u64,
}

impl BlockContext {
    /// Create a context.
    pub fn new(height: Height, timestamp: u64) -> Self {
        Self { height, timestamp }
    }
}
