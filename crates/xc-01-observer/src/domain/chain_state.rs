//! # Chain State
//!
//! Confirmed tip of each external chain, its parameters, and the global
//! crosschain switches.

use super::value_objects::Threshold;
use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId, Digest, Height};
use std::collections::BTreeMap;

/// Latest confirmed block of an external chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// External chain.
    pub chain_id: ChainId,
    /// Latest confirmed external height.
    pub latest_height: Height,
    /// Hash of that block.
    pub latest_hash: Digest,
    /// External height of the first approved header.
    pub earliest_height: Height,
    /// Home-chain height of the last update.
    pub updated_at: Height,
}

impl ChainState {
    /// Confirmations an event at `height` has against this tip.
    pub fn confirmations(&self, height: Height) -> u64 {
        if height > self.latest_height {
            0
        } else {
            self.latest_height - height + 1
        }
    }
}

/// Block header claimed by an observer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockObservation {
    /// External chain.
    pub chain_id: ChainId,
    /// Block height.
    pub height: Height,
    /// Block hash.
    pub hash: Digest,
}

impl BlockObservation {
    /// Ballot index for this (chain, height).
    pub fn ballot_index(&self) -> Digest {
        Digest::of(
            "inbound-block",
            &[&self.chain_id.to_be_bytes(), &self.height.to_be_bytes()],
        )
    }
}

/// Per-chain parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Chain the params apply to.
    pub chain_id: ChainId,
    /// Confirmations an inbound event needs before it may advance.
    pub confirmation_count: u64,
    /// Ballot threshold override for observations on this chain.
    pub ballot_threshold: Option<Threshold>,
    /// Whether the chain is connected.
    pub is_supported: bool,
    /// Gas limit for outbound transactions.
    pub outbound_gas_limit: u64,
    /// Gas price for outbound transactions.
    pub gas_price: u128,
}

impl ChainParams {
    /// Supported chain with default gas settings.
    pub fn supported(chain_id: ChainId, confirmation_count: u64) -> Self {
        Self {
            chain_id,
            confirmation_count,
            ballot_threshold: None,
            is_supported: true,
            outbound_gas_limit: 250_000,
            gas_price: 1,
        }
    }
}

/// Gas price an observer reports for an external chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceObservation {
    /// External chain.
    pub chain_id: ChainId,
    /// Reported price per gas unit.
    pub price: u128,
    /// External height the price was sampled at.
    pub external_height: Height,
}

/// One observer's standing gas price report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceEntry {
    /// Reported price.
    pub price: u128,
    /// External height of the sample.
    pub external_height: Height,
}

/// Per-chain gas price reports and their median.
///
/// Each observer holds at most one entry; a new report replaces the old one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrice {
    /// External chain.
    pub chain_id: ChainId,
    /// Observer address → latest report.
    pub entries: BTreeMap<Address, GasPriceEntry>,
    /// Median of the reported prices.
    pub median: u128,
    /// Home-chain height of the last report.
    pub updated_at: Height,
}

impl GasPrice {
    /// Empty record for a chain.
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            entries: BTreeMap::new(),
            median: 0,
            updated_at: 0,
        }
    }

    /// Insert or replace `observer`'s report and recompute the median.
    pub fn report(&mut self, observer: &str, entry: GasPriceEntry, height: Height) {
        self.entries.insert(observer.to_string(), entry);
        self.median = median_price(self.entries.values().map(|e| e.price));
        self.updated_at = height;
    }
}

/// Upper median: the element at `len / 2` of the sorted prices.
fn median_price(prices: impl Iterator<Item = u128>) -> u128 {
    let mut sorted: Vec<u128> = prices.collect();
    sorted.sort_unstable();
    sorted.get(sorted.len() / 2).copied().unwrap_or(0)
}

/// Global switches for inbound observation and outbound signing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosschainFlags {
    /// Accept inbound votes.
    pub inbound_enabled: bool,
    /// Hand out new outbound attempts.
    pub outbound_enabled: bool,
}

impl Default for CrosschainFlags {
    fn default() -> Self {
        Self {
            inbound_enabled: true,
            outbound_enabled: true,
        }
    }
}
