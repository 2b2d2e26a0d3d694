//! # Genesis Builder
//!
//! Validates the genesis section of the node configuration and turns it into
//! the observer's initial state.

use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockContext, ChainId, Height};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use xc_01_observer::{ChainParams, CrosschainFlags, NodeAccount, ObserverGenesis, Tss};

/// Genesis validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenesisError {
    /// No relayer with a non-zero weight.
    #[error("Genesis relayer set is empty")]
    EmptyRelayerSet,

    /// Two chain param entries for the same chain.
    #[error("Duplicate chain id {chain_id} in genesis chain params")]
    DuplicateChain { chain_id: ChainId },

    /// A chain threshold override with a zero denominator.
    #[error("Chain {chain_id} ballot threshold has a zero denominator")]
    ZeroDenominator { chain_id: ChainId },

    /// A genesis key with no active node account to hold it.
    #[error("Genesis TSS {pubkey} has no active node accounts")]
    TssWithoutParticipants { pubkey: String },
}

/// Genesis section of the node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Home-chain height of the genesis state.
    pub height: Height,
    /// Home-chain timestamp of the genesis state.
    pub timestamp: u64,
    /// Relayer address → voting weight.
    pub relayers: BTreeMap<Address, u64>,
    /// Node accounts taking part in keygen.
    pub node_accounts: Vec<NodeAccount>,
    /// Connected chains.
    pub chain_params: Vec<ChainParams>,
    /// Global switches.
    pub flags: CrosschainFlags,
    /// Key group active from genesis, held by every active node account.
    pub tss_pubkey: Option<String>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self::devnet()
    }
}

impl GenesisConfig {
    /// Five equally weighted relayers, three of them node accounts, two
    /// connected chains and a genesis key.
    pub fn devnet() -> Self {
        let relayers = (1..=5).map(|i| (format!("relayer-{}", i), 1)).collect();
        let node_accounts = (1..=3)
            .map(|i| NodeAccount::new(format!("relayer-{}", i), format!("signer-{}", i)))
            .collect();
        Self {
            height: 0,
            timestamp: 0,
            relayers,
            node_accounts,
            chain_params: vec![ChainParams::supported(1, 0), ChainParams::supported(101, 0)],
            flags: CrosschainFlags::default(),
            tss_pubkey: Some("tss-genesis".to_string()),
        }
    }
}

/// Validated genesis, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisState {
    /// Context the genesis state is written at.
    pub context: BlockContext,
    /// Observer initial state.
    pub observer: ObserverGenesis,
}

/// Builds [`GenesisState`] from a [`GenesisConfig`].
pub struct GenesisBuilder {
    config: GenesisConfig,
}

impl GenesisBuilder {
    /// Create a builder.
    pub fn new(config: GenesisConfig) -> Self {
        Self { config }
    }

    /// Validate and build.
    pub fn build(self) -> Result<GenesisState, GenesisError> {
        let config = self.config;

        if !config.relayers.values().any(|w| *w > 0) {
            return Err(GenesisError::EmptyRelayerSet);
        }

        let mut seen = BTreeSet::new();
        for params in &config.chain_params {
            if !seen.insert(params.chain_id) {
                return Err(GenesisError::DuplicateChain {
                    chain_id: params.chain_id,
                });
            }
            if params.ballot_threshold.is_some_and(|t| t.denominator == 0) {
                return Err(GenesisError::ZeroDenominator {
                    chain_id: params.chain_id,
                });
            }
        }

        let tss = match config.tss_pubkey {
            Some(pubkey) => {
                let active: Vec<&NodeAccount> = config
                    .node_accounts
                    .iter()
                    .filter(|a| a.is_active())
                    .collect();
                if active.is_empty() {
                    return Err(GenesisError::TssWithoutParticipants { pubkey });
                }
                Some(Tss {
                    pubkey,
                    participants: active.iter().map(|a| a.granted_pubkey.clone()).collect(),
                    operators: active.iter().map(|a| a.operator.clone()).collect(),
                    finalized_height: config.height,
                    keygen_height: config.height,
                })
            }
            None => None,
        };

        Ok(GenesisState {
            context: BlockContext::new(config.height, config.timestamp),
            observer: ObserverGenesis {
                relayers: config.relayers,
                node_accounts: config.node_accounts,
                chain_params: config.chain_params,
                flags: config.flags,
                tss,
            },
        })
    }
}
