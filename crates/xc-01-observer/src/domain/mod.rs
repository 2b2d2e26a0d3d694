//! Domain layer for the Observer subsystem

pub mod ballot;
pub mod chain_state;
pub mod nonce;
pub mod relayer;
pub mod tss;
pub mod value_objects;

pub use ballot::{Ballot, Vote, VoteOutcome};
pub use chain_state::{
    BlockObservation, ChainParams, ChainState, CrosschainFlags, GasPrice, GasPriceEntry,
    GasPriceObservation,
};
pub use nonce::{ChainNonces, NonceToXmsg, PendingNonces};
pub use relayer::{Blame, NodeAccount, RelayerSet};
pub use tss::{KeygenObservation, Tss, TssFundMigration};
pub use value_objects::{BallotStatus, KeygenStatus, NodeStatus, ObservationType, Threshold};
