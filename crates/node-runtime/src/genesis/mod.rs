//! # Genesis Module
//!
//! Initial observer state: relayers, node accounts, connected chains,
//! crosschain flags and the optional genesis key group.

pub mod builder;

pub use builder::{GenesisBuilder, GenesisConfig, GenesisError, GenesisState};
