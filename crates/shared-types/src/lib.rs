//! # Shared Types Crate
//!
//! Identifiers, block context and persistence plumbing shared by the
//! observer (`xc-01`) and cross-chain (`xc-02`) subsystems.
//!
//! ## Design Principles
//!
//! - **Deterministic identifiers**: every index is a Keccak-256 [`Digest`]
//!   over domain-separated, length-prefixed parts.
//! - **All-or-nothing writes**: subsystems never write to the store directly;
//!   they stage writes in a [`StoreTx`] and commit once per applied event.
//! - **Scoped critical sections**: [`KeyedLocks`] hand out per-key guards
//!   that a [`StoreTx`] holds until it commits or is dropped.

pub mod entities;
pub mod errors;
pub mod locks;
pub mod store;

pub use entities::*;
pub use errors::*;
pub use locks::{KeyGuard, KeyedLocks};
pub use store::{decode, encode, BatchOperation, InMemoryKVStore, KeyValueStore, StoreTx};
