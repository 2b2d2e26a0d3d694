//! # Integration Tests
//!
//! Each module wires the observer and crosschain services over one store
//! with the production adapters (`DefaultXmsgPolicy`, `LoggingSigner`,
//! `BroadcastEventPublisher`).

#[cfg(test)]
mod fixtures;

mod concurrency;
mod pipeline;
mod replay;
mod rotation;
