//! Adapters for the Cross-Chain subsystem

pub mod policy;
pub mod publisher;
pub mod signer;

pub use policy::DefaultXmsgPolicy;
pub use publisher::{BroadcastEventPublisher, DEFAULT_EVENT_CAPACITY};
pub use signer::LoggingSigner;
