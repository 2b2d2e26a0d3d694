//! Ports layer for the Cross-Chain subsystem

pub mod inbound;
pub mod outbound;

pub use inbound::CrossChainApi;
pub use outbound::{
    Eligibility, MockPolicy, MockSigner, OutboundSigner, RecordingPublisher, RevertFeasibility,
    SignerError, XmsgEventPublisher, XmsgPolicy,
};
