//! Domain layer for the Cross-Chain subsystem

pub mod events;
pub mod observation;
pub mod xmsg;

pub use events::XmsgEvent;
pub use observation::{InboundObservation, OutboundInstruction, OutboundObservation, ReceiveStatus};
pub use xmsg::{
    InboundParams, OutboundParams, RevertOptions, Status, TxFinalizationStatus, Xmsg, XmsgKind,
    XmsgStatus,
};
