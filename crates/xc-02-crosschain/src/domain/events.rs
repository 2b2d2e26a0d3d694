//! Lifecycle events emitted after an Xmsg change has been committed.

use super::xmsg::XmsgStatus;
use serde::{Deserialize, Serialize};
use shared_types::{ChainId, Height, XmsgIndex};

/// Xmsg lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmsgEvent {
    /// Inbound ballot approved and the Xmsg was created.
    XmsgCreated {
        /// Xmsg index.
        index: XmsgIndex,
        /// Origin chain.
        sender_chain_id: ChainId,
        /// Home-chain height.
        height: Height,
    },
    /// Status moved along the state machine.
    StatusChanged {
        /// Xmsg index.
        index: XmsgIndex,
        /// Previous status.
        from: XmsgStatus,
        /// New status.
        to: XmsgStatus,
        /// Reason.
        message: String,
        /// Home-chain height.
        height: Height,
    },
    /// Signer accepted an outbound attempt.
    OutboundDispatched {
        /// Xmsg index.
        index: XmsgIndex,
        /// Target chain.
        chain_id: ChainId,
        /// Nonce.
        nonce: u64,
        /// Broadcast transaction hash.
        tx_hash: String,
    },
    /// Signer refused or was unreachable; the attempt stays in flight until
    /// it is observed or times out.
    DispatchFailed {
        /// Xmsg index.
        index: XmsgIndex,
        /// Target chain.
        chain_id: ChainId,
        /// Nonce.
        nonce: u64,
        /// Signer error.
        reason: String,
    },
}

impl XmsgEvent {
    /// Xmsg the event is about.
    pub fn index(&self) -> XmsgIndex {
        match self {
            XmsgEvent::XmsgCreated { index, .. }
            | XmsgEvent::StatusChanged { index, .. }
            | XmsgEvent::OutboundDispatched { index, .. }
            | XmsgEvent::DispatchFailed { index, .. } => *index,
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            XmsgEvent::XmsgCreated { .. } => "xmsg_created",
            XmsgEvent::StatusChanged { .. } => "status_changed",
            XmsgEvent::OutboundDispatched { .. } => "outbound_dispatched",
            XmsgEvent::DispatchFailed { .. } => "dispatch_failed",
        }
    }
}
