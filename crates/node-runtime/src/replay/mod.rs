//! # Event Log Replay
//!
//! The home chain's ordered event log, one JSON object per line:
//!
//! ```text
//! {"height": 12, "timestamp": 1700000012, "event": {"vote_inbound": {"voter": "relayer-1", "observation": {...}}}}
//! {"height": 13, "timestamp": 1700000018, "event": "tick"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

pub mod runner;

pub use runner::{EntryOutcome, EventReplayer, ReplaySummary};

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockContext, ChainId, Height, XmsgIndex};
use thiserror::Error;
use xc_01_observer::{
    Blame, BlockObservation, ChainParams, CrosschainFlags, GasPriceObservation, KeygenObservation,
    NodeAccount,
};
use xc_02_crosschain::{InboundObservation, OutboundObservation};

/// Event log read errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The log could not be read.
    #[error("Failed to read event log: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a valid [`LogEntry`].
    #[error("Invalid event log entry on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// One ordered home-chain event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Home-chain height.
    pub height: Height,
    /// Home-chain block timestamp.
    pub timestamp: u64,
    /// The event.
    pub event: LogEvent,
}

impl LogEntry {
    /// Context the event is applied at.
    pub fn context(&self) -> BlockContext {
        BlockContext::new(self.height, self.timestamp)
    }
}

/// Events the node applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// Observer vote on an inbound event.
    VoteInbound {
        voter: Address,
        observation: InboundObservation,
    },
    /// Observer vote on a mined outbound attempt.
    VoteOutbound {
        voter: Address,
        observation: OutboundObservation,
    },
    /// Observer vote on an external block header.
    VoteBlockHeader {
        voter: Address,
        block: BlockObservation,
    },
    /// Node account vote on a keygen result.
    VoteKeygen {
        voter: Address,
        observation: KeygenObservation,
    },
    /// Observer vote on a blame record.
    VoteBlame { voter: Address, blame: Blame },
    /// Observer gas price report.
    VoteGasPrice {
        voter: Address,
        observation: GasPriceObservation,
    },
    /// Policy update replacing the relayer set.
    UpdatePolicies { relayers: BTreeMap<Address, u64> },
    /// Insert or replace a node account.
    UpsertNodeAccount { account: NodeAccount },
    /// Insert or replace chain params.
    UpsertChainParams { params: ChainParams },
    /// Replace the crosschain flags.
    UpdateCrosschainFlags { flags: CrosschainFlags },
    /// Move one chain's funds to a generated key.
    MigrateTssFunds {
        chain_id: ChainId,
        new_pubkey: String,
        amount: u128,
    },
    /// Make a generated key current.
    UpdateTssAddress { pubkey: String },
    /// Governance abort of a pending Xmsg.
    AbortStuckXmsg { index: XmsgIndex },
    /// Home-chain block with no other event.
    Tick,
}

impl LogEvent {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LogEvent::VoteInbound { .. } => "vote_inbound",
            LogEvent::VoteOutbound { .. } => "vote_outbound",
            LogEvent::VoteBlockHeader { .. } => "vote_block_header",
            LogEvent::VoteKeygen { .. } => "vote_keygen",
            LogEvent::VoteBlame { .. } => "vote_blame",
            LogEvent::VoteGasPrice { .. } => "vote_gas_price",
            LogEvent::UpdatePolicies { .. } => "update_policies",
            LogEvent::UpsertNodeAccount { .. } => "upsert_node_account",
            LogEvent::UpsertChainParams { .. } => "upsert_chain_params",
            LogEvent::UpdateCrosschainFlags { .. } => "update_crosschain_flags",
            LogEvent::MigrateTssFunds { .. } => "migrate_tss_funds",
            LogEvent::UpdateTssAddress { .. } => "update_tss_address",
            LogEvent::AbortStuckXmsg { .. } => "abort_stuck_xmsg",
            LogEvent::Tick => "tick",
        }
    }
}

/// Parse an event log.
pub fn parse_event_log(reader: impl BufRead) -> Result<Vec<LogEntry>, ReplayError> {
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let entry = serde_json::from_str(trimmed).map_err(|e| ReplayError::Parse {
            line: number + 1,
            message: e.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Read and parse the event log at `path`.
pub fn read_event_log(path: &Path) -> Result<Vec<LogEntry>, ReplayError> {
    let file = std::fs::File::open(path)?;
    parse_event_log(std::io::BufReader::new(file))
}
