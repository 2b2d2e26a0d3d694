//! # Replayer
//!
//! Applies log entries in order. A home-chain height seen for the first time
//! is ticked (`on_block`) before its first entry is applied, so Xmsgs created
//! at height `h` are swept from `h + 1` on.
//!
//! Non-fatal errors reject the entry and replay continues; a fatal error
//! halts the replay.

use std::sync::Arc;

use serde::Serialize;
use shared_types::{BlockContext, Height};
use tracing::{debug, error, info, warn};
use xc_01_observer::{BallotStatus, BallotUpdateResult};
use xc_02_crosschain::{CrossChainError, CrossChainResult, XmsgEventPublisher};
use xmsg_telemetry::{metric_inc, BALLOTS_FINALIZED, EVENTS_APPLIED};

use super::{LogEntry, LogEvent};
use crate::container::SubsystemContainer;
use crate::handlers::{LifecycleTally, MetricsRecorder};

/// What happened to one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Applied and committed.
    Applied,
    /// Refused; no state changed.
    Rejected(String),
    /// Unrecoverable; replay must stop.
    Fatal(String),
}

/// Result of a replay, printed as JSON by the binary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Entries read.
    pub entries: u64,
    /// Entries applied.
    pub applied: u64,
    /// Entries rejected.
    pub rejected: u64,
    /// Error that halted the replay.
    pub halted: Option<String>,
    /// Last home-chain height applied.
    pub last_height: Option<Height>,
    /// Block ticks run.
    pub blocks: u64,
    /// Ballots approved by a replayed vote.
    pub ballots_approved: u64,
    /// Ballots rejected by a replayed vote.
    pub ballots_rejected: u64,
    /// Lifecycle event counts.
    pub lifecycle: LifecycleTally,
    /// Non-terminal Xmsgs at the end.
    pub pending_xmsgs: usize,
    /// Current key at the last height.
    pub current_tss: Option<String>,
    /// Instructions signed.
    pub signed: u64,
    /// Lifecycle events published.
    pub events_published: u64,
}

/// Ordered event log replayer.
pub struct EventReplayer {
    container: Arc<SubsystemContainer>,
    recorder: MetricsRecorder,
    ticked_height: Option<Height>,
    summary: ReplaySummary,
}

impl EventReplayer {
    /// Create a replayer over `container`.
    pub fn new(container: Arc<SubsystemContainer>) -> Self {
        let recorder = MetricsRecorder::new(container.publisher.subscribe());
        Self {
            container,
            recorder,
            ticked_height: None,
            summary: ReplaySummary::default(),
        }
    }

    /// Apply every entry until the log ends or a fatal error occurs.
    pub async fn run(&mut self, entries: impl IntoIterator<Item = LogEntry>) -> ReplaySummary {
        for entry in entries {
            if let EntryOutcome::Fatal(reason) = self.apply(&entry).await {
                error!(height = entry.height, reason = %reason, "Replay halted");
                self.summary.halted = Some(reason);
                break;
            }
        }
        self.summary()
    }

    /// Apply one entry.
    pub async fn apply(&mut self, entry: &LogEntry) -> EntryOutcome {
        self.summary.entries += 1;
        let ctx = entry.context();
        let kind = entry.event.kind();

        let outcome = match self.summary.last_height {
            Some(last) if entry.height < last => EntryOutcome::Rejected(format!(
                "height {} is below the last applied height {}",
                entry.height, last
            )),
            _ => match self.tick(&ctx).await {
                Err(e) if e.is_fatal() => e.into(),
                _ => self.dispatch(&ctx, &entry.event).await,
            },
        };
        self.recorder.drain();

        match &outcome {
            EntryOutcome::Applied => {
                self.summary.applied += 1;
                self.summary.last_height = Some(entry.height);
                metric_inc!(EVENTS_APPLIED, &["ok"]);
                debug!(height = entry.height, kind, "Entry applied");
            }
            EntryOutcome::Rejected(reason) => {
                self.summary.rejected += 1;
                self.summary.last_height = self.summary.last_height.max(Some(entry.height));
                metric_inc!(EVENTS_APPLIED, &["rejected"]);
                warn!(height = entry.height, kind, reason = %reason, "Entry rejected");
            }
            EntryOutcome::Fatal(_) => {
                metric_inc!(EVENTS_APPLIED, &["fatal"]);
            }
        }
        outcome
    }

    /// Summary so far, with end-of-replay queries filled in.
    pub fn summary(&self) -> ReplaySummary {
        let crosschain = &self.container.crosschain;
        let height = self.summary.last_height.unwrap_or(self.container.config.genesis.height);
        ReplaySummary {
            lifecycle: self.recorder.tally().clone(),
            pending_xmsgs: crosschain
                .list_pending_xmsgs(None)
                .map(|pending| pending.len())
                .unwrap_or_default(),
            current_tss: self
                .container
                .observer
                .get_current_tss(height)
                .ok()
                .map(|tss| tss.pubkey),
            signed: self.container.signer.signed(),
            events_published: self.container.publisher.events_published(),
            ..self.summary.clone()
        }
    }

    async fn tick(&mut self, ctx: &BlockContext) -> CrossChainResult<()> {
        if self.ticked_height == Some(ctx.height) {
            return Ok(());
        }
        self.ticked_height = Some(ctx.height);
        self.summary.blocks += 1;
        match self.container.crosschain.on_block(ctx).await {
            Ok(report) => {
                if report.scheduled + report.timed_out + report.aborted + report.errors > 0 {
                    info!(
                        height = report.height,
                        pending = report.pending,
                        scheduled = report.scheduled,
                        timed_out = report.timed_out,
                        aborted = report.aborted,
                        errors = report.errors,
                        "Block tick"
                    );
                }
                Ok(())
            }
            Err(e) => {
                warn!(height = ctx.height, error = %e, "Block tick failed");
                Err(e)
            }
        }
    }

    async fn dispatch(&mut self, ctx: &BlockContext, event: &LogEvent) -> EntryOutcome {
        match self.apply_event(ctx, event.clone()).await {
            Ok(ballot) => {
                if let Some(result) = ballot.filter(|r| r.finalized_now) {
                    self.record_ballot(&result);
                }
                EntryOutcome::Applied
            }
            Err(e) => e.into(),
        }
    }

    fn record_ballot(&mut self, result: &BallotUpdateResult) {
        match result.status {
            BallotStatus::Approved(_) => {
                self.summary.ballots_approved += 1;
                metric_inc!(BALLOTS_FINALIZED, &["approved"]);
            }
            BallotStatus::Rejected => {
                self.summary.ballots_rejected += 1;
                metric_inc!(BALLOTS_FINALIZED, &["rejected"]);
            }
            BallotStatus::InProgress => {}
        }
    }

    async fn apply_event(
        &self,
        ctx: &BlockContext,
        event: LogEvent,
    ) -> CrossChainResult<Option<BallotUpdateResult>> {
        let crosschain = &self.container.crosschain;
        let observer = &self.container.observer;

        let ballot = match event {
            LogEvent::VoteInbound { voter, observation } => {
                Some(crosschain.vote_inbound(ctx, &voter, observation).await?.ballot)
            }
            LogEvent::VoteOutbound { voter, observation } => {
                Some(crosschain.vote_outbound(ctx, &voter, observation).await?.ballot)
            }
            LogEvent::VoteBlockHeader { voter, block } => {
                Some(observer.vote_block_header(ctx, &voter, block)?)
            }
            LogEvent::VoteKeygen { voter, observation } => {
                Some(observer.vote_keygen(ctx, &voter, observation)?)
            }
            LogEvent::VoteBlame { voter, blame } => Some(observer.vote_blame(ctx, &voter, blame)?),
            LogEvent::VoteGasPrice { voter, observation } => {
                observer.vote_gas_price(ctx, &voter, observation)?;
                None
            }
            LogEvent::UpdatePolicies { relayers } => {
                let set = observer.update_relayer_set(ctx, relayers)?;
                info!(height = ctx.height, members = set.len(), "Relayer set updated");
                None
            }
            LogEvent::UpsertNodeAccount { account } => {
                observer.upsert_node_account(&account)?;
                None
            }
            LogEvent::UpsertChainParams { params } => {
                observer.upsert_chain_params(&params)?;
                None
            }
            LogEvent::UpdateCrosschainFlags { flags } => {
                observer.set_crosschain_flags(flags)?;
                info!(
                    inbound = flags.inbound_enabled,
                    outbound = flags.outbound_enabled,
                    "Crosschain flags updated"
                );
                None
            }
            LogEvent::MigrateTssFunds {
                chain_id,
                new_pubkey,
                amount,
            } => {
                crosschain
                    .migrate_tss_funds(ctx, chain_id, &new_pubkey, amount)
                    .await?;
                None
            }
            LogEvent::UpdateTssAddress { pubkey } => {
                crosschain.update_tss_address(ctx, &pubkey)?;
                None
            }
            LogEvent::AbortStuckXmsg { index } => {
                crosschain.abort_stuck_xmsg(ctx, &index).await?;
                None
            }
            LogEvent::Tick => None,
        };
        Ok(ballot)
    }
}

impl From<CrossChainError> for EntryOutcome {
    fn from(e: CrossChainError) -> Self {
        if e.is_fatal() {
            EntryOutcome::Fatal(e.to_string())
        } else {
            EntryOutcome::Rejected(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xc_02_crosschain::{InboundObservation, OutboundObservation, ReceiveStatus, XmsgStatus};

    fn entry(height: Height, event: LogEvent) -> LogEntry {
        LogEntry {
            height,
            timestamp: height * 6,
            event,
        }
    }

    fn inbound() -> InboundObservation {
        InboundObservation {
            sender_chain_id: 1,
            sender: "0xsender".into(),
            tx_origin: "0xsender".into(),
            receiver_chain_id: 101,
            receiver: "0xreceiver".into(),
            amount: 1000,
            message: String::new(),
            tx_hash: "0xinbound".into(),
            tx_height: 40,
            event_index: 0,
            revert_options: None,
        }
    }

    fn votes(height: Height, make: impl Fn(String) -> LogEvent) -> Vec<LogEntry> {
        (1..=4)
            .map(|i| entry(height, make(format!("relayer-{}", i))))
            .collect()
    }

    fn replayer() -> EventReplayer {
        EventReplayer::new(Arc::new(SubsystemContainer::new_for_testing()))
    }

    #[tokio::test]
    async fn test_inbound_to_mined() {
        let mut replayer = replayer();
        let index = inbound().xmsg_index();

        let mut log = votes(5, |voter| LogEvent::VoteInbound {
            voter,
            observation: inbound(),
        });
        log.extend(votes(6, |voter| LogEvent::VoteOutbound {
            voter,
            observation: OutboundObservation {
                xmsg_index: index,
                chain_id: 101,
                nonce: 0,
                tx_hash: "0xmined".into(),
                external_height: 900,
                gas_used: 21_000,
                status: ReceiveStatus::Success,
            },
        }));

        let summary = replayer.run(log).await;
        assert_eq!(summary.applied, 8);
        assert_eq!(summary.rejected, 0);
        assert_eq!(summary.halted, None);
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.ballots_approved, 2);
        assert_eq!(summary.lifecycle.created, 1);
        assert_eq!(summary.lifecycle.dispatched, 1);
        assert_eq!(summary.lifecycle.transitions.get("outbound_mined"), Some(&1));
        assert_eq!(summary.pending_xmsgs, 0);
        assert_eq!(summary.signed, 1);
        assert_eq!(summary.current_tss.as_deref(), Some("tss-genesis"));

        let xmsg = replayer
            .container
            .crosschain
            .get_xmsg_by_index(&index)
            .unwrap()
            .unwrap();
        assert_eq!(xmsg.status(), XmsgStatus::OutboundMined);
    }

    #[tokio::test]
    async fn test_rejected_entries_do_not_halt() {
        let mut replayer = replayer();
        let log = vec![
            entry(
                5,
                LogEvent::VoteInbound {
                    voter: "intruder".into(),
                    observation: inbound(),
                },
            ),
            entry(4, LogEvent::Tick),
            entry(
                6,
                LogEvent::UpdateTssAddress {
                    pubkey: "never-generated".into(),
                },
            ),
            entry(7, LogEvent::Tick),
        ];

        let summary = replayer.run(log).await;
        assert_eq!(summary.entries, 4);
        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.halted, None);
        assert_eq!(summary.last_height, Some(7));
    }

    #[tokio::test]
    async fn test_gas_price_and_governance_abort() {
        let mut replayer = replayer();
        let index = inbound().xmsg_index();

        let mut log: Vec<LogEntry> = (1..=3)
            .map(|i| {
                entry(
                    2,
                    LogEvent::VoteGasPrice {
                        voter: format!("relayer-{}", i),
                        observation: xc_01_observer::GasPriceObservation {
                            chain_id: 101,
                            price: 10 * i,
                            external_height: 800,
                        },
                    },
                )
            })
            .collect();
        log.extend(votes(5, |voter| LogEvent::VoteInbound {
            voter,
            observation: inbound(),
        }));
        log.push(entry(9, LogEvent::AbortStuckXmsg { index }));
        log.push(entry(10, LogEvent::AbortStuckXmsg { index }));

        let summary = replayer.run(log).await;
        assert_eq!(summary.applied, 8);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.pending_xmsgs, 0);
        assert_eq!(summary.lifecycle.transitions.get("aborted"), Some(&1));

        let xmsg = replayer
            .container
            .crosschain
            .get_xmsg_by_index(&index)
            .unwrap()
            .unwrap();
        assert_eq!(xmsg.status(), XmsgStatus::Aborted);
        assert_eq!(xmsg.outbound[0].gas_price, 20);
    }

    #[tokio::test]
    async fn test_policy_events_apply() {
        let mut replayer = replayer();
        let log = vec![
            entry(
                3,
                LogEvent::UpdateCrosschainFlags {
                    flags: xc_01_observer::CrosschainFlags {
                        inbound_enabled: false,
                        outbound_enabled: true,
                    },
                },
            ),
            entry(
                4,
                LogEvent::VoteInbound {
                    voter: "relayer-1".into(),
                    observation: inbound(),
                },
            ),
        ];

        let summary = replayer.run(log).await;
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.rejected, 1);
        assert!(!replayer
            .container
            .observer
            .get_crosschain_flags()
            .unwrap()
            .inbound_enabled);
    }
}
