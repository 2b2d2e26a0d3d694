//! # Relayer Set Manager
//!
//! Height-versioned relayer snapshots, node accounts, and blame bookkeeping.
//!
//! A snapshot written at height `h` governs every ballot created at `h` or
//! later until the next snapshot. Ballots already open keep the voter
//! snapshot they were created with.

use super::keys;
use crate::domain::{Blame, NodeAccount, NodeStatus, RelayerSet};
use crate::error::{ObserverError, ObserverResult};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockContext, Height, KeyValueStore, StoreTx};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Relayer set settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerSetConfig {
    /// Blames a relayer may accumulate before it is ejected. Zero disables
    /// ejection.
    pub max_blames_before_ejection: u32,
}

impl Default for RelayerSetConfig {
    fn default() -> Self {
        Self {
            max_blames_before_ejection: 3,
        }
    }
}

/// Outcome of [`RelayerSetManager::record_blame`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlameOutcome {
    /// The blame was new (not a replay of a stored record).
    pub recorded: bool,
    /// Relayers ejected as a consequence.
    pub ejected: Vec<Address>,
}

/// Relayer roster management.
pub struct RelayerSetManager {
    config: RelayerSetConfig,
}

impl RelayerSetManager {
    /// Create a manager.
    pub fn new(config: RelayerSetConfig) -> Self {
        Self { config }
    }

    /// Write a new snapshot effective from `ctx.height`.
    ///
    /// # Errors
    ///
    /// `EmptyRelayerSet` if the set carries no voting power.
    pub fn update_set<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        members: BTreeMap<Address, u64>,
    ) -> ObserverResult<RelayerSet> {
        let set = RelayerSet::new(ctx.height, members);
        if set.total_power() == 0 {
            return Err(ObserverError::EmptyRelayerSet);
        }
        self.write_snapshot(tx, &set)?;
        info!(
            height = ctx.height,
            members = set.len(),
            power = set.total_power(),
            "[xc-01] Relayer set updated"
        );
        Ok(set)
    }

    fn write_snapshot<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        set: &RelayerSet,
    ) -> ObserverResult<()> {
        tx.put_typed(keys::relayer_set(set.height), set)?;
        let newer = tx
            .get_typed::<RelayerSet>(keys::RELAYER_SET_LATEST.as_bytes())?
            .map_or(true, |latest| set.height >= latest.height);
        if newer {
            tx.put_typed(keys::RELAYER_SET_LATEST, set)?;
        }
        Ok(())
    }

    /// Snapshot in force at `height`: the latest one written at or before it.
    ///
    /// Votes arrive at the tip, so the newest snapshot answers without a
    /// scan; only historical heights walk the history.
    ///
    /// # Errors
    ///
    /// `NoRelayerSet` if no snapshot precedes `height`.
    pub fn set_at<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        height: Height,
    ) -> ObserverResult<RelayerSet> {
        if let Some(latest) = tx.get_typed::<RelayerSet>(keys::RELAYER_SET_LATEST.as_bytes())? {
            if latest.height <= height {
                return Ok(latest);
            }
        }
        let limit = keys::relayer_set(height);
        tx.prefix_scan(keys::RELAYER_SET_PREFIX.as_bytes())?
            .into_iter()
            .take_while(|(key, _)| *key <= limit)
            .last()
            .map(|(key, value)| shared_types::decode::<RelayerSet>(&key, &value))
            .transpose()?
            .ok_or(ObserverError::NoRelayerSet { height })
    }

    /// Every snapshot, oldest first.
    pub fn history<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
    ) -> ObserverResult<Vec<RelayerSet>> {
        Ok(tx.scan_typed(keys::RELAYER_SET_PREFIX.as_bytes())?)
    }

    /// Insert or replace a node account.
    pub fn upsert_node_account<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        account: &NodeAccount,
    ) -> ObserverResult<()> {
        tx.put_typed(keys::node_account(&account.operator), account)?;
        Ok(())
    }

    /// Load a node account.
    pub fn node_account<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        operator: &str,
    ) -> ObserverResult<Option<NodeAccount>> {
        Ok(tx.get_typed(&keys::node_account(operator))?)
    }

    /// All node accounts, ordered by operator.
    pub fn node_accounts<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
    ) -> ObserverResult<Vec<NodeAccount>> {
        Ok(tx.scan_typed(keys::NODE_ACCOUNT_PREFIX.as_bytes())?)
    }

    /// Voter set for keygen ballots: every active node account, weight one.
    pub fn keygen_voters<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        height: Height,
    ) -> ObserverResult<RelayerSet> {
        let members = self
            .node_accounts(tx)?
            .into_iter()
            .filter(NodeAccount::is_active)
            .map(|account| (account.operator, 1))
            .collect();
        Ok(RelayerSet::new(height, members))
    }

    /// Store a blame record and apply its consequences.
    ///
    /// Replaying an identical blame is a no-op. Offenders reaching the blame
    /// limit are dropped from a new snapshot at `ctx.height` and their node
    /// accounts marked ejected.
    pub fn record_blame<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        blame: Blame,
    ) -> ObserverResult<BlameOutcome> {
        let index = blame.index();
        let key = keys::blame(&index);
        if tx.exists(&key)? {
            return Ok(BlameOutcome::default());
        }

        warn!(
            chain_id = blame.chain_id,
            subject = %blame.subject.short(),
            offenders = ?blame.offenders,
            reason = %blame.reason,
            "[xc-01] Blame recorded"
        );

        let limit = self.config.max_blames_before_ejection;
        let mut ejected = Vec::new();
        for offender in &blame.offenders {
            let count_key = keys::blame_count(offender);
            let count = tx.get_typed::<u32>(&count_key)?.unwrap_or(0).saturating_add(1);
            tx.put_typed(count_key, &count)?;
            if limit > 0 && count >= limit {
                ejected.push(offender.clone());
            }
        }
        tx.put_typed(key, &blame)?;

        if !ejected.is_empty() {
            self.eject(tx, ctx, &ejected)?;
        }

        Ok(BlameOutcome {
            recorded: true,
            ejected,
        })
    }

    fn eject<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        offenders: &[Address],
    ) -> ObserverResult<()> {
        if let Ok(current) = self.set_at(tx, ctx.height) {
            let mut next = current;
            for offender in offenders {
                next = next.without(offender, ctx.height);
            }
            // Ejecting the last relayers would leave nothing to vote with.
            if next.total_power() > 0 {
                self.write_snapshot(tx, &next)?;
            } else {
                warn!(
                    height = ctx.height,
                    "[xc-01] Ejection skipped: would empty the relayer set"
                );
            }
        }

        for offender in offenders {
            if let Some(mut account) = self.node_account(tx, offender)? {
                account.status = NodeStatus::Ejected;
                self.upsert_node_account(tx, &account)?;
            }
            info!(relayer = %offender, height = ctx.height, "[xc-01] Relayer ejected");
        }
        Ok(())
    }

    /// Blame records, ordered by index.
    pub fn blames<S: KeyValueStore>(&self, tx: &StoreTx<'_, S>) -> ObserverResult<Vec<Blame>> {
        Ok(tx.scan_typed(keys::BLAME_PREFIX.as_bytes())?)
    }

    /// Blames accumulated by one relayer.
    pub fn blame_count<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        relayer: &str,
    ) -> ObserverResult<u32> {
        Ok(tx.get_typed(&keys::blame_count(relayer))?.unwrap_or(0))
    }
}

impl Default for RelayerSetManager {
    fn default() -> Self {
        Self::new(RelayerSetConfig::default())
    }
}
