//! # TSS Registry
//!
//! Append-only history of TSS key groups plus fund-migration records.
//!
//! The first key group becomes current as soon as keygen succeeds. Later key
//! groups are parked as *generated* until funds have been migrated to them
//! and the address update registers them.

use super::keys;
use crate::domain::{Tss, TssFundMigration};
use crate::error::{ObserverError, ObserverResult};
use shared_types::{ChainId, Height, KeyValueStore, StoreTx};
use tracing::info;

/// TSS key-group bookkeeping.
#[derive(Default)]
pub struct TssRegistry;

impl TssRegistry {
    /// Create a registry.
    pub fn new() -> Self {
        Self
    }

    /// Append a key group to the history.
    ///
    /// # Errors
    ///
    /// - `TssOutOfOrder` unless `finalized_height` is above the latest entry
    /// - `TssAlreadyRegistered` for a pubkey already in the history
    pub fn register<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        tss: Tss,
    ) -> ObserverResult<()> {
        if let Some(latest) = self.latest(tx)? {
            if tss.finalized_height <= latest.finalized_height {
                return Err(ObserverError::TssOutOfOrder {
                    finalized_height: tss.finalized_height,
                    latest: latest.finalized_height,
                });
            }
        }
        if self.find(tx, &tss.pubkey)?.is_some() {
            return Err(ObserverError::TssAlreadyRegistered { pubkey: tss.pubkey });
        }

        tx.put_typed(keys::tss_history(tss.finalized_height), &tss)?;
        tx.put_typed(keys::TSS_LATEST, &tss)?;
        info!(
            pubkey = %tss.pubkey,
            finalized_height = tss.finalized_height,
            participants = tss.participants.len(),
            "[xc-01] TSS registered"
        );
        Ok(())
    }

    /// Key group signing at `height`.
    ///
    /// # Errors
    ///
    /// `TssNotFound` if no key group was finalized at or before `height`.
    pub fn current<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        height: Height,
    ) -> ObserverResult<Tss> {
        self.current_opt(tx, height)?
            .ok_or(ObserverError::TssNotFound { height })
    }

    /// Like [`current`](Self::current) but `None` instead of an error.
    pub fn current_opt<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        height: Height,
    ) -> ObserverResult<Option<Tss>> {
        match self.latest(tx)? {
            None => return Ok(None),
            Some(latest) if latest.finalized_height <= height => return Ok(Some(latest)),
            Some(_) => {}
        }
        Ok(self
            .history(tx)?
            .into_iter()
            .take_while(|t| t.finalized_height <= height)
            .last())
    }

    /// Most recently registered key group.
    pub fn latest<S: KeyValueStore>(&self, tx: &StoreTx<'_, S>) -> ObserverResult<Option<Tss>> {
        Ok(tx.get_typed(keys::TSS_LATEST.as_bytes())?)
    }

    /// Every key group, oldest first.
    pub fn history<S: KeyValueStore>(&self, tx: &StoreTx<'_, S>) -> ObserverResult<Vec<Tss>> {
        Ok(tx.scan_typed(keys::TSS_HISTORY_PREFIX.as_bytes())?)
    }

    /// Key group with `pubkey`, if registered.
    pub fn find<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        pubkey: &str,
    ) -> ObserverResult<Option<Tss>> {
        Ok(self.history(tx)?.into_iter().find(|t| t.pubkey == pubkey))
    }

    /// Park a successfully generated key group awaiting rotation.
    pub fn record_generated<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        tss: &Tss,
    ) -> ObserverResult<()> {
        if self.find(tx, &tss.pubkey)?.is_some() {
            return Err(ObserverError::TssAlreadyRegistered {
                pubkey: tss.pubkey.clone(),
            });
        }
        tx.put_typed(keys::tss_generated(&tss.pubkey), tss)?;
        info!(
            pubkey = %tss.pubkey,
            keygen_height = tss.keygen_height,
            "[xc-01] TSS generated, awaiting rotation"
        );
        Ok(())
    }

    /// Generated key group with `pubkey`, if parked.
    pub fn generated<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        pubkey: &str,
    ) -> ObserverResult<Option<Tss>> {
        Ok(tx.get_typed(&keys::tss_generated(pubkey))?)
    }

    /// Every parked key group, ordered by pubkey.
    pub fn generated_all<S: KeyValueStore>(&self, tx: &StoreTx<'_, S>) -> ObserverResult<Vec<Tss>> {
        Ok(tx.scan_typed(keys::TSS_GENERATED_PREFIX.as_bytes())?)
    }

    /// Register a parked key group as current from `height`.
    ///
    /// # Errors
    ///
    /// `TssNotFound` if `pubkey` was never generated.
    pub fn promote_generated<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        pubkey: &str,
        height: Height,
    ) -> ObserverResult<Tss> {
        let mut tss = self
            .generated(tx, pubkey)?
            .ok_or(ObserverError::TssNotFound { height })?;
        tss.finalized_height = height;
        self.register(tx, tss.clone())?;
        tx.delete(keys::tss_generated(pubkey));
        Ok(tss)
    }

    /// Store or replace the migration record of a chain.
    pub fn record_migration<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        migration: &TssFundMigration,
    ) -> ObserverResult<()> {
        tx.put_typed(keys::tss_migration(migration.chain_id), migration)?;
        Ok(())
    }

    /// Migration record of a chain.
    pub fn migration<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<Option<TssFundMigration>> {
        Ok(tx.get_typed(&keys::tss_migration(chain_id))?)
    }

    /// All migration records, ordered by chain.
    pub fn migrations<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
    ) -> ObserverResult<Vec<TssFundMigration>> {
        Ok(tx.scan_typed(keys::TSS_MIGRATION_PREFIX.as_bytes())?)
    }

    /// Drop every migration record once the rotation is complete.
    pub fn clear_migrations<S: KeyValueStore>(&self, tx: &mut StoreTx<'_, S>) -> ObserverResult<()> {
        for migration in self.migrations(tx)? {
            tx.delete(keys::tss_migration(migration.chain_id));
        }
        Ok(())
    }
}
