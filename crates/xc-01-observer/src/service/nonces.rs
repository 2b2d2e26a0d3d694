//! # Nonce Allocator
//!
//! Sequential outbound nonces per (chain, TSS pubkey).
//!
//! Each pair is a critical section: `allocate` takes the pair lock into the
//! caller's [`StoreTx`], so a concurrent allocation on the same pair waits
//! until the first one has committed or been discarded and then reads the
//! advanced counter.

use super::keys;
use crate::domain::{ChainNonces, NonceToXmsg, PendingNonces, TssFundMigration};
use crate::error::{ObserverError, ObserverResult};
use shared_types::{ChainId, Height, KeyValueStore, KeyedLocks, StoreTx, XmsgIndex};
use tracing::{debug, error};

/// Outbound nonce bookkeeping.
pub struct NonceAllocator {
    locks: KeyedLocks,
}

impl NonceAllocator {
    /// Create an allocator.
    pub fn new() -> Self {
        Self {
            locks: KeyedLocks::new(),
        }
    }

    /// Take the locks of several pairs up front, in sorted order.
    ///
    /// Needed by events that touch more than one pair, such as a revert
    /// allocating on the origin chain while releasing on the receiver chain.
    pub fn lock_pairs<S: KeyValueStore>(&self, tx: &mut StoreTx<'_, S>, pairs: &[(ChainId, &str)]) {
        let names = pairs
            .iter()
            .map(|(chain_id, pubkey)| keys::nonce_pair_lock(*chain_id, pubkey))
            .collect();
        tx.lock_all(&self.locks, names);
    }

    /// Assign the next nonce of the pair to `xmsg_index`.
    ///
    /// # Errors
    ///
    /// `NonceConflict` (fatal) if the nonce already maps to an Xmsg.
    pub fn allocate<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
        xmsg_index: XmsgIndex,
    ) -> ObserverResult<u64> {
        tx.lock(&self.locks, keys::nonce_pair_lock(chain_id, tss_pubkey));

        let counter_key = keys::chain_nonces(chain_id, tss_pubkey);
        let mut counter = tx
            .get_typed::<ChainNonces>(&counter_key)?
            .unwrap_or_else(|| ChainNonces::new(chain_id, tss_pubkey));
        let nonce = counter.next_nonce;

        let mapping_key = keys::nonce_to_xmsg(chain_id, tss_pubkey, nonce);
        if let Some(existing) = tx.get_typed::<NonceToXmsg>(&mapping_key)? {
            error!(
                chain_id,
                tss_pubkey,
                nonce,
                existing = %existing.xmsg_index,
                "[xc-01] Nonce already assigned"
            );
            return Err(ObserverError::NonceConflict {
                chain_id,
                tss_pubkey: tss_pubkey.to_string(),
                nonce,
                existing: existing.xmsg_index,
            });
        }

        counter.next_nonce += 1;
        tx.put_typed(counter_key, &counter)?;

        let pending_key = keys::pending_nonces(chain_id, tss_pubkey);
        let mut pending = tx
            .get_typed::<PendingNonces>(&pending_key)?
            .unwrap_or_else(|| PendingNonces::new(chain_id, tss_pubkey));
        pending.push(nonce);
        tx.put_typed(pending_key, &pending)?;

        tx.put_typed(
            mapping_key,
            &NonceToXmsg {
                chain_id,
                tss_pubkey: tss_pubkey.to_string(),
                nonce,
                xmsg_index,
            },
        )?;

        debug!(
            chain_id,
            tss_pubkey,
            nonce,
            xmsg = %xmsg_index.short(),
            "[xc-01] Nonce allocated"
        );
        Ok(nonce)
    }

    /// Give back a nonce whose attempt was never broadcast.
    ///
    /// Clears the reverse mapping and the outstanding entry. The counter is
    /// not rewound.
    pub fn release<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
        nonce: u64,
    ) -> ObserverResult<()> {
        tx.lock(&self.locks, keys::nonce_pair_lock(chain_id, tss_pubkey));
        self.remove_outstanding(tx, chain_id, tss_pubkey, nonce)?;
        tx.delete(keys::nonce_to_xmsg(chain_id, tss_pubkey, nonce));
        debug!(chain_id, tss_pubkey, nonce, "[xc-01] Nonce released");
        Ok(())
    }

    /// Mark a nonce's attempt as finalized on the external chain.
    ///
    /// The reverse mapping stays as history.
    pub fn complete<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
        nonce: u64,
    ) -> ObserverResult<()> {
        tx.lock(&self.locks, keys::nonce_pair_lock(chain_id, tss_pubkey));
        self.remove_outstanding(tx, chain_id, tss_pubkey, nonce)
    }

    fn remove_outstanding<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
        nonce: u64,
    ) -> ObserverResult<()> {
        let pending_key = keys::pending_nonces(chain_id, tss_pubkey);
        let not_pending = || ObserverError::NonceNotPending {
            chain_id,
            tss_pubkey: tss_pubkey.to_string(),
            nonce,
        };
        let mut pending = tx
            .get_typed::<PendingNonces>(&pending_key)?
            .ok_or_else(not_pending)?;
        if !pending.remove(nonce) {
            return Err(not_pending());
        }
        tx.put_typed(pending_key, &pending)?;
        Ok(())
    }

    /// Counter of a pair.
    pub fn chain_nonces<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
    ) -> ObserverResult<Option<ChainNonces>> {
        Ok(tx.get_typed(&keys::chain_nonces(chain_id, tss_pubkey))?)
    }

    /// Pending window of a pair.
    pub fn pending_nonces<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
    ) -> ObserverResult<Option<PendingNonces>> {
        Ok(tx.get_typed(&keys::pending_nonces(chain_id, tss_pubkey))?)
    }

    /// Pending windows of every key on a chain.
    pub fn pending_nonces_by_chain<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<Vec<PendingNonces>> {
        Ok(tx.scan_typed(&keys::pending_nonces_chain_prefix(chain_id))?)
    }

    /// Owner of a nonce.
    pub fn nonce_to_xmsg<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
        nonce: u64,
    ) -> ObserverResult<Option<NonceToXmsg>> {
        Ok(tx.get_typed(&keys::nonce_to_xmsg(chain_id, tss_pubkey, nonce))?)
    }

    /// Reverse mappings of every outstanding nonce of a pair, lowest first.
    pub fn outstanding<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
        tss_pubkey: &str,
    ) -> ObserverResult<Vec<NonceToXmsg>> {
        let Some(pending) = self.pending_nonces(tx, chain_id, tss_pubkey)? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::with_capacity(pending.outstanding.len());
        for nonce in &pending.outstanding {
            if let Some(entry) = self.nonce_to_xmsg(tx, chain_id, tss_pubkey, *nonce)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Snapshot the pair's outstanding allocations for a key rotation.
    ///
    /// Carried entries keep their nonces; the incoming key starts its own
    /// sequence at zero.
    pub fn migrate<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        chain_id: ChainId,
        from_pubkey: &str,
        to_pubkey: &str,
        height: Height,
    ) -> ObserverResult<TssFundMigration> {
        self.lock_pairs(tx, &[(chain_id, from_pubkey), (chain_id, to_pubkey)]);
        let carried = self.outstanding(tx, chain_id, from_pubkey)?;
        Ok(TssFundMigration {
            chain_id,
            from_pubkey: from_pubkey.to_string(),
            to_pubkey: to_pubkey.to_string(),
            carried,
            migration_xmsg: None,
            height,
        })
    }
}

impl Default for NonceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use shared_types::{Digest, InMemoryKVStore};
    use std::sync::Arc;
    use std::thread;

    fn xmsg(n: u64) -> XmsgIndex {
        Digest::of("xmsg", &[&n.to_be_bytes()])
    }

    fn seed_counter(store: &RwLock<InMemoryKVStore>, next_nonce: u64) {
        let mut tx = StoreTx::begin(store);
        tx.put_typed(
            keys::chain_nonces(101, "pk1"),
            &ChainNonces {
                chain_id: 101,
                tss_pubkey: "pk1".to_string(),
                next_nonce,
            },
        )
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_allocation_is_sequential_and_mapped() {
        let store = RwLock::new(InMemoryKVStore::new());
        let nonces = NonceAllocator::new();

        let mut tx = StoreTx::begin(&store);
        assert_eq!(nonces.allocate(&mut tx, 101, "pk1", xmsg(1)).unwrap(), 0);
        assert_eq!(nonces.allocate(&mut tx, 101, "pk1", xmsg(2)).unwrap(), 1);
        assert_eq!(nonces.allocate(&mut tx, 101, "pk2", xmsg(3)).unwrap(), 0);
        tx.commit().unwrap();

        let tx = StoreTx::begin(&store);
        let pending = nonces.pending_nonces(&tx, 101, "pk1").unwrap().unwrap();
        assert_eq!((pending.nonce_low, pending.nonce_high), (0, 2));
        assert_eq!(
            nonces.nonce_to_xmsg(&tx, 101, "pk1", 1).unwrap().unwrap().xmsg_index,
            xmsg(2)
        );
        assert_eq!(nonces.pending_nonces_by_chain(&tx, 101).unwrap().len(), 2);
        assert!(nonces.pending_nonces_by_chain(&tx, 10).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_allocation_serializes_on_pair() {
        let store = Arc::new(RwLock::new(InMemoryKVStore::new()));
        let nonces = Arc::new(NonceAllocator::new());
        seed_counter(&store, 5);

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let store = Arc::clone(&store);
                let nonces = Arc::clone(&nonces);
                thread::spawn(move || {
                    let mut tx = StoreTx::begin(&*store);
                    let nonce = nonces.allocate(&mut tx, 101, "pk1", xmsg(i)).unwrap();
                    tx.commit().unwrap();
                    nonce
                })
            })
            .collect();

        let mut got: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        got.sort_unstable();
        assert_eq!(got, vec![5, 6]);

        let tx = StoreTx::begin(&store);
        assert_eq!(
            nonces.chain_nonces(&tx, 101, "pk1").unwrap().unwrap().next_nonce,
            7
        );
    }

    #[test]
    fn test_existing_mapping_is_conflict() {
        let store = RwLock::new(InMemoryKVStore::new());
        let nonces = NonceAllocator::new();

        let mut tx = StoreTx::begin(&store);
        tx.put_typed(
            keys::nonce_to_xmsg(101, "pk1", 0),
            &NonceToXmsg {
                chain_id: 101,
                tss_pubkey: "pk1".to_string(),
                nonce: 0,
                xmsg_index: xmsg(9),
            },
        )
        .unwrap();
        let err = nonces.allocate(&mut tx, 101, "pk1", xmsg(1)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ObserverError::NonceConflict { nonce: 0, .. }));
    }

    #[test]
    fn test_release_keeps_counter_and_complete_keeps_mapping() {
        let store = RwLock::new(InMemoryKVStore::new());
        let nonces = NonceAllocator::new();

        let mut tx = StoreTx::begin(&store);
        nonces.allocate(&mut tx, 101, "pk1", xmsg(1)).unwrap();
        nonces.allocate(&mut tx, 101, "pk1", xmsg(2)).unwrap();

        nonces.release(&mut tx, 101, "pk1", 1).unwrap();
        assert!(nonces.nonce_to_xmsg(&tx, 101, "pk1", 1).unwrap().is_none());
        assert_eq!(nonces.allocate(&mut tx, 101, "pk1", xmsg(3)).unwrap(), 2);

        nonces.complete(&mut tx, 101, "pk1", 0).unwrap();
        assert!(nonces.nonce_to_xmsg(&tx, 101, "pk1", 0).unwrap().is_some());
        let pending = nonces.pending_nonces(&tx, 101, "pk1").unwrap().unwrap();
        assert_eq!((pending.nonce_low, pending.nonce_high), (2, 3));

        assert!(matches!(
            nonces.complete(&mut tx, 101, "pk1", 0),
            Err(ObserverError::NonceNotPending { nonce: 0, .. })
        ));
    }

    #[test]
    fn test_migrate_carries_outstanding_entries() {
        let store = RwLock::new(InMemoryKVStore::new());
        let nonces = NonceAllocator::new();

        let mut tx = StoreTx::begin(&store);
        nonces.allocate(&mut tx, 101, "old", xmsg(1)).unwrap();
        nonces.allocate(&mut tx, 101, "old", xmsg(2)).unwrap();
        nonces.complete(&mut tx, 101, "old", 0).unwrap();

        let migration = nonces.migrate(&mut tx, 101, "old", "new", 40).unwrap();
        assert_eq!(migration.carried.len(), 1);
        assert_eq!(migration.carried[0].nonce, 1);
        assert_eq!(nonces.allocate(&mut tx, 101, "new", xmsg(3)).unwrap(), 0);
    }
}
