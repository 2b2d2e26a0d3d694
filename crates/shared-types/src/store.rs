//! # Key-Value Store
//!
//! The persistence port consumed by every subsystem, an in-memory adapter,
//! and [`StoreTx`], the write overlay through which one event is applied.
//!
//! ## Atomicity
//!
//! Subsystems read through a `StoreTx` (their own staged writes shadow the
//! base store) and stage every write in it. `commit` hands the whole batch
//! to [`KeyValueStore::atomic_batch_write`]; dropping the transaction
//! discards it. Partial application is therefore never observable.

use crate::errors::StoreError;
use crate::locks::{KeyGuard, KeyedLocks};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Abstract interface for key-value database operations.
///
/// Testing and single-node replay: [`InMemoryKVStore`] (below).
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// Iterate over keys with a prefix, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// In-memory key-value store.
///
/// Ordered map so that prefix scans are deterministic across replicas.
#[derive(Default, Debug)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        // Single writer under the caller's lock; nothing can fail midway.
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Encode an entity for storage.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encoding {
        message: e.to_string(),
    })
}

/// Decode an entity read from `key`.
pub fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corruption {
        key: String::from_utf8_lossy(key).into_owned(),
        message: e.to_string(),
    })
}

/// Write overlay for applying one event atomically.
///
/// Also carries the per-key guards acquired while applying the event; they
/// are released only after the batch has been committed (or discarded).
pub struct StoreTx<'a, S: KeyValueStore> {
    base: &'a RwLock<S>,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    guards: BTreeMap<String, KeyGuard>,
}

impl<'a, S: KeyValueStore> StoreTx<'a, S> {
    /// Open a transaction over `base`.
    pub fn begin(base: &'a RwLock<S>) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
            guards: BTreeMap::new(),
        }
    }

    /// Acquire the lock for `key` in `locks` unless this transaction already
    /// holds it.
    pub fn lock(&mut self, locks: &KeyedLocks, key: String) {
        if self.guards.contains_key(&key) {
            return;
        }
        let guard = locks.acquire(&key);
        self.guards.insert(key, guard);
    }

    /// Acquire several locks of one namespace in sorted order.
    ///
    /// Used when an event touches more than one key of the same namespace.
    pub fn lock_all(&mut self, locks: &KeyedLocks, mut keys: Vec<String>) {
        keys.sort();
        keys.dedup();
        for key in keys {
            self.lock(locks, key);
        }
    }

    /// Whether this transaction holds `key`.
    pub fn holds(&self, key: &str) -> bool {
        self.guards.contains_key(key)
    }

    /// Read a raw value, seeing this transaction's own staged writes.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(staged) = self.writes.get(key) {
            return Ok(staged.clone());
        }
        self.base.read().get(key)
    }

    /// Whether `key` exists.
    pub fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Stage a raw put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.writes.insert(key.into(), Some(value));
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.writes.insert(key.into(), None);
    }

    /// Prefix scan merging the base store with staged writes.
    pub fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.read().prefix_scan(prefix)?.into_iter().collect();

        let staged = self
            .writes
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix));
        for (key, value) in staged {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Read and decode an entity.
    pub fn get_typed<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encode and stage an entity.
    pub fn put_typed<T: Serialize>(
        &mut self,
        key: impl Into<Vec<u8>>,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = encode(value)?;
        self.put(key, bytes);
        Ok(())
    }

    /// Decode every entity under `prefix`, in key order.
    pub fn scan_typed<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>, StoreError> {
        self.prefix_scan(prefix)?
            .into_iter()
            .map(|(k, v)| decode(&k, &v))
            .collect()
    }

    /// Number of staged operations.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Commit all staged writes as one atomic batch, then release the locks.
    ///
    /// Returns the number of operations written.
    pub fn commit(self) -> Result<usize, StoreError> {
        let StoreTx {
            base,
            writes,
            guards,
        } = self;

        let operations: Vec<BatchOperation> = writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(v) => BatchOperation::put(key, v),
                None => BatchOperation::delete(key),
            })
            .collect();
        let count = operations.len();

        if count > 0 {
            base.write().atomic_batch_write(operations)?;
        }
        tracing::trace!(operations = count, locks = guards.len(), "StoreTx committed");
        drop(guards);
        Ok(count)
    }
}
