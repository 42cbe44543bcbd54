//! Shard Store
//!
//! One independent storage partition. Keeps the keyspace hash map and the
//! ordered TTL secondary index coherent under a single lock, and hands out
//! snapshot read transactions for expiration scans.

use bytes::Bytes;
use hashbrown::HashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::ttl_index::{TtlIndexEntry, ValueType};
use super::StorageError;
use crate::server::Session;

/// Replication role of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoreMode {
    ReadWrite = 0,
    ReplicateOnly = 1,
    None = 2,
}

impl StoreMode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::ReadWrite,
            1 => Self::ReplicateOnly,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    value: Bytes,
    vtype: ValueType,
    expire_at_ms: Option<u64>,
}

#[derive(Default)]
struct Keyspace {
    data: HashMap<(u32, Bytes), Record>,
    ttl_index: BTreeSet<Bytes>,
}

/// A single shard store.
pub struct KvStore {
    id: u32,
    mode: AtomicU8,
    open: AtomicBool,
    paused: AtomicBool,
    inner: RwLock<Keyspace>,
}

impl KvStore {
    pub fn new(id: u32, mode: StoreMode) -> Self {
        Self {
            id,
            mode: AtomicU8::new(mode as u8),
            open: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            inner: RwLock::new(Keyspace::default()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn mode(&self) -> StoreMode {
        StoreMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: StoreMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Current store time in milliseconds, the bound for TTL cursors.
    pub fn current_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Close the store. Subsequent transactions and writes are refused.
    pub fn stop(&self) {
        self.open.store(false, Ordering::Release);
        debug!(store = self.id, "store stopped");
    }

    /// Tear the store down: drop all data, close it, and demote it to
    /// [`StoreMode::None`]. The store must be paused first.
    pub fn destroy(&self) -> Result<(), StorageError> {
        if !self.is_paused() {
            return Err(StorageError::NotPaused(self.id));
        }
        {
            let mut inner = self.inner.write().unwrap();
            inner.data.clear();
            inner.ttl_index.clear();
        }
        self.open.store(false, Ordering::Release);
        self.set_mode(StoreMode::None);
        debug!(store = self.id, "store destroyed");
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().data.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.inner.read().unwrap().data.len()
    }

    /// Insert or overwrite a key. `expire_at_ms` is an absolute timestamp;
    /// the TTL index entry of any overwritten record is dropped with it.
    pub fn set(
        &self,
        db_id: u32,
        key: Bytes,
        value: Bytes,
        vtype: ValueType,
        expire_at_ms: Option<u64>,
    ) -> Result<(), StorageError> {
        if !self.is_open() {
            return Err(StorageError::Closed(self.id));
        }
        let mut inner = self.inner.write().unwrap();
        let stale = inner.data.get(&(db_id, key.clone())).and_then(|old| {
            old.expire_at_ms
                .map(|expire| TtlIndexEntry::new(expire, db_id, old.vtype, key.clone()))
        });
        if let Some(stale) = stale {
            inner.ttl_index.remove(stale.encoded());
        }
        if let Some(expire) = expire_at_ms {
            let entry = TtlIndexEntry::new(expire, db_id, vtype, key.clone());
            inner.ttl_index.insert(entry.encoded().clone());
        }
        inner.data.insert(
            (db_id, key),
            Record {
                value,
                vtype,
                expire_at_ms,
            },
        );
        Ok(())
    }

    /// Read a key. Records whose TTL has elapsed read as absent even before
    /// the expiration engine has deleted them.
    pub fn get(&self, db_id: u32, key: &Bytes) -> Option<Bytes> {
        let inner = self.inner.read().unwrap();
        let record = inner.data.get(&(db_id, key.clone()))?;
        match record.expire_at_ms {
            Some(expire) if expire <= self.current_time() => None,
            _ => Some(record.value.clone()),
        }
    }

    /// Delete a key and its TTL index entry. Returns whether it existed.
    pub fn del(&self, db_id: u32, key: &Bytes) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.data.remove(&(db_id, key.clone())) {
            Some(record) => {
                if let Some(expire) = record.expire_at_ms {
                    let entry = TtlIndexEntry::new(expire, db_id, record.vtype, key.clone());
                    inner.ttl_index.remove(entry.encoded());
                }
                true
            }
            None => false,
        }
    }

    /// Delete `key` iff its recorded TTL has elapsed at `now` and the record
    /// still matches `vtype`. Safe to call repeatedly and for keys that were
    /// overwritten or already removed; those calls succeed with no effect.
    pub fn expire_key_if_needed(
        &self,
        db_id: u32,
        key: &Bytes,
        vtype: ValueType,
        now: u64,
    ) -> Result<bool, StorageError> {
        if !self.is_open() {
            return Err(StorageError::Closed(self.id));
        }
        let mut inner = self.inner.write().unwrap();
        let Some(record) = inner.data.get(&(db_id, key.clone())) else {
            return Ok(false);
        };
        if record.vtype != vtype {
            // Overwritten with a different type; the stale index entry no
            // longer refers to this record.
            return Ok(false);
        }
        let Some(expire) = record.expire_at_ms else {
            return Ok(false);
        };
        if expire > now {
            return Ok(false);
        }
        inner.data.remove(&(db_id, key.clone()));
        let entry = TtlIndexEntry::new(expire, db_id, vtype, key.clone());
        inner.ttl_index.remove(entry.encoded());
        Ok(true)
    }

    /// Begin a snapshot read transaction.
    pub fn begin_read_tx(&self, _sess: &Session) -> Result<ReadTx, StorageError> {
        if !self.is_open() {
            return Err(StorageError::Closed(self.id));
        }
        let inner = self.inner.read().unwrap();
        Ok(ReadTx {
            ttl_index: inner.ttl_index.clone(),
        })
    }
}

/// A read transaction: a point-in-time snapshot of the TTL index.
pub struct ReadTx {
    ttl_index: BTreeSet<Bytes>,
}

impl ReadTx {
    /// Cursor over the index entries whose expiration is at or before `now`,
    /// in encoded key order.
    pub fn ttl_cursor(&self, now: u64) -> Result<TtlCursor, StorageError> {
        let bound = TtlIndexEntry::upper_bound(now);
        let entries = self
            .ttl_index
            .range(..bound)
            .map(|raw| TtlIndexEntry::decode(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TtlCursor { entries, pos: 0 })
    }
}

/// Ordered cursor over elapsed TTL index entries.
pub struct TtlCursor {
    entries: Vec<TtlIndexEntry>,
    pos: usize,
}

impl TtlCursor {
    /// Position the cursor at the first entry whose encoded key is >= `prefix`.
    pub fn seek(&mut self, prefix: &[u8]) {
        self.pos = self
            .entries
            .partition_point(|e| e.encoded().as_ref() < prefix);
    }

    /// Encoded key under the cursor, if any.
    pub fn peek_key(&self) -> Option<&[u8]> {
        self.entries.get(self.pos).map(|e| e.encoded().as_ref())
    }

    /// Return the entry under the cursor and advance past it.
    pub fn next(&mut self) -> Option<TtlIndexEntry> {
        let entry = self.entries.get(self.pos).cloned()?;
        self.pos += 1;
        Some(entry)
    }
}
