//! Segment Manager
//!
//! Routes keys to shard stores via CRC16 slot hashing (Redis-compatible)
//! and resolves shard ids to store handles under shard-level locks.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::trace;

use crate::server::Session;
use crate::storage::KvStore;

/// Total number of slots (Redis-compatible)
pub const TOTAL_SLOTS: u16 = 16384;

/// CRC16 implementation (XMODEM)
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("unknown store {0}")]
    UnknownStore(u32),
}

/// Shard-lock intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared intent: scans and point reads; compatible with other readers.
    IntentShared,
    /// Exclusive: store lifecycle changes (destroy, mode flips).
    Exclusive,
}

/// A resolved shard handle; holds the shard lock for its lifetime.
pub struct DbGuard<'a> {
    _shared: Option<RwLockReadGuard<'a, ()>>,
    _exclusive: Option<RwLockWriteGuard<'a, ()>>,
    store: Arc<KvStore>,
}

impl DbGuard<'_> {
    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }
}

/// Segment manager: key → slot → shard routing plus shard-handle resolution.
pub struct SegmentMgr {
    stores: Vec<Arc<KvStore>>,
    locks: Vec<RwLock<()>>,
}

impl SegmentMgr {
    pub fn new(stores: Vec<Arc<KvStore>>) -> Self {
        let locks = stores.iter().map(|_| RwLock::new(())).collect();
        Self { stores, locks }
    }

    pub fn store_count(&self) -> u32 {
        self.stores.len() as u32
    }

    /// Slot of a key (CRC16 over 16384 slots).
    pub fn slot_for_key(&self, key: &[u8]) -> u16 {
        crc16(key) % TOTAL_SLOTS
    }

    /// Shard owning a key: slots are folded onto the shard count.
    pub fn shard_for_key(&self, key: &[u8]) -> u32 {
        u32::from(self.slot_for_key(key)) % self.store_count()
    }

    /// Resolve a shard to its store handle under the requested lock.
    pub fn get_db(
        &self,
        sess: &Session,
        shard: u32,
        mode: LockMode,
    ) -> Result<DbGuard<'_>, SegmentError> {
        let store = self
            .stores
            .get(shard as usize)
            .ok_or(SegmentError::UnknownStore(shard))?;
        trace!(session = sess.id(), shard, ?mode, "resolving shard handle");
        let lock = &self.locks[shard as usize];
        let (shared, exclusive) = match mode {
            LockMode::IntentShared => (Some(lock.read().unwrap()), None),
            LockMode::Exclusive => (None, Some(lock.write().unwrap())),
        };
        Ok(DbGuard {
            _shared: shared,
            _exclusive: exclusive,
            store: store.clone(),
        })
    }
}
