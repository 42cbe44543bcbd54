//! Shard Expiration State
//!
//! Per-shard mutable state of the expiration engine: resume cursor,
//! expired-key queue, single-flight flags, and observability counters.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::storage::TtlIndexEntry;

/// Cursor-and-queue half of a shard's state; always mutated under the lock.
pub(crate) struct ShardQueue {
    /// Encoded TTL-index key of the last enqueued entry; empty means the
    /// next scan starts from the beginning of the index.
    pub resume_cursor: Bytes,
    /// Entries discovered by the scanner but not yet handed to the deleter.
    pub expired: VecDeque<TtlIndexEntry>,
}

/// State of one shard.
pub(crate) struct ShardState {
    pub queue: Mutex<ShardQueue>,
    pub scan_busy: AtomicBool,
    pub del_busy: AtomicBool,
    pub disabled: AtomicBool,
    pub scan_in_flight: AtomicU64,
    pub del_in_flight: AtomicU64,
}

impl ShardState {
    fn new() -> Self {
        Self {
            queue: Mutex::new(ShardQueue {
                resume_cursor: Bytes::new(),
                expired: VecDeque::new(),
            }),
            scan_busy: AtomicBool::new(false),
            del_busy: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            scan_in_flight: AtomicU64::new(0),
            del_in_flight: AtomicU64::new(0),
        }
    }
}

/// Single-flight admission for one job kind on one shard.
///
/// Acquiring flips the busy flag and bumps the in-flight counter; dropping
/// undoes both, on every exit path of the job.
pub(crate) struct JobGuard<'a> {
    busy: &'a AtomicBool,
    in_flight: &'a AtomicU64,
}

impl<'a> JobGuard<'a> {
    pub fn try_acquire(busy: &'a AtomicBool, in_flight: &'a AtomicU64) -> Option<Self> {
        if busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        in_flight.fetch_add(1, Ordering::Relaxed);
        Some(Self { busy, in_flight })
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        // stop_store may have zeroed the counter under us; never wrap.
        let _ = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        self.busy.store(false, Ordering::Release);
    }
}

/// The engine's table of per-shard state plus process-wide counters.
pub(crate) struct ShardStateTable {
    shards: Vec<ShardState>,
    total_enqueue: AtomicU64,
    total_dequeue: AtomicU64,
}

impl ShardStateTable {
    pub fn new(shard_count: u32) -> Self {
        Self {
            shards: (0..shard_count).map(|_| ShardState::new()).collect(),
            total_enqueue: AtomicU64::new(0),
            total_dequeue: AtomicU64::new(0),
        }
    }

    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }

    pub fn shard(&self, id: u32) -> &ShardState {
        &self.shards[id as usize]
    }

    pub fn contains(&self, id: u32) -> bool {
        (id as usize) < self.shards.len()
    }

    /// Shards whose expired queues currently hold work.
    pub fn shards_with_pending(&self) -> Vec<u32> {
        let mut pending = Vec::new();
        for (id, shard) in self.shards.iter().enumerate() {
            if !shard.queue.lock().unwrap().expired.is_empty() {
                pending.push(id as u32);
            }
        }
        pending
    }

    /// Disable a shard: drop queued work, forget the resume cursor, zero
    /// the in-flight counters. In-flight jobs finish naturally and release
    /// their single-flight flags on exit.
    pub fn stop_store(&self, id: u32) {
        let shard = self.shard(id);
        let mut queue = shard.queue.lock().unwrap();
        queue.expired.clear();
        queue.resume_cursor = Bytes::new();
        shard.scan_in_flight.store(0, Ordering::Relaxed);
        shard.del_in_flight.store(0, Ordering::Relaxed);
        shard.disabled.store(true, Ordering::Relaxed);
    }

    pub fn note_enqueue(&self) {
        self.total_enqueue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_dequeue(&self) {
        self.total_dequeue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_enqueue(&self) -> u64 {
        self.total_enqueue.load(Ordering::Relaxed)
    }

    pub fn total_dequeue(&self) -> u64 {
        self.total_dequeue.load(Ordering::Relaxed)
    }
}
