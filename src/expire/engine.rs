//! Expiration Engine
//!
//! Discovers elapsed TTL-index entries across all shard stores and deletes
//! the keys they name, concurrently with live traffic. A single dispatch
//! thread feeds two worker pools: scanners read batches of elapsed index
//! entries into per-shard queues, deleters drain those queues through the
//! command layer's idempotent `expire_key_if_needed`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::state::{JobGuard, ShardStateTable};
use crate::cluster::LockMode;
use crate::server::{Config, ServerContext, Session, WorkerPool, WorkerPoolError};
use crate::storage::StoreMode;

const SCANNER_POOL: &str = "expire-scan";
const DELETER_POOL: &str = "expire-del";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Pool(#[from] WorkerPoolError),
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(io::Error),
    #[error("unknown shard {0}")]
    UnknownShard(u32),
}

/// The TTL expiration engine.
///
/// Owns one shard-state record per store for its whole lifetime. `startup`
/// launches the dispatch thread and both worker pools; `stop` joins them
/// all. A stopped engine runs no further jobs.
pub struct ExpirationEngine {
    core: Arc<EngineCore>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl ExpirationEngine {
    pub fn new(ctx: Arc<ServerContext>, config: &Config) -> Self {
        let shard_count = ctx.segment.store_count();
        Self {
            core: Arc::new(EngineCore {
                ctx,
                states: ShardStateTable::new(shard_count),
                is_running: AtomicBool::new(false),
                scan_batch: config.scan_batch,
                del_batch: config.del_batch,
                scan_pool_size: Config::resolve_pool_size(config.scan_pool_size),
                del_pool_size: Config::resolve_pool_size(config.del_pool_size),
                pause_time: config.pause_time,
                cluster_enabled: config.cluster_enabled,
            }),
            runner: Mutex::new(None),
        }
    }

    /// Start both worker pools and the dispatch thread.
    pub fn startup(&self) -> Result<(), EngineError> {
        if self
            .core
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }

        let metrics = self.core.ctx.metrics.clone();
        let scanner = match WorkerPool::startup(SCANNER_POOL, self.core.scan_pool_size, metrics.clone()) {
            Ok(pool) => pool,
            Err(err) => {
                self.core.is_running.store(false, Ordering::Release);
                return Err(err.into());
            }
        };
        let deleter = match WorkerPool::startup(DELETER_POOL, self.core.del_pool_size, metrics) {
            Ok(pool) => pool,
            Err(err) => {
                self.core.is_running.store(false, Ordering::Release);
                scanner.stop();
                return Err(err.into());
            }
        };

        let core = Arc::clone(&self.core);
        let handle = thread::Builder::new()
            .name("expire-loop".to_string())
            .spawn(move || core.run(scanner, deleter));
        match handle {
            Ok(handle) => {
                *self.runner.lock().unwrap() = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.core.is_running.store(false, Ordering::Release);
                Err(EngineError::Spawn(err))
            }
        }
    }

    /// Stop the engine: the dispatch thread finishes its current sleep,
    /// stops both pools (draining in-flight jobs), and exits. Returns once
    /// every engine thread has been joined.
    pub fn stop(&self) {
        if !self.core.is_running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("expiration engine begins to stop");
        if let Some(handle) = self.runner.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("expiration engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running.load(Ordering::Relaxed)
    }

    /// Disable a shard: clear its queue and cursor, reject all future work.
    /// In-flight jobs for the shard complete harmlessly.
    pub fn stop_store(&self, shard: u32) -> Result<(), EngineError> {
        if !self.core.states.contains(shard) {
            return Err(EngineError::UnknownShard(shard));
        }
        self.core.states.stop_store(shard);
        info!(shard, "expiration disabled for shard");
        Ok(())
    }

    /// Total entries enqueued by scanners since startup.
    pub fn total_enqueue(&self) -> u64 {
        self.core.states.total_enqueue()
    }

    /// Total entries handed to deletion since startup.
    pub fn total_dequeue(&self) -> u64 {
        self.core.states.total_dequeue()
    }

    /// In-flight scanner jobs for a shard. Panics on an unknown shard.
    pub fn scan_in_flight(&self, shard: u32) -> u64 {
        self.core.states.shard(shard).scan_in_flight.load(Ordering::Relaxed)
    }

    /// In-flight deleter jobs for a shard. Panics on an unknown shard.
    pub fn del_in_flight(&self, shard: u32) -> u64 {
        self.core.states.shard(shard).del_in_flight.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }
}

/// State shared between the engine handle, the dispatch thread, and jobs.
pub(crate) struct EngineCore {
    ctx: Arc<ServerContext>,
    states: ShardStateTable,
    is_running: AtomicBool,
    scan_batch: usize,
    del_batch: usize,
    scan_pool_size: usize,
    del_pool_size: usize,
    pause_time: Duration,
    cluster_enabled: bool,
}

impl EngineCore {
    /// Dispatch loop. Runs on the `expire-loop` thread until the engine
    /// stops, then shuts both pools down before returning, so joining this
    /// thread joins the whole engine.
    fn run(self: Arc<Self>, scanner: WorkerPool, deleter: WorkerPool) {
        info!("expiration engine running");
        while self.is_running.load(Ordering::Relaxed) {
            for shard in 0..self.states.shard_count() {
                let core = Arc::clone(&self);
                scanner.schedule(move || {
                    core.scan_expired_job(shard);
                });
            }

            for shard in self.states.shards_with_pending() {
                let core = Arc::clone(&self);
                deleter.schedule(move || {
                    core.try_del_expired_job(shard);
                });
            }

            thread::sleep(self.pause_time);
        }
        info!("expiration engine exiting");
        scanner.stop();
        deleter.stop();
    }

    /// Read the next batch of elapsed TTL-index entries of one shard into
    /// its expired queue, and advance the resume cursor.
    ///
    /// Best-effort: every early exit is a success with no effect, and any
    /// storage error leaves the cursor where it was so the next cycle
    /// retries the same range.
    pub(crate) fn scan_expired_job(&self, shard: u32) {
        let state = self.states.shard(shard);
        let Some(_guard) = JobGuard::try_acquire(&state.scan_busy, &state.scan_in_flight) else {
            // A scanner for this shard is still running; skip this tick.
            return;
        };
        if state.disabled.load(Ordering::Relaxed) {
            return;
        }
        if self.cluster_enabled && self.ctx.migrate.exists_migrate_task() {
            return;
        }

        let sess = Session::local();
        let db = match self.ctx.segment.get_db(&sess, shard, LockMode::IntentShared) {
            Ok(db) => db,
            Err(err) => {
                warn!(shard, %err, "shard unavailable for expiration scan");
                return;
            }
        };
        let store = db.store();
        if store.mode() != StoreMode::ReadWrite || !store.is_open() {
            return;
        }

        let txn = match store.begin_read_tx(&sess) {
            Ok(txn) => txn,
            Err(err) => {
                warn!(shard, %err, "expiration scan failed to begin transaction");
                self.ctx.metrics.record_failure(SCANNER_POOL);
                return;
            }
        };
        let mut cursor = match txn.ttl_cursor(store.current_time()) {
            Ok(cursor) => cursor,
            Err(err) => {
                warn!(shard, %err, "expiration scan failed to open ttl cursor");
                self.ctx.metrics.record_failure(SCANNER_POOL);
                return;
            }
        };

        // Resume where the previous pass left off, skipping the entry that
        // is already enqueued.
        let prefix = { state.queue.lock().unwrap().resume_cursor.clone() };
        if !prefix.is_empty() {
            cursor.seek(&prefix);
            match cursor.peek_key() {
                None => return,
                Some(key) if key == prefix.as_ref() => {
                    cursor.next();
                }
                Some(_) => {}
            }
        }

        while let Some(entry) = cursor.next() {
            let mut queue = state.queue.lock().unwrap();
            queue.resume_cursor = entry.encoded().clone();
            queue.expired.push_back(entry);
            self.states.note_enqueue();
            if queue.expired.len() >= self.scan_batch {
                break;
            }
        }
    }

    /// Drain one shard's expired queue in a bounded batch, invoking the
    /// idempotent deletion entry point for each entry. Returns the number
    /// of entries processed.
    ///
    /// Entries are peeked before the deletion call and popped only after
    /// it; the single-flight flag guarantees nothing else pops this queue.
    pub(crate) fn try_del_expired_job(&self, shard: u32) -> usize {
        let state = self.states.shard(shard);
        let Some(_guard) = JobGuard::try_acquire(&state.del_busy, &state.del_in_flight) else {
            return 0;
        };
        if state.disabled.load(Ordering::Relaxed) {
            return 0;
        }

        let mut deletes = 0;
        loop {
            if state.disabled.load(Ordering::Relaxed) {
                break;
            }
            let index = {
                let queue = state.queue.lock().unwrap();
                match queue.expired.front() {
                    Some(entry) => entry.clone(),
                    None => break,
                }
            };

            let sess = Session::local();
            sess.set_authed();
            sess.set_db_id(index.db_id());
            if let Err(err) =
                self.ctx
                    .dispatcher
                    .expire_key_if_needed(&sess, index.primary_key(), index.vtype())
            {
                warn!(shard, %err, "expired key deletion failed");
                self.ctx.metrics.record_failure(DELETER_POOL);
            }

            {
                let mut queue = state.queue.lock().unwrap();
                match queue.expired.pop_front() {
                    Some(_) => {
                        self.states.note_dequeue();
                        deletes += 1;
                    }
                    None => {
                        // Only stop_store may empty the queue under us.
                        assert!(
                            state.disabled.load(Ordering::Relaxed),
                            "expired queue drained outside the deleter"
                        );
                        break;
                    }
                }
            }

            if deletes == self.del_batch {
                break;
            }
        }
        deletes
    }

    #[cfg(test)]
    pub(crate) fn states(&self) -> &ShardStateTable {
        &self.states
    }
}
