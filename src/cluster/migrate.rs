//! Migration Manager
//!
//! Tracks live shard-migration tasks. The expiration engine defers scans
//! while any task is live, so expiration never races data movement.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// One live migration task.
#[derive(Debug, Clone)]
pub struct MigrateTask {
    pub shard: u32,
    pub started_at: Instant,
}

/// Registry of live migration tasks.
pub struct MigrateMgr {
    tasks: DashMap<u64, MigrateTask>,
    next_task_id: AtomicU64,
}

impl MigrateMgr {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Register a migration task for a shard. Returns the task id.
    pub fn register_task(&self, shard: u32) -> u64 {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(
            id,
            MigrateTask {
                shard,
                started_at: Instant::now(),
            },
        );
        id
    }

    /// Mark a task finished. Returns whether it was live.
    pub fn finish_task(&self, id: u64) -> bool {
        self.tasks.remove(&id).is_some()
    }

    /// Whether any migration task is live.
    pub fn exists_migrate_task(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for MigrateMgr {
    fn default() -> Self {
        Self::new()
    }
}
