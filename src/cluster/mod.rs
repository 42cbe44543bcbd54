//! Cluster Module
//!
//! Key-to-shard routing and shard-migration tracking.

mod migrate;
mod segment;

pub use migrate::{MigrateMgr, MigrateTask};
pub use segment::{DbGuard, LockMode, SegmentError, SegmentMgr, TOTAL_SLOTS};
