//! Storage Engine
//!
//! Per-shard ordered key-value stores with TTL secondary indexes, plus the
//! catalog of per-store metadata.

mod catalog;
mod kvstore;
mod ttl_index;

pub use catalog::{Catalog, CatalogError, StoreMainMeta};
pub use kvstore::{KvStore, ReadTx, StoreMode, TtlCursor};
pub use ttl_index::{TtlIndexEntry, ValueType};

use thiserror::Error;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store {0} is closed")]
    Closed(u32),
    #[error("store {0} must be paused before destroy")]
    NotPaused(u32),
    #[error("corrupt ttl index entry ({0} bytes)")]
    CorruptIndexEntry(usize),
}
