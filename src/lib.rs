//! STRATAKV - Sharded Persistent Key-Value Server Core
//!
//! The server core of a Redis-compatible persistent key-value service:
//! sharded stores with ordered TTL secondary indexes, and a background
//! expiration engine that deletes elapsed keys concurrently with live
//! traffic.

pub mod cluster;
pub mod commands;
pub mod expire;
pub mod metrics;
pub mod server;
pub mod storage;

pub use cluster::{LockMode, MigrateMgr, SegmentMgr};
pub use commands::Dispatcher;
pub use expire::ExpirationEngine;
pub use metrics::Metrics;
pub use server::{Config, ServerContext, ServerEntry, Session, WorkerPool};
pub use storage::{Catalog, KvStore, StoreMode, TtlIndexEntry, ValueType};
