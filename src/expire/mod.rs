//! Expiration Module
//!
//! Background deletion of keys whose TTL has elapsed, driven by the ordered
//! TTL secondary index of each shard store.

mod engine;
mod state;

pub use engine::{EngineError, ExpirationEngine};
