//! Command Dispatcher
//!
//! The slice of the command layer the expiration engine consumes:
//! `expire_key_if_needed`, the idempotent deletion entry point.

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

use crate::cluster::{LockMode, SegmentError, SegmentMgr};
use crate::server::Session;
use crate::storage::{StorageError, StoreMode, ValueType};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("authentication required")]
    AuthRequired,
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Dispatches commands against the sharded keyspace.
pub struct Dispatcher {
    segment: Arc<SegmentMgr>,
}

impl Dispatcher {
    pub fn new(segment: Arc<SegmentMgr>) -> Self {
        Self { segment }
    }

    /// Delete `key` iff its TTL has elapsed and the key has not been
    /// replaced. Returns whether a deletion happened.
    ///
    /// Idempotent: repeated and concurrent invocations for the same key are
    /// safe; a key that is live again (TTL extended, overwritten, already
    /// gone) is a no-op success. Stores that are not read-write or not open
    /// are never touched.
    pub fn expire_key_if_needed(
        &self,
        sess: &Session,
        key: &Bytes,
        vtype: ValueType,
    ) -> Result<bool, CommandError> {
        if !sess.is_authed() {
            return Err(CommandError::AuthRequired);
        }
        let shard = self.segment.shard_for_key(key);
        let db = self.segment.get_db(sess, shard, LockMode::IntentShared)?;
        let store = db.store();
        if store.mode() != StoreMode::ReadWrite || !store.is_open() {
            return Ok(false);
        }
        let now = store.current_time();
        let deleted = store.expire_key_if_needed(sess.db_id(), key, vtype, now)?;
        if deleted {
            trace!(session = sess.id(), shard, "expired key deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KvStore;

    fn setup(count: u32) -> (Arc<SegmentMgr>, Dispatcher) {
        let stores = (0..count)
            .map(|i| Arc::new(KvStore::new(i, StoreMode::ReadWrite)))
            .collect();
        let segment = Arc::new(SegmentMgr::new(stores));
        let dispatcher = Dispatcher::new(segment.clone());
        (segment, dispatcher)
    }

    fn authed_session(db_id: u32) -> Session {
        let sess = Session::local();
        sess.set_authed();
        sess.set_db_id(db_id);
        sess
    }

    #[test]
    fn requires_authentication() {
        let (_, dispatcher) = setup(1);
        let sess = Session::local();
        let err = dispatcher
            .expire_key_if_needed(&sess, &Bytes::from_static(b"k"), ValueType::String)
            .unwrap_err();
        assert!(matches!(err, CommandError::AuthRequired));
    }

    #[test]
    fn deletes_elapsed_key_once() {
        let (segment, dispatcher) = setup(2);
        let sess = authed_session(0);
        let key = Bytes::from_static(b"session:9");
        let shard = segment.shard_for_key(&key);
        let store = segment
            .get_db(&sess, shard, LockMode::IntentShared)
            .unwrap()
            .store()
            .clone();
        let past = store.current_time() - 5;
        store
            .set(0, key.clone(), Bytes::from_static(b"v"), ValueType::String, Some(past))
            .unwrap();

        assert!(dispatcher
            .expire_key_if_needed(&sess, &key, ValueType::String)
            .unwrap());
        // Duplicate invocation: no-op success.
        assert!(!dispatcher
            .expire_key_if_needed(&sess, &key, ValueType::String)
            .unwrap());
    }

    #[test]
    fn never_touches_replicate_only_stores() {
        let (segment, dispatcher) = setup(1);
        let sess = authed_session(0);
        let key = Bytes::from_static(b"replica-key");
        let store = segment
            .get_db(&sess, 0, LockMode::IntentShared)
            .unwrap()
            .store()
            .clone();
        let past = store.current_time() - 5;
        store
            .set(0, key.clone(), Bytes::from_static(b"v"), ValueType::String, Some(past))
            .unwrap();
        store.set_mode(StoreMode::ReplicateOnly);

        assert!(!dispatcher
            .expire_key_if_needed(&sess, &key, ValueType::String)
            .unwrap());
        assert_eq!(store.key_count(), 1);
    }
}
