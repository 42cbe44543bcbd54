//! Sessions
//!
//! Lightweight per-request context. Background jobs create ephemeral local
//! sessions; the dispatcher requires them to be authenticated and scoped to
//! a logical database.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A server-side session.
#[derive(Debug)]
pub struct Session {
    id: u64,
    db_id: AtomicU32,
    authed: AtomicBool,
}

impl Session {
    /// Create an ephemeral local session, as used by background jobs.
    pub fn local() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            db_id: AtomicU32::new(0),
            authed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_authed(&self) {
        self.authed.store(true, Ordering::Release);
    }

    pub fn is_authed(&self) -> bool {
        self.authed.load(Ordering::Acquire)
    }

    pub fn set_db_id(&self, db_id: u32) {
        self.db_id.store(db_id, Ordering::Release);
    }

    pub fn db_id(&self) -> u32 {
        self.db_id.load(Ordering::Acquire)
    }
}
