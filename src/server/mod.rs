//! Server Module
//!
//! Top-level server lifecycle: assembles the catalog, shard stores, segment
//! and migration managers, command dispatcher, and the expiration engine,
//! and tears them down in order.

mod config;
mod session;
mod worker_pool;

pub use config::Config;
pub use session::Session;
pub use worker_pool::{WorkerPool, WorkerPoolError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

use crate::cluster::{LockMode, MigrateMgr, SegmentMgr};
use crate::commands::Dispatcher;
use crate::expire::{EngineError, ExpirationEngine};
use crate::metrics::Metrics;
use crate::storage::{Catalog, CatalogError, KvStore, StorageError, StoreMainMeta, StoreMode};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Segment(#[from] crate::cluster::SegmentError),
    #[error("store {0} is not empty; pass force to destroy it anyway")]
    StoreNotEmpty(u32),
    #[error("store {0} must be paused before destroy")]
    StoreNotPaused(u32),
}

/// The capabilities background subsystems borrow from the server.
///
/// The engine holds this small context rather than the whole server, which
/// keeps ownership acyclic: the server owns the engine, the engine shares
/// the context.
pub struct ServerContext {
    pub segment: Arc<SegmentMgr>,
    pub migrate: Arc<MigrateMgr>,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<Metrics>,
}

/// Top-level server.
pub struct ServerEntry {
    config: Config,
    catalog: Catalog,
    stores: Vec<Arc<KvStore>>,
    ctx: Arc<ServerContext>,
    expire: ExpirationEngine,
    is_running: AtomicBool,
    is_stopped: AtomicBool,
    shutdown_requested: AtomicBool,
    event_lock: Mutex<()>,
    event_cv: Condvar,
    startup_time: Instant,
}

impl ServerEntry {
    /// Assemble every subsystem and start the expiration engine.
    pub fn startup(config: Config) -> Result<Self, ServerError> {
        info!(shards = config.shard_count, "server starting");

        let catalog = Catalog::new();
        let mut stores = Vec::with_capacity(config.shard_count as usize);
        for store_id in 0..config.shard_count {
            let mode = match catalog.store_main_meta(store_id) {
                Ok(meta) => meta.mode,
                Err(CatalogError::UnknownStore(_)) => {
                    let meta = StoreMainMeta::new(store_id, StoreMode::ReadWrite);
                    catalog.set_store_main_meta(meta);
                    meta.mode
                }
            };
            stores.push(Arc::new(KvStore::new(store_id, mode)));
        }
        debug_assert_eq!(stores.len() as u32, catalog.kvstore_count());

        let segment = Arc::new(SegmentMgr::new(stores.clone()));
        let migrate = Arc::new(MigrateMgr::new());
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Dispatcher::new(segment.clone());
        let ctx = Arc::new(ServerContext {
            segment,
            migrate,
            dispatcher,
            metrics,
        });

        let expire = ExpirationEngine::new(ctx.clone(), &config);
        expire.startup()?;

        let server = Self {
            config,
            catalog,
            stores,
            ctx,
            expire,
            is_running: AtomicBool::new(true),
            is_stopped: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            event_lock: Mutex::new(()),
            event_cv: Condvar::new(),
            startup_time: Instant::now(),
        };
        info!("server started");
        Ok(server)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Stop everything: the expiration engine first, then every store.
    /// Idempotent; returns once all engine threads are joined.
    pub fn stop(&self) {
        if !self.is_running.swap(false, Ordering::AcqRel) {
            info!("server is already stopping");
            return;
        }
        info!("server begins to stop");
        self.expire.stop();
        for store in &self.stores {
            store.stop();
        }
        self.is_stopped.store(true, Ordering::Release);
        self.event_cv.notify_all();
        info!("server stopped");
    }

    /// Record a shutdown request from the command layer; the thread parked
    /// in [`ServerEntry::wait_stop_complete`] picks it up and stops the
    /// server.
    pub fn handle_shutdown_cmd(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        self.event_cv.notify_all();
    }

    /// Block until the server has fully stopped, performing the stop when a
    /// shutdown request arrives.
    pub fn wait_stop_complete(&self) {
        loop {
            {
                let guard = self.event_lock.lock().unwrap();
                if !self.is_running() && self.is_stopped.load(Ordering::Acquire) {
                    return;
                }
                if !self.shutdown_requested.load(Ordering::Acquire) {
                    let _unused = self
                        .event_cv
                        .wait_timeout(guard, Duration::from_secs(1))
                        .unwrap();
                    continue;
                }
            }
            // A shutdown command arrived; stop without holding the lock.
            info!("shutdown command received");
            self.stop();
            return;
        }
    }

    /// Tear down one store: requires it paused, and empty unless forced.
    /// The catalog is demoted first so a half-completed destroy is not
    /// revived as READ_WRITE, then the store is destroyed and the
    /// expiration engine told to forget the shard.
    pub fn destroy_store(&self, sess: &Session, shard: u32, force: bool) -> Result<(), ServerError> {
        let db = self.ctx.segment.get_db(sess, shard, LockMode::Exclusive)?;
        let store = db.store();
        if !force && !store.is_empty() {
            return Err(ServerError::StoreNotEmpty(shard));
        }
        if !store.is_paused() {
            return Err(ServerError::StoreNotPaused(shard));
        }

        let mut meta = self.catalog.store_main_meta(shard)?;
        meta.mode = StoreMode::None;
        self.catalog.set_store_main_meta(meta);

        if let Err(err) = store.destroy() {
            error!(shard, %err, "store destroy failed");
            return Err(err.into());
        }
        debug_assert_eq!(store.mode(), StoreMode::None);

        self.expire.stop_store(shard)?;
        Ok(())
    }

    /// Change a store's replication mode, keeping the catalog in sync.
    pub fn set_store_mode(&self, store: &KvStore, mode: StoreMode) -> Result<(), ServerError> {
        if store.mode() == mode {
            return Ok(());
        }
        store.set_mode(mode);
        let mut meta = self.catalog.store_main_meta(store.id())?;
        meta.mode = mode;
        self.catalog.set_store_main_meta(meta);
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn expire(&self) -> &ExpirationEngine {
        &self.expire
    }

    pub fn store(&self, shard: u32) -> Option<&Arc<KvStore>> {
        self.stores.get(shard as usize)
    }

    pub fn store_count(&self) -> u32 {
        self.stores.len() as u32
    }

    pub fn uptime(&self) -> Duration {
        self.startup_time.elapsed()
    }
}
