//! Store Catalog
//!
//! Registry of per-store metadata. The server lifecycle consults it at
//! startup to restore store modes and updates it on mode changes and
//! destroys.

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use super::kvstore::StoreMode;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no metadata for store {0}")]
    UnknownStore(u32),
}

/// Main metadata record of one store.
#[derive(Debug, Clone, Copy)]
pub struct StoreMainMeta {
    pub store_id: u32,
    pub mode: StoreMode,
}

impl StoreMainMeta {
    pub fn new(store_id: u32, mode: StoreMode) -> Self {
        Self { store_id, mode }
    }
}

/// Catalog of store metadata.
pub struct Catalog {
    metas: RwLock<HashMap<u32, StoreMainMeta>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            metas: RwLock::new(HashMap::new()),
        }
    }

    pub fn store_main_meta(&self, store_id: u32) -> Result<StoreMainMeta, CatalogError> {
        self.metas
            .read()
            .unwrap()
            .get(&store_id)
            .copied()
            .ok_or(CatalogError::UnknownStore(store_id))
    }

    pub fn set_store_main_meta(&self, meta: StoreMainMeta) {
        self.metas.write().unwrap().insert(meta.store_id, meta);
    }

    pub fn kvstore_count(&self) -> u32 {
        self.metas.read().unwrap().len() as u32
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_store_meta() {
        let catalog = Catalog::new();
        assert!(catalog.store_main_meta(0).is_err());

        catalog.set_store_main_meta(StoreMainMeta::new(0, StoreMode::ReadWrite));
        assert_eq!(catalog.store_main_meta(0).unwrap().mode, StoreMode::ReadWrite);

        catalog.set_store_main_meta(StoreMainMeta::new(0, StoreMode::None));
        assert_eq!(catalog.store_main_meta(0).unwrap().mode, StoreMode::None);
        assert_eq!(catalog.kvstore_count(), 1);
    }
}
