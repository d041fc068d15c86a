use gk_core::{GkResult, Profile, Vault};
use std::path::Path;

use crate::json::JsonStore;
#[cfg(feature = "rocksdb")]
use crate::rocks::RocksDbStore;
use crate::RecordStore;

/// Dispatch enum that wraps either a JSON or RocksDB record store.
///
/// The CLI picks the backend at runtime from the configured store path.
pub enum StoreBackend {
    Json(JsonStore),
    #[cfg(feature = "rocksdb")]
    Rocks(RocksDbStore),
}

impl StoreBackend {
    /// Open the appropriate backend based on path extension.
    ///
    /// Paths ending in `.json` use the JSON backend; otherwise RocksDB (if compiled with `rocksdb`).
    pub fn open(path: &Path) -> GkResult<Self> {
        let is_json = path.extension().map(|ext| ext == "json").unwrap_or(false);

        #[cfg(feature = "rocksdb")]
        if !is_json {
            return Ok(StoreBackend::Rocks(RocksDbStore::open(path)?));
        }

        #[cfg(not(feature = "rocksdb"))]
        if !is_json {
            tracing::warn!(
                path = %path.display(),
                "RocksDB not compiled in (missing 'rocksdb' feature), falling back to JSON backend"
            );
        }

        Ok(StoreBackend::Json(JsonStore::open(path)?))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreBackend::Json(_) => "json",
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(_) => "rocksdb",
        }
    }
}

impl RecordStore for StoreBackend {
    fn get_vault(&self, vault_id: &str) -> GkResult<Option<Vault>> {
        match self {
            StoreBackend::Json(s) => s.get_vault(vault_id),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.get_vault(vault_id),
        }
    }

    fn put_vault(&mut self, vault: &Vault) -> GkResult<()> {
        match self {
            StoreBackend::Json(s) => s.put_vault(vault),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.put_vault(vault),
        }
    }

    fn list_vaults(&self, user_id: &str) -> GkResult<Vec<Vault>> {
        match self {
            StoreBackend::Json(s) => s.list_vaults(user_id),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.list_vaults(user_id),
        }
    }

    fn delete_vault(&mut self, vault_id: &str) -> GkResult<bool> {
        match self {
            StoreBackend::Json(s) => s.delete_vault(vault_id),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.delete_vault(vault_id),
        }
    }

    fn get_profile(&self, user_id: &str) -> GkResult<Option<Profile>> {
        match self {
            StoreBackend::Json(s) => s.get_profile(user_id),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.get_profile(user_id),
        }
    }

    fn put_profile(&mut self, profile: &Profile) -> GkResult<()> {
        match self {
            StoreBackend::Json(s) => s.put_profile(profile),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.put_profile(profile),
        }
    }

    fn list_profiles(&self) -> GkResult<Vec<Profile>> {
        match self {
            StoreBackend::Json(s) => s.list_profiles(),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.list_profiles(),
        }
    }

    fn delete_profile(&mut self, user_id: &str) -> GkResult<bool> {
        match self {
            StoreBackend::Json(s) => s.delete_profile(user_id),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.delete_profile(user_id),
        }
    }

    fn set_active_profile(&mut self, user_id: &str) -> GkResult<()> {
        match self {
            StoreBackend::Json(s) => s.set_active_profile(user_id),
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s.set_active_profile(user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_extension_selects_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreBackend::open(&dir.path().join("store.json")).unwrap();
        assert_eq!(store.kind(), "json");
    }

    #[cfg(not(feature = "rocksdb"))]
    #[test]
    fn non_json_falls_back_without_rocksdb() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreBackend::open(&dir.path().join("store.db")).unwrap();
        assert_eq!(store.kind(), "json");
    }
}
