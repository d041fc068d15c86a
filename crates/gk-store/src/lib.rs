//! Local record store: durable vault and profile records.
//!
//! Two backends are available:
//!   - **JSON** (default): one document, rewritten atomically via temp+rename on every write.
//!   - **RocksDB** (behind `rocksdb` feature): one key per record.
//!
//! Both implement [`RecordStore`]. A vault record (data, commit markers, and
//! flags) is always written as a single unit, so a crash never leaves half of
//! an edit on disk. The store does no encryption of its own.

pub mod backend;
pub mod json;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use gk_core::{GkError, GkResult, Profile, Vault};

pub use backend::StoreBackend;
pub use json::JsonStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

/// Storage for vault records (keyed by vault id) and profile records (keyed by user id).
pub trait RecordStore: Send {
    fn get_vault(&self, vault_id: &str) -> GkResult<Option<Vault>>;
    /// Insert or replace a vault record atomically.
    fn put_vault(&mut self, vault: &Vault) -> GkResult<()>;
    /// Vaults owned by `user_id`, ordered by vault id.
    fn list_vaults(&self, user_id: &str) -> GkResult<Vec<Vault>>;
    /// Returns whether a record was removed.
    fn delete_vault(&mut self, vault_id: &str) -> GkResult<bool>;

    fn get_profile(&self, user_id: &str) -> GkResult<Option<Profile>>;
    fn put_profile(&mut self, profile: &Profile) -> GkResult<()>;
    fn list_profiles(&self) -> GkResult<Vec<Profile>>;
    fn delete_profile(&mut self, user_id: &str) -> GkResult<bool>;

    fn active_profile(&self) -> GkResult<Option<Profile>> {
        Ok(self.list_profiles()?.into_iter().find(|p| p.active))
    }

    /// Mark `user_id` as the only active profile.
    fn set_active_profile(&mut self, user_id: &str) -> GkResult<()> {
        if self.get_profile(user_id)?.is_none() {
            return Err(GkError::NotFound(format!("profile {user_id}")));
        }
        for mut profile in self.list_profiles()? {
            let active = profile.user_id == user_id;
            if profile.active != active {
                profile.active = active;
                self.put_profile(&profile)?;
            }
        }
        Ok(())
    }

    /// Load a vault, apply `f`, and write it back. Nothing is written if `f` fails.
    fn update_vault<T>(
        &mut self,
        vault_id: &str,
        f: impl FnOnce(&mut Vault) -> GkResult<T>,
    ) -> GkResult<T>
    where
        Self: Sized,
    {
        let mut vault = self
            .get_vault(vault_id)?
            .ok_or_else(|| GkError::NotFound(format!("vault {vault_id}")))?;
        let out = f(&mut vault)?;
        self.put_vault(&vault)?;
        Ok(out)
    }
}
