//! RocksDB record store: one key per record, JSON values.
//!
//! Keys are `vault/<vault_id>` and `profile/<user_id>`. Every write goes
//! straight to the database; there is no in-memory mirror to drift.

use gk_core::{GkError, GkResult, Profile, Vault};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::RecordStore;

const VAULT_PREFIX: &str = "vault/";
const PROFILE_PREFIX: &str = "profile/";

pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    /// Open or create a RocksDB store at the given path.
    pub fn open(db_path: &Path) -> GkResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, db_path)
            .map_err(|e| GkError::Store(format!("opening RocksDB {}: {e}", db_path.display())))?;
        tracing::debug!(path = %db_path.display(), "opened RocksDB store");
        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> GkResult<Option<T>> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(GkError::Store(format!("RocksDB get {key}: {e}"))),
        }
    }

    fn put_json<T: serde::Serialize>(&self, key: &str, value: &T) -> GkResult<()> {
        let json = serde_json::to_vec(value)?;
        self.db
            .put(key.as_bytes(), json)
            .map_err(|e| GkError::Store(format!("RocksDB put {key}: {e}")))
    }

    fn delete_key(&self, key: &str) -> GkResult<bool> {
        let existed = self
            .db
            .get(key.as_bytes())
            .map_err(|e| GkError::Store(format!("RocksDB get {key}: {e}")))?
            .is_some();
        if existed {
            self.db
                .delete(key.as_bytes())
                .map_err(|e| GkError::Store(format!("RocksDB delete {key}: {e}")))?;
        }
        Ok(existed)
    }

    /// All values under `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> GkResult<Vec<T>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) =
                item.map_err(|e| GkError::Store(format!("iterating RocksDB entries: {e}")))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}

impl RecordStore for RocksDbStore {
    fn get_vault(&self, vault_id: &str) -> GkResult<Option<Vault>> {
        self.get_json(&format!("{VAULT_PREFIX}{vault_id}"))
    }

    fn put_vault(&mut self, vault: &Vault) -> GkResult<()> {
        self.put_json(&format!("{VAULT_PREFIX}{}", vault.vault_id), vault)
    }

    fn list_vaults(&self, user_id: &str) -> GkResult<Vec<Vault>> {
        Ok(self
            .scan::<Vault>(VAULT_PREFIX)?
            .into_iter()
            .filter(|v| v.owner == user_id)
            .collect())
    }

    fn delete_vault(&mut self, vault_id: &str) -> GkResult<bool> {
        self.delete_key(&format!("{VAULT_PREFIX}{vault_id}"))
    }

    fn get_profile(&self, user_id: &str) -> GkResult<Option<Profile>> {
        self.get_json(&format!("{PROFILE_PREFIX}{user_id}"))
    }

    fn put_profile(&mut self, profile: &Profile) -> GkResult<()> {
        self.put_json(&format!("{PROFILE_PREFIX}{}", profile.user_id), profile)
    }

    fn list_profiles(&self) -> GkResult<Vec<Profile>> {
        self.scan(PROFILE_PREFIX)
    }

    fn delete_profile(&mut self, user_id: &str) -> GkResult<bool> {
        self.delete_key(&format!("{PROFILE_PREFIX}{user_id}"))
    }

    fn set_active_profile(&mut self, user_id: &str) -> GkResult<()> {
        if self.get_profile(user_id)?.is_none() {
            return Err(GkError::NotFound(format!("profile {user_id}")));
        }
        let mut batch = WriteBatch::default();
        for mut profile in self.list_profiles()? {
            let active = profile.user_id == user_id;
            if profile.active != active {
                profile.active = active;
                let key = format!("{PROFILE_PREFIX}{}", profile.user_id);
                batch.put(key.as_bytes(), serde_json::to_vec(&profile)?);
            }
        }
        self.db
            .write(batch)
            .map_err(|e| GkError::Store(format!("RocksDB batch write: {e}")))
    }
}
