//! JSON-file record store. The whole document is held in memory and rewritten
//! atomically (write temp file, then rename) on every mutation.

use gk_core::types::{UserId, VaultId};
use gk_core::{GkError, GkResult, Profile, Vault};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::RecordStore;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    vaults: BTreeMap<VaultId, Vault>,
    #[serde(default)]
    profiles: BTreeMap<UserId, Profile>,
}

pub struct JsonStore {
    /// Path to the JSON document on disk
    path: PathBuf,
    doc: StoreDocument,
}

impl JsonStore {
    /// Load or create a store at the given path.
    /// If the file doesn't exist, starts empty. A file that exists but does
    /// not parse is an error, never silently replaced.
    pub fn open(path: &Path) -> GkResult<Self> {
        let doc = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                GkError::Store(format!("reading store {}: {e}", path.display()))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                GkError::Store(format!("parsing store {}: {e}", path.display()))
            })?
        } else {
            StoreDocument::default()
        };

        tracing::debug!(
            path = %path.display(),
            vaults = doc.vaults.len(),
            profiles = doc.profiles.len(),
            "opened JSON store"
        );
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` to the document and persist it; roll the in-memory copy
    /// back if the write fails.
    fn commit<T>(&mut self, f: impl FnOnce(&mut StoreDocument) -> T) -> GkResult<T> {
        let before = self.doc.clone();
        let out = f(&mut self.doc);
        if let Err(e) = self.persist() {
            self.doc = before;
            return Err(e);
        }
        Ok(out)
    }

    fn persist(&self) -> GkResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GkError::Store(format!("creating store dir {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.doc)?;

        // Atomic write: write to temp file, then rename
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            GkError::Store(format!("writing store temp {}: {e}", tmp_path.display()))
        })?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            GkError::Store(format!("renaming store {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

/// The document holds mnemonics; keep it owner-only.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> GkResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> GkResult<()> {
    Ok(())
}

impl RecordStore for JsonStore {
    fn get_vault(&self, vault_id: &str) -> GkResult<Option<Vault>> {
        Ok(self.doc.vaults.get(vault_id).cloned())
    }

    fn put_vault(&mut self, vault: &Vault) -> GkResult<()> {
        let vault = vault.clone();
        self.commit(|doc| {
            doc.vaults.insert(vault.vault_id.clone(), vault);
        })
    }

    fn list_vaults(&self, user_id: &str) -> GkResult<Vec<Vault>> {
        Ok(self
            .doc
            .vaults
            .values()
            .filter(|v| v.owner == user_id)
            .cloned()
            .collect())
    }

    fn delete_vault(&mut self, vault_id: &str) -> GkResult<bool> {
        if !self.doc.vaults.contains_key(vault_id) {
            return Ok(false);
        }
        self.commit(|doc| doc.vaults.remove(vault_id).is_some())
    }

    fn get_profile(&self, user_id: &str) -> GkResult<Option<Profile>> {
        Ok(self.doc.profiles.get(user_id).cloned())
    }

    fn put_profile(&mut self, profile: &Profile) -> GkResult<()> {
        let profile = profile.clone();
        self.commit(|doc| {
            doc.profiles.insert(profile.user_id.clone(), profile);
        })
    }

    fn list_profiles(&self) -> GkResult<Vec<Profile>> {
        Ok(self.doc.profiles.values().cloned().collect())
    }

    fn delete_profile(&mut self, user_id: &str) -> GkResult<bool> {
        if !self.doc.profiles.contains_key(user_id) {
            return Ok(false);
        }
        self.commit(|doc| doc.profiles.remove(user_id).is_some())
    }

    /// Single write, so the active flag never ends up on two profiles.
    fn set_active_profile(&mut self, user_id: &str) -> GkResult<()> {
        if !self.doc.profiles.contains_key(user_id) {
            return Err(GkError::NotFound(format!("profile {user_id}")));
        }
        self.commit(|doc| {
            for profile in doc.profiles.values_mut() {
                profile.active = profile.user_id == user_id;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gk_core::CellKey;

    fn vault(id: &str, owner: &str) -> Vault {
        Vault::new(id.into(), owner.into(), format!("name of {id}"), id.into())
    }

    fn profile(user_id: &str, active: bool) -> Profile {
        Profile {
            user_id: user_id.into(),
            principal: user_id.trim_start_matches("UserID_").into(),
            seed_phrase: "abandon ability able".into(),
            active,
            created_at: 1000,
        }
    }

    #[test]
    fn open_nonexistent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(&dir.path().join("store.json")).unwrap();
        assert!(store.list_profiles().unwrap().is_empty());
        assert!(store.get_vault("Vault_x").unwrap().is_none());
    }

    #[test]
    fn put_get_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/store.json");

        let mut store = JsonStore::open(&path).unwrap();
        let mut v = vault("Vault_a", "UserID_u");
        v.data.set_cell(CellKey::new(2, 1), "x");
        v.data.commit_cell(CellKey::new(2, 1));
        v.synced = true;
        store.put_vault(&v).unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        assert_eq!(reopened.get_vault("Vault_a").unwrap(), Some(v));
        assert!(!dir.path().join("nested/store.tmp").exists());
    }

    #[test]
    fn list_filters_by_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(&dir.path().join("store.json")).unwrap();
        store.put_vault(&vault("Vault_a", "UserID_u")).unwrap();
        store.put_vault(&vault("Vault_b", "UserID_u")).unwrap();
        store.put_vault(&vault("Vault_c", "UserID_other")).unwrap();

        let ids: Vec<String> = store
            .list_vaults("UserID_u")
            .unwrap()
            .into_iter()
            .map(|v| v.vault_id)
            .collect();
        assert_eq!(ids, vec!["Vault_a", "Vault_b"]);
    }

    #[test]
    fn delete_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(&dir.path().join("store.json")).unwrap();
        store.put_vault(&vault("Vault_a", "UserID_u")).unwrap();
        assert!(store.delete_vault("Vault_a").unwrap());
        assert!(!store.delete_vault("Vault_a").unwrap());
    }

    #[test]
    fn active_profile_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(&dir.path().join("store.json")).unwrap();
        store.put_profile(&profile("UserID_a", true)).unwrap();
        store.put_profile(&profile("UserID_b", false)).unwrap();

        store.set_active_profile("UserID_b").unwrap();
        let active: Vec<_> = store
            .list_profiles()
            .unwrap()
            .into_iter()
            .filter(|p| p.active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, "UserID_b");
        assert!(store.set_active_profile("UserID_missing").is_err());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(JsonStore::open(&path), Err(GkError::Store(_))));
    }

    #[test]
    fn update_vault_writes_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = JsonStore::open(&path).unwrap();
        store.put_vault(&vault("Vault_a", "UserID_u")).unwrap();

        let failed = store.update_vault("Vault_a", |v| {
            v.vault_name = "changed".into();
            Err::<(), _>(GkError::InvalidEdit("nope".into()))
        });
        assert!(failed.is_err());
        assert_eq!(
            JsonStore::open(&path).unwrap().get_vault("Vault_a").unwrap().unwrap().vault_name,
            "name of Vault_a"
        );

        store
            .update_vault("Vault_a", |v| v.rename("renamed"))
            .unwrap();
        let reloaded = JsonStore::open(&path).unwrap().get_vault("Vault_a").unwrap().unwrap();
        assert_eq!(reloaded.vault_name, "renamed");
        assert!(!reloaded.synced);
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = JsonStore::open(&path).unwrap();
        store.put_profile(&profile("UserID_a", true)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
