//! Custody service RPC surface and local adapters.
//!
//! [`RemoteVaultService`] is the shape of the calls the engine makes. The
//! service only ever sees sealed fields plus addressing keys.
//!
//! Two adapters apply the service-side semantics in process:
//!   - [`MemoryRemote`]: state in memory, with failure injection for tests
//!   - [`FileRemote`]: state in a JSON file, rewritten atomically per call
//!
//! Key contributions are derived per user from a service secret with
//! HKDF-SHA256 and remembered, so `get_vetkey_for_user` answers after the
//! first derivation. The real service wraps the contribution for the
//! caller's transport key; these adapters return it as is.

use async_trait::async_trait;
use gk_core::types::{UserId, VaultId};
use gk_crypto::RemoteKeyContribution;
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::wire::RemoteVaultData;

/// Size of a derived key contribution in bytes
pub const CONTRIBUTION_SIZE: usize = 48;

const VETKD_SALT: &[u8] = b"ghostkeys-vetkd-v1";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote service unavailable: {0}")]
    Unavailable(String),

    #[error("remote service rejected the request: {0}")]
    Rejected(String),

    #[error("remote storage error: {0}")]
    Storage(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// Arguments to a vetKD derivation request.
#[derive(Debug, Clone)]
pub struct VetKdArgs {
    /// Per-user scope the key is bound to
    pub scope: UserId,
    /// Input label for the derivation
    pub input: Vec<u8>,
    /// Caller-generated ephemeral public key the result is wrapped for
    pub transport_public_key: [u8; 32],
}

#[async_trait]
pub trait RemoteVaultService: Send + Sync {
    async fn get_all_vaults_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<(VaultId, RemoteVaultData)>, RemoteError>;

    async fn get_vault(
        &self,
        user_id: &str,
        vault_id: &str,
    ) -> Result<Option<RemoteVaultData>, RemoteError>;

    /// Apply a patch of upserts and tombstones to the stored vault.
    async fn add_or_update_vault(
        &self,
        user_id: &str,
        vault_id: &str,
        data: RemoteVaultData,
    ) -> Result<(), RemoteError>;

    async fn delete_vault(&self, user_id: &str, vault_id: &str) -> Result<(), RemoteError>;

    async fn clear_all_user_vaults(&self, user_id: &str) -> Result<(), RemoteError>;

    /// Derive the network half of a vault data key.
    async fn derive_vetkd_encrypted_key(
        &self,
        args: VetKdArgs,
    ) -> Result<RemoteKeyContribution, RemoteError>;

    /// Previously derived contribution for this user, if any.
    async fn get_vetkey_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<RemoteKeyContribution>, RemoteError>;
}

// ── Service-side state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RemoteState {
    secret: [u8; 32],
    #[serde(default)]
    vaults: BTreeMap<UserId, BTreeMap<VaultId, RemoteVaultData>>,
    #[serde(default)]
    contributions: BTreeMap<UserId, Vec<u8>>,
}

impl RemoteState {
    fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self {
            secret,
            vaults: BTreeMap::new(),
            contributions: BTreeMap::new(),
        }
    }

    fn all_vaults(&self, user_id: &str) -> Vec<(VaultId, RemoteVaultData)> {
        self.vaults
            .get(user_id)
            .map(|v| v.iter().map(|(id, d)| (id.clone(), d.clone())).collect())
            .unwrap_or_default()
    }

    fn vault(&self, user_id: &str, vault_id: &str) -> Option<RemoteVaultData> {
        self.vaults.get(user_id)?.get(vault_id).cloned()
    }

    fn upsert(&mut self, user_id: &str, vault_id: &str, patch: RemoteVaultData) {
        self.vaults
            .entry(user_id.to_string())
            .or_default()
            .entry(vault_id.to_string())
            .or_default()
            .merge(patch);
    }

    fn delete(&mut self, user_id: &str, vault_id: &str) {
        if let Some(vaults) = self.vaults.get_mut(user_id) {
            vaults.remove(vault_id);
        }
    }

    fn clear(&mut self, user_id: &str) {
        self.vaults.remove(user_id);
    }

    fn derive(&mut self, args: &VetKdArgs) -> Result<RemoteKeyContribution, RemoteError> {
        if args.scope.is_empty() {
            return Err(RemoteError::Rejected("empty vetKD scope".into()));
        }
        let mut info = Vec::with_capacity(args.scope.len() + 1 + args.input.len());
        info.extend_from_slice(args.scope.as_bytes());
        info.push(0);
        info.extend_from_slice(&args.input);

        let hkdf = Hkdf::<Sha256>::new(Some(VETKD_SALT), &self.secret);
        let mut okm = vec![0u8; CONTRIBUTION_SIZE];
        hkdf.expand(&info, &mut okm)
            .map_err(|e| RemoteError::Storage(format!("vetKD derivation failed: {e}")))?;

        self.contributions.insert(args.scope.clone(), okm.clone());
        Ok(RemoteKeyContribution::from_bytes(okm))
    }

    fn contribution(&self, user_id: &str) -> Option<RemoteKeyContribution> {
        self.contributions
            .get(user_id)
            .map(|bytes| RemoteKeyContribution::from_bytes(bytes.clone()))
    }
}

// ── In-memory adapter ────────────────────────────────────────────────────────

type PushHook = Arc<dyn Fn(&str, &RemoteVaultData) + Send + Sync>;

#[derive(Default)]
struct Faults {
    failing_pushes: u32,
    lost_acks: u32,
    failing_key_requests: bool,
    pushes: Vec<(VaultId, RemoteVaultData)>,
    push_hook: Option<PushHook>,
}

/// In-process custody service.
#[derive(Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
    faults: Arc<Mutex<Faults>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState::generate())),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Make the next `n` pushes fail with [`RemoteError::Unavailable`].
    pub fn fail_next_pushes(&self, n: u32) {
        self.with_faults(|f| f.failing_pushes = n);
    }

    /// Apply the next `n` pushes but answer them with
    /// [`RemoteError::Unavailable`], as if the acknowledgement was lost.
    pub fn lose_next_acks(&self, n: u32) {
        self.with_faults(|f| f.lost_acks = n);
    }

    /// Make every key request fail until reset.
    pub fn fail_key_requests(&self, fail: bool) {
        self.with_faults(|f| f.failing_key_requests = fail);
    }

    /// Run `hook` on every push, before it is applied.
    pub fn on_push(&self, hook: impl Fn(&str, &RemoteVaultData) + Send + Sync + 'static) {
        self.with_faults(|f| f.push_hook = Some(Arc::new(hook)));
    }

    /// Every patch received so far, failed ones included.
    pub fn pushes(&self) -> Vec<(VaultId, RemoteVaultData)> {
        self.with_faults(|f| f.pushes.clone())
    }

    /// Overwrite the stored revision, as another device's push would.
    pub fn bump_revision(&self, user_id: &str, vault_id: &str) {
        self.with_state(|s| {
            if let Some(v) = s.vaults.get_mut(user_id).and_then(|v| v.get_mut(vault_id)) {
                v.revision += 1;
            }
        });
    }

    /// Replace a stored vault wholesale.
    pub fn put_raw(&self, user_id: &str, vault_id: &str, data: RemoteVaultData) {
        self.with_state(|s| {
            s.vaults
                .entry(user_id.to_string())
                .or_default()
                .insert(vault_id.to_string(), data);
        });
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RemoteState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    fn with_faults<T>(&self, f: impl FnOnce(&mut Faults) -> T) -> T {
        let mut guard = self.faults.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl RemoteVaultService for MemoryRemote {
    async fn get_all_vaults_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<(VaultId, RemoteVaultData)>, RemoteError> {
        Ok(self.with_state(|s| s.all_vaults(user_id)))
    }

    async fn get_vault(
        &self,
        user_id: &str,
        vault_id: &str,
    ) -> Result<Option<RemoteVaultData>, RemoteError> {
        Ok(self.with_state(|s| s.vault(user_id, vault_id)))
    }

    async fn add_or_update_vault(
        &self,
        user_id: &str,
        vault_id: &str,
        data: RemoteVaultData,
    ) -> Result<(), RemoteError> {
        let (fail, lose_ack, hook) = self.with_faults(|f| {
            f.pushes.push((vault_id.to_string(), data.clone()));
            let fail = f.failing_pushes > 0;
            if fail {
                f.failing_pushes -= 1;
            }
            let lose_ack = !fail && f.lost_acks > 0;
            if lose_ack {
                f.lost_acks -= 1;
            }
            (fail, lose_ack, f.push_hook.clone())
        });
        if let Some(hook) = hook {
            hook(vault_id, &data);
        }
        if fail {
            return Err(RemoteError::Unavailable("injected push failure".into()));
        }
        self.with_state(|s| s.upsert(user_id, vault_id, data));
        if lose_ack {
            return Err(RemoteError::Unavailable("injected lost acknowledgement".into()));
        }
        Ok(())
    }

    async fn delete_vault(&self, user_id: &str, vault_id: &str) -> Result<(), RemoteError> {
        self.with_state(|s| s.delete(user_id, vault_id));
        Ok(())
    }

    async fn clear_all_user_vaults(&self, user_id: &str) -> Result<(), RemoteError> {
        self.with_state(|s| s.clear(user_id));
        Ok(())
    }

    async fn derive_vetkd_encrypted_key(
        &self,
        args: VetKdArgs,
    ) -> Result<RemoteKeyContribution, RemoteError> {
        if self.with_faults(|f| f.failing_key_requests) {
            return Err(RemoteError::Unavailable("injected key failure".into()));
        }
        self.with_state(|s| s.derive(&args))
    }

    async fn get_vetkey_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<RemoteKeyContribution>, RemoteError> {
        if self.with_faults(|f| f.failing_key_requests) {
            return Err(RemoteError::Unavailable("injected key failure".into()));
        }
        Ok(self.with_state(|s| s.contribution(user_id)))
    }
}

// ── File adapter ─────────────────────────────────────────────────────────────

/// Custody service backed by a JSON file. Each call loads the file, applies
/// the operation, and writes it back (temp file + rename).
pub struct FileRemote {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRemote {
    /// Open the service file, creating it (with a fresh secret) if absent.
    pub fn open(path: &Path) -> Result<Self, RemoteError> {
        let remote = Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        };
        if !path.exists() {
            remote.save(&RemoteState::generate())?;
            tracing::info!(path = %path.display(), "initialized remote service file");
        }
        Ok(remote)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<RemoteState, RemoteError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            RemoteError::Unavailable(format!("reading {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| RemoteError::Storage(format!("parsing {}: {e}", self.path.display())))
    }

    fn save(&self, state: &RemoteState) -> Result<(), RemoteError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RemoteError::Storage(format!("creating {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| RemoteError::Storage(format!("serializing remote state: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| RemoteError::Storage(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| RemoteError::Storage(format!("renaming {}: {e}", self.path.display())))
    }

    fn read<T>(&self, f: impl FnOnce(&RemoteState) -> T) -> Result<T, RemoteError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(f(&self.load()?))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut RemoteState) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }
}

#[async_trait]
impl RemoteVaultService for FileRemote {
    async fn get_all_vaults_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<(VaultId, RemoteVaultData)>, RemoteError> {
        self.read(|s| s.all_vaults(user_id))
    }

    async fn get_vault(
        &self,
        user_id: &str,
        vault_id: &str,
    ) -> Result<Option<RemoteVaultData>, RemoteError> {
        self.read(|s| s.vault(user_id, vault_id))
    }

    async fn add_or_update_vault(
        &self,
        user_id: &str,
        vault_id: &str,
        data: RemoteVaultData,
    ) -> Result<(), RemoteError> {
        self.write(|s| {
            s.upsert(user_id, vault_id, data);
            Ok(())
        })
    }

    async fn delete_vault(&self, user_id: &str, vault_id: &str) -> Result<(), RemoteError> {
        self.write(|s| {
            s.delete(user_id, vault_id);
            Ok(())
        })
    }

    async fn clear_all_user_vaults(&self, user_id: &str) -> Result<(), RemoteError> {
        self.write(|s| {
            s.clear(user_id);
            Ok(())
        })
    }

    async fn derive_vetkd_encrypted_key(
        &self,
        args: VetKdArgs,
    ) -> Result<RemoteKeyContribution, RemoteError> {
        self.write(|s| s.derive(&args))
    }

    async fn get_vetkey_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<RemoteKeyContribution>, RemoteError> {
        self.read(|s| s.contribution(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::WireCell;

    fn args(scope: &str) -> VetKdArgs {
        VetKdArgs {
            scope: scope.into(),
            input: b"ghostkeys-vault-key".to_vec(),
            transport_public_key: [7; 32],
        }
    }

    #[tokio::test]
    async fn contribution_is_remembered_per_user() {
        let remote = MemoryRemote::new();
        assert!(remote.get_vetkey_for_user("UserID_a").await.unwrap().is_none());

        let derived = remote.derive_vetkd_encrypted_key(args("UserID_a")).await.unwrap();
        assert_eq!(derived.as_bytes().len(), CONTRIBUTION_SIZE);
        let fetched = remote.get_vetkey_for_user("UserID_a").await.unwrap().unwrap();
        assert_eq!(fetched, derived);

        let other = remote.derive_vetkd_encrypted_key(args("UserID_b")).await.unwrap();
        assert_ne!(other, derived);
    }

    #[tokio::test]
    async fn injected_push_failures_do_not_apply() {
        let remote = MemoryRemote::new();
        remote.fail_next_pushes(1);
        let patch = RemoteVaultData {
            revision: 1,
            cells: vec![WireCell {
                row: 0,
                col: 0,
                value: "blob".into(),
            }],
            ..Default::default()
        };

        let err = remote
            .add_or_update_vault("UserID_a", "Vault_x", patch.clone())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(remote.get_vault("UserID_a", "Vault_x").await.unwrap().is_none());

        remote.add_or_update_vault("UserID_a", "Vault_x", patch).await.unwrap();
        assert_eq!(remote.pushes().len(), 2);
        assert_eq!(
            remote.get_vault("UserID_a", "Vault_x").await.unwrap().unwrap().revision,
            1
        );
    }

    #[tokio::test]
    async fn file_remote_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");

        let first = {
            let remote = FileRemote::open(&path).unwrap();
            remote
                .add_or_update_vault("UserID_a", "Vault_x", RemoteVaultData::default())
                .await
                .unwrap();
            remote.derive_vetkd_encrypted_key(args("UserID_a")).await.unwrap()
        };

        let remote = FileRemote::open(&path).unwrap();
        assert_eq!(remote.get_all_vaults_for_user("UserID_a").await.unwrap().len(), 1);
        assert_eq!(remote.get_vetkey_for_user("UserID_a").await.unwrap(), Some(first));

        remote.clear_all_user_vaults("UserID_a").await.unwrap();
        assert!(remote.get_all_vaults_for_user("UserID_a").await.unwrap().is_empty());
    }
}
