//! Sync engine: push, pull, import, transfer, delete, and clear for one
//! user's vaults.
//!
//! The local store is shared as `Arc<Mutex<S>>` and locked only for short,
//! synchronous sections; the lock is never held across a remote call.
//!
//! A push works on a snapshot (a clone of the vault plus its `generation`):
//!   1. diff the snapshot against its commit markers
//!   2. resolve the data key and seal the diff
//!   3. check the remote revision, then push with `revision + 1`
//!   4. re-read the vault, settle the markers on the current data, and set
//!      `synced` only if no edit landed since the snapshot
//!
//! On any failure nothing local changes.

use gk_core::config::SyncConfig;
use gk_core::types::{user_id_for, UserId, VaultId, VAULT_ID_PREFIX};
use gk_core::{GkError, Vault};
use gk_crypto::Identity;
use gk_store::RecordStore;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{decrypt_remote, encrypt_diff, DecodedVault};
use crate::diff::{apply_success, compute_diff};
use crate::error::{SyncError, SyncResult};
use crate::keys::KeySession;
use crate::remote::RemoteVaultService;
use crate::vaults::{self, Confirmation};
use crate::wire::RemoteVaultData;

/// Upper bound on a single backoff delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Extra attempts after a transient push failure (0 = fail immediately)
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry
    pub retry_base_delay: Duration,
    /// Refuse to push over a remote revision we have not seen
    pub conflict_check: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            conflict_check: cfg.conflict_check,
        }
    }
}

impl SyncOptions {
    /// Backoff before retry number `retry` (1-based).
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY)
    }
}

/// Result of a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub vault_id: VaultId,
    pub upserts: usize,
    pub tombstones: usize,
    /// Revision the remote now holds
    pub revision: u64,
    /// Push attempts made (0 when there was nothing to send)
    pub attempts: u32,
    /// False when the vault was edited while the push was in flight
    pub synced: bool,
}

/// Result of a pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    pub vault_id: VaultId,
    pub revision: u64,
    pub records: usize,
    pub unreadable: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: Vec<VaultId>,
    pub refreshed: Vec<VaultId>,
    /// Local vaults with unsynced edits, left untouched
    pub skipped: Vec<VaultId>,
    pub unreadable: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatus {
    pub vault_id: VaultId,
    pub vault_name: String,
    pub synced: bool,
    pub exists_remotely: bool,
    pub remote_revision: u64,
    /// Records the next sync would send
    pub pending_changes: usize,
    pub pending_tombstones: usize,
    pub unreadable: usize,
}

pub struct SyncEngine<S: RecordStore> {
    store: Arc<Mutex<S>>,
    remote: Arc<dyn RemoteVaultService>,
    keys: KeySession,
    options: SyncOptions,
}

impl<S: RecordStore> SyncEngine<S> {
    pub fn new(store: Arc<Mutex<S>>, remote: Arc<dyn RemoteVaultService>, options: SyncOptions) -> Self {
        Self {
            store,
            remote,
            keys: KeySession::new(),
            options,
        }
    }

    /// Share an existing key session (one per unlocked identity).
    pub fn with_key_session(mut self, keys: KeySession) -> Self {
        self.keys = keys;
        self
    }

    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    pub fn key_session(&self) -> &KeySession {
        &self.keys
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, S>> {
        lock_store(&self.store)
    }

    /// Load a vault and check it belongs to `identity`.
    fn owned_vault(&self, identity: &Identity, vault_id: &str) -> SyncResult<Vault> {
        let vault = self
            .lock()?
            .get_vault(vault_id)?
            .ok_or_else(|| GkError::NotFound(format!("vault {vault_id}")))?;
        check_owner(identity, &vault)?;
        Ok(vault)
    }

    // ── Push ─────────────────────────────────────────────────────────────

    /// Push local changes of one vault.
    pub async fn sync_vault(&self, identity: &Identity, vault_id: &str) -> SyncResult<SyncReport> {
        let user_id = user_id_for(&identity.principal().to_string());
        let snapshot = self.owned_vault(identity, vault_id)?;
        let diff = compute_diff(&snapshot.data);

        if snapshot.synced && snapshot.exists_remotely {
            debug!(vault_id, "already synced");
            return Ok(SyncReport {
                vault_id: vault_id.to_string(),
                upserts: 0,
                tombstones: 0,
                revision: snapshot.remote_revision,
                attempts: 0,
                synced: true,
            });
        }

        let key = self.keys.data_key(self.remote.as_ref(), identity, &snapshot).await?;
        let revision = snapshot.remote_revision + 1;
        let payload = encrypt_diff(&snapshot.vault_name, revision, &diff, &key)?;

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let retrying = attempts > 1;
            match self.push_once(&user_id, &snapshot, payload.clone(), retrying).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempts <= self.options.max_retries => {
                    let delay = self.options.retry_delay(attempts);
                    warn!(
                        vault_id,
                        attempt = attempts,
                        max_retries = self.options.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "push failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(vault_id, attempts, error = %e, "sync failed");
                    return Err(e);
                }
            }
        }

        let synced = {
            let mut store = self.lock()?;
            match store.get_vault(vault_id)? {
                Some(mut current) => {
                    apply_success(&mut current.data, &diff);
                    current.exists_remotely = true;
                    current.remote_revision = revision;
                    current.synced = current.generation == snapshot.generation;
                    store.put_vault(&current)?;
                    current.synced
                }
                None => {
                    warn!(vault_id, "vault deleted locally while sync was in flight");
                    false
                }
            }
        };

        info!(
            vault_id,
            revision,
            upserts = diff.upserts(),
            tombstones = diff.tombstones(),
            attempts,
            synced,
            "vault synced"
        );
        Ok(SyncReport {
            vault_id: vault_id.to_string(),
            upserts: diff.upserts(),
            tombstones: diff.tombstones(),
            revision,
            attempts,
            synced,
        })
    }

    async fn push_once(
        &self,
        user_id: &str,
        snapshot: &Vault,
        payload: RemoteVaultData,
        retrying: bool,
    ) -> SyncResult<()> {
        if self.options.conflict_check {
            let remote = self.remote.get_vault(user_id, &snapshot.vault_id).await?;
            if retrying && remote.as_ref().is_some_and(|r| already_applied(r, &payload)) {
                debug!(
                    vault_id = %snapshot.vault_id,
                    revision = payload.revision,
                    "earlier attempt was applied, acknowledgement lost"
                );
                return Ok(());
            }
            let remote_revision = remote.map(|v| v.revision).unwrap_or(0);
            if remote_revision != snapshot.remote_revision {
                return Err(SyncError::Conflict {
                    vault_id: snapshot.vault_id.clone(),
                    local: snapshot.remote_revision,
                    remote: remote_revision,
                });
            }
        }
        self.remote
            .add_or_update_vault(user_id, &snapshot.vault_id, payload)
            .await?;
        Ok(())
    }

    /// Push every vault of `identity` that has unsynced changes. Stops at
    /// the first failure.
    pub async fn sync_all(&self, identity: &Identity) -> SyncResult<Vec<SyncReport>> {
        let user_id = user_id_for(&identity.principal().to_string());
        let pending: Vec<VaultId> = self
            .lock()?
            .list_vaults(&user_id)?
            .into_iter()
            .filter(|v| !v.synced || !v.exists_remotely)
            .map(|v| v.vault_id)
            .collect();

        let mut reports = Vec::with_capacity(pending.len());
        for vault_id in pending {
            reports.push(self.sync_vault(identity, &vault_id).await?);
        }
        Ok(reports)
    }

    // ── Pull / import ────────────────────────────────────────────────────

    /// Replace the local copy with the remote one. Unsynced local edits are
    /// discarded, so that needs confirmation.
    pub async fn pull_vault(
        &self,
        identity: &Identity,
        vault_id: &str,
        confirmation: Confirmation,
    ) -> SyncResult<PullReport> {
        let user_id = user_id_for(&identity.principal().to_string());
        let local = self.lock()?.get_vault(vault_id)?;
        if let Some(local) = &local {
            check_owner(identity, local)?;
            if !local.synced && !confirmation.is_confirmed() {
                return Err(GkError::UnsyncedChanges(format!(
                    "vault '{}' has local changes that a pull would discard",
                    local.vault_name
                ))
                .into());
            }
        }

        let remote = self
            .remote
            .get_vault(&user_id, vault_id)
            .await?
            .ok_or_else(|| GkError::NotFound(format!("vault {vault_id} on remote")))?;

        let shell = match local {
            Some(v) => v,
            None => new_local_vault(&user_id, vault_id),
        };
        let key = self.keys.data_key(self.remote.as_ref(), identity, &shell).await?;
        let decoded = decrypt_remote(&remote, &key);
        let report = PullReport {
            vault_id: vault_id.to_string(),
            revision: decoded.revision,
            records: remote.record_count(),
            unreadable: decoded.data.unreadable.len(),
        };

        {
            let mut store = self.lock()?;
            let generation = store
                .get_vault(vault_id)?
                .map(|v| v.generation)
                .unwrap_or(shell.generation);
            store.put_vault(&refreshed(shell, decoded, generation))?;
        }
        info!(vault_id, revision = report.revision, unreadable = report.unreadable, "vault pulled");
        Ok(report)
    }

    /// Fetch every remote vault of `identity`: insert missing ones, refresh
    /// synced ones, and leave vaults with unsynced edits alone.
    pub async fn import_all(&self, identity: &Identity) -> SyncResult<ImportReport> {
        let user_id = user_id_for(&identity.principal().to_string());
        let remote_vaults = self.remote.get_all_vaults_for_user(&user_id).await?;
        let mut report = ImportReport::default();

        for (vault_id, remote) in remote_vaults {
            let local = self.lock()?.get_vault(&vault_id)?;
            let shell = match local {
                Some(v) if v.owner != user_id => {
                    warn!(vault_id, owner = %v.owner, "local vault has another owner, skipping");
                    report.skipped.push(vault_id);
                    continue;
                }
                Some(v) if !v.synced => {
                    warn!(vault_id, "local vault has unsynced changes, skipping");
                    report.skipped.push(vault_id);
                    continue;
                }
                Some(v) => {
                    report.refreshed.push(vault_id.clone());
                    v
                }
                None => {
                    report.inserted.push(vault_id.clone());
                    new_local_vault(&user_id, &vault_id)
                }
            };

            let key = self.keys.data_key(self.remote.as_ref(), identity, &shell).await?;
            let decoded = decrypt_remote(&remote, &key);
            report.unreadable += decoded.data.unreadable.len();

            let mut store = self.lock()?;
            // An edit may have landed while the key was resolving.
            if let Some(current) = store.get_vault(&vault_id)? {
                if !current.synced {
                    warn!(vault_id, "vault edited during import, skipping");
                    report.refreshed.retain(|id| id != &vault_id);
                    report.inserted.retain(|id| id != &vault_id);
                    report.skipped.push(vault_id);
                    continue;
                }
            }
            let generation = shell.generation;
            store.put_vault(&refreshed(shell, decoded, generation))?;
        }

        info!(
            inserted = report.inserted.len(),
            refreshed = report.refreshed.len(),
            skipped = report.skipped.len(),
            "import complete"
        );
        Ok(report)
    }

    // ── Delete / clear ───────────────────────────────────────────────────

    /// Delete a vault remotely (if it was ever pushed) and then locally.
    pub async fn delete_vault(&self, identity: &Identity, vault_id: &str) -> SyncResult<()> {
        let user_id = user_id_for(&identity.principal().to_string());
        let vault = self.owned_vault(identity, vault_id)?;
        if vault.exists_remotely {
            self.remote.delete_vault(&user_id, vault_id).await?;
        }
        self.lock()?.delete_vault(vault_id)?;
        info!(vault_id, "vault deleted");
        Ok(())
    }

    // ── Transfer ─────────────────────────────────────────────────────────

    /// Hand a vault to another local profile.
    ///
    /// The current owner's remote copy lives in a namespace the new owner
    /// can neither address nor decrypt, so it is deleted before the vault is
    /// re-homed. If the delete fails nothing local changes.
    pub async fn transfer_vault(
        &self,
        from: &Identity,
        vault_id: &str,
        new_owner: &UserId,
        confirmation: Confirmation,
    ) -> SyncResult<Vault> {
        let user_id = user_id_for(&from.principal().to_string());
        let vault = vaults::check_transfer(&*self.lock()?, vault_id, from, new_owner, confirmation)?;

        if vault.exists_remotely {
            self.remote.delete_vault(&user_id, vault_id).await?;
            info!(vault_id, user_id, "deleted remote copy before transfer");
        }

        let mut store = self.lock()?;
        let mut current = store
            .get_vault(vault_id)?
            .ok_or_else(|| GkError::NotFound(format!("vault {vault_id}")))?;
        vaults::rehome(&mut current, new_owner);
        store.put_vault(&current)?;
        info!(vault_id, from = %user_id, to = %new_owner, "transferred vault");
        Ok(current)
    }

    /// Remove every vault of `identity`, remote first. Returns the number of
    /// local vaults deleted.
    pub async fn clear_all(&self, identity: &Identity) -> SyncResult<usize> {
        let user_id = user_id_for(&identity.principal().to_string());
        self.remote.clear_all_user_vaults(&user_id).await?;

        let mut store = self.lock()?;
        let mut removed = 0;
        for vault in store.list_vaults(&user_id)? {
            if store.delete_vault(&vault.vault_id)? {
                removed += 1;
            }
        }
        info!(user_id, removed, "cleared all vaults");
        Ok(removed)
    }

    // ── Status ───────────────────────────────────────────────────────────

    pub fn vault_status(&self, vault_id: &str) -> SyncResult<VaultStatus> {
        let vault = self
            .lock()?
            .get_vault(vault_id)?
            .ok_or_else(|| GkError::NotFound(format!("vault {vault_id}")))?;
        Ok(status_of(&vault))
    }
}

/// Sync summary of a single vault.
pub fn status_of(vault: &Vault) -> VaultStatus {
    let diff = compute_diff(&vault.data);
    let pending = !vault.synced || !vault.exists_remotely;
    VaultStatus {
        vault_id: vault.vault_id.clone(),
        vault_name: vault.vault_name.clone(),
        synced: vault.synced,
        exists_remotely: vault.exists_remotely,
        remote_revision: vault.remote_revision,
        pending_changes: if pending { diff.len() } else { 0 },
        pending_tombstones: if pending { diff.tombstones() } else { 0 },
        unreadable: vault.data.unreadable.len(),
    }
}

/// The remote copy already carries `payload`. The vault name is sealed with
/// a fresh nonce on every push, so its ciphertext identifies the push.
fn already_applied(remote: &RemoteVaultData, payload: &RemoteVaultData) -> bool {
    remote.revision == payload.revision
        && !payload.vault_name.is_empty()
        && remote.vault_name == payload.vault_name
}

pub(crate) fn lock_store<S>(store: &Arc<Mutex<S>>) -> SyncResult<MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|_| SyncError::Store(GkError::Store("store lock poisoned".into())))
}

fn check_owner(identity: &Identity, vault: &Vault) -> SyncResult<()> {
    let user_id = user_id_for(&identity.principal().to_string());
    if vault.owner != user_id {
        return Err(SyncError::WrongOwner {
            vault_id: vault.vault_id.clone(),
            owner: vault.owner.clone(),
            user_id,
        });
    }
    Ok(())
}

/// Placeholder record for a vault only the remote knows about.
fn new_local_vault(user_id: &str, vault_id: &str) -> Vault {
    let address = vault_id.strip_prefix(VAULT_ID_PREFIX).unwrap_or(vault_id);
    Vault::new(
        vault_id.to_string(),
        user_id.to_string(),
        String::new(),
        address.to_string(),
    )
}

/// The local record after adopting the remote copy. The generation moves
/// past `generation` so an in-flight push cannot mark it synced.
fn refreshed(mut vault: Vault, decoded: DecodedVault, generation: u64) -> Vault {
    vault.vault_name = decoded.vault_name;
    vault.data = decoded.data;
    vault.remote_revision = decoded.revision;
    vault.exists_remotely = true;
    vault.synced = true;
    vault.generation = generation + 1;
    vault
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        let options = SyncOptions {
            max_retries: 10,
            retry_base_delay: Duration::from_millis(500),
            conflict_check: true,
        };
        assert_eq!(options.retry_delay(1), Duration::from_millis(500));
        assert_eq!(options.retry_delay(2), Duration::from_millis(1000));
        assert_eq!(options.retry_delay(4), Duration::from_millis(4000));
        assert_eq!(options.retry_delay(7), MAX_RETRY_DELAY);
        assert_eq!(options.retry_delay(40), MAX_RETRY_DELAY);
    }

    #[test]
    fn applied_push_is_recognised_by_its_sealed_name() {
        let payload = RemoteVaultData {
            vault_name: "sealed-a".into(),
            revision: 3,
            ..Default::default()
        };
        assert!(already_applied(&payload.clone(), &payload));

        let other_device = RemoteVaultData {
            vault_name: "sealed-b".into(),
            ..payload.clone()
        };
        assert!(!already_applied(&other_device, &payload));

        let older = RemoteVaultData {
            revision: 2,
            ..payload.clone()
        };
        assert!(!already_applied(&older, &payload));

        let unnamed = RemoteVaultData {
            vault_name: String::new(),
            revision: 3,
            ..Default::default()
        };
        assert!(!already_applied(&unnamed, &unnamed));
    }

    #[test]
    fn defaults_never_retry() {
        let options = SyncOptions::default();
        assert_eq!(options.max_retries, 0);
        assert!(options.conflict_check);
    }

    #[test]
    fn status_counts_only_unsynced_work() {
        let mut vault = Vault::new("Vault_x".into(), "UserID_u".into(), "v".into(), "x".into());
        vault.data.set_cell(gk_core::CellKey::new(0, 0), "a");
        assert_eq!(status_of(&vault).pending_changes, 1);

        vault.synced = true;
        vault.exists_remotely = true;
        assert_eq!(status_of(&vault).pending_changes, 0);
    }
}
