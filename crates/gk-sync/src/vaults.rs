//! Vault lifecycle: create, rename, list, leave, transfer.

use gk_core::types::{user_id_for, vault_id_for, UserId};
use gk_core::{GkError, Vault};
use gk_crypto::{vault_address, Identity};
use gk_store::RecordStore;
use tracing::info;

use crate::error::{SyncError, SyncResult};

/// Explicit answer to a data-loss guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Confirmation {
    /// Proceed even though unsynced local changes would be abandoned
    Confirmed,
    #[default]
    NotConfirmed,
}

impl Confirmation {
    pub fn is_confirmed(self) -> bool {
        self == Confirmation::Confirmed
    }
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Confirmation::Confirmed
        } else {
            Confirmation::NotConfirmed
        }
    }
}

/// Create an empty vault. The id is derived from the identity and the
/// trimmed name, so the same mnemonic and name give the same id anywhere.
pub fn create_vault<S: RecordStore>(
    store: &mut S,
    identity: &Identity,
    name: &str,
) -> SyncResult<Vault> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GkError::InvalidEdit("vault name cannot be empty".into()).into());
    }
    let address = vault_address(identity, name).to_string();
    let vault_id = vault_id_for(&address);
    if store.get_vault(&vault_id)?.is_some() {
        return Err(GkError::AlreadyExists(format!("vault '{name}' ({vault_id})")).into());
    }

    let owner = user_id_for(&identity.principal().to_string());
    let vault = Vault::new(vault_id, owner, name.to_string(), address);
    store.put_vault(&vault)?;
    info!(vault_id = %vault.vault_id, "created vault");
    Ok(vault)
}

/// Rename a vault. The name is a sealed field, so the vault becomes unsynced.
pub fn rename_vault<S: RecordStore>(store: &mut S, vault_id: &str, name: &str) -> SyncResult<()> {
    store.update_vault(vault_id, |v| v.rename(name))?;
    Ok(())
}

pub fn list_vaults<S: RecordStore>(store: &S, user_id: &str) -> SyncResult<Vec<Vault>> {
    Ok(store.list_vaults(user_id)?)
}

/// Guard for switching away from `vault`.
pub fn ensure_can_leave(vault: &Vault, confirmation: Confirmation) -> SyncResult<()> {
    if !vault.synced && !confirmation.is_confirmed() {
        return Err(GkError::UnsyncedChanges(format!(
            "vault '{}' has changes that were never synced",
            vault.vault_name
        ))
        .into());
    }
    Ok(())
}

/// Hand a local-only vault to another local profile.
///
/// A vault that was ever pushed is refused with
/// [`SyncError::RemoteCopyExists`]; [`SyncEngine::transfer_vault`] deletes
/// the remote copy first and then re-homes it.
///
/// [`SyncEngine::transfer_vault`]: crate::engine::SyncEngine::transfer_vault
pub fn transfer_vault<S: RecordStore>(
    store: &mut S,
    vault_id: &str,
    from: &Identity,
    new_owner: &UserId,
    confirmation: Confirmation,
) -> SyncResult<Vault> {
    let mut vault = check_transfer(store, vault_id, from, new_owner, confirmation)?;
    if vault.exists_remotely {
        return Err(SyncError::RemoteCopyExists(vault.vault_id));
    }
    rehome(&mut vault, new_owner);
    store.put_vault(&vault)?;
    info!(vault_id, to = %new_owner, "transferred vault");
    Ok(vault)
}

/// Ownership, target profile, and unsynced-changes guards for a transfer.
pub(crate) fn check_transfer<S: RecordStore>(
    store: &S,
    vault_id: &str,
    from: &Identity,
    new_owner: &UserId,
    confirmation: Confirmation,
) -> SyncResult<Vault> {
    let vault = store
        .get_vault(vault_id)?
        .ok_or_else(|| GkError::NotFound(format!("vault {vault_id}")))?;
    let current = user_id_for(&from.principal().to_string());
    if vault.owner != current {
        return Err(SyncError::WrongOwner {
            vault_id: vault.vault_id.clone(),
            owner: vault.owner.clone(),
            user_id: current,
        });
    }
    if store.get_profile(new_owner)?.is_none() {
        return Err(GkError::NotFound(format!("profile {new_owner}")).into());
    }
    ensure_can_leave(&vault, confirmation)?;
    Ok(vault)
}

/// The new owner's data key differs, so every commit marker is cleared and
/// the next sync pushes the whole vault to the new owner's namespace.
/// Pending tombstones go with the markers: the remote copy they were aimed
/// at is gone.
pub(crate) fn rehome(vault: &mut Vault, new_owner: &UserId) {
    vault.owner = new_owner.clone();
    vault.data.reset_commit_markers();
    vault.exists_remotely = false;
    vault.remote_revision = 0;
    vault.synced = false;
    vault.generation += 1;
}
