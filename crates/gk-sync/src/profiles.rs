//! Identity profiles: generate, import, list, switch, unlock.

use gk_core::config::{CryptoConfig, SeedSchemeKind};
use gk_core::types::user_id_for;
use gk_core::{GkError, Profile};
use gk_crypto::{generate_mnemonic, validate_mnemonic, Identity, KdfParams, SeedScheme};
use gk_store::RecordStore;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::error::SyncResult;
use crate::vaults::Confirmation;

/// Everything needed to turn a stored mnemonic into an identity.
#[derive(Debug, Clone)]
pub struct IdentityParams {
    pub scheme: SeedScheme,
    pub derivation_path: String,
    /// Optional BIP-39 style passphrase; never persisted
    pub passphrase: String,
}

impl Default for IdentityParams {
    fn default() -> Self {
        Self::from_config(&CryptoConfig::default())
    }
}

impl IdentityParams {
    pub fn from_config(cfg: &CryptoConfig) -> Self {
        let scheme = match cfg.seed_scheme {
            SeedSchemeKind::Argon2id => SeedScheme::Argon2id(KdfParams {
                mem_cost_kib: cfg.argon2_mem_cost_kib,
                time_cost: cfg.argon2_time_cost,
                parallelism: cfg.argon2_parallelism,
            }),
            SeedSchemeKind::Bip39Pbkdf2 => SeedScheme::Bip39Pbkdf2,
        };
        Self {
            scheme,
            derivation_path: cfg.derivation_path.clone(),
            passphrase: String::new(),
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = passphrase.into();
        self
    }

    pub fn derive(&self, phrase: &str) -> SyncResult<Identity> {
        Ok(Identity::from_mnemonic(
            phrase,
            &self.passphrase,
            &self.scheme,
            &self.derivation_path,
        )?)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generate a new mnemonic, persist the profile, and make it active.
pub fn create_profile<S: RecordStore>(
    store: &mut S,
    params: &IdentityParams,
) -> SyncResult<(Profile, Identity)> {
    let phrase = generate_mnemonic()?;
    import_profile(store, &phrase, params)
}

/// Validate and derive `phrase`, persist it, and make it active. Importing
/// a phrase that is already stored just reactivates that profile.
pub fn import_profile<S: RecordStore>(
    store: &mut S,
    phrase: &str,
    params: &IdentityParams,
) -> SyncResult<(Profile, Identity)> {
    let normalized = validate_mnemonic(phrase)?;
    let identity = params.derive(&normalized)?;
    let principal = identity.principal().to_string();
    let user_id = user_id_for(&principal);

    let profile = match store.get_profile(&user_id)? {
        Some(existing) => existing,
        None => {
            let profile = Profile {
                user_id: user_id.clone(),
                principal,
                seed_phrase: normalized,
                active: false,
                created_at: now_secs(),
            };
            store.put_profile(&profile)?;
            info!(user_id = %profile.user_id, "stored new profile");
            profile
        }
    };
    store.set_active_profile(&user_id)?;

    let profile = Profile {
        active: true,
        ..profile
    };
    Ok((profile, identity))
}

pub fn list_profiles<S: RecordStore>(store: &S) -> SyncResult<Vec<Profile>> {
    Ok(store.list_profiles()?)
}

/// Make `user_id` the active profile. Refuses while the current profile
/// has unsynced vaults, unless confirmed.
pub fn switch_profile<S: RecordStore>(
    store: &mut S,
    user_id: &str,
    confirmation: Confirmation,
) -> SyncResult<()> {
    if store.get_profile(user_id)?.is_none() {
        return Err(GkError::NotFound(format!("profile {user_id}")).into());
    }
    if let Some(active) = store.active_profile()? {
        if active.user_id == user_id {
            return Ok(());
        }
        let unsynced: Vec<String> = store
            .list_vaults(&active.user_id)?
            .into_iter()
            .filter(|v| !v.synced)
            .map(|v| v.vault_name)
            .collect();
        if !unsynced.is_empty() && !confirmation.is_confirmed() {
            return Err(GkError::UnsyncedChanges(format!(
                "unsynced vaults would be left behind: {}",
                unsynced.join(", ")
            ))
            .into());
        }
    }
    store.set_active_profile(user_id)?;
    info!(user_id, "switched profile");
    Ok(())
}

/// Re-derive the identity of a stored profile.
pub fn unlock(profile: &Profile, params: &IdentityParams) -> SyncResult<Identity> {
    let identity = params.derive(&profile.seed_phrase)?;
    let principal = identity.principal().to_string();
    if principal != profile.principal {
        return Err(GkError::Config(format!(
            "profile {} derives to a different principal; check the seed scheme, derivation path, and passphrase",
            profile.user_id
        ))
        .into());
    }
    Ok(identity)
}

/// The active profile, unlocked.
pub fn unlock_active<S: RecordStore>(
    store: &S,
    params: &IdentityParams,
) -> SyncResult<(Profile, Identity)> {
    let profile = store
        .active_profile()?
        .ok_or_else(|| GkError::NotFound("no active profile".into()))?;
    let identity = unlock(&profile, params)?;
    Ok((profile, identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::vaults::create_vault;
    use gk_store::JsonStore;

    const PHRASE: &str =
        "abandon ability able about above absent absorb abstract absurd abuse access accident";

    fn fast_params() -> IdentityParams {
        IdentityParams {
            scheme: SeedScheme::Bip39Pbkdf2,
            ..IdentityParams::default()
        }
    }

    fn store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(&dir.path().join("store.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn import_is_idempotent() {
        let (_dir, mut store) = store();
        let (first, id1) = import_profile(&mut store, PHRASE, &fast_params()).unwrap();
        let (second, id2) =
            import_profile(&mut store, &PHRASE.to_uppercase(), &fast_params()).unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(id1.principal(), id2.principal());
        assert_eq!(store.list_profiles().unwrap().len(), 1);
        assert!(first.active);
    }

    #[test]
    fn bad_phrase_is_rejected_before_storing() {
        let (_dir, mut store) = store();
        let err = import_profile(&mut store, "abandon ability", &fast_params()).unwrap_err();
        assert!(matches!(err, SyncError::Crypto(_)));
        assert!(store.list_profiles().unwrap().is_empty());
    }

    #[test]
    fn switch_guards_unsynced_vaults() {
        let (_dir, mut store) = store();
        let (alice, alice_id) = import_profile(&mut store, PHRASE, &fast_params()).unwrap();
        let (bob, _) = create_profile(&mut store, &fast_params()).unwrap();
        switch_profile(&mut store, &alice.user_id, Confirmation::Confirmed).unwrap();

        create_vault(&mut store, &alice_id, "Personal").unwrap();
        let err = switch_profile(&mut store, &bob.user_id, Confirmation::NotConfirmed).unwrap_err();
        assert!(matches!(err, SyncError::Store(GkError::UnsyncedChanges(_))));
        assert_eq!(store.active_profile().unwrap().unwrap().user_id, alice.user_id);

        switch_profile(&mut store, &bob.user_id, Confirmation::Confirmed).unwrap();
        assert_eq!(store.active_profile().unwrap().unwrap().user_id, bob.user_id);
    }

    #[test]
    fn unlock_detects_parameter_drift() {
        let (_dir, mut store) = store();
        let (profile, identity) = import_profile(&mut store, PHRASE, &fast_params()).unwrap();
        let unlocked = unlock(&profile, &fast_params()).unwrap();
        assert_eq!(unlocked.principal(), identity.principal());

        let other_path = IdentityParams {
            derivation_path: "m/44'/223'/0'/0'/1'".into(),
            ..fast_params()
        };
        assert!(unlock(&profile, &other_path).is_err());
    }
}
