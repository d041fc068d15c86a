//! Per-session data key resolution.
//!
//! The remote contribution is fetched at most once per user per session and
//! cached; each vault key is then `combine_keys(resource_seed, contribution)`.

use gk_core::types::{user_id_for, UserId};
use gk_core::Vault;
use gk_crypto::{
    combine_keys, derive_resource_seed, CryptoError, DataKey, Identity, RemoteKeyContribution,
    TransportPublicKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::SyncResult;
use crate::remote::{RemoteVaultService, VetKdArgs};

/// Input label for vetKD derivation requests
pub const VETKD_INPUT: &str = "ghostkeys-vault-key";

/// Shared contribution cache, keyed by user id
pub type SharedContributions = Arc<RwLock<HashMap<UserId, RemoteKeyContribution>>>;

#[derive(Clone, Default)]
pub struct KeySession {
    contributions: SharedContributions,
}

impl KeySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The remote contribution for `user_id`: cached, else fetched, else derived.
    pub async fn contribution(
        &self,
        remote: &dyn RemoteVaultService,
        user_id: &str,
    ) -> SyncResult<RemoteKeyContribution> {
        if let Some(c) = self.contributions.read().await.get(user_id) {
            return Ok(c.clone());
        }

        // Held across the fetch so concurrent callers wait for one request.
        let mut cache = self.contributions.write().await;
        if let Some(c) = cache.get(user_id) {
            return Ok(c.clone());
        }

        let contribution = fetch_contribution(remote, user_id).await?;
        cache.insert(user_id.to_string(), contribution.clone());
        tracing::debug!(user_id, "cached remote key contribution");
        Ok(contribution)
    }

    /// Data key for `vault`, owned by `identity`.
    pub async fn data_key(
        &self,
        remote: &dyn RemoteVaultService,
        identity: &Identity,
        vault: &Vault,
    ) -> SyncResult<DataKey> {
        let user_id = user_id_for(&identity.principal().to_string());
        let contribution = self.contribution(remote, &user_id).await?;
        let seed = derive_resource_seed(identity, &vault.public_address);
        Ok(combine_keys(&seed, &contribution)?)
    }

    pub async fn is_cached(&self, user_id: &str) -> bool {
        self.contributions.read().await.contains_key(user_id)
    }

    /// Drop a cached contribution (e.g. after the user's remote data was cleared).
    pub async fn forget(&self, user_id: &str) {
        self.contributions.write().await.remove(user_id);
    }
}

async fn fetch_contribution(
    remote: &dyn RemoteVaultService,
    user_id: &str,
) -> SyncResult<RemoteKeyContribution> {
    let unavailable =
        |e: crate::remote::RemoteError| CryptoError::KeyUnavailable(format!("{user_id}: {e}"));

    if let Some(existing) = remote.get_vetkey_for_user(user_id).await.map_err(unavailable)? {
        if !existing.is_empty() {
            return Ok(existing);
        }
    }

    let args = VetKdArgs {
        scope: user_id.to_string(),
        input: VETKD_INPUT.as_bytes().to_vec(),
        transport_public_key: TransportPublicKey::ephemeral().to_bytes(),
    };
    let derived = remote
        .derive_vetkd_encrypted_key(args)
        .await
        .map_err(unavailable)?;
    if derived.is_empty() {
        return Err(CryptoError::KeyUnavailable(format!(
            "{user_id}: remote returned an empty key contribution"
        ))
        .into());
    }
    tracing::info!(user_id, "derived remote key contribution");
    Ok(derived)
}
