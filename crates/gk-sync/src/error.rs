use gk_core::GkError;
use gk_crypto::CryptoError;
use thiserror::Error;

use crate::remote::RemoteError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Key derivation or field encryption failed, including an unavailable
    /// remote key contribution.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("sync failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("vault {vault_id} changed remotely (local revision {local}, remote revision {remote}); pull it before syncing")]
    Conflict {
        vault_id: String,
        local: u64,
        remote: u64,
    },

    #[error(transparent)]
    Store(#[from] GkError),

    /// The current owner's remote copy must be deleted before the vault
    /// can change hands.
    #[error("vault {0} still has a remote copy under its current owner")]
    RemoteCopyExists(String),

    #[error("vault {vault_id} is owned by {owner}, not {user_id}")]
    WrongOwner {
        vault_id: String,
        owner: String,
        user_id: String,
    },
}

impl SyncError {
    /// Failures worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_transient())
    }
}
