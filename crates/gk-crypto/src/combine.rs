//! Key combiner: resource seed + remote contribution → data key

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::resource::ResourceSeed;
use crate::KEY_SIZE;

const COMBINER_PROTOCOL: &[u8] = b"ghostkeys-key-combiner-v1";
const DATA_KEY_INFO: &[u8] = b"ghostkeys-vault-data-key";

/// Opaque key material issued by the custody service. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteKeyContribution {
    bytes: Vec<u8>,
}

impl RemoteKeyContribution {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for RemoteKeyContribution {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for RemoteKeyContribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKeyContribution")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Final 256-bit field key. Zeroized on drop.
#[derive(Clone)]
pub struct DataKey {
    bytes: [u8; KEY_SIZE],
}

impl DataKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DataKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// HKDF-SHA256 over `resource_seed || contribution`, salted with the hash of
/// a fixed protocol string. An empty contribution is refused.
pub fn combine_keys(
    resource_seed: &ResourceSeed,
    contribution: &RemoteKeyContribution,
) -> CryptoResult<DataKey> {
    if contribution.is_empty() {
        return Err(CryptoError::KeyUnavailable(
            "remote key contribution is empty".into(),
        ));
    }

    let salt = Sha256::digest(COMBINER_PROTOCOL);
    let mut ikm = Zeroizing::new(Vec::with_capacity(KEY_SIZE + contribution.as_bytes().len()));
    ikm.extend_from_slice(resource_seed.as_bytes());
    ikm.extend_from_slice(contribution.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), &ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(DATA_KEY_INFO, &mut okm)
        .map_err(|e| CryptoError::Kdf(format!("HKDF expand failed: {e}")))?;
    Ok(DataKey::from_bytes(okm))
}
