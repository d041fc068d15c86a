//! Per-vault material derived by signing vault-scoped labels

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::identity::Identity;
use crate::principal::Principal;
use crate::KEY_SIZE;

const RESOURCE_SEED_PREFIX: &[u8] = b"ghostkeys-vault-key-v1:";
const VAULT_ADDRESS_PREFIX: &[u8] = b"ghostkeys-vault-address-v1:";

/// 32-byte per-vault seed. Zeroized on drop.
#[derive(Clone)]
pub struct ResourceSeed {
    bytes: [u8; KEY_SIZE],
}

impl ResourceSeed {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ResourceSeed {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ResourceSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSeed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

fn signed_digest(identity: &Identity, prefix: &[u8], label: &str) -> Zeroizing<[u8; 32]> {
    let mut message = Vec::with_capacity(prefix.len() + label.len());
    message.extend_from_slice(prefix);
    message.extend_from_slice(label.as_bytes());

    let mut signature = identity.sign(&message);
    let digest = Zeroizing::new(Sha256::digest(signature).into());
    signature.zeroize();
    digest
}

/// `sha256(sign(prefix || resource_id))`, truncated to the key size.
pub fn derive_resource_seed(identity: &Identity, resource_id: &str) -> ResourceSeed {
    let digest = signed_digest(identity, RESOURCE_SEED_PREFIX, resource_id);
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&digest[..KEY_SIZE]);
    ResourceSeed::from_bytes(bytes)
}

/// Stable public address of the vault called `vault_name` under `identity`.
/// The same identity and name always give the same address.
pub fn vault_address(identity: &Identity, vault_name: &str) -> Principal {
    let digest = signed_digest(identity, VAULT_ADDRESS_PREFIX, vault_name.trim());
    Principal::derived(&digest[..])
}
