//! Ed25519 signing identity derived from a seed

use ed25519_dalek::{Signer, SigningKey};
use std::fmt;

use crate::error::CryptoResult;
use crate::mnemonic::{mnemonic_to_seed, Seed, SeedScheme};
use crate::principal::Principal;
use crate::slip10::{DerivationPath, ExtendedKey};

/// A deterministic signing keypair and its principal.
///
/// The signing key zeroizes itself on drop.
#[derive(Clone)]
pub struct Identity {
    signing: SigningKey,
    principal: Principal,
}

impl Identity {
    pub fn from_key_seed(key: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(key);
        let principal = Principal::self_authenticating(signing.verifying_key().as_bytes());
        Self { signing, principal }
    }

    /// Walk `path` from `seed` and build the identity at the leaf.
    pub fn derive(seed: &Seed, path: &DerivationPath) -> CryptoResult<Self> {
        let leaf = ExtendedKey::derive(seed.as_bytes(), path)?;
        Ok(Self::from_key_seed(leaf.key_bytes()))
    }

    /// Validate the phrase, stretch it, and derive. Fails before any
    /// stretching if the phrase or the path is malformed.
    pub fn from_mnemonic(
        phrase: &str,
        passphrase: &str,
        scheme: &SeedScheme,
        path: &str,
    ) -> CryptoResult<Self> {
        let path: DerivationPath = path.parse()?;
        let seed = mnemonic_to_seed(phrase, passphrase, scheme)?;
        let identity = Self::derive(&seed, &path)?;
        tracing::debug!(principal = %identity.principal, path = %path, "derived identity");
        Ok(identity)
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Ed25519 signature (deterministic for a given key and message).
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal)
            .field("signing", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use crate::kdf::KdfParams;
    use crate::DEFAULT_DERIVATION_PATH;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    const PHRASE: &str =
        "abandon ability able about above absent absorb abstract absurd abuse access accident";

    fn fast() -> SeedScheme {
        SeedScheme::Argon2id(KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn same_mnemonic_same_principal() {
        let a = Identity::from_mnemonic(PHRASE, "", &fast(), DEFAULT_DERIVATION_PATH).unwrap();
        let b = Identity::from_mnemonic(PHRASE, "", &fast(), DEFAULT_DERIVATION_PATH).unwrap();
        assert_eq!(a.principal(), b.principal());
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn path_changes_identity() {
        let a = Identity::from_mnemonic(PHRASE, "", &fast(), "m/44'/223'/0'/0'/0'").unwrap();
        let b = Identity::from_mnemonic(PHRASE, "", &fast(), "m/44'/223'/0'/0'/1'").unwrap();
        assert_ne!(a.principal(), b.principal());
    }

    #[test]
    fn non_hardened_path_fails_without_key() {
        let err = Identity::from_mnemonic(PHRASE, "", &fast(), "m/44'/223'/0'/0/0'").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPath(_)));
    }

    #[test]
    fn bad_mnemonic_fails() {
        let err = Identity::from_mnemonic("abandon", "", &fast(), DEFAULT_DERIVATION_PATH)
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidMnemonic(_)));
    }

    #[test]
    fn signatures_verify_and_are_deterministic() {
        let id = Identity::from_key_seed(&[3u8; 32]);
        let sig = id.sign(b"label");
        assert_eq!(sig, id.sign(b"label"));

        let vk = VerifyingKey::from_bytes(&id.public_key()).unwrap();
        assert!(vk.verify(b"label", &Signature::from_bytes(&sig)).is_ok());
    }

    #[test]
    fn debug_is_redacted() {
        let id = Identity::from_key_seed(&[3u8; 32]);
        let dbg = format!("{id:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(dbg.contains(&id.principal().to_string()));
    }
}
