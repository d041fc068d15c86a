//! Memory-hard stretching: Argon2id secret → seed bytes

use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::{CryptoError, CryptoResult};

/// Argon2id parameters for KDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 16384 = 16 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 2)
    pub time_cost: u32,
    /// Parallelism (default: 1)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // Lighter than a password KDF: a 12-word mnemonic carries 128 bits of entropy.
        Self {
            mem_cost_kib: 16384,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Fill `out` with Argon2id output over `secret` and `salt`.
///
/// The salt must be at least 8 bytes.
pub fn stretch(secret: &[u8], salt: &[u8], params: &KdfParams, out: &mut [u8]) -> CryptoResult<()> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(out.len()),
    )
    .map_err(|e| CryptoError::Kdf(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    argon2
        .hash_password_into(secret, salt, out)
        .map_err(|e| CryptoError::Kdf(format!("Argon2id failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_kdf_deterministic() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        stretch(b"test-secret", b"salt-salt", &fast(), &mut a).unwrap();
        stretch(b"test-secret", b"salt-salt", &fast(), &mut b).unwrap();
        assert_eq!(a, b, "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_salts() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        stretch(b"same", b"salt-one", &fast(), &mut a).unwrap();
        stretch(b"same", b"salt-two", &fast(), &mut b).unwrap();
        assert_ne!(a, b, "different salts must produce different output");
    }

    #[test]
    fn test_kdf_rejects_short_salt() {
        let mut out = [0u8; 32];
        assert!(matches!(
            stretch(b"secret", b"short", &fast(), &mut out),
            Err(CryptoError::Kdf(_))
        ));
    }
}
