//! Ephemeral transport keys for vetKD requests
//!
//! Every key request carries a fresh public key so the service can bind the
//! contribution it returns to this caller. The contribution is used as the
//! service returns it and is never unwrapped client-side, so the secret half
//! has no use: it is dropped (and zeroized) as soon as the public key exists.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPublicKey([u8; 32]);

impl TransportPublicKey {
    /// A fresh public key whose secret is already gone.
    pub fn ephemeral() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        Self(secret.verifying_key().to_bytes())
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::VerifyingKey;

    #[test]
    fn each_key_is_fresh() {
        assert_ne!(TransportPublicKey::ephemeral(), TransportPublicKey::ephemeral());
    }

    #[test]
    fn key_is_a_valid_ed25519_point() {
        let bytes = TransportPublicKey::ephemeral().to_bytes();
        assert!(VerifyingKey::from_bytes(&bytes).is_ok());
    }
}
