//! Per-field AES-256-GCM encryption
//!
//! Blob format (base64, standard alphabet, padded):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! Every field gets its own nonce. The empty string is the wire tombstone
//! and is passed through unencrypted by [`seal_or_empty`].

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

use crate::combine::DataKey;
use crate::error::{CryptoError, CryptoResult};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypt one string field under `key`.
pub fn encrypt_field(plaintext: &str, key: &DataKey) -> CryptoResult<String> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("field encryption failed: {e}")))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a blob produced by [`encrypt_field`]. Any malformed, truncated,
/// tampered, or foreign-keyed blob yields [`CryptoError::Decryption`].
pub fn decrypt_field(blob: &str, key: &DataKey) -> CryptoResult<String> {
    let raw = STANDARD
        .decode(blob.trim())
        .map_err(|_| CryptoError::Decryption)?;
    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption);
    }

    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
}

/// Encrypt unless the value is the empty tombstone.
pub fn seal_or_empty(plaintext: &str, key: &DataKey) -> CryptoResult<String> {
    if plaintext.is_empty() {
        Ok(String::new())
    } else {
        encrypt_field(plaintext, key)
    }
}

/// Inverse of [`seal_or_empty`].
pub fn open_or_empty(blob: &str, key: &DataKey) -> CryptoResult<String> {
    if blob.is_empty() {
        Ok(String::new())
    } else {
        decrypt_field(blob, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(byte: u8) -> DataKey {
        DataKey::from_bytes([byte; 32])
    }

    #[test]
    fn roundtrip() {
        let blob = encrypt_field("hunter2", &key(1)).unwrap();
        assert_eq!(decrypt_field(&blob, &key(1)).unwrap(), "hunter2");
    }

    #[test]
    fn empty_plaintext_still_encrypts() {
        let blob = encrypt_field("", &key(1)).unwrap();
        assert!(!blob.is_empty());
        assert_eq!(decrypt_field(&blob, &key(1)).unwrap(), "");
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let a = encrypt_field("same", &key(1)).unwrap();
        let b = encrypt_field("same", &key(1)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let blob = encrypt_field("secret", &key(1)).unwrap();
        assert!(matches!(decrypt_field(&blob, &key(2)), Err(CryptoError::Decryption)));
    }

    #[test]
    fn truncated_and_garbage_fail() {
        let blob = encrypt_field("secret", &key(1)).unwrap();
        let raw = STANDARD.decode(&blob).unwrap();
        let short = STANDARD.encode(&raw[..NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(decrypt_field(&short, &key(1)), Err(CryptoError::Decryption)));
        assert!(matches!(decrypt_field("%%%", &key(1)), Err(CryptoError::Decryption)));
        assert!(matches!(decrypt_field("", &key(1)), Err(CryptoError::Decryption)));
    }

    #[test]
    fn tombstone_passthrough() {
        assert_eq!(seal_or_empty("", &key(1)).unwrap(), "");
        assert_eq!(open_or_empty("", &key(1)).unwrap(), "");
        let blob = seal_or_empty("x", &key(1)).unwrap();
        assert_eq!(open_or_empty(&blob, &key(1)).unwrap(), "x");
    }

    proptest! {
        #[test]
        fn roundtrip_any_string(s in ".*", k in any::<[u8; 32]>()) {
            let key = DataKey::from_bytes(k);
            let blob = encrypt_field(&s, &key).unwrap();
            prop_assert_eq!(decrypt_field(&blob, &key).unwrap(), s);
        }

        #[test]
        fn any_bit_flip_is_detected(s in ".{0,64}", bit in any::<usize>()) {
            let key = key(7);
            let blob = encrypt_field(&s, &key).unwrap();
            let mut raw = STANDARD.decode(&blob).unwrap();
            let bit = bit % (raw.len() * 8);
            raw[bit / 8] ^= 1 << (bit % 8);
            let tampered = STANDARD.encode(&raw);
            prop_assert!(matches!(decrypt_field(&tampered, &key), Err(CryptoError::Decryption)));
        }
    }
}
