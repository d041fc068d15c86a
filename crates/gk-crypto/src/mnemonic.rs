//! BIP-39 mnemonic handling and seed stretching
//!
//! A new identity starts from a 12-word English mnemonic (128 bits of
//! entropy). Validation checks the word count and wordlist membership only,
//! so phrases written down from the legacy client (which did not enforce the
//! BIP-39 checksum) still import.

use bip39::{Language, Mnemonic};
use rand::RngCore;
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{stretch, KdfParams};
use crate::SEED_SIZE;

/// Words in a Ghostkeys mnemonic.
pub const MNEMONIC_WORDS: usize = 12;

const ARGON2_SEED_SALT: &[u8] = b"ghostkeys-seed-v1";
const BIP39_SALT_PREFIX: &str = "mnemonic";
const BIP39_PBKDF2_ROUNDS: u32 = 2048;

/// Stretched seed bytes. Zeroized on drop.
#[derive(Clone)]
pub struct Seed {
    bytes: [u8; SEED_SIZE],
}

impl Seed {
    pub fn from_bytes(bytes: [u8; SEED_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SEED_SIZE] {
        &self.bytes
    }
}

impl Drop for Seed {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// How the mnemonic is turned into seed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedScheme {
    /// Argon2id over the normalized phrase, salted with a fixed label and the passphrase.
    Argon2id(KdfParams),
    /// Standard BIP-39 seed (PBKDF2-HMAC-SHA512, 2048 rounds).
    Bip39Pbkdf2,
}

impl Default for SeedScheme {
    fn default() -> Self {
        SeedScheme::Argon2id(KdfParams::default())
    }
}

/// Generate a fresh 12-word mnemonic.
pub fn generate_mnemonic() -> CryptoResult<String> {
    // 12 words = 128 bits of entropy
    let mut entropy = Zeroizing::new([0u8; 16]);
    rand::thread_rng().fill_bytes(&mut entropy[..]);

    let mnemonic = Mnemonic::from_entropy(&entropy[..])
        .map_err(|e| CryptoError::InvalidMnemonic(format!("generation failed: {e}")))?;
    Ok(mnemonic.to_string())
}

/// Check word count and wordlist membership; returns the normalized phrase
/// (lower-case, single spaces).
pub fn validate_mnemonic(phrase: &str) -> CryptoResult<String> {
    let words: Vec<String> = phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();

    if words.len() != MNEMONIC_WORDS {
        return Err(CryptoError::InvalidMnemonic(format!(
            "expected {MNEMONIC_WORDS} words, got {}",
            words.len()
        )));
    }

    let wordlist = Language::English.word_list();
    if let Some(pos) = words
        .iter()
        .position(|w| !wordlist.iter().any(|known| *known == w.as_str()))
    {
        // The word itself is secret material; report only its position.
        return Err(CryptoError::InvalidMnemonic(format!(
            "word {} is not in the wordlist",
            pos + 1
        )));
    }

    Ok(words.join(" "))
}

/// Validate `phrase` and stretch it into a seed.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str, scheme: &SeedScheme) -> CryptoResult<Seed> {
    let normalized = Zeroizing::new(validate_mnemonic(phrase)?);
    let mut bytes = [0u8; SEED_SIZE];

    match scheme {
        SeedScheme::Argon2id(params) => {
            let mut salt = Zeroizing::new(ARGON2_SEED_SALT.to_vec());
            salt.extend_from_slice(passphrase.as_bytes());
            stretch(normalized.as_bytes(), &salt, params, &mut bytes)?;
        }
        SeedScheme::Bip39Pbkdf2 => {
            let salt = Zeroizing::new(format!("{BIP39_SALT_PREFIX}{passphrase}"));
            pbkdf2::pbkdf2_hmac::<Sha512>(
                normalized.as_bytes(),
                salt.as_bytes(),
                BIP39_PBKDF2_ROUNDS,
                &mut bytes,
            );
        }
    }

    Ok(Seed::from_bytes(bytes))
}
