//! Hardened-only Ed25519 hierarchical derivation (SLIP-0010 style)
//!
//! master = HMAC-SHA512(key = domain string, data = seed)
//! child  = HMAC-SHA512(key = chain code, data = 0x00 || key || ser32(index | 2^31))
//!
//! The left 32 bytes are the key, the right 32 the chain code. Ed25519 has no
//! public-parent derivation, so every segment must be hardened.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

/// Bit set on every hardened index.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Master-key domain string, kept compatible with identities created by the
/// legacy web client.
const MASTER_DOMAIN: &[u8] = b"ed25519 seed super level encryption";

type HmacSha512 = Hmac<Sha512>;

/// Parsed `m/a'/b'/...` path. Indices are stored without the hardened bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    indices: Vec<u32>,
}

impl DerivationPath {
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

impl FromStr for DerivationPath {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(CryptoError::InvalidPath(format!("'{s}' must start with 'm'")));
        }

        let mut indices = Vec::new();
        for segment in parts {
            let digits = segment.strip_suffix('\'').ok_or_else(|| {
                CryptoError::InvalidPath(format!("segment '{segment}' is not hardened"))
            })?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CryptoError::InvalidPath(format!(
                    "segment '{segment}' is not numeric"
                )));
            }
            let index: u32 = digits
                .parse()
                .ok()
                .filter(|i| *i < HARDENED_OFFSET)
                .ok_or_else(|| {
                    CryptoError::InvalidPath(format!("segment '{segment}' is out of range"))
                })?;
            indices.push(index);
        }

        if indices.is_empty() {
            return Err(CryptoError::InvalidPath(format!("'{s}' has no segments")));
        }
        Ok(Self { indices })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for index in &self.indices {
            write!(f, "/{index}'")?;
        }
        Ok(())
    }
}

/// A (key, chain code) pair. Zeroized on drop.
#[derive(Clone)]
pub struct ExtendedKey {
    key: [u8; KEY_SIZE],
    chain_code: [u8; KEY_SIZE],
}

impl ExtendedKey {
    pub fn master(seed: &[u8]) -> CryptoResult<Self> {
        Self::from_hmac(MASTER_DOMAIN, &[seed])
    }

    /// Hardened child at `index` (the hardened bit is added here).
    pub fn child(&self, index: u32) -> CryptoResult<Self> {
        if index >= HARDENED_OFFSET {
            return Err(CryptoError::InvalidPath(format!("index {index} is out of range")));
        }
        let ser = (index | HARDENED_OFFSET).to_be_bytes();
        Self::from_hmac(&self.chain_code, &[&[0u8][..], &self.key[..], &ser[..]])
    }

    pub fn derive(seed: &[u8], path: &DerivationPath) -> CryptoResult<Self> {
        path.indices()
            .iter()
            .try_fold(Self::master(seed)?, |parent, index| parent.child(*index))
    }

    pub fn key_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn chain_code(&self) -> &[u8; KEY_SIZE] {
        &self.chain_code
    }

    fn from_hmac(key: &[u8], data: &[&[u8]]) -> CryptoResult<Self> {
        let mut mac = <HmacSha512 as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::Kdf(format!("HMAC key: {e}")))?;
        for part in data {
            mac.update(part);
        }
        let mut out = mac.finalize().into_bytes();

        let mut ext = Self {
            key: [0u8; KEY_SIZE],
            chain_code: [0u8; KEY_SIZE],
        };
        ext.key.copy_from_slice(&out[..KEY_SIZE]);
        ext.chain_code.copy_from_slice(&out[KEY_SIZE..]);
        out.as_mut_slice().zeroize();
        Ok(ext)
    }
}

impl Drop for ExtendedKey {
    fn drop(&mut self) {
        self.key.zeroize();
        self.chain_code.zeroize();
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("key", &"[REDACTED]")
            .field("chain_code", &"[REDACTED]")
            .finish()
    }
}
