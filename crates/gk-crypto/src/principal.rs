//! Principals: public identifiers for identities and vaults
//!
//! Textual form: lower-case, unpadded base32 of `crc32_be(bytes) || bytes`,
//! split into groups of five characters joined by `-`.

use data_encoding::BASE32_NOPAD;
use sha2::{Digest, Sha224};
use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;

/// DER `SubjectPublicKeyInfo` header for a raw Ed25519 public key.
const ED25519_DER_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

const SELF_AUTHENTICATING_TAG: u8 = 0x02;
const DERIVED_TAG: u8 = 0x03;
const MAX_LEN: usize = 29;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal {
    bytes: Vec<u8>,
}

impl Principal {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() > MAX_LEN {
            return Err(CryptoError::InvalidPrincipal(format!(
                "{} bytes exceeds the {MAX_LEN}-byte limit",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Principal of an Ed25519 public key: `sha224(der(pubkey)) || 0x02`.
    pub fn self_authenticating(public_key: &[u8; 32]) -> Self {
        let mut hasher = Sha224::new();
        hasher.update(ED25519_DER_PREFIX);
        hasher.update(public_key);
        let mut bytes = hasher.finalize().to_vec();
        bytes.push(SELF_AUTHENTICATING_TAG);
        Self { bytes }
    }

    /// Principal minted from arbitrary seed material: `sha224(seed) || 0x03`.
    pub fn derived(seed: &[u8]) -> Self {
        let mut bytes = Sha224::digest(seed).to_vec();
        bytes.push(DERIVED_TAG);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut framed = Vec::with_capacity(4 + self.bytes.len());
        framed.extend_from_slice(&crc32fast::hash(&self.bytes).to_be_bytes());
        framed.extend_from_slice(&self.bytes);

        let encoded = BASE32_NOPAD.encode(&framed).to_ascii_lowercase();
        let grouped: Vec<&str> = encoded
            .as_bytes()
            .chunks(5)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        f.write_str(&grouped.join("-"))
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({self})")
    }
}

impl FromStr for Principal {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let framed = BASE32_NOPAD
            .decode(compact.to_ascii_uppercase().as_bytes())
            .map_err(|e| CryptoError::InvalidPrincipal(format!("'{s}': {e}")))?;
        if framed.len() < 4 {
            return Err(CryptoError::InvalidPrincipal(format!("'{s}' is too short")));
        }

        let (checksum, bytes) = framed.split_at(4);
        if checksum != crc32fast::hash(bytes).to_be_bytes() {
            return Err(CryptoError::InvalidPrincipal(format!(
                "'{s}' has a bad checksum"
            )));
        }

        let principal = Self::from_bytes(bytes)?;
        if principal.to_string() != s.to_ascii_lowercase() {
            return Err(CryptoError::InvalidPrincipal(format!(
                "'{s}' is not in canonical form"
            )));
        }
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_principals() {
        assert_eq!(Principal::from_bytes(&[]).unwrap().to_string(), "aaaaa-aa");
        assert_eq!(
            Principal::from_bytes(&[0x04]).unwrap().to_string(),
            "2vxsx-fae"
        );
    }

    #[test]
    fn self_authenticating_shape() {
        let p = Principal::self_authenticating(&[9u8; 32]);
        assert_eq!(p.as_bytes().len(), 29);
        assert_eq!(p.as_bytes()[28], 0x02);
        // 33 bytes framed -> 53 base32 chars -> 11 groups
        assert_eq!(p.to_string().split('-').count(), 11);
    }

    #[test]
    fn text_roundtrip() {
        let p = Principal::self_authenticating(&[42u8; 32]);
        let parsed: Principal = p.to_string().parse().unwrap();
        assert_eq!(parsed, p);
        assert_eq!("2vxsx-fae".parse::<Principal>().unwrap().as_bytes(), &[0x04]);
    }

    #[test]
    fn rejects_corrupted_text() {
        let text = Principal::self_authenticating(&[1u8; 32]).to_string();
        let mut chars: Vec<char> = text.chars().collect();
        chars[0] = if chars[0] == 'a' { 'b' } else { 'a' };
        let corrupted: String = chars.into_iter().collect();
        assert!(corrupted.parse::<Principal>().is_err());
        assert!("not-a-principal!".parse::<Principal>().is_err());
    }

    #[test]
    fn derived_differs_from_self_authenticating() {
        let seed = [5u8; 32];
        assert_ne!(Principal::derived(&seed), Principal::self_authenticating(&seed));
    }
}
