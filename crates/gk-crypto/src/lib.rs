//! gk-crypto: client-side key hierarchy for Ghostkeys vaults
//!
//! Every string a vault sends to the custody service is sealed with a data
//! key that needs both a locally derived seed and a contribution fetched from
//! the service. Neither side alone can decrypt.
//!
//! Key hierarchy:
//! ```text
//! Mnemonic (12 BIP-39 words)
//!   └── Seed (64 bytes, Argon2id or BIP-39 PBKDF2)
//!       └── Ed25519 Identity (hardened-only path, m/44'/223'/0'/0'/0')
//!           ├── Principal (self-authenticating, sha224(DER pubkey) || 0x02)
//!           └── Resource Seed (sha256(sign("ghostkeys-vault-key-v1:" || vault address)))
//!               └── Data Key = HKDF-SHA256(salt=sha256(protocol), resource seed || remote contribution)
//!                   └── Field AEAD: AES-256-GCM, nonce=random_96bit, blob=base64(nonce || ct || tag)
//! ```

pub mod combine;
pub mod error;
pub mod field;
pub mod identity;
pub mod kdf;
pub mod mnemonic;
pub mod principal;
pub mod resource;
pub mod slip10;
pub mod transport;

pub use combine::{combine_keys, DataKey, RemoteKeyContribution};
pub use error::{CryptoError, CryptoResult};
pub use field::{decrypt_field, encrypt_field, open_or_empty, seal_or_empty};
pub use identity::Identity;
pub use kdf::KdfParams;
pub use mnemonic::{generate_mnemonic, mnemonic_to_seed, validate_mnemonic, Seed, SeedScheme};
pub use principal::Principal;
pub use resource::{derive_resource_seed, vault_address, ResourceSeed};
pub use slip10::{DerivationPath, ExtendedKey};
pub use transport::TransportPublicKey;

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a stretched mnemonic seed
pub const SEED_SIZE: usize = 64;

/// Identity path used unless configuration overrides it.
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/223'/0'/0'/0'";
