use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level client configuration (loaded from ghostkeys.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GkConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub remote: RemoteConfig,
    pub crypto: CryptoConfig,
    pub sync: SyncConfig,
    /// Warn if the config file is world-readable (default: true)
    #[serde(default = "default_true")]
    pub config_file_mode_check: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Local record store path. A `.rocksdb` extension selects the RocksDB
    /// backend when built with the `rocksdb` feature.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// JSON file standing in for the custody service
    pub path: PathBuf,
}

/// How a mnemonic is stretched into seed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedSchemeKind {
    /// Memory-hard Argon2id stretching (default)
    Argon2id,
    /// Standard BIP-39 PBKDF2-HMAC-SHA512, for identities created by the legacy web client
    Bip39Pbkdf2,
}

/// Key derivation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub seed_scheme: SeedSchemeKind,
    /// Argon2id memory cost in KiB (default: 16384 = 16 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 2)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 1)
    pub argon2_parallelism: u32,
    /// Hardened-only derivation path for the identity key
    pub derivation_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retry limit for failed pushes (0 = never retry, the user re-triggers sync)
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Refuse to push when the remote revision moved since our last sync
    pub conflict_check: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/ghostkeys/store.json"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/ghostkeys/remote.json"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            seed_scheme: SeedSchemeKind::Argon2id,
            argon2_mem_cost_kib: 16384,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            derivation_path: "m/44'/223'/0'/0'/0'".into(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_base_delay_ms: 500,
            conflict_check: true,
        }
    }
}
