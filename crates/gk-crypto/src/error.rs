use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Wrong word count or a word outside the wordlist. Nothing was derived.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    /// Authentication failed, or the blob was malformed. Never partial output.
    #[error("field decryption failed")]
    Decryption,

    /// The remote key contribution could not be obtained.
    #[error("data key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}
