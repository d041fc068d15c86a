use thiserror::Error;

pub type GkResult<T> = Result<T, GkError>;

#[derive(Debug, Error)]
pub enum GkError {
    #[error("store error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("config error: {0}")]
    Config(String),

    /// Leaving this vault would abandon edits that were never synced.
    #[error("vault {0} has unsynced changes; confirm to discard them")]
    UnsyncedChanges(String),

    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
