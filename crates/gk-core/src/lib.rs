pub mod config;
pub mod error;
pub mod grid;
pub mod types;
pub mod vault;

pub use error::{GkError, GkResult};
pub use types::{CellKey, ColumnMeta, LoginEntry, LoginSite, Note, Profile, RecordRef};
pub use vault::{Vault, VaultData};
