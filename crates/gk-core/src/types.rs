use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GkError;

/// Number of columns the grid shows before any customization.
pub const DEFAULT_COLUMN_COUNT: u32 = 50;

pub const USER_ID_PREFIX: &str = "UserID_";
pub const VAULT_ID_PREFIX: &str = "Vault_";

/// `UserID_<principal>`
pub type UserId = String;
/// `Vault_<vault address>`
pub type VaultId = String;

pub fn user_id_for(principal: &str) -> UserId {
    format!("{USER_ID_PREFIX}{principal}")
}

pub fn vault_id_for(address: &str) -> VaultId {
    format!("{VAULT_ID_PREFIX}{address}")
}

/// Address of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub row: u32,
    pub col: u32,
}

impl CellKey {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

impl FromStr for CellKey {
    type Err = GkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (row, col) = s
            .split_once(',')
            .ok_or_else(|| GkError::InvalidEdit(format!("cell key must be 'row,col': {s}")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| GkError::InvalidEdit(format!("cell key must be 'row,col': {s}")))
        };
        Ok(Self::new(parse(row)?, parse(col)?))
    }
}

/// Spreadsheet-style column label: A..Z, AA..AZ, BA..
pub fn default_column_name(index: u32) -> String {
    let mut n = index as u64 + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Column override. An empty name means "use the default label".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub hidden: bool,
}

impl ColumnMeta {
    pub fn is_default(&self) -> bool {
        self.name.is_empty() && !self.hidden
    }

    pub fn display_name(&self, index: u32) -> String {
        if self.name.is_empty() {
            default_column_name(index)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEntry {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for LoginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginEntry")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSite {
    pub name: String,
    pub entries: Vec<LoginEntry>,
}

/// A single record inside a vault, used to flag records that could not be
/// decrypted on the last pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordRef {
    Cell { row: u32, col: u32 },
    Column { index: u32 },
    Note { slot: u32 },
    LoginSite { slot: u32 },
}

impl RecordRef {
    pub fn cell(key: CellKey) -> Self {
        RecordRef::Cell {
            row: key.row,
            col: key.col,
        }
    }
}

/// Locally persisted identity profile.
///
/// The mnemonic is stored in the clear so the identity can be unlocked
/// without re-entry. Anyone with read access to the store can recover it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub principal: String,
    pub seed_phrase: String,
    pub active: bool,
    /// Unix timestamp (seconds)
    pub created_at: u64,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("user_id", &self.user_id)
            .field("principal", &self.principal)
            .field("seed_phrase", &"[REDACTED]")
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .finish()
    }
}
