//! Wire records exchanged with the custody service.
//!
//! Every string field except the addressing keys is ciphertext. An empty
//! string is the tombstone for cells (`value`) and columns (`name` empty and
//! not hidden); notes and login sites carry an explicit `deleted` flag
//! because an empty note is a legitimate record.
//!
//! The same type serves as the pushed patch and as the stored full copy:
//! [`RemoteVaultData::merge`] is the server-side application of a patch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCell {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

impl WireCell {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireColumn {
    pub index: u32,
    pub name: String,
    pub hidden: bool,
}

impl WireColumn {
    pub fn is_tombstone(&self) -> bool {
        self.name.is_empty() && !self.hidden
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNote {
    pub slot: u32,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLoginEntry {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLoginSite {
    pub slot: u32,
    pub name: String,
    pub entries: Vec<WireLoginEntry>,
    #[serde(default)]
    pub deleted: bool,
}

/// A vault as the custody service sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVaultData {
    /// Sealed vault display name (empty in a patch that leaves it unchanged)
    pub vault_name: String,
    pub revision: u64,
    #[serde(default)]
    pub cells: Vec<WireCell>,
    #[serde(default)]
    pub columns: Vec<WireColumn>,
    #[serde(default)]
    pub notes: Vec<WireNote>,
    #[serde(default)]
    pub login_sites: Vec<WireLoginSite>,
}

impl RemoteVaultData {
    /// Apply a pushed patch: upserts replace records by key, tombstones
    /// delete them. The patch's revision becomes the stored revision.
    pub fn merge(&mut self, patch: RemoteVaultData) {
        if !patch.vault_name.is_empty() {
            self.vault_name = patch.vault_name;
        }
        self.revision = patch.revision;

        let mut cells: BTreeMap<(u32, u32), WireCell> = std::mem::take(&mut self.cells)
            .into_iter()
            .map(|c| ((c.row, c.col), c))
            .collect();
        for cell in patch.cells {
            if cell.is_tombstone() {
                cells.remove(&(cell.row, cell.col));
            } else {
                cells.insert((cell.row, cell.col), cell);
            }
        }
        self.cells = cells.into_values().collect();

        let mut columns: BTreeMap<u32, WireColumn> = std::mem::take(&mut self.columns)
            .into_iter()
            .map(|c| (c.index, c))
            .collect();
        for column in patch.columns {
            if column.is_tombstone() {
                columns.remove(&column.index);
            } else {
                columns.insert(column.index, column);
            }
        }
        self.columns = columns.into_values().collect();

        let mut notes: BTreeMap<u32, WireNote> = std::mem::take(&mut self.notes)
            .into_iter()
            .map(|n| (n.slot, n))
            .collect();
        for note in patch.notes {
            if note.deleted {
                notes.remove(&note.slot);
            } else {
                notes.insert(note.slot, note);
            }
        }
        self.notes = notes.into_values().collect();

        let mut sites: BTreeMap<u32, WireLoginSite> = std::mem::take(&mut self.login_sites)
            .into_iter()
            .map(|s| (s.slot, s))
            .collect();
        for site in patch.login_sites {
            if site.deleted {
                sites.remove(&site.slot);
            } else {
                sites.insert(site.slot, site);
            }
        }
        self.login_sites = sites.into_values().collect();
    }

    pub fn record_count(&self) -> usize {
        self.cells.len() + self.columns.len() + self.notes.len() + self.login_sites.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(row: u32, col: u32, value: &str) -> WireCell {
        WireCell {
            row,
            col,
            value: value.into(),
        }
    }

    #[test]
    fn merge_applies_upserts_and_tombstones() {
        let mut stored = RemoteVaultData {
            vault_name: "name-v1".into(),
            revision: 1,
            cells: vec![cell(0, 0, "a"), cell(2, 1, "x")],
            ..Default::default()
        };

        stored.merge(RemoteVaultData {
            vault_name: String::new(),
            revision: 2,
            cells: vec![cell(2, 1, ""), cell(3, 3, "new")],
            columns: vec![WireColumn {
                index: 4,
                name: String::new(),
                hidden: true,
            }],
            notes: vec![WireNote {
                slot: 0,
                title: "t".into(),
                body: String::new(),
                deleted: false,
            }],
            ..Default::default()
        });

        assert_eq!(stored.vault_name, "name-v1");
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.cells, vec![cell(0, 0, "a"), cell(3, 3, "new")]);
        assert_eq!(stored.columns.len(), 1);
        assert_eq!(stored.notes.len(), 1);

        stored.merge(RemoteVaultData {
            revision: 3,
            columns: vec![WireColumn {
                index: 4,
                name: String::new(),
                hidden: false,
            }],
            notes: vec![WireNote {
                slot: 0,
                title: String::new(),
                body: String::new(),
                deleted: true,
            }],
            ..Default::default()
        });
        assert!(stored.columns.is_empty());
        assert!(stored.notes.is_empty());
        assert_eq!(stored.record_count(), 2);
    }
}
