//! Vault records and the local editing model.
//!
//! Every collection in [`VaultData`] carries a side-set of committed keys:
//! keys the remote copy currently holds a non-default record for. Edits never
//! drop a committed key silently. They leave it either as an empty value in
//! the map or absent from the map while still committed, and the diff turns
//! both into tombstones.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GkError, GkResult};
use crate::types::{CellKey, ColumnMeta, LoginEntry, LoginSite, Note, RecordRef, UserId, VaultId};

/// A vault as persisted in the local record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub vault_id: VaultId,
    pub owner: UserId,
    pub vault_name: String,
    /// Textual vault address (the resource identifier keys are derived from)
    pub public_address: String,
    pub synced: bool,
    pub exists_remotely: bool,
    /// Last revision the remote acknowledged for this vault
    pub remote_revision: u64,
    /// Bumped on every local mutation
    pub generation: u64,
    pub data: VaultData,
}

impl Vault {
    pub fn new(vault_id: VaultId, owner: UserId, vault_name: String, public_address: String) -> Self {
        Self {
            vault_id,
            owner,
            vault_name,
            public_address,
            synced: false,
            exists_remotely: false,
            remote_revision: 0,
            generation: 0,
            data: VaultData::default(),
        }
    }

    /// Apply a mutation to the vault data. Successful edits mark the vault
    /// unsynced and bump its generation; failed ones leave it untouched.
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut VaultData) -> GkResult<T>) -> GkResult<T> {
        let out = f(&mut self.data)?;
        self.touch();
        Ok(out)
    }

    pub fn rename(&mut self, name: &str) -> GkResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GkError::InvalidEdit("vault name cannot be empty".into()));
        }
        self.vault_name = name.to_string();
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.synced = false;
    }
}

/// Sparse grid, column overrides, notes, and login sites, with commit markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultData {
    #[serde(with = "cell_entries")]
    pub cells: BTreeMap<CellKey, String>,
    pub committed_keys: BTreeSet<CellKey>,
    pub columns: BTreeMap<u32, ColumnMeta>,
    pub committed_columns: BTreeSet<u32>,
    pub notes: BTreeMap<u32, Note>,
    pub committed_notes: BTreeSet<u32>,
    pub login_sites: BTreeMap<u32, LoginSite>,
    pub committed_sites: BTreeSet<u32>,
    /// Records that failed to decrypt on the last pull
    pub unreadable: BTreeSet<RecordRef>,
}

impl VaultData {
    // ── Cells ────────────────────────────────────────────────────────────

    /// Non-empty value at `key`.
    pub fn cell(&self, key: CellKey) -> Option<&str> {
        self.cells
            .get(&key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set_cell(&mut self, key: CellKey, value: impl Into<String>) {
        let value = value.into();
        self.unreadable.remove(&RecordRef::cell(key));
        if !value.is_empty() {
            self.cells.insert(key, value);
        } else if self.committed_keys.contains(&key) {
            self.cells.insert(key, String::new());
        } else {
            self.cells.remove(&key);
        }
    }

    /// Clear every cell inside the inclusive rectangle spanned by `a` and `b`.
    pub fn clear_range(&mut self, a: CellKey, b: CellKey) {
        let (r0, r1) = (a.row.min(b.row), a.row.max(b.row));
        let (c0, c1) = (a.col.min(b.col), a.col.max(b.col));
        let keys: Vec<CellKey> = self
            .cells
            .keys()
            .filter(|k| (r0..=r1).contains(&k.row) && (c0..=c1).contains(&k.col))
            .copied()
            .collect();
        for key in keys {
            self.set_cell(key, "");
        }
    }

    /// Insert an empty row at `at`, shifting that row and everything below
    /// down by one. Committed keys vacated by the shift stay committed, so
    /// the next diff tombstones them.
    ///
    /// Refused while an unreadable cell sits in the shifted rows: its value
    /// cannot be re-sealed at the new key.
    pub fn insert_row(&mut self, at: u32) -> GkResult<()> {
        self.ensure_no_unreadable_cells_from(at)?;
        if self.cells.iter().any(|(k, v)| k.row == u32::MAX && !v.is_empty()) {
            return Err(GkError::InvalidEdit("row insert would shift past the last row".into()));
        }
        let mut next = BTreeMap::new();
        for (key, value) in std::mem::take(&mut self.cells) {
            if key.row < at {
                next.insert(key, value);
            } else if !value.is_empty() {
                next.insert(CellKey::new(key.row + 1, key.col), value);
            }
        }
        self.cells = next;
        Ok(())
    }

    /// Delete `count` rows starting at `start`; rows below move up.
    ///
    /// Committed keys in the deleted range, and committed keys whose values
    /// moved away, are left as tombstones at their original position unless
    /// a live value lands on the same key. Refused while an unreadable cell
    /// sits below the deleted range.
    pub fn delete_rows(&mut self, start: u32, count: u32) -> GkResult<()> {
        if count == 0 {
            return Ok(());
        }
        let end = start.saturating_add(count);
        self.ensure_no_unreadable_cells_from(end)?;
        let mut next = BTreeMap::new();
        let mut vacated = Vec::new();

        for (key, value) in std::mem::take(&mut self.cells) {
            if key.row < start {
                next.insert(key, value);
                continue;
            }
            if key.row >= end && !value.is_empty() {
                next.insert(CellKey::new(key.row - count, key.col), value);
            }
            if self.committed_keys.contains(&key) {
                vacated.push(key);
            }
        }
        for key in vacated {
            next.entry(key).or_default();
        }
        self.cells = next;
        self.unreadable.retain(|r| match r {
            RecordRef::Cell { row, .. } => !(start..end).contains(row),
            _ => true,
        });
        Ok(())
    }

    /// Clear the cells of `count` columns starting at `start`.
    pub fn clear_columns(&mut self, start: u32, count: u32) {
        let end = start.saturating_add(count);
        let keys: Vec<CellKey> = self
            .cells
            .keys()
            .filter(|k| (start..end).contains(&k.col))
            .copied()
            .collect();
        for key in keys {
            self.set_cell(key, "");
        }
    }

    /// Empty the grid. Committed cells become tombstones.
    pub fn clear_all(&mut self) {
        self.cells = self
            .committed_keys
            .iter()
            .map(|k| (*k, String::new()))
            .collect();
        self.unreadable
            .retain(|r| !matches!(r, RecordRef::Cell { .. }));
    }

    fn ensure_no_unreadable_cells_from(&self, row: u32) -> GkResult<()> {
        let stuck = self
            .unreadable
            .iter()
            .filter(|r| matches!(r, RecordRef::Cell { row: r0, .. } if *r0 >= row))
            .count();
        if stuck > 0 {
            return Err(GkError::InvalidEdit(format!(
                "{stuck} unreadable cell(s) from row {row} on would move; clear or overwrite them first"
            )));
        }
        Ok(())
    }

    // ── Columns ──────────────────────────────────────────────────────────

    pub fn column(&self, index: u32) -> ColumnMeta {
        self.columns.get(&index).cloned().unwrap_or_default()
    }

    /// Override a column's name and visibility. Naming a column after its
    /// default label is the same as leaving it unnamed.
    pub fn set_column(&mut self, index: u32, name: &str, hidden: bool) {
        let name = name.trim();
        let meta = ColumnMeta {
            name: if name == crate::types::default_column_name(index) {
                String::new()
            } else {
                name.to_string()
            },
            hidden,
        };
        self.unreadable.remove(&RecordRef::Column { index });
        if meta.is_default() && !self.committed_columns.contains(&index) {
            self.columns.remove(&index);
        } else {
            self.columns.insert(index, meta);
        }
    }

    pub fn reset_column(&mut self, index: u32) {
        self.set_column(index, "", false);
    }

    // ── Notes ────────────────────────────────────────────────────────────

    pub fn add_note(&mut self, title: &str, body: &str) -> u32 {
        let slot = next_slot(&self.notes, &self.committed_notes);
        self.notes.insert(
            slot,
            Note {
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        slot
    }

    pub fn update_note(&mut self, slot: u32, title: &str, body: &str) -> GkResult<()> {
        let note = self
            .notes
            .get_mut(&slot)
            .ok_or_else(|| GkError::NotFound(format!("note {slot}")))?;
        note.title = title.to_string();
        note.body = body.to_string();
        self.unreadable.remove(&RecordRef::Note { slot });
        Ok(())
    }

    pub fn remove_note(&mut self, slot: u32) -> GkResult<()> {
        self.notes
            .remove(&slot)
            .ok_or_else(|| GkError::NotFound(format!("note {slot}")))?;
        self.unreadable.remove(&RecordRef::Note { slot });
        Ok(())
    }

    // ── Login sites ──────────────────────────────────────────────────────

    pub fn add_login_site(&mut self, name: &str) -> GkResult<u32> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GkError::InvalidEdit("site name cannot be empty".into()));
        }
        let slot = next_slot(&self.login_sites, &self.committed_sites);
        self.login_sites.insert(
            slot,
            LoginSite {
                name: name.to_string(),
                entries: Vec::new(),
            },
        );
        Ok(slot)
    }

    pub fn rename_login_site(&mut self, slot: u32, name: &str) -> GkResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GkError::InvalidEdit("site name cannot be empty".into()));
        }
        self.site_mut(slot)?.name = name.to_string();
        Ok(())
    }

    pub fn remove_login_site(&mut self, slot: u32) -> GkResult<()> {
        self.login_sites
            .remove(&slot)
            .ok_or_else(|| GkError::NotFound(format!("login site {slot}")))?;
        self.unreadable.remove(&RecordRef::LoginSite { slot });
        Ok(())
    }

    /// Append a credential to a site; returns its position.
    pub fn add_login_entry(&mut self, slot: u32, login: &str, password: &str) -> GkResult<usize> {
        let site = self.site_mut(slot)?;
        site.entries.push(LoginEntry {
            login: login.to_string(),
            password: password.to_string(),
        });
        Ok(site.entries.len() - 1)
    }

    pub fn update_login_entry(
        &mut self,
        slot: u32,
        index: usize,
        login: &str,
        password: &str,
    ) -> GkResult<()> {
        let entry = self
            .site_mut(slot)?
            .entries
            .get_mut(index)
            .ok_or_else(|| GkError::NotFound(format!("login entry {slot}/{index}")))?;
        entry.login = login.to_string();
        entry.password = password.to_string();
        Ok(())
    }

    pub fn remove_login_entry(&mut self, slot: u32, index: usize) -> GkResult<()> {
        let site = self.site_mut(slot)?;
        if index >= site.entries.len() {
            return Err(GkError::NotFound(format!("login entry {slot}/{index}")));
        }
        site.entries.remove(index);
        Ok(())
    }

    fn site_mut(&mut self, slot: u32) -> GkResult<&mut LoginSite> {
        self.unreadable.remove(&RecordRef::LoginSite { slot });
        self.login_sites
            .get_mut(&slot)
            .ok_or_else(|| GkError::NotFound(format!("login site {slot}")))
    }

    // ── Commit markers ───────────────────────────────────────────────────

    /// The remote now holds the value sent for `key`.
    pub fn commit_cell(&mut self, key: CellKey) {
        self.committed_keys.insert(key);
    }

    /// A tombstone for `key` round-tripped. The local placeholder is dropped
    /// unless the user typed a new value in the meantime.
    pub fn settle_cell_tombstone(&mut self, key: CellKey) {
        self.committed_keys.remove(&key);
        if self.cells.get(&key).is_some_and(String::is_empty) {
            self.cells.remove(&key);
        }
    }

    pub fn commit_column(&mut self, index: u32) {
        self.committed_columns.insert(index);
    }

    pub fn settle_column_tombstone(&mut self, index: u32) {
        self.committed_columns.remove(&index);
        if self.columns.get(&index).is_some_and(ColumnMeta::is_default) {
            self.columns.remove(&index);
        }
    }

    pub fn commit_note(&mut self, slot: u32) {
        self.committed_notes.insert(slot);
    }

    pub fn settle_note_tombstone(&mut self, slot: u32) {
        self.committed_notes.remove(&slot);
    }

    pub fn commit_site(&mut self, slot: u32) {
        self.committed_sites.insert(slot);
    }

    pub fn settle_site_tombstone(&mut self, slot: u32) {
        self.committed_sites.remove(&slot);
    }

    /// Forget everything the remote was known to hold. Pending tombstones
    /// are dropped with the markers; the next sync pushes every live record.
    pub fn reset_commit_markers(&mut self) {
        self.committed_keys.clear();
        self.committed_columns.clear();
        self.committed_notes.clear();
        self.committed_sites.clear();
        self.cells.retain(|_, v| !v.is_empty());
        self.columns.retain(|_, meta| !meta.is_default());
    }

    /// True when any record kind still carries a commit marker.
    pub fn has_commit_markers(&self) -> bool {
        !(self.committed_keys.is_empty()
            && self.committed_columns.is_empty()
            && self.committed_notes.is_empty()
            && self.committed_sites.is_empty())
    }
}

/// First slot past every live or committed slot, so a new record never
/// reuses a slot that still owes the remote a tombstone.
fn next_slot<V>(live: &BTreeMap<u32, V>, committed: &BTreeSet<u32>) -> u32 {
    let max_live = live.keys().next_back().copied();
    let max_committed = committed.iter().next_back().copied();
    match max_live.max(max_committed) {
        Some(max) => max + 1,
        None => 0,
    }
}

/// JSON object keys must be strings, so cells persist as a list of entries.
mod cell_entries {
    use super::CellKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct EntryRef<'a> {
        row: u32,
        col: u32,
        value: &'a str,
    }

    #[derive(Deserialize)]
    struct Entry {
        row: u32,
        col: u32,
        value: String,
    }

    pub fn serialize<S: Serializer>(
        cells: &BTreeMap<CellKey, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(cells.iter().map(|(k, v)| EntryRef {
            row: k.row,
            col: k.col,
            value: v,
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<CellKey, String>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| (CellKey::new(e.row, e.col), e.value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: u32, col: u32) -> CellKey {
        CellKey::new(row, col)
    }

    /// Data with the given cells already acknowledged by the remote.
    fn committed(cells: &[((u32, u32), &str)]) -> VaultData {
        let mut data = VaultData::default();
        for ((r, c), v) in cells {
            data.set_cell(key(*r, *c), *v);
            data.commit_cell(key(*r, *c));
        }
        data
    }

    #[test]
    fn clearing_committed_cell_leaves_tombstone() {
        let mut data = committed(&[((2, 1), "x")]);
        data.set_cell(key(2, 1), "");
        assert_eq!(data.cells.get(&key(2, 1)).map(String::as_str), Some(""));
        assert_eq!(data.cell(key(2, 1)), None);
    }

    #[test]
    fn clearing_uncommitted_cell_removes_it() {
        let mut data = VaultData::default();
        data.set_cell(key(5, 0), "y");
        data.set_cell(key(5, 0), "");
        assert!(data.cells.is_empty());
    }

    #[test]
    fn clear_range_is_inclusive_and_order_independent() {
        let mut data = committed(&[((0, 0), "a"), ((1, 1), "b")]);
        data.set_cell(key(1, 2), "c");
        data.set_cell(key(3, 3), "d");
        data.clear_range(key(1, 2), key(0, 0));
        assert_eq!(data.cells.get(&key(0, 0)).map(String::as_str), Some(""));
        assert_eq!(data.cells.get(&key(1, 1)).map(String::as_str), Some(""));
        assert!(!data.cells.contains_key(&key(1, 2)));
        assert_eq!(data.cell(key(3, 3)), Some("d"));
    }

    #[test]
    fn insert_row_shifts_values_and_keeps_commit_markers() {
        let mut data = committed(&[((0, 0), "top"), ((2, 0), "mid"), ((3, 1), "low")]);
        data.insert_row(2).unwrap();

        assert_eq!(data.cell(key(0, 0)), Some("top"));
        assert_eq!(data.cell(key(3, 0)), Some("mid"));
        assert_eq!(data.cell(key(4, 1)), Some("low"));
        assert!(!data.cells.contains_key(&key(2, 0)));
        // vacated keys are still committed, so they owe the remote a tombstone
        assert!(data.committed_keys.contains(&key(2, 0)));
        assert!(data.committed_keys.contains(&key(3, 1)));
    }

    #[test]
    fn delete_rows_tombstones_original_positions() {
        let mut data = committed(&[((3, 0), "z"), ((4, 2), "below")]);
        data.set_cell(key(3, 1), "w");
        data.delete_rows(3, 1).unwrap();

        assert_eq!(data.cells.get(&key(3, 0)).map(String::as_str), Some(""));
        assert!(!data.cells.contains_key(&key(3, 1)));
        assert_eq!(data.cell(key(3, 2)), Some("below"));
        assert_eq!(data.cells.get(&key(4, 2)).map(String::as_str), Some(""));
    }

    #[test]
    fn delete_rows_cascade_keeps_live_values() {
        let mut data = committed(&[((4, 0), "a"), ((5, 0), "b")]);
        data.delete_rows(3, 1).unwrap();

        assert_eq!(data.cell(key(3, 0)), Some("a"));
        assert_eq!(data.cell(key(4, 0)), Some("b"));
        assert_eq!(data.cells.get(&key(5, 0)).map(String::as_str), Some(""));
    }

    #[test]
    fn row_shifts_refuse_to_move_unreadable_cells() {
        let mut data = committed(&[((0, 0), "keep"), ((5, 0), "<unreadable>")]);
        data.unreadable.insert(RecordRef::cell(key(5, 0)));
        let before = data.clone();

        assert!(matches!(data.delete_rows(3, 1), Err(GkError::InvalidEdit(_))));
        assert!(matches!(data.insert_row(5), Err(GkError::InvalidEdit(_))));
        assert_eq!(data, before);

        // shifts that leave it in place are fine
        data.insert_row(6).unwrap();
        data.delete_rows(6, 2).unwrap();
        // deleting its own row is an explicit delete
        data.delete_rows(5, 1).unwrap();
        assert!(data.unreadable.is_empty());
        assert_eq!(data.cells.get(&key(5, 0)).map(String::as_str), Some(""));
    }

    #[test]
    fn insert_row_refuses_to_push_past_last_row() {
        let mut data = VaultData::default();
        data.set_cell(key(u32::MAX, 0), "edge");
        assert!(data.insert_row(0).is_err());
        assert_eq!(data.cell(key(u32::MAX, 0)), Some("edge"));
    }

    #[test]
    fn clear_all_only_keeps_committed_tombstones() {
        let mut data = committed(&[((0, 0), "a")]);
        data.set_cell(key(1, 1), "b");
        data.clear_all();
        assert_eq!(data.cells.len(), 1);
        assert_eq!(data.cells.get(&key(0, 0)).map(String::as_str), Some(""));
    }

    #[test]
    fn default_column_override_is_dropped_unless_committed() {
        let mut data = VaultData::default();
        data.set_column(0, "Site", false);
        assert_eq!(data.column(0).display_name(0), "Site");
        data.set_column(0, "A", false);
        assert!(data.columns.is_empty());

        data.set_column(1, "User", false);
        data.commit_column(1);
        data.reset_column(1);
        assert_eq!(data.columns.get(&1), Some(&ColumnMeta::default()));
    }

    #[test]
    fn note_slots_skip_pending_tombstones() {
        let mut data = VaultData::default();
        let first = data.add_note("a", "1");
        data.commit_note(first);
        data.remove_note(first).unwrap();
        let second = data.add_note("b", "2");
        assert_ne!(first, second);
        assert!(data.update_note(first, "x", "y").is_err());
    }

    #[test]
    fn login_site_entries() {
        let mut data = VaultData::default();
        let slot = data.add_login_site("example.com").unwrap();
        let idx = data.add_login_entry(slot, "alice", "pw1").unwrap();
        data.update_login_entry(slot, idx, "alice", "pw2").unwrap();
        assert_eq!(data.login_sites[&slot].entries[0].password, "pw2");
        data.remove_login_entry(slot, idx).unwrap();
        assert!(data.login_sites[&slot].entries.is_empty());
        assert!(data.remove_login_entry(slot, 0).is_err());
        assert!(data.add_login_site("  ").is_err());
    }

    #[test]
    fn edit_marks_vault_unsynced_only_on_success() {
        let mut vault = Vault::new("Vault_x".into(), "UserID_u".into(), "v".into(), "x".into());
        vault.synced = true;
        assert!(vault.edit(|d| d.remove_note(9)).is_err());
        assert!(vault.synced);
        assert_eq!(vault.generation, 0);

        vault
            .edit(|d| {
                d.set_cell(CellKey::new(0, 0), "v");
                Ok(())
            })
            .unwrap();
        assert!(!vault.synced);
        assert_eq!(vault.generation, 1);
    }

    #[test]
    fn vault_data_json_roundtrip() {
        let mut data = committed(&[((2, 1), "x")]);
        data.set_cell(key(2, 1), "");
        data.set_column(3, "Notes", true);
        data.add_note("t", "b");
        data.unreadable.insert(RecordRef::Note { slot: 7 });

        let json = serde_json::to_string(&data).unwrap();
        let back: VaultData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn reset_commit_markers_drops_tombstones() {
        let mut data = committed(&[((0, 0), "keep"), ((1, 0), "gone")]);
        data.set_cell(key(1, 0), "");
        data.set_column(2, "Pw", false);
        data.commit_column(2);
        data.reset_column(2);
        let slot = data.add_note("t", "b");
        data.commit_note(slot);

        data.reset_commit_markers();
        assert!(!data.has_commit_markers());
        assert_eq!(data.cells.len(), 1);
        assert_eq!(data.cell(key(0, 0)), Some("keep"));
        assert!(data.columns.is_empty());
        assert!(data.notes.contains_key(&slot));
    }

    proptest::proptest! {
        #[test]
        fn insert_then_delete_row_restores_live_values(
            cells in proptest::collection::btree_map((0u32..20, 0u32..5), "[a-z]{1,4}", 0..30),
            at in 0u32..20,
        ) {
            let mut data = VaultData::default();
            for ((r, c), v) in &cells {
                data.set_cell(key(*r, *c), v.as_str());
            }
            let before: Vec<(CellKey, String)> = data.cells.clone().into_iter().collect();
            data.insert_row(at).unwrap();
            data.delete_rows(at, 1).unwrap();
            let after: Vec<(CellKey, String)> = data.cells.into_iter().collect();
            proptest::prop_assert_eq!(before, after);
        }
    }
}
