//! Commit-marker diff.
//!
//! For every record kind the outgoing diff holds:
//!   - an upsert for each live, readable record
//!   - a tombstone for each committed key whose local record is gone or
//!     back to default
//!
//! Records that were never committed and are empty or default are never
//! sent. Structural grid edits need no special case here: `VaultData`
//! already leaves vacated committed keys behind as tombstones.

use gk_core::{CellKey, ColumnMeta, LoginSite, Note, RecordRef, VaultData};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<K, V> {
    Upsert(K, V),
    Tombstone(K),
}

impl<K: Copy, V> Change<K, V> {
    pub fn key(&self) -> K {
        match self {
            Change::Upsert(k, _) | Change::Tombstone(k) => *k,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Change::Tombstone(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultDiff {
    pub cells: Vec<Change<CellKey, String>>,
    pub columns: Vec<Change<u32, ColumnMeta>>,
    pub notes: Vec<Change<u32, Note>>,
    pub login_sites: Vec<Change<u32, LoginSite>>,
}

impl VaultDiff {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.cells.len() + self.columns.len() + self.notes.len() + self.login_sites.len()
    }

    pub fn tombstones(&self) -> usize {
        self.cells.iter().filter(|c| c.is_tombstone()).count()
            + self.columns.iter().filter(|c| c.is_tombstone()).count()
            + self.notes.iter().filter(|c| c.is_tombstone()).count()
            + self.login_sites.iter().filter(|c| c.is_tombstone()).count()
    }

    pub fn upserts(&self) -> usize {
        self.len() - self.tombstones()
    }
}

/// Compute what the remote needs to converge to `data`.
pub fn compute_diff(data: &VaultData) -> VaultDiff {
    let mut cells = Vec::new();
    for (key, value) in &data.cells {
        if !value.is_empty() {
            if !data.unreadable.contains(&RecordRef::cell(*key)) {
                cells.push(Change::Upsert(*key, value.clone()));
            }
        } else if data.committed_keys.contains(key) {
            cells.push(Change::Tombstone(*key));
        }
    }
    for key in missing(&data.committed_keys, |k| data.cells.contains_key(k)) {
        cells.push(Change::Tombstone(key));
    }
    cells.sort_by_key(Change::key);

    let mut columns = Vec::new();
    for (index, meta) in &data.columns {
        if !meta.is_default() {
            if !data.unreadable.contains(&RecordRef::Column { index: *index }) {
                columns.push(Change::Upsert(*index, meta.clone()));
            }
        } else if data.committed_columns.contains(index) {
            columns.push(Change::Tombstone(*index));
        }
    }
    for index in missing(&data.committed_columns, |i| data.columns.contains_key(i)) {
        columns.push(Change::Tombstone(index));
    }
    columns.sort_by_key(Change::key);

    let mut notes: Vec<_> = data
        .notes
        .iter()
        .filter(|(slot, _)| !data.unreadable.contains(&RecordRef::Note { slot: **slot }))
        .map(|(slot, note)| Change::Upsert(*slot, note.clone()))
        .collect();
    for slot in missing(&data.committed_notes, |s| data.notes.contains_key(s)) {
        notes.push(Change::Tombstone(slot));
    }
    notes.sort_by_key(Change::key);

    let mut login_sites: Vec<_> = data
        .login_sites
        .iter()
        .filter(|(slot, _)| !data.unreadable.contains(&RecordRef::LoginSite { slot: **slot }))
        .map(|(slot, site)| Change::Upsert(*slot, site.clone()))
        .collect();
    for slot in missing(&data.committed_sites, |s| data.login_sites.contains_key(s)) {
        login_sites.push(Change::Tombstone(slot));
    }
    login_sites.sort_by_key(Change::key);

    VaultDiff {
        cells,
        columns,
        notes,
        login_sites,
    }
}

/// Committed keys with no local entry at all.
fn missing<K: Ord + Copy>(committed: &BTreeSet<K>, present: impl Fn(&K) -> bool) -> Vec<K> {
    committed.iter().filter(|k| !present(k)).copied().collect()
}

/// Settle commit markers after the remote acknowledged `diff`.
///
/// Applied to the vault's current data, which may have moved on since the
/// snapshot the diff was computed from: upserted keys become committed,
/// tombstoned keys leave the committed set and drop their local placeholder
/// unless a new value was typed in the meantime.
pub fn apply_success(data: &mut VaultData, diff: &VaultDiff) {
    for change in &diff.cells {
        match change {
            Change::Upsert(key, _) => data.commit_cell(*key),
            Change::Tombstone(key) => data.settle_cell_tombstone(*key),
        }
    }
    for change in &diff.columns {
        match change {
            Change::Upsert(index, _) => data.commit_column(*index),
            Change::Tombstone(index) => data.settle_column_tombstone(*index),
        }
    }
    for change in &diff.notes {
        match change {
            Change::Upsert(slot, _) => data.commit_note(*slot),
            Change::Tombstone(slot) => data.settle_note_tombstone(*slot),
        }
    }
    for change in &diff.login_sites {
        match change {
            Change::Upsert(slot, _) => data.commit_site(*slot),
            Change::Tombstone(slot) => data.settle_site_tombstone(*slot),
        }
    }
}
