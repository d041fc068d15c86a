//! Sealing diffs for the wire and opening remote copies.

use gk_core::{CellKey, ColumnMeta, LoginEntry, LoginSite, Note, RecordRef, VaultData};
use gk_crypto::{open_or_empty, seal_or_empty, CryptoResult, DataKey};

use crate::diff::{Change, VaultDiff};
use crate::wire::{RemoteVaultData, WireCell, WireColumn, WireLoginEntry, WireLoginSite, WireNote};

/// Shown in place of a field that failed to decrypt.
pub const UNREADABLE_PLACEHOLDER: &str = "<unreadable>";

/// Seal every field of `diff` under `key`. Tombstones carry no ciphertext.
pub fn encrypt_diff(
    vault_name: &str,
    revision: u64,
    diff: &VaultDiff,
    key: &DataKey,
) -> CryptoResult<RemoteVaultData> {
    let mut out = RemoteVaultData {
        vault_name: seal_or_empty(vault_name, key)?,
        revision,
        ..Default::default()
    };

    for change in &diff.cells {
        let k = change.key();
        let value = match change {
            Change::Upsert(_, v) => seal_or_empty(v, key)?,
            Change::Tombstone(_) => String::new(),
        };
        out.cells.push(WireCell {
            row: k.row,
            col: k.col,
            value,
        });
    }

    for change in &diff.columns {
        out.columns.push(match change {
            Change::Upsert(index, meta) => WireColumn {
                index: *index,
                name: seal_or_empty(&meta.name, key)?,
                hidden: meta.hidden,
            },
            Change::Tombstone(index) => WireColumn {
                index: *index,
                name: String::new(),
                hidden: false,
            },
        });
    }

    for change in &diff.notes {
        out.notes.push(match change {
            Change::Upsert(slot, note) => WireNote {
                slot: *slot,
                title: seal_or_empty(&note.title, key)?,
                body: seal_or_empty(&note.body, key)?,
                deleted: false,
            },
            Change::Tombstone(slot) => WireNote {
                slot: *slot,
                title: String::new(),
                body: String::new(),
                deleted: true,
            },
        });
    }

    for change in &diff.login_sites {
        out.login_sites.push(match change {
            Change::Upsert(slot, site) => WireLoginSite {
                slot: *slot,
                name: seal_or_empty(&site.name, key)?,
                entries: site
                    .entries
                    .iter()
                    .map(|e| {
                        Ok(WireLoginEntry {
                            login: seal_or_empty(&e.login, key)?,
                            password: seal_or_empty(&e.password, key)?,
                        })
                    })
                    .collect::<CryptoResult<Vec<_>>>()?,
                deleted: false,
            },
            Change::Tombstone(slot) => WireLoginSite {
                slot: *slot,
                name: String::new(),
                entries: Vec::new(),
                deleted: true,
            },
        });
    }

    Ok(out)
}

/// A remote vault opened with its data key.
#[derive(Debug, Clone)]
pub struct DecodedVault {
    pub vault_name: String,
    pub revision: u64,
    /// Every record marked committed; unreadable ones flagged in `unreadable`
    pub data: VaultData,
    /// Fields that failed to decrypt (the vault name included)
    pub failed_fields: usize,
}

/// Open every field of a remote vault. A field that fails to decrypt is
/// replaced by [`UNREADABLE_PLACEHOLDER`] and its record is flagged; the
/// rest of the vault still loads.
pub fn decrypt_remote(remote: &RemoteVaultData, key: &DataKey) -> DecodedVault {
    let mut failed_fields = 0usize;
    let mut open = |blob: &str, failed: &mut bool| match open_or_empty(blob, key) {
        Ok(plain) => plain,
        Err(_) => {
            failed_fields += 1;
            *failed = true;
            UNREADABLE_PLACEHOLDER.to_string()
        }
    };

    let mut name_failed = false;
    let vault_name = open(&remote.vault_name, &mut name_failed);
    let mut data = VaultData::default();

    for cell in remote.cells.iter().filter(|c| !c.is_tombstone()) {
        let k = CellKey::new(cell.row, cell.col);
        let mut failed = false;
        let value = open(&cell.value, &mut failed);
        if failed {
            data.unreadable.insert(RecordRef::cell(k));
        }
        data.cells.insert(k, value);
        data.committed_keys.insert(k);
    }

    for column in remote.columns.iter().filter(|c| !c.is_tombstone()) {
        let mut failed = false;
        let name = open(&column.name, &mut failed);
        if failed {
            data.unreadable.insert(RecordRef::Column {
                index: column.index,
            });
        }
        data.columns.insert(
            column.index,
            ColumnMeta {
                name,
                hidden: column.hidden,
            },
        );
        data.committed_columns.insert(column.index);
    }

    for note in remote.notes.iter().filter(|n| !n.deleted) {
        let mut failed = false;
        let title = open(&note.title, &mut failed);
        let body = open(&note.body, &mut failed);
        if failed {
            data.unreadable.insert(RecordRef::Note { slot: note.slot });
        }
        data.notes.insert(note.slot, Note { title, body });
        data.committed_notes.insert(note.slot);
    }

    for site in remote.login_sites.iter().filter(|s| !s.deleted) {
        let mut failed = false;
        let name = open(&site.name, &mut failed);
        let entries = site
            .entries
            .iter()
            .map(|e| LoginEntry {
                login: open(&e.login, &mut failed),
                password: open(&e.password, &mut failed),
            })
            .collect();
        if failed {
            data.unreadable
                .insert(RecordRef::LoginSite { slot: site.slot });
        }
        data.login_sites.insert(site.slot, LoginSite { name, entries });
        data.committed_sites.insert(site.slot);
    }

    if failed_fields > 0 {
        tracing::warn!(
            failed_fields,
            records = data.unreadable.len(),
            "some vault fields could not be decrypted"
        );
    }

    DecodedVault {
        vault_name,
        revision: remote.revision,
        data,
        failed_fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compute_diff;
    use gk_crypto::encrypt_field;

    fn key(byte: u8) -> DataKey {
        DataKey::from_bytes([byte; 32])
    }

    fn sample() -> VaultData {
        let mut data = VaultData::default();
        data.set_cell(CellKey::new(0, 0), "github");
        data.set_cell(CellKey::new(0, 1), "hunter2");
        data.set_column(1, "Password", true);
        data.add_note("wifi", "correct horse");
        let site = data.add_login_site("example.com").unwrap();
        data.add_login_entry(site, "alice", "pw").unwrap();
        data
    }

    #[test]
    fn sealed_payload_hides_plaintext() {
        let payload = encrypt_diff("Personal", 1, &compute_diff(&sample()), &key(1)).unwrap();
        let json = serde_json::to_string(&payload).unwrap();
        for secret in ["Personal", "github", "hunter2", "Password", "correct horse", "alice"] {
            assert!(!json.contains(secret), "{secret} leaked onto the wire");
        }
        assert_eq!(payload.record_count(), 5);
    }

    #[test]
    fn decrypt_marks_everything_committed() {
        let data = sample();
        let payload = encrypt_diff("Personal", 4, &compute_diff(&data), &key(1)).unwrap();
        let mut stored = RemoteVaultData::default();
        stored.merge(payload);

        let decoded = decrypt_remote(&stored, &key(1));
        assert_eq!(decoded.vault_name, "Personal");
        assert_eq!(decoded.revision, 4);
        assert_eq!(decoded.failed_fields, 0);
        assert_eq!(decoded.data.cells, data.cells);
        assert_eq!(decoded.data.notes, data.notes);
        assert_eq!(decoded.data.login_sites, data.login_sites);
        assert_eq!(decoded.data.committed_keys.len(), 2);
        assert!(decoded.data.committed_columns.contains(&1));
        assert!(compute_diff(&decoded.data).upserts() > 0);
    }

    #[test]
    fn one_bad_field_does_not_hide_the_rest() {
        let data = sample();
        let mut payload = encrypt_diff("Personal", 1, &compute_diff(&data), &key(1)).unwrap();
        payload.cells[1].value = encrypt_field("foreign", &key(9)).unwrap();
        payload.notes[0].body = "not base64 at all".into();

        let decoded = decrypt_remote(&payload, &key(1));
        assert_eq!(decoded.failed_fields, 2);
        assert_eq!(decoded.data.cell(CellKey::new(0, 0)), Some("github"));
        assert_eq!(decoded.data.cell(CellKey::new(0, 1)), Some(UNREADABLE_PLACEHOLDER));
        assert_eq!(decoded.data.notes[&0].title, "wifi");
        assert_eq!(decoded.data.notes[&0].body, UNREADABLE_PLACEHOLDER);
        assert!(decoded
            .data
            .unreadable
            .contains(&RecordRef::cell(CellKey::new(0, 1))));
        assert!(decoded.data.unreadable.contains(&RecordRef::Note { slot: 0 }));

        let diff = compute_diff(&decoded.data);
        assert!(diff
            .cells
            .iter()
            .all(|c| c.key() != CellKey::new(0, 1)));
        assert!(diff.notes.is_empty());
    }

    #[test]
    fn hidden_column_without_name_is_not_a_tombstone() {
        let mut data = VaultData::default();
        data.set_column(2, "", true);
        let payload = encrypt_diff("v", 1, &compute_diff(&data), &key(1)).unwrap();
        assert_eq!(payload.columns.len(), 1);
        assert!(!payload.columns[0].is_tombstone());
    }
}
