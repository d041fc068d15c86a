//! Records written through the dispatch enum survive a reopen.

use gk_core::{CellKey, Vault};
use gk_store::{RecordStore, StoreBackend};

#[test]
fn vault_with_markers_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("store.json");

    let mut vault = Vault::new(
        "Vault_x".into(),
        "UserID_u".into(),
        "Personal".into(),
        "x".into(),
    );
    vault.data.set_cell(CellKey::new(2, 1), "x");
    vault.data.commit_cell(CellKey::new(2, 1));
    vault.data.set_cell(CellKey::new(2, 1), "");
    let slot = vault.data.add_note("wifi", "hunter2");

    {
        let mut store = StoreBackend::open(&path).unwrap();
        store.put_vault(&vault).unwrap();
    }

    let store = StoreBackend::open(&path).unwrap();
    let loaded = store.get_vault("Vault_x").unwrap().unwrap();
    assert!(loaded.data.committed_keys.contains(&CellKey::new(2, 1)));
    assert_eq!(loaded.data.cell(CellKey::new(2, 1)), None);
    assert_eq!(loaded.data.notes.get(&slot).map(|n| n.body.as_str()), Some("hunter2"));
}
