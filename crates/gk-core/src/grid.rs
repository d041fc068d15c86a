//! Delimited text import/export for the cell grid.

use crate::error::{GkError, GkResult};
use crate::types::CellKey;
use crate::vault::VaultData;

/// Paste CSV or TSV text into the grid with its top-left field at `origin`.
/// Tab-separated input is detected from the first line. Empty fields clear
/// the cell they land on. Returns the number of fields written.
pub fn import_delimited(data: &mut VaultData, text: &str, origin: CellKey) -> GkResult<usize> {
    let first_line = text.lines().next().unwrap_or_default();
    let delimiter = if first_line.contains('\t') { b'\t' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut written = 0;
    for (row_offset, record) in reader.records().enumerate() {
        let record = record.map_err(|e| GkError::InvalidEdit(format!("malformed input: {e}")))?;
        for (col_offset, field) in record.iter().enumerate() {
            let key = offset(origin, row_offset, col_offset).ok_or_else(|| {
                GkError::InvalidEdit(format!(
                    "field {row_offset},{col_offset} lands past the edge of the grid"
                ))
            })?;
            data.set_cell(key, field);
            written += 1;
        }
    }
    tracing::debug!(written, delimiter = %(delimiter as char).escape_default(), "imported delimited text");
    Ok(written)
}

fn offset(origin: CellKey, rows: usize, cols: usize) -> Option<CellKey> {
    let row = origin.row.checked_add(u32::try_from(rows).ok()?)?;
    let col = origin.col.checked_add(u32::try_from(cols).ok()?)?;
    Some(CellKey::new(row, col))
}

/// Render the inclusive rectangle spanned by `a` and `b` as TSV.
pub fn export_range(data: &VaultData, a: CellKey, b: CellKey) -> GkResult<String> {
    let (r0, r1) = (a.row.min(b.row), a.row.max(b.row));
    let (c0, c1) = (a.col.min(b.col), a.col.max(b.col));

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    for row in r0..=r1 {
        let record: Vec<&str> = (c0..=c1)
            .map(|col| data.cell(CellKey::new(row, col)).unwrap_or(""))
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| GkError::Store(format!("export: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| GkError::Store(format!("export: {e}")))?;
    String::from_utf8(bytes).map_err(|e| GkError::Store(format!("export: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_csv_at_origin() {
        let mut data = VaultData::default();
        let n = import_delimited(&mut data, "site,user\n\"a, b\",bob\n", CellKey::new(1, 2)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(data.cell(CellKey::new(1, 2)), Some("site"));
        assert_eq!(data.cell(CellKey::new(2, 2)), Some("a, b"));
        assert_eq!(data.cell(CellKey::new(2, 3)), Some("bob"));
    }

    #[test]
    fn detects_tabs_and_clears_on_empty_fields() {
        let mut data = VaultData::default();
        data.set_cell(CellKey::new(0, 1), "old");
        data.commit_cell(CellKey::new(0, 1));
        import_delimited(&mut data, "x\t\ty", CellKey::new(0, 0)).unwrap();
        assert_eq!(data.cell(CellKey::new(0, 0)), Some("x"));
        assert_eq!(data.cells.get(&CellKey::new(0, 1)).map(String::as_str), Some(""));
        assert_eq!(data.cell(CellKey::new(0, 2)), Some("y"));
    }

    #[test]
    fn rejects_fields_past_the_grid_edge() {
        let mut data = VaultData::default();
        let edge = CellKey::new(u32::MAX, 0);
        assert_eq!(import_delimited(&mut data, "a", edge).unwrap(), 1);
        assert!(matches!(
            import_delimited(&mut data, "a\nb", edge),
            Err(GkError::InvalidEdit(_))
        ));
        assert!(matches!(
            import_delimited(&mut data, "a,b", CellKey::new(0, u32::MAX)),
            Err(GkError::InvalidEdit(_))
        ));
    }

    #[test]
    fn exports_tsv() {
        let mut data = VaultData::default();
        data.set_cell(CellKey::new(0, 0), "a");
        data.set_cell(CellKey::new(1, 1), "d");
        let out = export_range(&data, CellKey::new(1, 1), CellKey::new(0, 0)).unwrap();
        assert_eq!(out, "a\t\n\td\n");
    }
}
