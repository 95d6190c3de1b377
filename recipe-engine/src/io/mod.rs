// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The tabular I/O interface (§4.1, §6.1) the rest of the engine depends on.
//!
//! The core never imports `csv`/`calamine`/`rust_xlsxwriter` directly outside
//! this module; `import`/`export` processors call the free functions here,
//! which resolve format, dispatch to the delimited or workbook backend, and
//! normalize both into the same `Table`/error shape.

mod delimited;
mod format;
mod workbook;

pub use format::Format;
pub use workbook::SheetSelector;

use indexmap::IndexMap;
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::table::Table;
use std::fs;
use std::path::{Path, PathBuf};

/// Options accepted by [`read_table`]; every field is optional because the
/// overwhelming majority of recipe steps just name a path.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub sheet: Option<SheetSelector>,
    pub separator: Option<u8>,
    pub explicit_format: Option<Format>,
}

/// Options accepted by [`write_table`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub sheet: Option<String>,
    pub separator: Option<u8>,
    pub explicit_format: Option<Format>,
    pub create_backup: bool,
}

pub fn read_table(path: &Path, options: &ReadOptions) -> Result<Table> {
    let (fmt, fallback_warning) = format::resolve_format(path, options.explicit_format);
    if fallback_warning {
        tracing::warn!(path = %path.display(), "unrecognized extension, falling back to workbook format");
    }
    if fmt.is_workbook() {
        let selector = options.sheet.clone().unwrap_or_default();
        workbook::read_workbook(path, &selector)
    } else {
        delimited::read_delimited(path, apply_separator_override(fmt, options.separator))
    }
}

/// A delimited format honors an explicit separator override; workbook
/// formats ignore it (there is no separator concept for a cell grid).
fn apply_separator_override(fmt: Format, separator: Option<u8>) -> Format {
    match (fmt, separator) {
        (Format::Csv, Some(b'\t')) | (Format::Tsv, Some(b',')) => {
            // An explicit override always wins over the extension-derived
            // default, even when it flips comma<->tab.
            if separator == Some(b'\t') {
                Format::Tsv
            } else {
                Format::Csv
            }
        }
        _ => fmt,
    }
}

/// Writes `table` to `path`, returning the final resolved path. Creates the
/// parent directory if missing and, if `create_backup` is set, copies an
/// existing destination aside first (§4.1).
pub fn write_table(table: &Table, path: &Path, options: &WriteOptions) -> Result<PathBuf> {
    let (fmt, fallback_warning) = format::resolve_format(path, options.explicit_format);
    if fallback_warning {
        tracing::warn!(path = %path.display(), "unrecognized extension, falling back to workbook format");
    }
    workbook::read_workbook_format_check(fmt, path, true)?;

    if options.create_backup && path.exists() {
        backup_existing(path)?;
    }

    if fmt.is_workbook() {
        workbook::write_workbook(table, path, options.sheet.as_deref())?;
    } else {
        delimited::write_delimited(table, path, apply_separator_override(fmt, options.separator))?;
    }
    Ok(path.to_path_buf())
}

/// Writes a full workbook with one sheet per map entry, preserving the
/// map's iteration order (§4.1). Delimited formats have no multi-sheet
/// concept; calling this against a `.csv`/`.tsv` path is a config error.
pub fn write_multi_sheet(
    sheets: &IndexMap<String, Table>,
    path: &Path,
    create_backup: bool,
    active_sheet: Option<&str>,
) -> Result<PathBuf> {
    let (fmt, _) = format::resolve_format(path, None);
    if !fmt.is_workbook() {
        return Err(RecipeError::Config(format!(
            "write_multi_sheet requires a workbook path, got '{}'",
            path.display()
        )));
    }
    if create_backup && path.exists() {
        backup_existing(path)?;
    }
    workbook::write_multi_sheet(sheets, path, active_sheet)?;
    Ok(path.to_path_buf())
}

pub fn list_sheets(path: &Path) -> Result<Vec<String>> {
    workbook::list_sheets(path)
}

/// Copies `path` to `path.backup[N]` for the smallest non-colliding `N`.
fn backup_existing(path: &Path) -> Result<()> {
    let mut n = 1usize;
    let backup_path = loop {
        let candidate = PathBuf::from(format!("{}.backup{n}", path.display()));
        if !candidate.exists() {
            break candidate;
        }
        n += 1;
    };
    fs::copy(path, &backup_path).map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_domain::table::Column;
    use recipe_domain::value::{CellValue, ColumnType};
    use tempfile::tempdir;

    fn sample() -> Table {
        Table::new(
            vec![Column { name: "id".into(), column_type: ColumnType::Integer }],
            vec![vec![CellValue::Integer(1), CellValue::Integer(2)]],
        )
        .unwrap()
    }

    #[test]
    fn write_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/sub/out.csv");
        write_table(&sample(), &path, &WriteOptions::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn backup_uses_smallest_non_colliding_suffix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_table(&sample(), &path, &WriteOptions::default()).unwrap();
        write_table(
            &sample(),
            &path,
            &WriteOptions { create_backup: true, ..Default::default() },
        )
        .unwrap();
        assert!(dir.path().join("out.csv.backup1").exists());

        write_table(
            &sample(),
            &path,
            &WriteOptions { create_backup: true, ..Default::default() },
        )
        .unwrap();
        assert!(dir.path().join("out.csv.backup2").exists());
    }

    #[test]
    fn write_multi_sheet_rejects_delimited_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sheets = IndexMap::new();
        sheets.insert("Sheet1".to_string(), sample());
        let err = write_multi_sheet(&sheets, &path, false, None).unwrap_err();
        assert!(matches!(err, RecipeError::Config(_)));
    }
}
