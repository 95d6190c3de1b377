// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Workbook (`.xlsx`/`.xlsm`/`.xlsb`/`.xls`) reading and writing (§4.1, §6.1).
//!
//! Reading goes through `calamine`, which handles every workbook dialect
//! uniformly including the legacy `.xls` format. Writing goes through
//! `rust_xlsxwriter`, which only targets the modern OOXML dialect — a write
//! to `.xls` is rejected before any file-system work happens.

use super::format::Format;
use calamine::{open_workbook_auto, Data, Reader};
use indexmap::IndexMap;
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::table::{Column, Table};
use recipe_domain::value::{CellValue, ColumnType};
use std::fs;
use std::path::Path;

/// Selects a sheet either by 1-based position or by name (§4.1).
#[derive(Debug, Clone)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(1)
    }
}

pub fn list_sheets(path: &Path) -> Result<Vec<String>> {
    let workbook =
        open_workbook_auto(path).map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
    Ok(workbook.sheet_names().to_vec())
}

fn resolve_sheet_name(sheet_names: &[String], selector: &SheetSelector, path: &Path) -> Result<String> {
    match selector {
        SheetSelector::Index(i) => sheet_names.get(i.saturating_sub(1)).cloned().ok_or_else(|| {
            RecipeError::io(
                path.display().to_string(),
                format!("sheet index {i} out of range ({} sheets)", sheet_names.len()),
            )
        }),
        SheetSelector::Name(name) => {
            if sheet_names.iter().any(|s| s == name) {
                Ok(name.clone())
            } else {
                Err(RecipeError::io(
                    path.display().to_string(),
                    format!("sheet '{name}' not found; available: {sheet_names:?}"),
                ))
            }
        }
    }
}

pub fn read_workbook(path: &Path, selector: &SheetSelector) -> Result<Table> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = resolve_sheet_name(&sheet_names, selector, path)?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_to_display).collect(),
        None => return Ok(Table::default()),
    };

    let mut raw_columns: Vec<Vec<Data>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx >= raw_columns.len() {
                break;
            }
            raw_columns[idx].push(cell.clone());
        }
        for col in raw_columns.iter_mut().skip(row.len()) {
            col.push(Data::Empty);
        }
    }

    let mut columns = Vec::with_capacity(headers.len());
    let mut data = Vec::with_capacity(headers.len());
    for (name, raw) in headers.into_iter().zip(raw_columns.into_iter()) {
        let values: Vec<CellValue> = raw.iter().map(cell_to_value).collect();
        let column_type = infer_column_type(&values);
        columns.push(Column { name, column_type });
        data.push(values);
    }

    Table::new(columns, data)
}

fn cell_to_display(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_to_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| CellValue::Date(d.date()))
            .unwrap_or_else(|| CellValue::String(cell.to_string())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(_) => CellValue::Null,
    }
}

/// Workbook cells are already typed by the reader, unlike the delimited
/// readers' string-first promotion; the column type is simply whichever
/// non-null type appears, defaulting to `String` on a mix.
fn infer_column_type(values: &[CellValue]) -> ColumnType {
    let mut found: Option<ColumnType> = None;
    for v in values {
        if v.is_null() {
            continue;
        }
        let t = v.column_type();
        match found {
            None => found = Some(t),
            Some(existing) if existing == t => {}
            Some(_) => return ColumnType::String,
        }
    }
    found.unwrap_or(ColumnType::Null)
}

pub fn read_workbook_format_check(format: Format, path: &Path, write: bool) -> Result<()> {
    if write && format == Format::WorkbookLegacy {
        return Err(RecipeError::io(
            path.display().to_string(),
            "legacy .xls is read-only; write to .xlsx/.xlsm instead".to_string(),
        ));
    }
    Ok(())
}

fn write_sheet(worksheet: &mut rust_xlsxwriter::Worksheet, table: &Table) -> Result<()> {
    for (col, column) in table.columns().iter().enumerate() {
        worksheet
            .write_string(0, col as u16, &column.name)
            .map_err(|e| RecipeError::Internal(e.to_string()))?;
    }
    for row in 0..table.row_count() {
        for col in 0..table.column_count() {
            let r = (row + 1) as u32;
            let c = col as u16;
            match table.cell(row, col) {
                CellValue::String(s) => worksheet.write_string(r, c, s),
                CellValue::Integer(i) => worksheet.write_number(r, c, *i as f64),
                CellValue::Float(f) => worksheet.write_number(r, c, *f),
                CellValue::Bool(b) => worksheet.write_boolean(r, c, *b),
                CellValue::Date(d) => worksheet.write_string(r, c, &d.to_string()),
                CellValue::Null => worksheet.write_blank(r, c, &rust_xlsxwriter::Format::default()),
            }
            .map_err(|e| RecipeError::Internal(e.to_string()))?;
        }
    }
    Ok(())
}

pub fn write_workbook(table: &Table, path: &Path, sheet_name: Option<&str>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
        }
    }

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    if let Some(name) = sheet_name {
        worksheet
            .set_name(name)
            .map_err(|e| RecipeError::Internal(e.to_string()))?;
    }
    write_sheet(worksheet, table)?;
    workbook
        .save(path)
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))
}

/// Writes every `(sheet_name, table)` pair in the map's iteration order,
/// which the caller is responsible for presenting in the desired sheet
/// order (an `IndexMap` rather than a `BTreeMap`, so insertion order is
/// preserved instead of being re-sorted alphabetically).
pub fn write_multi_sheet(
    sheets: &IndexMap<String, Table>,
    path: &Path,
    active_sheet: Option<&str>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
        }
    }

    let mut workbook = rust_xlsxwriter::Workbook::new();
    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(name)
            .map_err(|e| RecipeError::Internal(e.to_string()))?;
        write_sheet(worksheet, table)?;
        if Some(name.as_str()) == active_sheet {
            worksheet.set_active(true);
        }
    }
    workbook
        .save(path)
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))
}
