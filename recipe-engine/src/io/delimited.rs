// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! CSV/TSV reading and writing (§4.1, §6.1).
//!
//! Readers parse every cell as a string first, then attempt per-column
//! numeric promotion: a column is promoted to `Integer`/`Float` only if
//! *every* non-null cell in it parses as that type, matching
//! `excel_recipe_processor/core/file_reader.py`'s `_convert_numeric_columns`.

use super::format::Format;
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::table::{Column, Table};
use recipe_domain::value::{CellValue, ColumnType};
use std::fs;
use std::path::Path;

/// Sentinel strings that map to [`CellValue::Null`] on read (§4.1).
const NULL_SENTINELS: &[&str] = &["", "NULL", "null", "N/A", "n/a", "NA", "None"];

fn is_null_sentinel(raw: &str) -> bool {
    NULL_SENTINELS.contains(&raw.trim())
}

pub fn read_delimited(path: &Path, format: Format) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.separator())
        .flexible(false)
        .from_path(path)
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
        for (idx, field) in record.iter().enumerate() {
            if idx >= raw_columns.len() {
                break;
            }
            raw_columns[idx].push(if is_null_sentinel(field) {
                None
            } else {
                Some(field.to_string())
            });
        }
    }
    // Pad any column that ended up short (ragged rows) with nulls.
    let row_count = raw_columns.iter().map(Vec::len).max().unwrap_or(0);
    for col in raw_columns.iter_mut() {
        while col.len() < row_count {
            col.push(None);
        }
    }

    let mut columns = Vec::with_capacity(headers.len());
    let mut data = Vec::with_capacity(headers.len());
    for (name, raw) in headers.into_iter().zip(raw_columns.into_iter()) {
        let (column_type, values) = promote_column(&raw);
        columns.push(Column { name, column_type });
        data.push(values);
    }

    Table::new(columns, data)
}

/// Promotes a raw string column to `Integer` or `Float` iff every non-null
/// cell parses as that type; otherwise the column stays `String`. An
/// all-null column is typed `Null`.
fn promote_column(raw: &[Option<String>]) -> (ColumnType, Vec<CellValue>) {
    let non_null: Vec<&str> = raw.iter().filter_map(|v| v.as_deref()).collect();

    if non_null.is_empty() {
        return (ColumnType::Null, raw.iter().map(|_| CellValue::Null).collect());
    }

    if non_null.iter().all(|s| s.parse::<i64>().is_ok()) {
        let values = raw
            .iter()
            .map(|v| match v {
                Some(s) => CellValue::Integer(s.parse().expect("checked above")),
                None => CellValue::Null,
            })
            .collect();
        return (ColumnType::Integer, values);
    }

    if non_null.iter().all(|s| s.parse::<f64>().is_ok()) {
        let values = raw
            .iter()
            .map(|v| match v {
                Some(s) => CellValue::Float(s.parse().expect("checked above")),
                None => CellValue::Null,
            })
            .collect();
        return (ColumnType::Float, values);
    }

    let values = raw
        .iter()
        .map(|v| match v {
            Some(s) => CellValue::String(s.clone()),
            None => CellValue::Null,
        })
        .collect();
    (ColumnType::String, values)
}

/// Renders a float to 6 significant digits, the writer default (§6.1),
/// mirroring `examples/original_source/excel_recipe_processor/core/file_writer.py`'s
/// `float_format='%.6g'`: fixed-point within a normal magnitude range,
/// scientific notation outside it (exponent < -4 or >= 6).
fn format_float(f: f64) -> String {
    const SIG_DIGITS: i32 = 6;
    if f == 0.0 {
        return "0".to_string();
    }
    if !f.is_finite() {
        return f.to_string();
    }

    let exponent = f.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= SIG_DIGITS {
        let decimals = (SIG_DIGITS - 1).max(0) as usize;
        let (mantissa, exp) = format!("{f:.decimals$e}")
            .split_once('e')
            .map(|(m, e)| (m.to_string(), e.to_string()))
            .expect("LowerExp always emits 'e'");
        return format!("{}e{exp}", trim_trailing_zeros(&mantissa));
    }

    let decimals = (SIG_DIGITS - 1 - exponent).max(0) as usize;
    trim_trailing_zeros(&format!("{f:.decimals$}"))
}

fn trim_trailing_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

pub fn write_delimited(table: &Table, path: &Path, format: Format) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.separator())
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;

    writer
        .write_record(table.columns().iter().map(|c| c.name.as_str()))
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;

    for row in 0..table.row_count() {
        let record: Vec<String> = (0..table.column_count())
            .map(|col| match table.cell(row, col) {
                CellValue::Float(f) => format_float(*f),
                other => other.display_string(),
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))?;
    }

    writer
        .flush()
        .map_err(|e| RecipeError::io(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mixed_non_numeric_cell_keeps_column_as_string() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(&path, "id,amount\n1,150\n2,not_a_number\n").unwrap();

        let table = read_delimited(&path, Format::Csv).unwrap();
        assert_eq!(table.columns()[0].column_type, ColumnType::Integer);
        assert_eq!(table.columns()[1].column_type, ColumnType::String);
    }

    #[test]
    fn null_sentinels_become_null_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(&path, "id,name\n1,NULL\n2,n/a\n3,Acme\n").unwrap();

        let table = read_delimited(&path, Format::Csv).unwrap();
        assert_eq!(table.cell(0, 1), &CellValue::Null);
        assert_eq!(table.cell(1, 1), &CellValue::Null);
        assert_eq!(table.cell(2, 1), &CellValue::String("Acme".into()));
    }

    #[test]
    fn all_null_column_promotes_to_null_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(&path, "id,empty\n1,\n2,NULL\n").unwrap();

        let table = read_delimited(&path, Format::Csv).unwrap();
        assert_eq!(table.columns()[1].column_type, ColumnType::Null);
    }

    #[test]
    fn format_float_keeps_six_significant_digits_not_six_decimal_places() {
        assert_eq!(format_float(75.5), "75.5");
        assert_eq!(format_float(0.3), "0.3");
        assert_eq!(format_float(1234567.5), "1.23457e6");
        assert_eq!(format_float(0.0000012345), "1.2345e-6");
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(-150.25), "-150.25");
    }

    #[test]
    fn round_trip_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = Table::new(
            vec![
                Column { name: "id".into(), column_type: ColumnType::Integer },
                Column { name: "amount".into(), column_type: ColumnType::Float },
            ],
            vec![
                vec![CellValue::Integer(1), CellValue::Integer(2)],
                vec![CellValue::Float(150.5), CellValue::Float(75.0)],
            ],
        )
        .unwrap();

        write_delimited(&table, &path, Format::Csv).unwrap();
        let reread = read_delimited(&path, Format::Csv).unwrap();
        assert_eq!(reread.row_count(), 2);
        assert_eq!(reread.cell(0, 1), &CellValue::Float(150.5));
    }
}
