//! The in-memory tabular value type shared between every stage, processor,
//! and tabular reader/writer.

use crate::error::{RecipeError, Result};
use crate::value::{CellValue, ColumnType};

/// A single named column: its header and its runtime-inferred type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// An ordered sequence of rows sharing a fixed, ordered set of named
/// columns.
///
/// Storage is column-major (`Vec<CellValue>` per column) rather than
/// row-major, because every processor in this crate (numeric promotion,
/// lookup-key normalization, subtotal aggregation) operates a column at a
/// time. A caller wanting row-major access uses [`Table::row`].
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Column>,
    data: Vec<Vec<CellValue>>,
    row_count: usize,
}

impl Table {
    /// Builds a table from column definitions and column-major data.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError::Internal`] if the column count doesn't match
    /// the data width, or if any column's values aren't all the same
    /// length.
    pub fn new(columns: Vec<Column>, data: Vec<Vec<CellValue>>) -> Result<Self> {
        if columns.len() != data.len() {
            return Err(RecipeError::Internal(format!(
                "table has {} column definitions but {} data columns",
                columns.len(),
                data.len()
            )));
        }
        let row_count = data.first().map(Vec::len).unwrap_or(0);
        for (col, values) in columns.iter().zip(data.iter()) {
            if values.len() != row_count {
                return Err(RecipeError::Internal(format!(
                    "column '{}' has {} values, expected {row_count}",
                    col.name,
                    values.len()
                )));
            }
        }
        Ok(Self {
            columns,
            data,
            row_count,
        })
    }

    pub fn empty(columns: Vec<Column>) -> Self {
        let data = columns.iter().map(|_| Vec::new()).collect();
        Self {
            columns,
            data,
            row_count: 0,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Borrowed access to a column's values, by index.
    pub fn column_values(&self, index: usize) -> &[CellValue] {
        &self.data[index]
    }

    /// Borrowed access to a column's values, by name.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError::ColumnNotFound`] if `name` is not a column.
    pub fn column_values_by_name(&self, name: &str) -> Result<&[CellValue]> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| RecipeError::ColumnNotFound(name.to_string()))?;
        Ok(self.column_values(idx))
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        &self.data[col][row]
    }

    /// A single row as an owned, row-major vector of cells.
    pub fn row(&self, index: usize) -> Vec<CellValue> {
        self.data.iter().map(|col| col[index].clone()).collect()
    }

    /// Appends a row. The caller is responsible for supplying one value per
    /// column, in column order; this is checked in debug builds via
    /// `debug_assert!` since it is always an internal-construction
    /// invariant, never user input.
    pub fn push_row(&mut self, values: Vec<CellValue>) {
        debug_assert_eq!(values.len(), self.columns.len());
        for (col, value) in self.data.iter_mut().zip(values.into_iter()) {
            col.push(value);
        }
        self.row_count += 1;
    }

    /// Renames a column in place. No-op if `from` isn't present and
    /// `must_exist` is false; otherwise returns [`RecipeError::ColumnNotFound`].
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let idx = self
            .column_index(from)
            .ok_or_else(|| RecipeError::ColumnNotFound(from.to_string()))?;
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    /// Replaces a column's values and type in place, or appends it as a new
    /// column if `name` doesn't already exist. Used by the lookup processor
    /// to land pulled-in columns, including the "pulled column wins on
    /// collision" rule from the lookup spec.
    pub fn set_column(&mut self, name: &str, column_type: ColumnType, values: Vec<CellValue>) {
        debug_assert_eq!(values.len(), self.row_count.max(values.len()));
        if let Some(idx) = self.column_index(name) {
            self.columns[idx].column_type = column_type;
            self.data[idx] = values;
        } else {
            self.columns.push(Column {
                name: name.to_string(),
                column_type,
            });
            self.data.push(values);
        }
    }

    /// Returns a new table containing only the rows for which `keep`
    /// returns true, preserving row order. Used by `filter_data` and by the
    /// join implementations to build unmatched-row subsets.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize) -> bool,
    {
        let mut data: Vec<Vec<CellValue>> = self.columns.iter().map(|_| Vec::new()).collect();
        let mut row_count = 0;
        for row in 0..self.row_count {
            if keep(row) {
                for (col_data, col) in data.iter_mut().zip(self.data.iter()) {
                    col_data.push(col[row].clone());
                }
                row_count += 1;
            }
        }
        Table {
            columns: self.columns.clone(),
            data,
            row_count,
        }
    }
}
