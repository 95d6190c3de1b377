// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Extension-to-format resolution (§6.1).

use std::path::Path;

/// The logical tabular format a path resolves to, independent of which crate
/// reads or writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.xlsx`, `.xlsm`, `.xlsb` — modern, multi-sheet, read/write.
    WorkbookModern,
    /// `.xls` — legacy workbook, read-only in practice.
    WorkbookLegacy,
    /// `.csv` — comma-separated.
    Csv,
    /// `.tsv` / `.txt` — tab-separated.
    Tsv,
}

impl Format {
    pub fn is_workbook(self) -> bool {
        matches!(self, Format::WorkbookModern | Format::WorkbookLegacy)
    }

    pub fn separator(self) -> u8 {
        match self {
            Format::Csv => b',',
            Format::Tsv => b'\t',
            Format::WorkbookModern | Format::WorkbookLegacy => b',',
        }
    }
}

/// Resolves a path to a [`Format`], honoring an `explicit` override first.
/// An unrecognized extension falls back to [`Format::WorkbookModern`] with a
/// caller-visible warning (logged by the caller, not here, since this
/// function has no side effects).
pub fn resolve_format(path: &Path, explicit: Option<Format>) -> (Format, bool) {
    if let Some(f) = explicit {
        return (f, false);
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("xlsx") | Some("xlsm") | Some("xlsb") => (Format::WorkbookModern, false),
        Some("xls") => (Format::WorkbookLegacy, false),
        Some("csv") => (Format::Csv, false),
        Some("tsv") | Some("txt") => (Format::Tsv, false),
        _ => (Format::WorkbookModern, true),
    }
}
