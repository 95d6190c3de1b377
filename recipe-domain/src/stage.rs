//! Stage value types: the named, typed slot that the (engine-level) stage
//! manager stores tables under. This module holds the data shapes only; the
//! mutable store itself (`StageManager`) lives in `recipe-engine` since it
//! is orchestrator-scoped runtime state, not a domain value.

use crate::table::Table;
use chrono::{DateTime, Utc};

/// Names a caller may never write to explicitly; reserved for the
/// orchestrator's own conventions (`input`/`output`/`current`) and for
/// processor config keys that refer to "the data flowing through" without
/// naming a stage (`data`).
pub const RESERVED_STAGE_NAMES: &[&str] = &["input", "output", "current", "data"];

pub fn is_reserved_stage_name(name: &str) -> bool {
    RESERVED_STAGE_NAMES.contains(&name)
}

/// Descriptive, non-authoritative information about a stage, recomputed on
/// every write. None of these fields participate in correctness; they exist
/// for diagnostics and the `list()` operation.
#[derive(Debug, Clone)]
pub struct StageMetadata {
    pub created_by_step: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: usize,
    pub approx_memory_bytes: usize,
}

impl StageMetadata {
    pub fn for_table(table: &Table, created_by_step: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            created_by_step: created_by_step.into(),
            description: description.into(),
            created_at: now,
            rows: table.row_count(),
            columns: table.column_count(),
            approx_memory_bytes: estimate_table_bytes(table),
        }
    }
}

/// A rough, intentionally approximate memory estimate: enough to flag a
/// stage that's grown unexpectedly large, not a precise accounting.
fn estimate_table_bytes(table: &Table) -> usize {
    const ASSUMED_BYTES_PER_CELL: usize = 24;
    table.row_count() * table.column_count() * ASSUMED_BYTES_PER_CELL
}

/// A named entry in the stage store.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub table: Table,
    pub metadata: StageMetadata,
    pub protected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_recognized() {
        assert!(is_reserved_stage_name("input"));
        assert!(is_reserved_stage_name("output"));
        assert!(is_reserved_stage_name("current"));
        assert!(is_reserved_stage_name("data"));
        assert!(!is_reserved_stage_name("customers"));
    }
}
