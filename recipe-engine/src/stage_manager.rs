// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The named, typed, in-memory table store (§4.3): `declare`, `save`,
//! `load`, `exists`, `list`, `cleanup`, the `max_stages` capacity check, and
//! the reserved-name / empty-table / copy-on-write invariants.

use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::StageStore;
use recipe_domain::stage::{is_reserved_stage_name, Stage, StageMetadata};
use recipe_domain::table::Table;
use std::collections::BTreeMap;

/// Default cap on concurrently-live stages when a recipe's
/// `settings.max_stages` is unset.
pub const DEFAULT_MAX_STAGES: usize = 25;

/// Orchestrator-scoped runtime state: the single writer-at-a-time table
/// store every step reads from and writes to (§5). Not `Clone`; there is
/// exactly one instance per run, owned by the orchestrator and passed to
/// processors by mutable reference through `ExecutionScope`.
#[derive(Debug)]
pub struct StageManager {
    stages: BTreeMap<String, Stage>,
    /// Names `declare`d but not yet populated by a write; these reserve a
    /// slot's protection flag and description without counting toward
    /// `max_stages` until the first `save`.
    declared: BTreeMap<String, (String, bool)>,
    max_stages: usize,
}

impl StageManager {
    pub fn new(max_stages: usize) -> Self {
        Self {
            stages: BTreeMap::new(),
            declared: BTreeMap::new(),
            max_stages,
        }
    }

    /// Pre-creates an empty, named slot. Does not count toward capacity
    /// until the slot's first write.
    pub fn declare(&mut self, name: &str, description: &str, protected: bool) -> Result<()> {
        if is_reserved_stage_name(name) {
            return Err(RecipeError::StageConflict(format!("'{name}' is a reserved stage name")));
        }
        self.declared.insert(name.to_string(), (description.to_string(), protected));
        Ok(())
    }

    /// Writes `table` under `name`, stamping fresh metadata.
    ///
    /// Fails if: `name` is reserved; `name` already exists and `overwrite`
    /// is false; `table` is empty; or writing a *new* name would exceed
    /// `max_stages`.
    pub fn save(
        &mut self,
        name: &str,
        table: Table,
        step_name: &str,
        description: &str,
        overwrite: bool,
    ) -> Result<()> {
        if is_reserved_stage_name(name) {
            return Err(RecipeError::StageConflict(format!("'{name}' is a reserved stage name")));
        }
        if table.is_empty() {
            return Err(RecipeError::StageConflict(format!(
                "refusing to save stage '{name}': table has no rows"
            )));
        }
        let already_protected = self.stages.get(name).map(|s| s.protected);
        if let Some(existing) = self.stages.get(name) {
            if existing.protected && !overwrite {
                return Err(RecipeError::StageConflict(format!(
                    "stage '{name}' is protected; pass overwrite=true to replace it"
                )));
            }
            if !existing.protected && !overwrite {
                return Err(RecipeError::StageConflict(format!(
                    "stage '{name}' already exists; pass overwrite=true to replace it"
                )));
            }
        } else if self.stages.len() >= self.max_stages {
            return Err(RecipeError::StageConflict(format!(
                "cannot create stage '{name}': at capacity ({} stages)",
                self.max_stages
            )));
        }

        let declared_protected = self.declared.remove(name).map(|(_, p)| p).unwrap_or(false);
        let protected = already_protected.unwrap_or(declared_protected);

        let metadata = StageMetadata::for_table(&table, step_name, description, chrono::Utc::now());
        self.stages.insert(
            name.to_string(),
            Stage {
                name: name.to_string(),
                table,
                metadata,
                protected,
            },
        );
        Ok(())
    }

    /// Returns a copy of the stored table. Callers mutating the result must
    /// not observe any change in the stage itself (§8: idempotent stage
    /// isolation).
    pub fn load(&self, name: &str) -> Result<Table> {
        self.stages
            .get(name)
            .map(|s| s.table.clone())
            .ok_or_else(|| RecipeError::StageNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn list(&self) -> BTreeMap<String, StageMetadata> {
        self.stages.iter().map(|(k, v)| (k.clone(), v.metadata.clone())).collect()
    }

    /// Releases every stage and pending declaration. Called unconditionally
    /// at teardown (§4.5 phase 5), success or failure.
    pub fn cleanup(&mut self) {
        self.stages.clear();
        self.declared.clear();
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl StageStore for StageManager {
    fn load(&self, name: &str) -> Result<Table> {
        StageManager::load(self, name)
    }

    fn save(
        &mut self,
        name: &str,
        table: Table,
        step_name: &str,
        description: &str,
        overwrite: bool,
    ) -> Result<()> {
        StageManager::save(self, name, table, step_name, description, overwrite)
    }

    fn exists(&self, name: &str) -> bool {
        StageManager::exists(self, name)
    }

    fn list(&self) -> BTreeMap<String, StageMetadata> {
        StageManager::list(self)
    }
}
