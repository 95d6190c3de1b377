// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `rename_columns` — renames columns per an old→new mapping.

use super::parse_config;
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::{
    ExecutionOutcome, ExecutionScope, OptionDescription, Processor, ProcessorDescription, ProcessorFactory, Role,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

const PROCESSOR_TYPE: &str = "rename_columns";

#[derive(Debug, Deserialize)]
struct Config {
    source_stage: String,
    save_to_stage: String,
    mapping: BTreeMap<String, String>,
    #[serde(default)]
    overwrite: bool,
}

struct RenameColumnsProcessor {
    config: Config,
}

impl Processor for RenameColumnsProcessor {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome {
        let mut table = scope.stages.load(&self.config.source_stage)?;
        for (from, to) in &self.config.mapping {
            table
                .rename_column(from, to)
                .map_err(|_| RecipeError::ColumnNotFound(from.clone()))?;
        }
        let step_description = scope.step_description.clone();
        scope.stages.save(
            &self.config.save_to_stage,
            table,
            &step_description,
            "renamed columns",
            self.config.overwrite,
        )
    }
}

struct RenameColumnsFactory;

impl ProcessorFactory for RenameColumnsFactory {
    fn processor_type(&self) -> &'static str {
        PROCESSOR_TYPE
    }

    fn role(&self) -> Role {
        Role::Transform
    }

    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        let mapping_ok = config.get("mapping").and_then(JsonValue::as_object).map(|m| !m.is_empty()).unwrap_or(false);
        if !mapping_ok {
            return Err(RecipeError::Config("'mapping' must be a non-empty object".to_string()));
        }
        Ok(Box::new(RenameColumnsProcessor { config: parse_config(PROCESSOR_TYPE, config)? }))
    }

    fn minimal_config(&self) -> JsonValue {
        json!({"source_stage": "data", "save_to_stage": "renamed", "mapping": {"old_name": "new_name"}})
    }

    fn describe(&self) -> ProcessorDescription {
        ProcessorDescription {
            processor_type: PROCESSOR_TYPE,
            role: Role::Transform,
            summary: "Renames columns per an old-name to new-name mapping",
            options: vec![
                OptionDescription { name: "mapping", required: true, default: None, description: "map of existing column name to new name" },
            ],
        }
    }
}

pub fn factory() -> Box<dyn ProcessorFactory> {
    Box::new(RenameColumnsFactory)
}
