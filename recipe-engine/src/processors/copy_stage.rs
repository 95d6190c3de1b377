// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `copy_stage` — the minimal possible Transform: loads `source_stage` and
//! saves it unchanged to `save_to_stage`. Exists mainly as the smallest
//! fixture for the registry's own `describe()`/`minimal_config()` self-test.

use super::parse_config;
use recipe_domain::error::Result;
use recipe_domain::processor::{
    ExecutionOutcome, ExecutionScope, OptionDescription, Processor, ProcessorDescription, ProcessorFactory, Role,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

const PROCESSOR_TYPE: &str = "copy_stage";

#[derive(Debug, Deserialize)]
struct Config {
    source_stage: String,
    save_to_stage: String,
    #[serde(default)]
    overwrite: bool,
}

struct CopyStageProcessor {
    config: Config,
}

impl Processor for CopyStageProcessor {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome {
        let table = scope.stages.load(&self.config.source_stage)?;
        let step_description = scope.step_description.clone();
        scope.stages.save(
            &self.config.save_to_stage,
            table,
            &step_description,
            "copied from another stage",
            self.config.overwrite,
        )
    }
}

struct CopyStageFactory;

impl ProcessorFactory for CopyStageFactory {
    fn processor_type(&self) -> &'static str {
        PROCESSOR_TYPE
    }

    fn role(&self) -> Role {
        Role::Transform
    }

    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        Ok(Box::new(CopyStageProcessor { config: parse_config(PROCESSOR_TYPE, config)? }))
    }

    fn minimal_config(&self) -> JsonValue {
        json!({"source_stage": "data", "save_to_stage": "copy"})
    }

    fn describe(&self) -> ProcessorDescription {
        ProcessorDescription {
            processor_type: PROCESSOR_TYPE,
            role: Role::Transform,
            summary: "Copies a stage's table unchanged to another stage name",
            options: vec![
                OptionDescription { name: "source_stage", required: true, default: None, description: "stage to read" },
                OptionDescription { name: "save_to_stage", required: true, default: None, description: "stage to write" },
                OptionDescription { name: "overwrite", required: false, default: Some("false"), description: "allow replacing an existing stage" },
            ],
        }
    }
}

pub fn factory() -> Box<dyn ProcessorFactory> {
    Box::new(CopyStageFactory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_manager::StageManager;
    use recipe_domain::table::{Column, Table};
    use recipe_domain::value::{CellValue, ColumnType};
    use recipe_domain::variables::VariableScope;

    fn sample() -> Table {
        Table::new(
            vec![Column { name: "id".into(), column_type: ColumnType::Integer }],
            vec![vec![CellValue::Integer(1)]],
        )
        .unwrap()
    }

    #[test]
    fn copies_the_stage_verbatim() {
        let mut stages = StageManager::new(10);
        stages.save("source", sample(), "seed", "seed data", false).unwrap();

        let processor = factory()
            .create(&BTreeMap::from([
                ("source_stage".to_string(), json!("source")),
                ("save_to_stage".to_string(), json!("copy")),
            ]))
            .unwrap();

        let variables = VariableScope::new();
        let config = BTreeMap::new();
        let mut scope = ExecutionScope {
            stages: &mut stages,
            variables: &variables,
            step_config: &config,
            step_index: 1,
            step_description: "copy it".to_string(),
        };
        processor.execute(&mut scope).unwrap();
        assert!(stages.exists("copy"));
    }
}
