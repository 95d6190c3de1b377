// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `filter_data` — keep or drop rows by a column/operator/value condition.

use super::parse_config;
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::{
    ExecutionOutcome, ExecutionScope, OptionDescription, Processor, ProcessorDescription, ProcessorFactory, Role,
};
use recipe_domain::value::CellValue;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

const PROCESSOR_TYPE: &str = "filter_data";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Contains,
    NotContains,
    IsNull,
    IsNotNull,
    InList,
}

#[derive(Debug, Deserialize)]
struct Config {
    source_stage: String,
    save_to_stage: String,
    column: String,
    condition: Operator,
    value: Option<JsonValue>,
    #[serde(default)]
    overwrite: bool,
}

fn json_to_cell(value: &JsonValue) -> CellValue {
    match value {
        JsonValue::Null => CellValue::Null,
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else {
                CellValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => CellValue::String(s.clone()),
        other => CellValue::String(other.to_string()),
    }
}

fn matches(cell: &CellValue, op: Operator, value: Option<&JsonValue>) -> Result<bool> {
    match op {
        Operator::IsNull => Ok(cell.is_null()),
        Operator::IsNotNull => Ok(!cell.is_null()),
        Operator::InList => {
            let list = value
                .and_then(JsonValue::as_array)
                .ok_or_else(|| RecipeError::Config("'in_list' requires a list 'value'".to_string()))?;
            Ok(list.iter().map(json_to_cell).any(|candidate| &candidate == cell))
        }
        Operator::Contains | Operator::NotContains => {
            let needle = value
                .and_then(JsonValue::as_str)
                .ok_or_else(|| RecipeError::Config(format!("'{op:?}' requires a string 'value'")))?;
            let contains = cell.display_string().contains(needle);
            Ok(if op == Operator::Contains { contains } else { !contains })
        }
        Operator::Equals | Operator::NotEquals | Operator::GreaterThan | Operator::LessThan | Operator::GreaterEqual | Operator::LessEqual => {
            let value = value.ok_or_else(|| RecipeError::Config(format!("'{op:?}' requires a 'value'")))?;
            let target = json_to_cell(value);
            let ord = cell.partial_cmp(&target);
            Ok(match op {
                Operator::Equals => cell == &target,
                Operator::NotEquals => cell != &target,
                Operator::GreaterThan => ord == Some(std::cmp::Ordering::Greater),
                Operator::LessThan => ord == Some(std::cmp::Ordering::Less),
                Operator::GreaterEqual => matches!(ord, Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)),
                Operator::LessEqual => matches!(ord, Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)),
                _ => unreachable!(),
            })
        }
    }
}

struct FilterDataProcessor {
    config: Config,
}

impl Processor for FilterDataProcessor {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome {
        let table = scope.stages.load(&self.config.source_stage)?;
        let col_idx = table
            .column_index(&self.config.column)
            .ok_or_else(|| RecipeError::ColumnNotFound(self.config.column.clone()))?;

        let mut error = None;
        let filtered = table.filter_rows(|row| {
            if error.is_some() {
                return false;
            }
            match matches(table.cell(row, col_idx), self.config.condition, self.config.value.as_ref()) {
                Ok(keep) => keep,
                Err(e) => {
                    error = Some(e);
                    false
                }
            }
        });
        if let Some(e) = error {
            return Err(e);
        }

        let step_description = scope.step_description.clone();
        scope.stages.save(
            &self.config.save_to_stage,
            filtered,
            &step_description,
            &format!("filtered where {} {:?}", self.config.column, self.config.condition),
            self.config.overwrite,
        )
    }
}

struct FilterDataFactory;

impl ProcessorFactory for FilterDataFactory {
    fn processor_type(&self) -> &'static str {
        PROCESSOR_TYPE
    }

    fn role(&self) -> Role {
        Role::Transform
    }

    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        Ok(Box::new(FilterDataProcessor { config: parse_config(PROCESSOR_TYPE, config)? }))
    }

    fn minimal_config(&self) -> JsonValue {
        json!({"source_stage": "data", "save_to_stage": "filtered", "column": "Status", "condition": "equals", "value": "Active"})
    }

    fn describe(&self) -> ProcessorDescription {
        ProcessorDescription {
            processor_type: PROCESSOR_TYPE,
            role: Role::Transform,
            summary: "Keeps rows matching a column/operator/value condition",
            options: vec![
                OptionDescription { name: "column", required: true, default: None, description: "column to test" },
                OptionDescription { name: "condition", required: true, default: None, description: "equals|not_equals|greater_than|less_than|greater_equal|less_equal|contains|not_contains|is_null|is_not_null|in_list" },
                OptionDescription { name: "value", required: false, default: None, description: "comparison value; required except for is_null/is_not_null" },
            ],
        }
    }
}

pub fn factory() -> Box<dyn ProcessorFactory> {
    Box::new(FilterDataFactory)
}
