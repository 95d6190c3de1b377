// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `add_subtotals` — inserts a grouped sum row after each run of rows
//! sharing the same `group_by` key, modeled on
//! `excel_recipe_processor/processors/add_subtotals_processor.py`'s
//! `after_group` positioning with `sum` aggregation.

use super::parse_config;
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::{
    ExecutionOutcome, ExecutionScope, OptionDescription, Processor, ProcessorDescription, ProcessorFactory, Role,
};
use recipe_domain::table::Table;
use recipe_domain::value::CellValue;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

const PROCESSOR_TYPE: &str = "add_subtotals";

#[derive(Debug, Deserialize)]
struct Config {
    source_stage: String,
    save_to_stage: String,
    group_by: Vec<String>,
    sum_columns: Vec<String>,
    label_column: Option<String>,
    #[serde(default = "default_label_template")]
    label_template: String,
    #[serde(default)]
    overwrite: bool,
}

fn default_label_template() -> String {
    "{group} Total".to_string()
}

fn sum_cells(cells: &[&CellValue]) -> CellValue {
    let mut int_sum: i64 = 0;
    let mut float_sum: f64 = 0.0;
    let mut saw_float = false;
    let mut saw_any = false;
    for cell in cells {
        match cell {
            CellValue::Integer(i) => {
                int_sum += i;
                saw_any = true;
            }
            CellValue::Float(f) => {
                float_sum += f;
                saw_float = true;
                saw_any = true;
            }
            CellValue::Null => {}
            _ => {}
        }
    }
    if !saw_any {
        return CellValue::Null;
    }
    if saw_float {
        CellValue::Float(float_sum + int_sum as f64)
    } else {
        CellValue::Integer(int_sum)
    }
}

fn add_subtotals(table: &Table, config: &Config) -> Result<Table> {
    let group_idxs: Vec<usize> = config
        .group_by
        .iter()
        .map(|c| table.column_index(c).ok_or_else(|| RecipeError::ColumnNotFound(c.clone())))
        .collect::<Result<_>>()?;
    let sum_idxs: Vec<usize> = config
        .sum_columns
        .iter()
        .map(|c| table.column_index(c).ok_or_else(|| RecipeError::ColumnNotFound(c.clone())))
        .collect::<Result<_>>()?;
    let label_idx = match &config.label_column {
        Some(c) => table.column_index(c).ok_or_else(|| RecipeError::ColumnNotFound(c.clone()))?,
        None => group_idxs[0],
    };

    let mut result = Table::empty(table.columns().to_vec());

    let mut start = 0usize;
    while start < table.row_count() {
        let mut end = start + 1;
        while end < table.row_count()
            && group_idxs.iter().all(|&idx| table.cell(start, idx) == table.cell(end, idx))
        {
            end += 1;
        }

        for row in start..end {
            result.push_row(table.row(row));
        }

        let group_label = table.cell(start, group_idxs[0]).display_string();
        let mut subtotal_row = table.row(start);
        for (col, value) in subtotal_row.iter_mut().enumerate() {
            if col == label_idx {
                *value = CellValue::String(config.label_template.replace("{group}", &group_label));
            } else if !group_idxs.contains(&col) {
                *value = CellValue::Null;
            }
        }
        for &idx in &sum_idxs {
            let cells: Vec<&CellValue> = (start..end).map(|row| table.cell(row, idx)).collect();
            subtotal_row[idx] = sum_cells(&cells);
        }
        result.push_row(subtotal_row);

        start = end;
    }

    Ok(result)
}

struct AddSubtotalsProcessor {
    config: Config,
}

impl Processor for AddSubtotalsProcessor {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome {
        let table = scope.stages.load(&self.config.source_stage)?;
        let result = add_subtotals(&table, &self.config)?;
        let step_description = scope.step_description.clone();
        scope.stages.save(
            &self.config.save_to_stage,
            result,
            &step_description,
            &format!("subtotaled by {:?}", self.config.group_by),
            self.config.overwrite,
        )
    }
}

struct AddSubtotalsFactory;

impl ProcessorFactory for AddSubtotalsFactory {
    fn processor_type(&self) -> &'static str {
        PROCESSOR_TYPE
    }

    fn role(&self) -> Role {
        Role::Transform
    }

    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        let parsed: Config = parse_config(PROCESSOR_TYPE, config)?;
        if parsed.group_by.is_empty() {
            return Err(RecipeError::Config("'group_by' must be a non-empty list".to_string()));
        }
        if parsed.sum_columns.is_empty() {
            return Err(RecipeError::Config("'sum_columns' must be a non-empty list".to_string()));
        }
        Ok(Box::new(AddSubtotalsProcessor { config: parsed }))
    }

    fn minimal_config(&self) -> JsonValue {
        json!({"source_stage": "data", "save_to_stage": "subtotaled", "group_by": ["Region"], "sum_columns": ["Amount"]})
    }

    fn describe(&self) -> ProcessorDescription {
        ProcessorDescription {
            processor_type: PROCESSOR_TYPE,
            role: Role::Transform,
            summary: "Inserts a grouped sum row after each run of rows sharing a group_by key",
            options: vec![
                OptionDescription { name: "group_by", required: true, default: None, description: "columns defining group boundaries; input must already be sorted by these" },
                OptionDescription { name: "sum_columns", required: true, default: None, description: "columns to sum within each group" },
                OptionDescription { name: "label_column", required: false, default: Some("first group_by column"), description: "column the subtotal label is written into" },
                OptionDescription { name: "label_template", required: false, default: Some("\"{group} Total\""), description: "label text; {group} is replaced with the group's key value" },
            ],
        }
    }
}

pub fn factory() -> Box<dyn ProcessorFactory> {
    Box::new(AddSubtotalsFactory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_manager::StageManager;
    use recipe_domain::table::Column;
    use recipe_domain::value::ColumnType;
    use recipe_domain::variables::VariableScope;

    fn sales() -> Table {
        Table::new(
            vec![
                Column { name: "Region".into(), column_type: ColumnType::String },
                Column { name: "Amount".into(), column_type: ColumnType::Integer },
            ],
            vec![
                vec![
                    CellValue::String("West".into()),
                    CellValue::String("West".into()),
                    CellValue::String("East".into()),
                ],
                vec![CellValue::Integer(100), CellValue::Integer(50), CellValue::Integer(200)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn inserts_one_subtotal_row_per_group() {
        let mut stages = StageManager::new(10);
        stages.save("source", sales(), "seed", "seed", false).unwrap();

        let processor = factory()
            .create(&BTreeMap::from([
                ("source_stage".to_string(), json!("source")),
                ("save_to_stage".to_string(), json!("totaled")),
                ("group_by".to_string(), json!(["Region"])),
                ("sum_columns".to_string(), json!(["Amount"])),
            ]))
            .unwrap();

        let variables = VariableScope::new();
        let step_config = BTreeMap::new();
        let mut scope = ExecutionScope {
            stages: &mut stages,
            variables: &variables,
            step_config: &step_config,
            step_index: 1,
            step_description: "subtotal".to_string(),
        };
        processor.execute(&mut scope).unwrap();

        let result = stages.load("totaled").unwrap();
        assert_eq!(result.row_count(), 5); // 2 west rows + subtotal + 1 east row + subtotal
        let amount_idx = result.column_index("Amount").unwrap();
        assert_eq!(result.cell(2, amount_idx), &CellValue::Integer(150));
        let region_idx = result.column_index("Region").unwrap();
        assert_eq!(result.cell(2, region_idx), &CellValue::String("West Total".into()));
    }

    #[test]
    fn empty_group_by_is_a_config_error() {
        let err = factory()
            .create(&BTreeMap::from([
                ("source_stage".to_string(), json!("source")),
                ("save_to_stage".to_string(), json!("totaled")),
                ("group_by".to_string(), json!([])),
                ("sum_columns".to_string(), json!(["Amount"])),
            ]))
            .unwrap_err();
        assert!(matches!(err, RecipeError::Config(_)));
    }
}
