// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `lookup_data` — the representative transform. Joins columns pulled from a
//! lookup table onto a main table by a normalized key, modeled on
//! `excel_recipe_processor/processors/lookup_data_processor.py`'s
//! `_perform_lookup`, generalized to all four join types rather than just
//! the original's left/inner pair.

use super::parse_config;
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::{
    ExecutionOutcome, ExecutionScope, OptionDescription, Processor, ProcessorDescription, ProcessorFactory, Role,
};
use recipe_domain::table::{Column, Table};
use recipe_domain::value::{CellValue, ColumnType};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

const PROCESSOR_TYPE: &str = "lookup_data";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum JoinType {
    Left,
    Right,
    Inner,
    Outer,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DuplicatePolicy {
    First,
    Last,
    Error,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefaultValue {
    Scalar(JsonValue),
    PerColumn(BTreeMap<String, JsonValue>),
}

#[derive(Debug, Deserialize)]
struct Config {
    source_stage: String,
    lookup_stage: String,
    match_col_in_main_data: String,
    match_col_in_lookup_data: String,
    lookup_columns: Vec<String>,
    save_to_stage: String,
    #[serde(default = "default_join_type")]
    join_type: JoinType,
    #[serde(default = "default_duplicate_policy")]
    handle_duplicates: DuplicatePolicy,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default = "default_true")]
    normalize_keys: bool,
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    suffix: String,
    default_value: Option<DefaultValue>,
    #[serde(default)]
    overwrite: bool,
}

fn default_join_type() -> JoinType {
    JoinType::Left
}

fn default_duplicate_policy() -> DuplicatePolicy {
    DuplicatePolicy::First
}

fn default_true() -> bool {
    true
}

/// Reduces a cell to its join-comparison key, applying the normalization
/// rules in order: string conversion, integral re-render, ASCII trim,
/// literal `"nan"` to null, and optional case folding. `Null` short-circuits
/// to "no key" before any string work happens.
pub fn normalize_key(cell: &CellValue, normalize: bool, case_sensitive: bool) -> Option<String> {
    if cell.is_null() {
        return None;
    }
    if !normalize {
        let raw = cell.display_string();
        return if case_sensitive { Some(raw) } else { Some(raw.to_lowercase()) };
    }

    let mut key = match cell {
        CellValue::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
        CellValue::Integer(i) => i.to_string(),
        other => other.display_string(),
    };
    key = key.trim().to_string();
    if key == "nan" {
        return None;
    }
    if !case_sensitive {
        key = key.to_lowercase();
    }
    Some(key)
}

/// One lookup-side bucket after `handle_duplicates` has been applied: at
/// most one row index per normalized key.
fn build_lookup_index(
    lookup: &Table,
    key_col: usize,
    normalize: bool,
    case_sensitive: bool,
    policy: DuplicatePolicy,
) -> Result<BTreeMap<String, usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for row in 0..lookup.row_count() {
        if let Some(key) = normalize_key(lookup.cell(row, key_col), normalize, case_sensitive) {
            groups.entry(key).or_default().push(row);
        }
    }

    let mut duplicated = Vec::new();
    let mut index = BTreeMap::new();
    for (key, rows) in groups {
        if rows.len() > 1 {
            duplicated.push(key.clone());
        }
        let chosen = match policy {
            DuplicatePolicy::First => rows[0],
            DuplicatePolicy::Last => *rows.last().unwrap(),
            DuplicatePolicy::Error => rows[0],
        };
        index.insert(key, chosen);
    }

    if policy == DuplicatePolicy::Error && !duplicated.is_empty() {
        duplicated.sort();
        return Err(RecipeError::DuplicateKey(duplicated));
    }

    Ok(index)
}

fn renamed_pulled_columns(config: &Config) -> Vec<String> {
    config
        .lookup_columns
        .iter()
        .map(|name| format!("{}{name}{}", config.prefix, config.suffix))
        .collect()
}

fn default_for(config: &Config, renamed_name: &str, original_name: &str) -> Option<CellValue> {
    match &config.default_value {
        None => None,
        Some(DefaultValue::Scalar(v)) => Some(json_scalar_to_cell(v)),
        Some(DefaultValue::PerColumn(map)) => map
            .get(renamed_name)
            .or_else(|| map.get(original_name))
            .map(json_scalar_to_cell),
    }
}

fn json_scalar_to_cell(value: &JsonValue) -> CellValue {
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

fn lookup(main: &Table, lookup_table: &Table, config: &Config) -> Result<Table> {
    let main_key_col = main
        .column_index(&config.match_col_in_main_data)
        .ok_or_else(|| RecipeError::ColumnNotFound(config.match_col_in_main_data.clone()))?;
    let lookup_key_col = lookup_table
        .column_index(&config.match_col_in_lookup_data)
        .ok_or_else(|| RecipeError::ColumnNotFound(config.match_col_in_lookup_data.clone()))?;
    if config.lookup_columns.is_empty() {
        return Err(RecipeError::Config("'lookup_columns' must be a non-empty list".to_string()));
    }
    let pull_idxs: Vec<usize> = config
        .lookup_columns
        .iter()
        .map(|c| lookup_table.column_index(c).ok_or_else(|| RecipeError::ColumnNotFound(c.clone())))
        .collect::<Result<_>>()?;

    let index = build_lookup_index(
        lookup_table,
        lookup_key_col,
        config.normalize_keys,
        config.case_sensitive,
        config.handle_duplicates,
    )?;

    let renamed_names = renamed_pulled_columns(config);

    // `target_idxs[i]` is where pulled column `i` (= `pull_idxs[i]` /
    // `renamed_names[i]`) lands in `out_columns`: either the index of an
    // existing main column it collides with (which it replaces — the
    // pulled column wins) or a freshly appended index.
    let mut out_columns = main.columns().to_vec();
    let mut target_idxs = Vec::with_capacity(pull_idxs.len());
    let mut collisions = Vec::new();
    for (renamed, original_idx) in renamed_names.iter().zip(&pull_idxs) {
        let column_type = lookup_table.columns()[*original_idx].column_type;
        if let Some(pos) = out_columns.iter().position(|c| &c.name == renamed) {
            out_columns[pos].column_type = column_type;
            target_idxs.push(pos);
            collisions.push(renamed.clone());
        } else {
            out_columns.push(Column { name: renamed.clone(), column_type });
            target_idxs.push(out_columns.len() - 1);
        }
    }
    if !collisions.is_empty() {
        tracing::warn!(columns = ?collisions, "pulled lookup column(s) replaced existing main column(s)");
    }

    let mut out = Table::empty(out_columns.clone());
    let out_width = out_columns.len();
    let mut matched_lookup_rows = std::collections::BTreeSet::new();

    let include_unmatched_main = matches!(config.join_type, JoinType::Left | JoinType::Outer);
    let require_match = matches!(config.join_type, JoinType::Inner | JoinType::Right);

    for row in 0..main.row_count() {
        let key = normalize_key(main.cell(row, main_key_col), config.normalize_keys, config.case_sensitive);
        let matched_row = key.as_ref().and_then(|k| index.get(k).copied());

        if let Some(lr) = matched_row {
            matched_lookup_rows.insert(lr);
        }
        if matched_row.is_none() && require_match {
            continue;
        }
        debug_assert!(matched_row.is_some() || include_unmatched_main);

        let mut out_row = main.row(row);
        out_row.resize(out_width, CellValue::Null);
        for (i, original_idx) in pull_idxs.iter().enumerate() {
            let value = match matched_row {
                Some(lr) => lookup_table.cell(lr, *original_idx).clone(),
                None => CellValue::Null,
            };
            out_row[target_idxs[i]] = value;
        }
        apply_defaults(&mut out_row, &target_idxs, config, &renamed_names);
        out.push_row(out_row);
    }

    if matches!(config.join_type, JoinType::Right | JoinType::Outer) {
        for lr in 0..lookup_table.row_count() {
            if matched_lookup_rows.contains(&lr) {
                continue;
            }
            let mut out_row: Vec<CellValue> = vec![CellValue::Null; out_width];
            for (i, original_idx) in pull_idxs.iter().enumerate() {
                out_row[target_idxs[i]] = lookup_table.cell(lr, *original_idx).clone();
            }
            apply_defaults(&mut out_row, &target_idxs, config, &renamed_names);
            out.push_row(out_row);
        }
    }

    Ok(out)
}

fn apply_defaults(row: &mut [CellValue], target_idxs: &[usize], config: &Config, renamed_names: &[String]) {
    for (offset, renamed) in renamed_names.iter().enumerate() {
        let idx = target_idxs[offset];
        if row[idx].is_null() {
            if let Some(default) = default_for(config, renamed, &config.lookup_columns[offset]) {
                row[idx] = default;
            }
        }
    }
}

struct LookupDataProcessor {
    config: Config,
}

impl Processor for LookupDataProcessor {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome {
        let main = scope.stages.load(&self.config.source_stage)?;
        let lookup_table = scope.stages.load(&self.config.lookup_stage)?;
        let result = lookup(&main, &lookup_table, &self.config)?;
        let step_description = scope.step_description.clone();
        scope.stages.save(
            &self.config.save_to_stage,
            result,
            &step_description,
            &format!(
                "{:?}-joined on {} = {}",
                self.config.join_type, self.config.match_col_in_main_data, self.config.match_col_in_lookup_data
            ),
            self.config.overwrite,
        )
    }
}

struct LookupDataFactory;

impl ProcessorFactory for LookupDataFactory {
    fn processor_type(&self) -> &'static str {
        PROCESSOR_TYPE
    }

    fn role(&self) -> Role {
        Role::Transform
    }

    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        let parsed: Config = parse_config(PROCESSOR_TYPE, config)?;
        if parsed.lookup_columns.is_empty() {
            return Err(RecipeError::Config("'lookup_columns' must be a non-empty list".to_string()));
        }
        Ok(Box::new(LookupDataProcessor { config: parsed }))
    }

    fn minimal_config(&self) -> JsonValue {
        json!({
            "source_stage": "orders",
            "lookup_stage": "customers",
            "match_col_in_main_data": "Customer_ID",
            "match_col_in_lookup_data": "Customer_ID",
            "lookup_columns": ["Name", "Region"],
            "save_to_stage": "enriched",
        })
    }

    fn describe(&self) -> ProcessorDescription {
        ProcessorDescription {
            processor_type: PROCESSOR_TYPE,
            role: Role::Transform,
            summary: "Joins columns from a lookup table onto a main table by a normalized key",
            options: vec![
                OptionDescription { name: "match_col_in_main_data", required: true, default: None, description: "join key column in the main table" },
                OptionDescription { name: "match_col_in_lookup_data", required: true, default: None, description: "join key column in the lookup table" },
                OptionDescription { name: "lookup_columns", required: true, default: None, description: "non-empty list of lookup-table columns to pull in" },
                OptionDescription { name: "join_type", required: false, default: Some("\"left\""), description: "left|right|inner|outer" },
                OptionDescription { name: "handle_duplicates", required: false, default: Some("\"first\""), description: "first|last|error, applied to repeated lookup keys" },
                OptionDescription { name: "case_sensitive", required: false, default: Some("false"), description: "key comparison case folding" },
                OptionDescription { name: "normalize_keys", required: false, default: Some("true"), description: "apply numeric/whitespace/nan key normalization" },
                OptionDescription { name: "prefix", required: false, default: Some("\"\""), description: "prepended to every pulled column's name" },
                OptionDescription { name: "suffix", required: false, default: Some("\"\""), description: "appended to every pulled column's name" },
                OptionDescription { name: "default_value", required: false, default: None, description: "scalar or per-column map filling nulls left by an unmatched join" },
            ],
        }
    }
}

pub fn factory() -> Box<dyn ProcessorFactory> {
    Box::new(LookupDataFactory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_manager::StageManager;
    use recipe_domain::variables::VariableScope;

    fn orders() -> Table {
        Table::new(
            vec![
                Column { name: "Order_ID".into(), column_type: ColumnType::Integer },
                Column { name: "Customer_ID".into(), column_type: ColumnType::String },
            ],
            vec![
                vec![CellValue::Integer(1001), CellValue::Integer(1002), CellValue::Integer(1004)],
                vec![
                    CellValue::String("C001".into()),
                    CellValue::String("C002".into()),
                    CellValue::String("UNKNOWN".into()),
                ],
            ],
        )
        .unwrap()
    }

    fn customers() -> Table {
        Table::new(
            vec![
                Column { name: "Customer_ID".into(), column_type: ColumnType::String },
                Column { name: "Name".into(), column_type: ColumnType::String },
            ],
            vec![
                vec![CellValue::String("C001".into()), CellValue::String("C002".into())],
                vec![CellValue::String("Acme".into()), CellValue::String("Beta".into())],
            ],
        )
        .unwrap()
    }

    fn run(config: BTreeMap<String, JsonValue>, stages: &mut StageManager) -> Result<()> {
        let processor = factory().create(&config).unwrap();
        let variables = VariableScope::new();
        let step_config = BTreeMap::new();
        let mut scope = ExecutionScope {
            stages,
            variables: &variables,
            step_config: &step_config,
            step_index: 1,
            step_description: "lookup".to_string(),
        };
        processor.execute(&mut scope)
    }

    #[test]
    fn left_join_keeps_every_main_row_with_nulls_for_unmatched() {
        let mut stages = StageManager::new(10);
        stages.save("orders", orders(), "seed", "seed", false).unwrap();
        stages.save("customers", customers(), "seed", "seed", false).unwrap();

        run(
            BTreeMap::from([
                ("source_stage".to_string(), json!("orders")),
                ("lookup_stage".to_string(), json!("customers")),
                ("match_col_in_main_data".to_string(), json!("Customer_ID")),
                ("match_col_in_lookup_data".to_string(), json!("Customer_ID")),
                ("lookup_columns".to_string(), json!(["Name"])),
                ("save_to_stage".to_string(), json!("enriched")),
                ("default_value".to_string(), json!({"Name": "Unknown"})),
            ]),
            &mut stages,
        )
        .unwrap();

        let result = stages.load("enriched").unwrap();
        assert_eq!(result.row_count(), 3);
        let name_idx = result.column_index("Name").unwrap();
        assert_eq!(result.cell(2, name_idx), &CellValue::String("Unknown".into()));
    }

    #[test]
    fn inner_join_drops_unmatched_main_rows() {
        let mut stages = StageManager::new(10);
        stages.save("orders", orders(), "seed", "seed", false).unwrap();
        stages.save("customers", customers(), "seed", "seed", false).unwrap();

        run(
            BTreeMap::from([
                ("source_stage".to_string(), json!("orders")),
                ("lookup_stage".to_string(), json!("customers")),
                ("match_col_in_main_data".to_string(), json!("Customer_ID")),
                ("match_col_in_lookup_data".to_string(), json!("Customer_ID")),
                ("lookup_columns".to_string(), json!(["Name"])),
                ("save_to_stage".to_string(), json!("enriched")),
                ("join_type".to_string(), json!("inner")),
            ]),
            &mut stages,
        )
        .unwrap();

        assert_eq!(stages.load("enriched").unwrap().row_count(), 2);
    }

    #[test]
    fn key_normalization_matches_dot_zero_suffixed_strings() {
        let main = Table::new(
            vec![Column { name: "Key".into(), column_type: ColumnType::String }],
            vec![vec![
                CellValue::String("1001.0".into()),
                CellValue::String("9999.0".into()),
            ]],
        )
        .unwrap();
        let lookup_table = Table::new(
            vec![
                Column { name: "Key".into(), column_type: ColumnType::String },
                Column { name: "Val".into(), column_type: ColumnType::String },
            ],
            vec![
                vec![CellValue::String("1001".into())],
                vec![CellValue::String("match".into())],
            ],
        )
        .unwrap();

        let mut stages = StageManager::new(10);
        stages.save("main", main, "seed", "seed", false).unwrap();
        stages.save("lk", lookup_table, "seed", "seed", false).unwrap();
        run(
            BTreeMap::from([
                ("source_stage".to_string(), json!("main")),
                ("lookup_stage".to_string(), json!("lk")),
                ("match_col_in_main_data".to_string(), json!("Key")),
                ("match_col_in_lookup_data".to_string(), json!("Key")),
                ("lookup_columns".to_string(), json!(["Val"])),
                ("save_to_stage".to_string(), json!("out")),
            ]),
            &mut stages,
        )
        .unwrap();

        let result = stages.load("out").unwrap();
        let val_idx = result.column_index("Val").unwrap();
        assert_eq!(result.cell(0, val_idx), &CellValue::String("match".into()));
        assert!(result.cell(1, val_idx).is_null());
    }

    #[test]
    fn pulled_column_colliding_with_a_main_column_replaces_it() {
        let main = Table::new(
            vec![
                Column { name: "Customer_ID".into(), column_type: ColumnType::String },
                Column { name: "Name".into(), column_type: ColumnType::String },
            ],
            vec![
                vec![CellValue::String("C001".into()), CellValue::String("C002".into())],
                vec![
                    CellValue::String("placeholder".into()),
                    CellValue::String("placeholder".into()),
                ],
            ],
        )
        .unwrap();

        let mut stages = StageManager::new(10);
        stages.save("main", main, "seed", "seed", false).unwrap();
        stages.save("customers", customers(), "seed", "seed", false).unwrap();

        run(
            BTreeMap::from([
                ("source_stage".to_string(), json!("main")),
                ("lookup_stage".to_string(), json!("customers")),
                ("match_col_in_main_data".to_string(), json!("Customer_ID")),
                ("match_col_in_lookup_data".to_string(), json!("Customer_ID")),
                ("lookup_columns".to_string(), json!(["Name"])),
                ("save_to_stage".to_string(), json!("enriched")),
            ]),
            &mut stages,
        )
        .unwrap();

        let result = stages.load("enriched").unwrap();
        // The collision does not append a second "Name" column.
        assert_eq!(result.column_count(), 2);
        let name_idx = result.column_index("Name").unwrap();
        assert_eq!(result.cell(0, name_idx), &CellValue::String("Acme".into()));
        assert_eq!(result.cell(1, name_idx), &CellValue::String("Beta".into()));
    }

    #[test]
    fn duplicate_keys_with_error_policy_abort() {
        let lookup_table = Table::new(
            vec![
                Column { name: "Key".into(), column_type: ColumnType::String },
                Column { name: "Val".into(), column_type: ColumnType::String },
            ],
            vec![
                vec![CellValue::String("A".into()), CellValue::String("A".into())],
                vec![CellValue::String("x".into()), CellValue::String("y".into())],
            ],
        )
        .unwrap();
        let main = Table::new(
            vec![Column { name: "Key".into(), column_type: ColumnType::String }],
            vec![vec![CellValue::String("A".into())]],
        )
        .unwrap();

        let mut stages = StageManager::new(10);
        stages.save("main", main, "seed", "seed", false).unwrap();
        stages.save("lk", lookup_table, "seed", "seed", false).unwrap();
        let err = run(
            BTreeMap::from([
                ("source_stage".to_string(), json!("main")),
                ("lookup_stage".to_string(), json!("lk")),
                ("match_col_in_main_data".to_string(), json!("Key")),
                ("match_col_in_lookup_data".to_string(), json!("Key")),
                ("lookup_columns".to_string(), json!(["Val"])),
                ("save_to_stage".to_string(), json!("out")),
                ("handle_duplicates".to_string(), json!("error")),
            ]),
            &mut stages,
        )
        .unwrap_err();
        assert!(matches!(err, RecipeError::DuplicateKey(_)));
    }

    #[test]
    fn empty_lookup_columns_is_a_config_error() {
        let err = factory()
            .create(&BTreeMap::from([
                ("source_stage".to_string(), json!("orders")),
                ("lookup_stage".to_string(), json!("customers")),
                ("match_col_in_main_data".to_string(), json!("Customer_ID")),
                ("match_col_in_lookup_data".to_string(), json!("Customer_ID")),
                ("lookup_columns".to_string(), json!([])),
                ("save_to_stage".to_string(), json!("enriched")),
            ]))
            .unwrap_err();
        assert!(matches!(err, RecipeError::Config(_)));
    }
}
