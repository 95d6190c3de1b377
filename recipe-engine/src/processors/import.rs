// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `import_file` — the Import-role processor wrapping [`crate::io::read_table`].

use super::parse_config;
use crate::io::{self, Format, ReadOptions, SheetSelector};
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::{
    ExecutionOutcome, ExecutionScope, OptionDescription, Processor, ProcessorDescription, ProcessorFactory, Role,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

const PROCESSOR_TYPE: &str = "import_file";

#[derive(Debug, Deserialize)]
struct Config {
    input_file: String,
    save_to_stage: String,
    sheet: Option<SheetSelectorConfig>,
    separator: Option<String>,
    format: Option<String>,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SheetSelectorConfig {
    Index(usize),
    Name(String),
}

fn parse_format(s: &str) -> Result<Format> {
    match s.to_ascii_lowercase().as_str() {
        "csv" => Ok(Format::Csv),
        "tsv" | "txt" => Ok(Format::Tsv),
        "xlsx" | "xlsm" | "xlsb" => Ok(Format::WorkbookModern),
        "xls" => Ok(Format::WorkbookLegacy),
        other => Err(RecipeError::Config(format!("unknown explicit format '{other}'"))),
    }
}

struct ImportFileProcessor {
    config: Config,
}

impl Processor for ImportFileProcessor {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome {
        let path_raw = scope.config_str("input_file").unwrap_or_else(|| self.config.input_file.clone());
        let path = Path::new(&path_raw);

        let explicit_format = self.config.format.as_deref().map(parse_format).transpose()?;
        let sheet = self.config.sheet.as_ref().map(|s| match s {
            SheetSelectorConfig::Index(i) => SheetSelector::Index(*i),
            SheetSelectorConfig::Name(n) => SheetSelector::Name(n.clone()),
        });
        let separator = self.config.separator.as_ref().and_then(|s| s.bytes().next());

        let options = ReadOptions { sheet, separator, explicit_format };
        let table = io::read_table(path, &options)?;

        let step_description = scope.step_description.clone();
        scope.stages.save(
            &self.config.save_to_stage,
            table,
            &step_description,
            &format!("imported from {path_raw}"),
            self.config.overwrite,
        )
    }
}

struct ImportFileFactory;

impl ProcessorFactory for ImportFileFactory {
    fn processor_type(&self) -> &'static str {
        PROCESSOR_TYPE
    }

    fn role(&self) -> Role {
        Role::Import
    }

    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        Ok(Box::new(ImportFileProcessor { config: parse_config(PROCESSOR_TYPE, config)? }))
    }

    fn minimal_config(&self) -> JsonValue {
        json!({"input_file": "input.csv", "save_to_stage": "imported"})
    }

    fn describe(&self) -> ProcessorDescription {
        ProcessorDescription {
            processor_type: PROCESSOR_TYPE,
            role: Role::Import,
            summary: "Reads a table from a file into a stage",
            options: vec![
                OptionDescription { name: "input_file", required: true, default: None, description: "path, substituted against the variable scope" },
                OptionDescription { name: "save_to_stage", required: true, default: None, description: "stage to write" },
                OptionDescription { name: "sheet", required: false, default: Some("1"), description: "1-based index or sheet name (workbook formats only)" },
                OptionDescription { name: "separator", required: false, default: None, description: "override delimiter for delimited formats" },
                OptionDescription { name: "format", required: false, default: None, description: "explicit format override, wins over extension" },
                OptionDescription { name: "overwrite", required: false, default: Some("false"), description: "allow replacing an existing stage" },
            ],
        }
    }
}

pub fn factory() -> Box<dyn ProcessorFactory> {
    Box::new(ImportFileFactory)
}
