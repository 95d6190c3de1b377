// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `export_file` — the Export-role processor wrapping [`crate::io::write_table`].

use super::parse_config;
use crate::io::{self, Format, WriteOptions};
use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::{
    ExecutionOutcome, ExecutionScope, OptionDescription, Processor, ProcessorDescription, ProcessorFactory, Role,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

const PROCESSOR_TYPE: &str = "export_file";

#[derive(Debug, Deserialize)]
struct Config {
    source_stage: String,
    output_file: String,
    sheet: Option<String>,
    separator: Option<String>,
    format: Option<String>,
    #[serde(default)]
    create_backup: bool,
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

struct ExportFileProcessor {
    config: Config,
}

impl Processor for ExportFileProcessor {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome {
        let table = scope.stages.load(&self.config.source_stage)?;
        let path_raw = scope.config_str("output_file").unwrap_or_else(|| self.config.output_file.clone());
        let path = Path::new(&path_raw);

        let explicit_format = self.config.format.as_deref().map(parse_format).transpose()?;
        let separator = self.config.separator.as_ref().and_then(|s| s.bytes().next());

        let options = WriteOptions {
            sheet: self.config.sheet.clone(),
            separator,
            explicit_format,
            create_backup: self.config.create_backup,
        };
        io::write_table(&table, path, &options)?;
        Ok(())
    }
}

struct ExportFileFactory;

impl ProcessorFactory for ExportFileFactory {
    fn processor_type(&self) -> &'static str {
        PROCESSOR_TYPE
    }

    fn role(&self) -> Role {
        Role::Export
    }

    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        Ok(Box::new(ExportFileProcessor { config: parse_config(PROCESSOR_TYPE, config)? }))
    }

    fn minimal_config(&self) -> JsonValue {
        json!({"source_stage": "data", "output_file": "output.csv"})
    }

    fn describe(&self) -> ProcessorDescription {
        ProcessorDescription {
            processor_type: PROCESSOR_TYPE,
            role: Role::Export,
            summary: "Writes a stage's table to a file",
            options: vec![
                OptionDescription { name: "source_stage", required: true, default: None, description: "stage to read" },
                OptionDescription { name: "output_file", required: true, default: None, description: "path, substituted against the variable scope" },
                OptionDescription { name: "sheet", required: false, default: None, description: "sheet name (workbook formats only)" },
                OptionDescription { name: "separator", required: false, default: None, description: "override delimiter for delimited formats" },
                OptionDescription { name: "format", required: false, default: None, description: "explicit format override, wins over extension" },
                OptionDescription { name: "create_backup", required: false, default: Some("false"), description: "back up an existing destination first" },
            ],
        }
    }
}

pub fn factory() -> Box<dyn ProcessorFactory> {
    Box::new(ExportFileFactory)
}
