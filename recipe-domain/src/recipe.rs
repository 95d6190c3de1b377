//! The recipe document shape (§6.2): an ordered list of steps plus a
//! `settings` map. Parsing is format-agnostic at this layer — `recipe-engine`
//! feeds it YAML via `serde_yaml`, but nothing here depends on that choice.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One entry in a recipe's step list.
///
/// `processor_type` and `step_description` are promoted to real fields
/// because every processor needs them; everything else is processor-specific
/// and stays in `config` as an untyped JSON map (mirroring the teacher's
/// `StageConfiguration.parameters: HashMap<String, String>`, generalized to
/// JSON values since recipe config is richer than flat strings — lists of
/// lookup columns, nested default-value maps, and so on).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Step {
    pub processor_type: String,
    #[serde(default)]
    pub step_description: Option<String>,
    #[serde(flatten)]
    pub config: BTreeMap<String, JsonValue>,
}

impl Step {
    pub fn description(&self, step_index: usize) -> String {
        self.step_description
            .clone()
            .unwrap_or_else(|| format!("Step {step_index}"))
    }
}

/// `settings.stages[]` — a stage pre-declared by the recipe rather than
/// created implicitly on first write.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StageDecl {
    pub stage_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub protected: bool,
}

/// `settings.required_external_vars[]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalVarDecl {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub default: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
}

/// `settings` — the recipe-wide metadata and configuration block.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub description: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub stages: Vec<StageDecl>,
    #[serde(default)]
    pub required_external_vars: Vec<ExternalVarDecl>,
    /// Upper bound on concurrently-live stages; `None` defers to the
    /// orchestrator's built-in default (see `recipe_engine::stage_manager`).
    #[serde(default)]
    pub max_stages: Option<usize>,
}

/// The top-level recipe document (§6.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub recipe: Vec<Step>,
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_recipe() {
        let yaml = r#"
recipe:
  - processor_type: import_file
    step_description: "Import orders"
    input_file: "orders.csv"
    save_to_stage: orders
settings:
  description: "A minimal recipe"
"#;
        let recipe: Recipe = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(recipe.recipe.len(), 1);
        assert_eq!(recipe.recipe[0].processor_type, "import_file");
        assert_eq!(
            recipe.recipe[0].config.get("input_file").unwrap().as_str(),
            Some("orders.csv")
        );
        assert_eq!(recipe.settings.description, "A minimal recipe");
    }

    #[test]
    fn step_description_defaults_to_positional_label() {
        let step = Step {
            processor_type: "noop".into(),
            step_description: None,
            config: BTreeMap::new(),
        };
        assert_eq!(step.description(3), "Step 3");
    }
}
