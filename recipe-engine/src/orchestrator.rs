// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The pipeline orchestrator (§4.5): load & validate, resolve externals,
//! pre-flight, execute, teardown.
//!
//! This is the one place that sequences the other components — registry,
//! stage manager, variable scope — into a single run. It mirrors the
//! teacher's `PipelineService` in shape (a thin coordinator that owns no
//! business logic of its own, only the order in which its collaborators are
//! invoked) without adopting the teacher's async/`tokio` plumbing: per
//! spec §5 this pipeline is strictly sequential at step granularity, so the
//! orchestrator's `run` is a plain synchronous call.

use recipe_domain::error::{RecipeError, Result, StepError};
use recipe_domain::processor::{ExecutionScope, StageStore};
use recipe_domain::recipe::Recipe;
use recipe_domain::stage::{is_reserved_stage_name, StageMetadata};
use recipe_domain::variables::{self, Mode, VariableScope};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::registry::ProcessorRegistry;
use crate::stage_manager::{StageManager, DEFAULT_MAX_STAGES};

/// Everything needed to start a run; the CLI (or any other caller) builds
/// one of these and hands it to [`Orchestrator::run`].
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub recipe_path: PathBuf,
    /// `--var name=value` overrides (last-wins if a name repeats; the CLI
    /// is responsible for that merge before this struct is built).
    pub external_vars: BTreeMap<String, String>,
    /// Run phases 1-3 only, then stop without executing any step.
    pub validate_only: bool,
    /// Whether an interactive prompt may be used to resolve a missing
    /// required external variable with no default. The CLI sets this from
    /// `stdin().is_terminal()`; library callers typically leave it `false`.
    pub interactive: bool,
}

impl RunRequest {
    pub fn new(recipe_path: impl Into<PathBuf>) -> Self {
        Self {
            recipe_path: recipe_path.into(),
            external_vars: BTreeMap::new(),
            validate_only: false,
            interactive: std::io::stdin().is_terminal(),
        }
    }
}

/// What a successful run produced: how many steps actually executed and a
/// snapshot of the stage store's metadata before teardown released it.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub steps_executed: usize,
    pub stage_summary: BTreeMap<String, StageMetadata>,
}

/// The two distinct failure shapes a run can produce (§7's propagation
/// policy): a pre-flight failure carries every issue found, collected
/// rather than stopping at the first one; an execution failure carries the
/// single step that failed, with its 1-based index and description.
#[derive(Error, Debug, Clone)]
pub enum RunError {
    #[error("recipe validation failed with {} issue(s):\n{}", .0.len(), .0.join("\n"))]
    PreFlight(Vec<String>),
    #[error(transparent)]
    Execution(#[from] StepError),
}

/// Owns the process-wide [`ProcessorRegistry`] and drives a run through its
/// five phases. Stateless across runs: a fresh [`StageManager`] is created
/// per [`run`](Self::run) call.
pub struct Orchestrator {
    registry: ProcessorRegistry,
}

impl Orchestrator {
    pub fn new(registry: ProcessorRegistry) -> Self {
        Self { registry }
    }

    pub fn with_builtins() -> Self {
        Self::new(ProcessorRegistry::with_builtins())
    }

    pub fn run(&self, request: RunRequest) -> std::result::Result<RunReport, RunError> {
        let now = chrono::Utc::now();

        // Phase 1: load & validate the document shape.
        let document = std::fs::read_to_string(&request.recipe_path).map_err(|e| {
            RunError::PreFlight(vec![RecipeError::io(request.recipe_path.display().to_string(), e.to_string())
                .to_string()])
        })?;
        let recipe: Recipe = serde_yaml::from_str(&document)
            .map_err(|e| RunError::PreFlight(vec![RecipeError::RecipeValidation(e.to_string()).to_string()]))?;

        tracing::info!(
            steps = recipe.recipe.len(),
            description = %recipe.settings.description,
            "loaded recipe"
        );

        let mut issues = Vec::new();

        // Phase 2: resolve externals into the full, layered variable scope.
        let scope = match self.resolve_externals(&recipe, &request, now) {
            Ok(scope) => scope,
            Err(mut errs) => {
                issues.append(&mut errs);
                // Build a scope anyway (built-ins + recipe vars only) so
                // phase 3's placeholder check can still run and surface
                // every other issue in the same pass.
                VariableScope::with_builtins(now, None, Some(&request.recipe_path))
                    .with_recipe_variables(&recipe.settings.variables)
                    .unwrap_or_default()
            }
        };

        // Phase 3: pre-flight.
        self.preflight(&recipe, &scope, &mut issues);

        if !issues.is_empty() {
            return Err(RunError::PreFlight(issues));
        }

        if request.validate_only {
            tracing::info!("validate-only: pre-flight passed, skipping execution");
            return Ok(RunReport::default());
        }

        // Phase 4: execute.
        let max_stages = recipe.settings.max_stages.unwrap_or(DEFAULT_MAX_STAGES);
        let mut stages = StageManager::new(max_stages);
        let declare_result = self.declare_stages(&recipe, &mut stages);

        let execution_result = match declare_result {
            Ok(()) => self.execute_steps(&recipe, &scope, &mut stages),
            Err(e) => Err(e),
        };

        let stage_summary = stages.list();
        let steps_executed = match &execution_result {
            Ok(n) => *n,
            Err(StepError { step_index, .. }) => step_index.saturating_sub(1),
        };

        // Phase 5: teardown, unconditionally.
        stages.cleanup();

        match execution_result {
            Ok(_) => Ok(RunReport { steps_executed, stage_summary }),
            Err(e) => Err(RunError::Execution(e)),
        }
    }

    fn declare_stages(&self, recipe: &Recipe, stages: &mut StageManager) -> std::result::Result<(), StepError> {
        for decl in &recipe.settings.stages {
            stages
                .declare(&decl.stage_name, &decl.description, decl.protected)
                .map_err(|e| StepError::new(0, "settings.stages declaration", e))?;
        }
        Ok(())
    }

    fn execute_steps(
        &self,
        recipe: &Recipe,
        scope: &VariableScope,
        stages: &mut StageManager,
    ) -> std::result::Result<usize, StepError> {
        for (zero_based, step) in recipe.recipe.iter().enumerate() {
            let step_index = zero_based + 1;
            let description = step.description(step_index);
            tracing::info!(step = step_index, processor = %step.processor_type, description = %description, "executing step");

            let processor = self
                .registry
                .create(&step.processor_type, &step.config)
                .map_err(|e| StepError::new(step_index, description.clone(), e))?;

            let mut exec_scope = ExecutionScope {
                stages: stages as &mut dyn StageStore,
                variables: scope,
                step_config: &step.config,
                step_index,
                step_description: description.clone(),
            };
            processor
                .execute(&mut exec_scope)
                .map_err(|e| StepError::new(step_index, description.clone(), e))?;

            tracing::info!(step = step_index, "step completed");
        }
        Ok(recipe.recipe.len())
    }

    /// Phase 2: merges CLI-supplied variables with the recipe's declared
    /// `required_external_vars`, applying defaults, interactive prompting,
    /// and `choices` validation. Returns every unresolved/invalid variable
    /// as a message rather than stopping at the first one, matching the
    /// pre-flight "collect, don't short-circuit" policy.
    fn resolve_externals(
        &self,
        recipe: &Recipe,
        request: &RunRequest,
        now: chrono::DateTime<chrono::Utc>,
    ) -> std::result::Result<VariableScope, Vec<String>> {
        let mut errors = Vec::new();
        let mut external = request.external_vars.clone();

        for decl in &recipe.settings.required_external_vars {
            if !external.contains_key(&decl.name) {
                if let Some(default) = &decl.default {
                    external.insert(decl.name.clone(), default.clone());
                } else if request.interactive {
                    match prompt_for(decl) {
                        Some(value) => {
                            external.insert(decl.name.clone(), value);
                        }
                        None => errors.push(format!(
                            "required external variable '{}' was not supplied and the interactive prompt was empty",
                            decl.name
                        )),
                    }
                } else {
                    errors.push(format!(
                        "required external variable '{}' was not supplied and has no default ({})",
                        decl.name, decl.description
                    ));
                }
            }

            if let Some(value) = external.get(&decl.name) {
                if !decl.choices.is_empty() && !decl.choices.contains(value) {
                    errors.push(format!(
                        "external variable '{}' = '{value}' is not one of the declared choices {:?}",
                        decl.name, decl.choices
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let scope = VariableScope::with_builtins(now, None, Some(&request.recipe_path))
            .with_recipe_variables(&recipe.settings.variables)
            .map_err(|e| vec![e.to_string()])?
            .with_external_variables(external);
        Ok(scope)
    }

    /// Phase 3: every issue detectable before any step runs, collected into
    /// `issues` rather than returned early.
    fn preflight(&self, recipe: &Recipe, scope: &VariableScope, issues: &mut Vec<String>) {
        for decl in &recipe.settings.stages {
            if is_reserved_stage_name(&decl.stage_name) {
                issues.push(format!(
                    "settings.stages declares '{}', which is a reserved stage name",
                    decl.stage_name
                ));
            }
        }

        for (zero_based, step) in recipe.recipe.iter().enumerate() {
            let step_index = zero_based + 1;
            let description = step.description(step_index);

            match self.registry.role_of(&step.processor_type) {
                Ok(_) => match self.registry.create(&step.processor_type, &step.config) {
                    Ok(_) => {}
                    Err(e) => issues.push(format!("step {step_index} ({description}): {e}")),
                },
                Err(e) => issues.push(format!("step {step_index} ({description}): {e}")),
            }

            let mut templates = Vec::new();
            for value in step.config.values() {
                collect_string_leaves(value, &mut templates);
            }
            let mut unknown_in_step = Vec::new();
            for template in &templates {
                for name in variables::validate(template, scope) {
                    if !unknown_in_step.contains(&name) {
                        unknown_in_step.push(name);
                    }
                }
            }
            if !unknown_in_step.is_empty() {
                issues.push(format!(
                    "step {step_index} ({description}): unresolved variable(s) {unknown_in_step:?}"
                ));
            }
        }
    }
}

/// Walks a step config's JSON value tree, collecting every string leaf
/// (placeholders can appear inside nested lists/maps, e.g. a lookup's
/// `default_value` per-column map).
fn collect_string_leaves(value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::String(s) => out.push(s.clone()),
        JsonValue::Array(items) => items.iter().for_each(|v| collect_string_leaves(v, out)),
        JsonValue::Object(map) => map.values().for_each(|v| collect_string_leaves(v, out)),
        _ => {}
    }
}

fn prompt_for(decl: &recipe_domain::recipe::ExternalVarDecl) -> Option<String> {
    use std::io::Write;
    if !decl.choices.is_empty() {
        print!("{} ({}) [{}]: ", decl.name, decl.description, decl.choices.join("/"));
    } else {
        print!("{} ({}): ", decl.name, decl.description);
    }
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_recipe(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn end_to_end_filter_lookup_export() {
        let dir = tempdir().unwrap();
        write_recipe(
            dir.path(),
            "orders.csv",
            "Order_ID,Customer_ID,Status,Amount\n\
             1001,C001,Active,150\n\
             1002,C002,Active,75.5\n\
             1003,C003,Pending,200\n\
             1004,UNKNOWN,Active,300\n",
        );
        write_recipe(
            dir.path(),
            "customers.csv",
            "Customer_ID,Name,Region\nC001,Acme,West\nC002,Beta,East\nC003,Gamma,Central\n",
        );

        let recipe_yaml = format!(
            r#"
recipe:
  - processor_type: import_file
    step_description: "Import orders"
    input_file: "{orders}"
    save_to_stage: orders
  - processor_type: import_file
    step_description: "Import customers"
    input_file: "{customers}"
    save_to_stage: customers
  - processor_type: filter_data
    step_description: "Keep active orders"
    source_stage: orders
    save_to_stage: active_orders
    column: Status
    condition: equals
    value: Active
  - processor_type: lookup_data
    step_description: "Enrich with customer info"
    source_stage: active_orders
    lookup_stage: customers
    match_col_in_main_data: Customer_ID
    match_col_in_lookup_data: Customer_ID
    lookup_columns: ["Name", "Region"]
    save_to_stage: enriched
    default_value:
      Name: "Unknown"
      Region: "Unassigned"
  - processor_type: export_file
    step_description: "Export enriched orders"
    source_stage: enriched
    output_file: "{out}"
settings:
  description: "filter + lookup + export"
"#,
            orders = dir.path().join("orders.csv").display(),
            customers = dir.path().join("customers.csv").display(),
            out = dir.path().join("out.csv").display(),
        );
        let recipe_path = write_recipe(dir.path(), "recipe.yaml", &recipe_yaml);

        let orchestrator = Orchestrator::with_builtins();
        let request = RunRequest {
            recipe_path,
            external_vars: BTreeMap::new(),
            validate_only: false,
            interactive: false,
        };
        let report = orchestrator.run(request).unwrap();
        assert_eq!(report.steps_executed, 5);

        let written = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        let mut lines = written.lines();
        let header = lines.next().unwrap();
        assert!(header.contains("Name"));
        assert_eq!(lines.count(), 3);
        assert!(written.contains("Unknown"));
    }

    #[test]
    fn reserved_stage_name_fails_preflight_before_any_step_runs() {
        let dir = tempdir().unwrap();
        let recipe_yaml = r#"
recipe:
  - processor_type: copy_stage
    source_stage: data
    save_to_stage: copy
settings:
  description: "reserved stage test"
  stages:
    - stage_name: input
      description: "not allowed"
"#;
        let recipe_path = write_recipe(dir.path(), "recipe.yaml", recipe_yaml);
        let orchestrator = Orchestrator::with_builtins();
        let err = orchestrator
            .run(RunRequest::new(recipe_path))
            .unwrap_err();
        match err {
            RunError::PreFlight(issues) => {
                assert!(issues.iter().any(|i| i.contains("reserved")));
            }
            RunError::Execution(_) => panic!("expected a pre-flight failure"),
        }
    }

    #[test]
    fn unknown_processor_type_is_a_preflight_issue() {
        let dir = tempdir().unwrap();
        let recipe_yaml = r#"
recipe:
  - processor_type: does_not_exist
    save_to_stage: whatever
settings:
  description: "unknown processor"
"#;
        let recipe_path = write_recipe(dir.path(), "recipe.yaml", recipe_yaml);
        let orchestrator = Orchestrator::with_builtins();
        let err = orchestrator.run(RunRequest::new(recipe_path)).unwrap_err();
        match err {
            RunError::PreFlight(issues) => assert!(issues.iter().any(|i| i.contains("does_not_exist"))),
            RunError::Execution(_) => panic!("expected a pre-flight failure"),
        }
    }

    #[test]
    fn missing_required_external_var_without_default_fails_preflight() {
        let dir = tempdir().unwrap();
        let recipe_yaml = r#"
recipe:
  - processor_type: copy_stage
    source_stage: data
    save_to_stage: copy
settings:
  description: "external var required"
  required_external_vars:
    - name: region
      description: "target region"
"#;
        let recipe_path = write_recipe(dir.path(), "recipe.yaml", recipe_yaml);
        let orchestrator = Orchestrator::with_builtins();
        let request = RunRequest {
            recipe_path,
            external_vars: BTreeMap::new(),
            validate_only: false,
            interactive: false,
        };
        let err = orchestrator.run(request).unwrap_err();
        match err {
            RunError::PreFlight(issues) => assert!(issues.iter().any(|i| i.contains("region"))),
            RunError::Execution(_) => panic!("expected a pre-flight failure"),
        }
    }

    #[test]
    fn validate_only_does_not_execute_any_step() {
        let dir = tempdir().unwrap();
        let recipe_yaml = r#"
recipe:
  - processor_type: import_file
    input_file: "does-not-exist.csv"
    save_to_stage: data
settings:
  description: "validate-only smoke test"
"#;
        let recipe_path = write_recipe(dir.path(), "recipe.yaml", recipe_yaml);
        let orchestrator = Orchestrator::with_builtins();
        let request = RunRequest {
            recipe_path,
            external_vars: BTreeMap::new(),
            validate_only: true,
            interactive: false,
        };
        let report = orchestrator.run(request).unwrap();
        assert_eq!(report.steps_executed, 0);
    }

    #[test]
    fn execution_failure_reports_step_index_and_description() {
        let dir = tempdir().unwrap();
        let recipe_yaml = r#"
recipe:
  - processor_type: copy_stage
    step_description: "Copy nonexistent stage"
    source_stage: nope
    save_to_stage: copy
settings:
  description: "execution failure test"
"#;
        let recipe_path = write_recipe(dir.path(), "recipe.yaml", recipe_yaml);
        let orchestrator = Orchestrator::with_builtins();
        let err = orchestrator.run(RunRequest::new(recipe_path)).unwrap_err();
        match err {
            RunError::Execution(step_err) => {
                assert_eq!(step_err.step_index, 1);
                assert_eq!(step_err.step_description, "Copy nonexistent stage");
            }
            RunError::PreFlight(issues) => panic!("expected an execution failure, got {issues:?}"),
        }
    }

    #[test]
    fn variable_substitution_priority_external_over_recipe_over_builtin() {
        let dir = tempdir().unwrap();
        write_recipe(dir.path(), "data.csv", "id\n1\n");
        let recipe_yaml = format!(
            r#"
recipe:
  - processor_type: import_file
    input_file: "{data}"
    save_to_stage: source
  - processor_type: export_file
    source_stage: source
    output_file: "{dir}/report_{{region}}.csv"
settings:
  description: "variable priority test"
  variables:
    region: "west"
"#,
            data = dir.path().join("data.csv").display(),
            dir = dir.path().display(),
        );
        let recipe_path = write_recipe(dir.path(), "recipe.yaml", &recipe_yaml);

        let orchestrator = Orchestrator::with_builtins();
        let mut external_vars = BTreeMap::new();
        external_vars.insert("region".to_string(), "east".to_string());
        let request = RunRequest {
            recipe_path,
            external_vars,
            validate_only: false,
            interactive: false,
        };
        orchestrator.run(request).unwrap();
        assert!(dir.path().join("report_east.csv").exists());
    }
}
