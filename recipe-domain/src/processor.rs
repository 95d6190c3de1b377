// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The four processor role contracts (§3) and the single uniform `execute`
//! entry point (§4.4) every processor is invoked through.
//!
//! The stage store is expressed here as a trait ([`StageStore`]) rather than
//! a concrete type because the concrete, capacity-enforcing implementation
//! (`StageManager`) is orchestrator-scoped runtime state that lives in
//! `recipe-engine`; the domain layer only needs to know the shape a
//! processor is allowed to poke at, matching the teacher's
//! `FromParameters`/service-trait seam between domain and infrastructure.

use crate::error::Result;
use crate::stage::StageMetadata;
use crate::table::Table;
use crate::variables::VariableScope;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// The four fixed dispatch patterns a processor may implement. Role is a
/// static property of the factory, never introspected at runtime from the
/// processor instance itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Consumes exactly one input stage, produces exactly one output stage.
    Transform,
    /// Consumes zero stages (reads a file), produces exactly one output stage.
    Import,
    /// Consumes exactly one input stage, produces zero stages (writes a file).
    Export,
    /// Consumes zero stages and produces zero stages; file-to-file only.
    FileOp,
}

/// The subset of stage-manager operations a processor is allowed to call,
/// reachable through [`ExecutionScope::stages`].
pub trait StageStore {
    fn load(&self, name: &str) -> Result<Table>;
    fn save(
        &mut self,
        name: &str,
        table: Table,
        step_name: &str,
        description: &str,
        overwrite: bool,
    ) -> Result<()>;
    fn exists(&self, name: &str) -> bool;
    fn list(&self) -> BTreeMap<String, StageMetadata>;
}

/// Everything a processor's `execute` receives: the stage store, the fully
/// resolved (and by this point immutable) variable scope, and its own
/// step's config, index, and description.
pub struct ExecutionScope<'a> {
    pub stages: &'a mut dyn StageStore,
    pub variables: &'a VariableScope,
    pub step_config: &'a BTreeMap<String, JsonValue>,
    pub step_index: usize,
    pub step_description: String,
}

impl<'a> ExecutionScope<'a> {
    /// Looks up a string-valued config key, expanding it against
    /// [`self.variables`](Self::variables) in lenient mode (runtime
    /// substitution never fails; unresolved placeholders already would
    /// have been caught in pre-flight strict validation).
    pub fn config_str(&self, key: &str) -> Option<String> {
        self.step_config
            .get(key)
            .and_then(JsonValue::as_str)
            .map(|raw| crate::variables::substitute(raw, self.variables, crate::variables::Mode::Lenient))
    }
}

/// The result of invoking a processor. This is a plain [`Result`] rather than
/// a bespoke sum type: the error side already carries the discriminable
/// `RecipeError` kind, and the orchestrator is the one place that attaches
/// the 1-based step index and description on the way out of a failed call
/// (see `recipe_domain::error::StepError`).
pub type ExecutionOutcome = Result<()>;

/// The logic a single step dispatches to. Implementors correspond 1:1 with a
/// `processor_type` string via a registered [`ProcessorFactory`].
pub trait Processor: Send + Sync {
    fn execute(&self, scope: &mut ExecutionScope) -> ExecutionOutcome;
}

/// A supported config option, used to build [`ProcessorDescription`] records
/// for capability discovery and for the pre-flight self-test.
#[derive(Debug, Clone)]
pub struct OptionDescription {
    pub name: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
    pub description: &'static str,
}

/// Structured capability record returned by [`ProcessorFactory::describe`].
#[derive(Debug, Clone)]
pub struct ProcessorDescription {
    pub processor_type: &'static str,
    pub role: Role,
    pub summary: &'static str,
    pub options: Vec<OptionDescription>,
}

/// A worked usage example, returned by the optional
/// [`ProcessorFactory::examples`].
#[derive(Debug, Clone)]
pub struct ProcessorExample {
    pub title: &'static str,
    pub config: JsonValue,
}

/// Produces [`Processor`] instances for one `processor_type` string.
/// Registered once at start-up in the registry (`recipe-engine::registry`);
/// double-registration of the same type, or lookup of an unregistered type,
/// are both errors at the registry layer, not here.
pub trait ProcessorFactory: Send + Sync {
    fn processor_type(&self) -> &'static str;

    fn role(&self) -> Role;

    /// Builds a processor instance, validating the step's own config shape.
    /// Returns [`crate::error::RecipeError::Config`] on a malformed config.
    fn create(&self, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>>;

    /// A smallest valid config example, used by the registry's self-test and
    /// by capability-discovery tooling outside this crate's scope.
    fn minimal_config(&self) -> JsonValue;

    fn describe(&self) -> ProcessorDescription;

    /// Worked usage examples; empty by default.
    fn examples(&self) -> Vec<ProcessorExample> {
        Vec::new()
    }
}
