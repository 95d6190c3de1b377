// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The process-wide `processor_type` → factory mapping (§4.4).

use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::{Processor, ProcessorDescription, ProcessorFactory, Role};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Maps a recipe step's `processor_type` string to the factory that builds
/// it. Built once at start-up via [`ProcessorRegistry::with_builtins`];
/// registering the same type twice is an error, and looking up an
/// unregistered type is [`RecipeError::UnknownProcessor`].
pub struct ProcessorRegistry {
    factories: BTreeMap<String, Box<dyn ProcessorFactory>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self { factories: BTreeMap::new() }
    }

    pub fn register(&mut self, factory: Box<dyn ProcessorFactory>) -> Result<()> {
        let key = factory.processor_type().to_string();
        if self.factories.contains_key(&key) {
            return Err(RecipeError::Internal(format!("processor type '{key}' already registered")));
        }
        self.factories.insert(key, factory);
        Ok(())
    }

    pub fn role_of(&self, processor_type: &str) -> Result<Role> {
        self.factories
            .get(processor_type)
            .map(|f| f.role())
            .ok_or_else(|| RecipeError::UnknownProcessor(processor_type.to_string()))
    }

    pub fn create(&self, processor_type: &str, config: &BTreeMap<String, JsonValue>) -> Result<Box<dyn Processor>> {
        let factory = self
            .factories
            .get(processor_type)
            .ok_or_else(|| RecipeError::UnknownProcessor(processor_type.to_string()))?;
        factory.create(config)
    }

    pub fn describe(&self, processor_type: &str) -> Result<ProcessorDescription> {
        self.factories
            .get(processor_type)
            .map(|f| f.describe())
            .ok_or_else(|| RecipeError::UnknownProcessor(processor_type.to_string()))
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds the registry with every processor this crate ships (§4.7).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for factory in crate::processors::builtin_factories() {
            registry.register(factory).expect("builtin processor types are distinct");
        }
        registry
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_processor_type_is_an_error() {
        let registry = ProcessorRegistry::with_builtins();
        assert!(matches!(
            registry.create("no_such_processor", &BTreeMap::new()).unwrap_err(),
            RecipeError::UnknownProcessor(_)
        ));
    }

    #[test]
    fn builtins_cover_every_processor_named_in_the_system_overview() {
        let registry = ProcessorRegistry::with_builtins();
        for expected in [
            "import_file",
            "export_file",
            "lookup_data",
            "filter_data",
            "rename_columns",
            "add_subtotals",
            "copy_stage",
        ] {
            assert!(
                registry.registered_types().contains(&expected),
                "missing builtin processor '{expected}'"
            );
        }
    }

    #[test]
    fn double_registration_of_the_same_type_is_an_error() {
        let mut registry = ProcessorRegistry::with_builtins();
        let dup = crate::processors::copy_stage::factory();
        assert!(registry.register(dup).is_err());
    }
}
