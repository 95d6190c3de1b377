// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Built-in processors (§4.6, §4.7). Every module here exposes a `factory()`
//! returning a boxed [`ProcessorFactory`](recipe_domain::processor::ProcessorFactory),
//! which [`builtin_factories`] collects for [`crate::registry::ProcessorRegistry::with_builtins`].

pub mod copy_stage;
pub mod export;
pub mod filter;
pub mod import;
pub mod lookup;
pub mod rename;
pub mod subtotal;

use recipe_domain::error::{RecipeError, Result};
use recipe_domain::processor::ProcessorFactory;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub fn builtin_factories() -> Vec<Box<dyn ProcessorFactory>> {
    vec![
        import::factory(),
        export::factory(),
        lookup::factory(),
        filter::factory(),
        rename::factory(),
        subtotal::factory(),
        copy_stage::factory(),
    ]
}

/// Deserializes a step's raw `config` map into a processor's typed config
/// struct, translating any shape failure into [`RecipeError::Config`] — the
/// "per-processor config struct carrying exactly the recognized keys"
/// pattern from the spec's redesign notes (§9).
pub fn parse_config<T: DeserializeOwned>(
    processor_type: &str,
    config: &BTreeMap<String, JsonValue>,
) -> Result<T> {
    let value = JsonValue::Object(config.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(value)
        .map_err(|e| RecipeError::Config(format!("'{processor_type}' config: {e}")))
}
