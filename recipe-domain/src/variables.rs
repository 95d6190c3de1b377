//! The `{name}`-placeholder substitution engine (§4.2).
//!
//! Placeholders are `{name}`; any other use of `{` or `}` is literal. The
//! engine is built around a layered [`VariableScope`] — built-ins shadowed
//! by recipe variables shadowed by external variables — and supports both a
//! strict mode (pre-flight validation: unknown names are an error) and a
//! lenient mode (runtime substitution of user-supplied paths: unknown names
//! pass through unchanged, braces and all).

use crate::error::{RecipeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// How [`substitute`] treats a placeholder whose name resolves to nothing in
/// the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Used for pre-flight checks: an unresolved placeholder is an error.
    Strict,
    /// Used for runtime substitution of user-facing strings (paths, sheet
    /// names): an unresolved placeholder is left untouched.
    Lenient,
}

/// The three-layer variable namespace available during a run.
///
/// Precedence (highest to lowest): external > recipe > built-in. Built into
/// the layering rather than pre-merged so that `recipe` values may
/// themselves reference built-ins when they're first computed (see
/// [`VariableScope::with_recipe_variables`]), while external values are
/// taken literally and never re-substituted.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    builtin: BTreeMap<String, String>,
    recipe: BTreeMap<String, String>,
    external: BTreeMap<String, String>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in scope: `date`, `YYYY`, `YY`, `MM`, `DD`, `HH`, `mm`, `ss`
    /// derived from `now` (computed once at run start and passed in so the
    /// whole run sees a stable wall-clock snapshot), plus path-derived
    /// basenames/stems for the input file and recipe file when known.
    pub fn with_builtins(
        now: chrono::DateTime<chrono::Utc>,
        input_path: Option<&std::path::Path>,
        recipe_path: Option<&std::path::Path>,
    ) -> Self {
        let mut builtin = BTreeMap::new();
        builtin.insert("date".into(), now.format("%Y-%m-%d").to_string());
        builtin.insert("YYYY".into(), now.format("%Y").to_string());
        builtin.insert("YY".into(), now.format("%y").to_string());
        builtin.insert("MM".into(), now.format("%m").to_string());
        builtin.insert("DD".into(), now.format("%d").to_string());
        builtin.insert("HH".into(), now.format("%H").to_string());
        builtin.insert("mm".into(), now.format("%M").to_string());
        builtin.insert("ss".into(), now.format("%S").to_string());

        if let Some(p) = input_path {
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                builtin.insert("input_basename".into(), name.to_string());
            }
            if let Some(stem) = p.file_stem().and_then(|n| n.to_str()) {
                builtin.insert("input_stem".into(), stem.to_string());
            }
        }
        if let Some(p) = recipe_path {
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                builtin.insert("recipe_basename".into(), name.to_string());
            }
            if let Some(stem) = p.file_stem().and_then(|n| n.to_str()) {
                builtin.insert("recipe_stem".into(), stem.to_string());
            }
        }

        Self {
            builtin,
            recipe: BTreeMap::new(),
            external: BTreeMap::new(),
        }
    }

    /// Installs the recipe's `settings.variables`, first substituting each
    /// raw value against the built-in scope so recipe variables may compose
    /// built-ins (e.g. `region_report: "report_{YYYY}"`).
    pub fn with_recipe_variables(mut self, raw: &BTreeMap<String, String>) -> Result<Self> {
        for (name, raw_value) in raw {
            let value = substitute(raw_value, &self, Mode::Lenient);
            self.recipe.insert(name.clone(), value);
        }
        Ok(self)
    }

    /// Installs externally-supplied (CLI / prompt) variables. These are
    /// taken literally — no substitution is applied to them.
    pub fn with_external_variables(mut self, external: BTreeMap<String, String>) -> Self {
        self.external = external;
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.external
            .get(name)
            .or_else(|| self.recipe.get(name))
            .or_else(|| self.builtin.get(name))
            .map(String::as_str)
    }

    pub fn external_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.external
    }
}

/// Expands every `{name}` placeholder in `template` against `scope`.
///
/// In [`Mode::Strict`], the first unresolved placeholder raises
/// [`RecipeError::UnknownVariable`]. In [`Mode::Lenient`], unresolved
/// placeholders are left as-is. Callers that need the *full* list of
/// unresolved names for a pre-flight report should use [`validate`] instead,
/// since this function (in strict mode) stops at the first one.
pub fn substitute_checked(template: &str, scope: &VariableScope, mode: Mode) -> Result<String> {
    let mut error = None;
    let result = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        match scope.get(name) {
            Some(value) => value.to_string(),
            None => match mode {
                Mode::Lenient => caps[0].to_string(),
                Mode::Strict => {
                    if error.is_none() {
                        error = Some(RecipeError::UnknownVariable(name.to_string()));
                    }
                    caps[0].to_string()
                }
            },
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(result.into_owned()),
    }
}

/// Convenience wrapper over [`substitute_checked`] for lenient
/// (never-fails) substitution, used throughout runtime processing of paths
/// and other user-facing strings.
pub fn substitute(template: &str, scope: &VariableScope, mode: Mode) -> String {
    substitute_checked(template, scope, mode).unwrap_or_else(|_| template.to_string())
}

/// Returns every placeholder name in `template` that does not resolve in
/// `scope`, in order of first appearance, without stopping at the first
/// failure — used by pre-flight (§4.5 phase 3) to report every problem in
/// one pass instead of one-at-a-time.
pub fn validate(template: &str, scope: &VariableScope) -> Vec<String> {
    let mut unknown = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if scope.get(name).is_none() && !unknown.iter().any(|n: &String| n == name) {
            unknown.push(name.to_string());
        }
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn fixed_now() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2026, 3, 5, 12, 30, 45).unwrap()
    }

    #[test]
    fn expands_builtin_date_fields() {
        let scope = VariableScope::with_builtins(fixed_now(), None, None);
        assert_eq!(
            substitute("report_{region}_{YYYY}.xlsx", &scope, Mode::Lenient),
            "report_{region}_2026.xlsx"
        );
    }

    #[test]
    fn external_shadows_recipe_shadows_builtin() {
        let mut raw = BTreeMap::new();
        raw.insert("region".to_string(), "west".to_string());
        let scope = VariableScope::with_builtins(fixed_now(), None, None)
            .with_recipe_variables(&raw)
            .unwrap()
            .with_external_variables(BTreeMap::from([("region".to_string(), "east".to_string())]));

        assert_eq!(substitute("{region}_{YYYY}", &scope, Mode::Strict).unwrap(), "east_2026");
    }

    #[test]
    fn strict_mode_rejects_unknown_variable() {
        let scope = VariableScope::with_builtins(fixed_now(), None, None);
        let err = substitute_checked("{nope}", &scope, Mode::Strict).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownVariable(name) if name == "nope"));
    }

    #[test]
    fn validate_collects_every_unknown_name_without_short_circuiting() {
        let scope = VariableScope::with_builtins(fixed_now(), None, None);
        let unknown = validate("{a}-{b}-{YYYY}-{a}", &scope);
        assert_eq!(unknown, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn literal_braces_without_a_known_identifier_pass_through() {
        let scope = VariableScope::with_builtins(fixed_now(), None, None);
        assert_eq!(substitute("{not a name}", &scope, Mode::Lenient), "{not a name}");
    }

    proptest! {
        #[test]
        fn substitution_is_idempotent_once_no_braces_remain(region in "[a-z]{1,8}") {
            let scope = VariableScope::with_builtins(fixed_now(), None, None)
                .with_external_variables(BTreeMap::from([("region".to_string(), region)]));
            let template = "report_{region}_{YYYY}";
            let once = substitute(template, &scope, Mode::Lenient);
            prop_assert!(!once.contains('{'));
            let twice = substitute(&once, &scope, Mode::Lenient);
            prop_assert_eq!(once, twice);
        }
    }
}
