// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The closed error taxonomy shared by every crate in this workspace.
//!
//! Every failure a caller needs to discriminate on is a distinct variant
//! here, per the taxonomy in the specification's error-handling design.
//! Execution-time variants may carry a 1-based step index and description so
//! the orchestrator can report "step 3 (Lookup customer) failed: ..." without
//! re-threading that context through every processor.

use thiserror::Error;

/// Domain-specific errors for the recipe pipeline.
#[derive(Error, Debug, Clone)]
pub enum RecipeError {
    #[error("recipe validation failed: {0}")]
    RecipeValidation(String),

    #[error("unknown variable '{0}' referenced in template")]
    UnknownVariable(String),

    #[error("unknown processor type '{0}'")]
    UnknownProcessor(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("stage '{0}' not found")]
    StageNotFound(String),

    #[error("stage conflict: {0}")]
    StageConflict(String),

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("duplicate keys in lookup: {0:?}")]
    DuplicateKey(Vec<String>),

    #[error("IO error on '{path}': {message}")]
    Io { path: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl RecipeError {
    pub fn io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable, machine-matchable category name, mirroring the pattern the
    /// teacher crate uses for metrics/logging dispatch.
    pub fn category(&self) -> &'static str {
        match self {
            Self::RecipeValidation(_) => "recipe_validation",
            Self::UnknownVariable(_) => "unknown_variable",
            Self::UnknownProcessor(_) => "unknown_processor",
            Self::Config(_) => "config",
            Self::StageNotFound(_) => "stage_not_found",
            Self::StageConflict(_) => "stage_conflict",
            Self::ColumnNotFound(_) => "column_not_found",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::Io { .. } => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for RecipeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Wraps a [`RecipeError`] with the 1-based step index and description of
/// the step that produced it, attached once by the orchestrator on the way
/// out of a failed `execute` call.
#[derive(Error, Debug, Clone)]
#[error("step {step_index} ({step_description}): {source}")]
pub struct StepError {
    pub step_index: usize,
    pub step_description: String,
    #[source]
    pub source: RecipeError,
}

impl StepError {
    pub fn new(step_index: usize, step_description: impl Into<String>, source: RecipeError) -> Self {
        Self {
            step_index,
            step_description: step_description.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecipeError>;
