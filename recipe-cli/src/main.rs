// /////////////////////////////////////////////////////////////////////////////
// Recipe Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Command-line entry point for running recipe pipelines (§6.3).
//!
//! A thin adapter over [`recipe_engine::orchestrator::Orchestrator`]: this
//! binary owns argument parsing, `-v`/`-vv` verbosity wiring, and turning a
//! [`recipe_engine::orchestrator::RunError`] into a process exit code. It
//! contains no pipeline logic of its own.

use clap::{Parser, Subcommand};
use recipe_engine::orchestrator::{Orchestrator, RunError, RunRequest};
use recipe_engine::registry::ProcessorRegistry;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "recipe")]
#[command(about = "Runs declarative, YAML-defined recipes over tabular data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Raise logging verbosity: -v for info, -vv for debug.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recipe.
    Run {
        /// Path to the recipe document.
        recipe: PathBuf,

        /// Variable override, `name=value`. May be repeated; later repeats
        /// of the same name win.
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Run pre-flight validation only; do not execute any step.
        #[arg(long)]
        validate_only: bool,
    },

    /// List every registered processor type and its role.
    ListProcessors,

    /// Print a processor's capability record (options, role, summary).
    Describe {
        /// The `processor_type` to describe.
        processor_type: String,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) => Ok((name.to_string(), value.to_string())),
        None => Err(format!("expected 'name=value', got '{raw}'")),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { recipe, vars, validate_only } => run(recipe, vars, validate_only),
        Commands::ListProcessors => list_processors(),
        Commands::Describe { processor_type } => describe(&processor_type),
    }
}

fn run(recipe_path: PathBuf, vars: Vec<(String, String)>, validate_only: bool) -> ExitCode {
    let mut external_vars = BTreeMap::new();
    for (name, value) in vars {
        external_vars.insert(name, value);
    }

    let request = RunRequest {
        recipe_path,
        external_vars,
        validate_only,
        interactive: std::io::stdin().is_terminal(),
    };

    let orchestrator = Orchestrator::with_builtins();
    match orchestrator.run(request) {
        Ok(report) => {
            if validate_only {
                println!("recipe is valid");
            } else {
                println!("{} step(s) executed successfully", report.steps_executed);
                for (name, meta) in &report.stage_summary {
                    println!("  stage '{name}': {} row(s), {} column(s)", meta.rows, meta.columns);
                }
            }
            ExitCode::SUCCESS
        }
        Err(RunError::PreFlight(issues)) => {
            for issue in &issues {
                error!("{issue}");
            }
            eprintln!("recipe failed pre-flight validation with {} issue(s):", issues.len());
            for issue in &issues {
                eprintln!("  - {issue}");
            }
            ExitCode::FAILURE
        }
        Err(RunError::Execution(step_err)) => {
            error!("step {} ({}) failed: {}", step_err.step_index, step_err.step_description, step_err.source);
            eprintln!(
                "step {} ({}) failed: {}",
                step_err.step_index, step_err.step_description, step_err.source
            );
            ExitCode::FAILURE
        }
    }
}

fn list_processors() -> ExitCode {
    let registry = ProcessorRegistry::with_builtins();
    let mut types = registry.registered_types();
    types.sort_unstable();
    for processor_type in types {
        match registry.role_of(processor_type) {
            Ok(role) => println!("{processor_type:<20} {role:?}"),
            Err(e) => warn!("{e}"),
        }
    }
    ExitCode::SUCCESS
}

fn describe(processor_type: &str) -> ExitCode {
    let registry = ProcessorRegistry::with_builtins();
    match registry.describe(processor_type) {
        Ok(desc) => {
            println!("{} ({:?})", desc.processor_type, desc.role);
            println!("  {}", desc.summary);
            println!("  options:");
            for opt in &desc.options {
                let required = if opt.required { "required" } else { "optional" };
                let default = opt.default.map(|d| format!(", default {d}")).unwrap_or_default();
                println!("    {} [{required}{default}] — {}", opt.name, opt.description);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
