//! Command-line interface for the sbmlflat library
//!
//! This binary provides a CLI to flatten hierarchical SBML documents, including:
//! - Inlining external model definitions as model definitions
//! - Collapsing submodels into a single flat model
//! - Validating documents and printing a summary
//!
//! # Usage
//!
//! ```bash
//! # Inline all external model definitions
//! sbmlflat flatten-emds top.xml --output top_emd.xml
//!
//! # Collapse the whole hierarchy into one model
//! sbmlflat flatten top.xml --output top_flat.xml --no-ports
//!
//! # Validate a document and print the diagnostics as JSON
//! sbmlflat validate top.xml --json
//! ```
//!
//! # Exit codes
//!
//! * `0` success
//! * `1` read or write error
//! * `2` unresolved reference or missing model reference
//! * `3` validation errors after flattening
//! * `4` cyclic reference or model id collision

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use log::{error, LevelFilter};
use sbmlflat::{
    comp::driver::{FlattenOutcome, FlattenerBuilder},
    info::report_table,
    io::{read_sbml, save_report},
    sbml::error::SBMLError,
    validation::consistency::{validate, ValidationOptions, ValidationOptionsBuilder},
};

/// Exit code for documents that fail validation
const VALIDATION_FAILED: u8 = 3;

/// Main CLI configuration struct
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Replace external model definitions by model definitions
    FlattenEmds {
        /// Path to the SBML document
        path: PathBuf,

        /// Path to write the result to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip validation before and after flattening
        #[arg(long)]
        no_validate: bool,

        /// Write the reconciliation report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Inline external model definitions and collapse all submodels into the top model
    Flatten {
        /// Path to the SBML document
        path: PathBuf,

        /// Path to write the result to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Remove the ports of the top model
        #[arg(long)]
        no_ports: bool,

        /// Skip validation before and after flattening
        #[arg(long)]
        no_validate: bool,
    },
    /// Validate an SBML document
    Validate {
        /// Path to the SBML document
        path: PathBuf,

        /// Print the diagnostics as JSON
        #[arg(long)]
        json: bool,

        /// Skip the units checks
        #[arg(long)]
        no_units: bool,

        /// Skip the modeling practice checks
        #[arg(long)]
        no_practice: bool,
    },
    /// Print packages, models and external model definitions of a document
    Info {
        /// Path to the SBML document
        path: PathBuf,
    },
}

/// Main entry point for the CLI application
pub fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(command: Commands) -> Result<u8, SBMLError> {
    match command {
        Commands::FlattenEmds {
            path,
            output,
            no_validate,
            report,
        } => {
            let mut builder = FlattenerBuilder::default();
            builder.validate(!no_validate);
            if let Some(output) = output {
                builder.output(output);
            }
            let flattener = builder
                .build()
                .map_err(|err| SBMLError::Unflattenable(err.to_string()))?;
            let outcome = flattener.run(&path)?;

            if let Some(report) = report {
                save_report(&report, &outcome.reconcile)
                    .map_err(|err| SBMLError::WriteError(std::io::Error::other(err)))?;
            }
            finish(outcome)
        }
        Commands::Flatten {
            path,
            output,
            no_ports,
            no_validate,
        } => {
            let mut builder = FlattenerBuilder::default();
            builder
                .validate(!no_validate)
                .flatten_submodels(true)
                .leave_ports(!no_ports);
            if let Some(output) = output {
                builder.output(output);
            }
            let flattener = builder
                .build()
                .map_err(|err| SBMLError::Unflattenable(err.to_string()))?;
            finish(flattener.run(&path)?)
        }
        Commands::Validate {
            path,
            json,
            no_units,
            no_practice,
        } => {
            let doc = read_sbml(path)?;
            let options = ValidationOptionsBuilder::default()
                .units(!no_units)
                .modeling_practice(!no_practice)
                .build()
                .unwrap_or_else(|_| ValidationOptions::default());
            let report = validate(&doc, &options);

            if json {
                let json = serde_json::to_string_pretty(&report)
                    .map_err(|err| SBMLError::WriteError(std::io::Error::other(err)))?;
                println!("{json}");
            } else {
                println!("{}", report_table(&report));
            }

            Ok(if report.error_count() > 0 {
                VALIDATION_FAILED
            } else {
                0
            })
        }
        Commands::Info { path } => {
            let doc = read_sbml(path)?;
            println!("{doc}");
            Ok(0)
        }
    }
}

/// Prints the summary of a flattening run and derives the exit code.
fn finish(outcome: FlattenOutcome) -> Result<u8, SBMLError> {
    for warning in &outcome.reconcile.warnings {
        eprintln!("warning: {warning}");
    }
    if let Some(report) = &outcome.validation {
        let (total, errors, warnings) = report.counts();
        println!("{total} diagnostic(s): {errors} error(s), {warnings} warning(s)");
    }

    Ok(if outcome.has_validation_errors() {
        VALIDATION_FAILED
    } else {
        0
    })
}
