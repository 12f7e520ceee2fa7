//! Flattening pipeline
//!
//! Chains the steps of a flattening run:
//!
//! 1. read the document
//! 2. validate (advisory, logged)
//! 3. rewrite external model definitions into model definitions
//! 4. reconcile the package declarations
//! 5. optionally collapse submodels into the top model
//! 6. validate again (errors are logged and returned, never fatal)
//! 7. optionally write the result
//!
//! [`flatten_emds`] and [`flatten_comp`] run the pipeline with default settings,
//! [`Flattener`] exposes the individual switches.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use log::{debug, error, info, warn};

use crate::{
    comp::{
        flatten::{CompFlattener, FlattenReport, SubmodelInliner},
        reconciler::{reconcile, ReconcileReport},
        rewriter::rewrite,
    },
    sbml::{document::SBMLDocument, error::SBMLError},
    validation::consistency::{validate, ValidationOptions, ValidationReport},
};

/// Replaces all external model definitions of the document at `path` by model
/// definitions and returns the result.
///
/// # Errors
///
/// See [`Flattener::run`].
pub fn flatten_emds(path: impl AsRef<Path>) -> Result<SBMLDocument, SBMLError> {
    let outcome = FlattenerBuilder::default()
        .build()
        .map_err(|err| SBMLError::Unflattenable(err.to_string()))?
        .run(path)?;
    Ok(outcome.document)
}

/// Inlines external model definitions and collapses all submodels of the document at
/// `path` into a single flat model.
pub fn flatten_comp(path: impl AsRef<Path>) -> Result<SBMLDocument, SBMLError> {
    let outcome = FlattenerBuilder::default()
        .flatten_submodels(true)
        .build()
        .map_err(|err| SBMLError::Unflattenable(err.to_string()))?
        .run(path)?;
    Ok(outcome.document)
}

/// Configurable flattening run
///
/// # Examples
///
/// ```no_run
/// use sbmlflat::comp::driver::FlattenerBuilder;
///
/// let outcome = FlattenerBuilder::default()
///     .validate(false)
///     .output("flat.xml")
///     .build()
///     .unwrap()
///     .run("top.xml")
///     .unwrap();
/// assert!(outcome.document.external_model_definitions().is_empty());
/// ```
#[derive(Debug, Clone, Builder)]
pub struct Flattener {
    /// Validate the document before and after flattening
    #[builder(default = "true")]
    pub validate: bool,
    /// Checks to run when validating
    #[builder(default)]
    pub validation_options: ValidationOptions,
    /// Collapse the submodels into the top model after inlining
    #[builder(default = "false")]
    pub flatten_submodels: bool,
    /// Keep the ports of the top model when collapsing submodels
    #[builder(default = "true")]
    pub leave_ports: bool,
    /// Write the result to this path on success
    #[builder(default, setter(into, strip_option))]
    pub output: Option<PathBuf>,
}

/// Result of a flattening run
#[derive(Debug, Clone)]
pub struct FlattenOutcome {
    pub document: SBMLDocument,
    pub reconcile: ReconcileReport,
    /// Present when submodels were collapsed
    pub flatten: Option<FlattenReport>,
    /// Validation of the result, present when validation is enabled
    pub validation: Option<ValidationReport>,
}

impl FlattenOutcome {
    /// True when the result was validated and contains errors.
    pub fn has_validation_errors(&self) -> bool {
        self.validation
            .as_ref()
            .is_some_and(|report| report.error_count() > 0)
    }
}

impl Flattener {
    /// Reads the document at `path` and flattens it.
    ///
    /// # Errors
    ///
    /// * `SBMLError::ReadError`, `SBMLError::Xml`, `SBMLError::NotSBML` - the input cannot be read
    /// * `SBMLError::UnresolvedReference`, `SBMLError::MissingModelRef` - an EMD cannot be resolved
    /// * `SBMLError::CyclicReference`, `SBMLError::ModelIdCollision` - the EMDs cannot be inlined
    /// * `SBMLError::Unflattenable` - the submodels cannot be collapsed
    /// * `SBMLError::WriteError` - the output cannot be written
    pub fn run(&self, path: impl AsRef<Path>) -> Result<FlattenOutcome, SBMLError> {
        let doc = SBMLDocument::read(path)?;
        self.process(doc)
    }

    /// Flattens a document that is already in memory. Relative sources are resolved
    /// against the directory of [`SBMLDocument::path`].
    pub fn process(&self, mut doc: SBMLDocument) -> Result<FlattenOutcome, SBMLError> {
        if self.validate {
            let report = validate(&doc, &self.validation_options);
            let (total, errors, warnings) = report.counts();
            debug!("Input validation: {total} diagnostic(s), {errors} error(s), {warnings} warning(s)");
            if errors > 0 {
                warn!("Input document has {errors} validation error(s)");
            }
        }

        let demand = rewrite(&mut doc)?;
        let reconcile = reconcile(&mut doc, &demand);

        let flatten = if self.flatten_submodels {
            let inliner = SubmodelInliner::new(self.leave_ports);
            Some(inliner.flatten(&mut doc)?)
        } else {
            None
        };

        let validation = if self.validate {
            let report = validate(&doc, &self.validation_options);
            report.log();
            if report.error_count() > 0 {
                error!(
                    "Flattened document has {} validation error(s)",
                    report.error_count()
                );
            }
            Some(report)
        } else {
            None
        };

        if let Some(output) = &self.output {
            doc.write(output)?;
            info!("Flattened model written to '{}'", output.display());
        }

        Ok(FlattenOutcome {
            document: doc,
            reconcile,
            flatten,
            validation,
        })
    }
}
