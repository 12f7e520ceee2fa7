//! Consistency module for checking SBML documents.
//!
//! This module is the validator facade used before and after flattening. It checks:
//! - Document structure and package declarations (internal consistency)
//! - Identifiers, references and comp/fbc rules inside every model (general consistency)
//! - Units and modeling practice (optional categories)
//!
//! The main entry point is the `validate` function which runs the configured checks
//! and returns a `ValidationReport`. Validation never modifies the document.

use std::fmt;

use colored::Colorize;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::sbml::document::SBMLDocument;
use crate::validation::general::check_general;
use crate::validation::internal::check_internal;
use crate::validation::practice::{check_modeling_practice, check_units};

/// Checks to run during validation
///
/// # Examples
///
/// ```
/// use sbmlflat::validation::consistency::ValidationOptionsBuilder;
///
/// let options = ValidationOptionsBuilder::default()
///     .units(false)
///     .build()
///     .unwrap();
/// assert!(options.internal);
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Units consistency checks
    #[builder(default = "true")]
    pub units: bool,
    /// Internal consistency checks of the document structure
    #[builder(default = "true")]
    pub internal: bool,
    /// Modeling practice recommendations
    #[builder(default = "true")]
    pub modeling_practice: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            units: true,
            internal: true,
            modeling_practice: true,
        }
    }
}

/// Validates an SBML document.
///
/// Internal consistency checks run when `options.internal` is set, the general
/// consistency checks always run. Units and modeling-practice checks are optional.
///
/// # Arguments
///
/// * `doc` - The document to validate.
/// * `options` - The checks to run.
///
/// # Returns
///
/// Returns a `ValidationReport` with every diagnostic and the counts by severity.
pub fn validate(doc: &SBMLDocument, options: &ValidationOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    if options.internal {
        check_internal(doc, &mut report);
    }
    check_general(doc, &mut report);
    if options.units {
        check_units(doc, &mut report);
    }
    if options.modeling_practice {
        check_modeling_practice(doc, &mut report);
    }

    report
}

/// The `ValidationReport` struct stores the results of the validation checks.
///
/// Fatal and Error diagnostics count as errors, all others as warnings. The document
/// is considered invalid if there is at least one error.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ValidationReport {
    /// Whether the document is valid overall. False if any errors were found.
    pub is_valid: bool,
    /// Individual diagnostics in the order they were found.
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            diagnostics: Vec::new(),
        }
    }

    /// Adds a diagnostic to the report.
    ///
    /// If the diagnostic counts as an error, marks the overall report as invalid.
    pub fn add_result(&mut self, result: Diagnostic) {
        if result.severity.is_error() {
            self.is_valid = false;
        }
        self.diagnostics.push(result);
    }

    /// Total number of diagnostics.
    pub fn total(&self) -> usize {
        self.diagnostics.len()
    }

    /// Number of fatal and error diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity.is_error())
            .count()
    }

    /// Number of warning and info diagnostics.
    pub fn warning_count(&self) -> usize {
        self.total() - self.error_count()
    }

    /// `(total, errors, warnings)`
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.total(), self.error_count(), self.warning_count())
    }

    /// No errors and no warnings.
    pub fn is_perfect(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.severity.is_error())
    }

    /// Diagnostics concerning the object with the given identifier.
    pub fn filter_results(&self, identifier: &str) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|result| result.identifier.as_deref() == Some(identifier))
            .cloned()
            .collect()
    }

    /// Diagnostics of one category.
    pub fn by_category(&self, category: Category) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    /// Emits every diagnostic through the `log` facade at a level matching its severity.
    pub fn log(&self) {
        for diagnostic in &self.diagnostics {
            match diagnostic.severity {
                Severity::Fatal | Severity::Error => log::error!("{}", diagnostic.plain()),
                Severity::Warning => log::warn!("{}", diagnostic.plain()),
                Severity::Info => log::info!("{}", diagnostic.plain()),
            }
        }
    }
}

/// A single validation issue: `(severity, category, id, message)` plus the location
/// inside the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Path to the element the issue was found on, e.g. `/sbml/model[@id='m']`
    location: String,
    /// Human readable description of the issue
    message: String,
    /// Severity level of the issue
    severity: Severity,
    /// Check category the issue belongs to
    category: Category,
    /// The identifier of the object, if any
    identifier: Option<String>,
}

impl Diagnostic {
    pub fn new(
        location: String,
        message: String,
        severity: Severity,
        category: Category,
        identifier: Option<String>,
    ) -> Self {
        Self {
            location,
            message,
            severity,
            category,
            identifier,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> &Severity {
        &self.severity
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn identifier(&self) -> &Option<String> {
        &self.identifier
    }

    /// Uncolored single-line rendering used for logging.
    pub fn plain(&self) -> String {
        format!(
            "[{}] {} ({}): {}",
            self.location, self.severity, self.category, self.message
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self.severity {
            Severity::Fatal | Severity::Error => self.message.bold().red(),
            Severity::Warning => self.message.bold().yellow(),
            Severity::Info => self.message.bold().green(),
        };

        let severity = match self.severity {
            Severity::Fatal => "Fatal".bold().red(),
            Severity::Error => "Error".bold().red(),
            Severity::Warning => "Warning".bold().yellow(),
            Severity::Info => "Info".bold().green(),
        };

        write!(
            f,
            "[{}] {} ({}):\n\t└── {}",
            self.location.bold(),
            severity,
            self.category,
            message
        )
    }
}

/// Severity levels for validation issues.
#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
pub enum Severity {
    /// The document cannot be processed
    Fatal,
    /// The document is invalid
    Error,
    /// The document may have issues but is still valid
    Warning,
    /// Informational message
    Info,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Fatal | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "Fatal"),
            Severity::Error => write!(f, "Error"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

/// Check categories
#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
pub enum Category {
    /// Problems found while reading the XML
    Xml,
    /// Document structure and package declarations
    Internal,
    /// Identifiers and references
    General,
    /// Hierarchical model composition
    Comp,
    /// Flux balance constraints
    Fbc,
    Units,
    ModelingPractice,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Xml => "xml",
            Category::Internal => "internal consistency",
            Category::General => "general consistency",
            Category::Comp => "comp",
            Category::Fbc => "fbc",
            Category::Units => "units consistency",
            Category::ModelingPractice => "modeling practice",
        };
        write!(f, "{name}")
    }
}

/// Location path of a model element, e.g. `/sbml/model[@id='m']`.
pub(crate) fn model_location(model: &crate::sbml::model::Model<'_>) -> String {
    let kind = if model.is_definition() {
        "listOfModelDefinitions/modelDefinition"
    } else {
        "model"
    };
    match model.id() {
        Some(id) => format!("/sbml/{kind}[@id='{id}']"),
        None => format!("/sbml/{kind}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
      xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true">
      <model id="top" timeUnits="second" substanceUnits="mole" extentUnits="mole">
        <listOfCompartments>
          <compartment id="c" size="1" units="litre" spatialDimensions="3" constant="true"/>
        </listOfCompartments>
        <listOfSpecies>
          <species id="s" compartment="c" initialConcentration="1" hasOnlySubstanceUnits="false"
                   boundaryCondition="false" constant="false"/>
        </listOfSpecies>
        <comp:listOfSubmodels>
          <comp:submodel comp:id="sub" comp:modelRef="A"/>
        </comp:listOfSubmodels>
      </model>
      <comp:listOfModelDefinitions>
        <comp:modelDefinition id="A"/>
      </comp:listOfModelDefinitions>
    </sbml>"#;

    #[test]
    fn test_valid_document() {
        let doc = SBMLDocument::from_xml_string(VALID).expect("Failed to read document");
        let report = validate(&doc, &ValidationOptions::default());
        assert!(report.is_valid, "{:#?}", report.diagnostics);
        assert_eq!(report.counts(), (0, 0, 0));
    }

    #[test]
    fn test_inconsistent_document() {
        let xml = VALID
            .replace(r#"compartment="c""#, r#"compartment="nowhere""#)
            .replace(r#"comp:modelRef="A""#, r#"comp:modelRef="B""#);
        let doc = SBMLDocument::from_xml_string(&xml).expect("Failed to read document");
        let report = validate(&doc, &ValidationOptions::default());

        assert!(!report.is_valid);
        assert_eq!(report.error_count(), 2);
        assert_eq!(report.filter_results("s").len(), 1);
        assert_eq!(report.filter_results("sub").len(), 1);
    }

    #[test]
    fn test_optional_categories() {
        let xml = VALID.replace(r#" size="1""#, "");
        let doc = SBMLDocument::from_xml_string(&xml).unwrap();

        let all = validate(&doc, &ValidationOptions::default());
        assert_eq!(all.by_category(Category::ModelingPractice).len(), 1);
        assert!(all.is_valid);

        let options = ValidationOptionsBuilder::default()
            .modeling_practice(false)
            .build()
            .unwrap();
        let reduced = validate(&doc, &options);
        assert!(reduced.is_perfect());
    }

    #[test]
    fn test_severity_counts() {
        let mut report = ValidationReport::new();
        for severity in [Severity::Fatal, Severity::Error, Severity::Warning, Severity::Info] {
            report.add_result(Diagnostic::new(
                "/sbml".to_string(),
                "message".to_string(),
                severity,
                Category::General,
                None,
            ));
        }
        assert_eq!(report.counts(), (4, 2, 2));
        assert!(!report.is_valid);
    }
}
