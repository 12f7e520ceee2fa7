//! Information display module for SBML documents
//!
//! This module provides functionality for displaying SBML documents in a human-readable
//! format. It implements the `Display` trait for `SBMLDocument`, listing the declared
//! packages, the models and the external model definitions as tables.

use std::fmt::{self, Display};

use tabled::{builder::Builder, settings::Style};

use crate::{
    sbml::{
        document::SBMLDocument,
        model::{ExternalModelDefinition, Model},
        packages::PackageDeclaration,
    },
    validation::consistency::ValidationReport,
};

/// Trait for converting document components to table records
trait TableRecord {
    /// Get the column headers for the table
    fn columns() -> Vec<String>;

    /// Convert the instance to a record for display in a table
    fn to_record(&self) -> Vec<String>;
}

impl Display for SBMLDocument {
    /// Formats an SBML document as a table of its packages, models and external model
    /// definitions, leaving out empty sections.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        let title = match (self.level(), self.version()) {
            (Some(level), Some(version)) => format!("SBML Level {level} Version {version}"),
            _ => "SBML".to_string(),
        };
        builder.push_record(vec![title]);

        if let Some(path) = self.path() {
            builder.push_record(vec![path.display().to_string()]);
        }

        let packages = self.packages();
        if !packages.is_empty() {
            builder.push_record(vec!["Packages".to_string()]);
            builder.push_record(vec![to_table(&packages)]);
        }

        let models: Vec<Model<'_>> = self
            .model()
            .into_iter()
            .chain(self.model_definitions())
            .collect();
        if !models.is_empty() {
            builder.push_record(vec!["Models".to_string()]);
            builder.push_record(vec![to_table(&models)]);
        }

        let emds = self.external_model_definitions();
        if !emds.is_empty() {
            builder.push_record(vec!["External Model Definitions".to_string()]);
            builder.push_record(vec![to_table(&emds)]);
        }

        let mut table = builder.build();
        table.with(Style::sharp());
        write!(f, "{table}")
    }
}

/// Renders the diagnostics of a validation report as a table.
pub fn report_table(report: &ValidationReport) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Severity", "Category", "Id", "Location", "Message"]);
    for diagnostic in &report.diagnostics {
        builder.push_record([
            diagnostic.severity().to_string(),
            diagnostic.category().to_string(),
            diagnostic.identifier().clone().unwrap_or_default(),
            diagnostic.location().to_string(),
            diagnostic.message().to_string(),
        ]);
    }

    let (total, errors, warnings) = report.counts();
    let mut table = builder.build();
    table.with(Style::rounded());
    format!("{table}\n{total} diagnostic(s): {errors} error(s), {warnings} warning(s)")
}

/// Converts a collection of TableRecord implementors to a formatted table string
fn to_table<T: TableRecord>(records: &[T]) -> String {
    let mut builder = Builder::default();
    builder.push_record(T::columns());

    for record in records {
        builder.push_record(record.to_record());
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

impl TableRecord for PackageDeclaration {
    fn columns() -> Vec<String> {
        vec![
            "Prefix".to_string(),
            "Package".to_string(),
            "Version".to_string(),
            "Required".to_string(),
        ]
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.prefix.clone(),
            self.name.clone(),
            self.version().map(|v| v.to_string()).unwrap_or_default(),
            self.required
                .map(|r| r.to_string())
                .unwrap_or("unset".to_string()),
        ]
    }
}

impl TableRecord for Model<'_> {
    fn columns() -> Vec<String> {
        vec![
            "ID".to_string(),
            "Kind".to_string(),
            "Compartments".to_string(),
            "Species".to_string(),
            "Parameters".to_string(),
            "Reactions".to_string(),
            "Submodels".to_string(),
        ]
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.id().unwrap_or("None").to_string(),
            if self.is_definition() {
                "definition".to_string()
            } else {
                "model".to_string()
            },
            self.count("listOfCompartments").to_string(),
            self.count("listOfSpecies").to_string(),
            self.count("listOfParameters").to_string(),
            self.count("listOfReactions").to_string(),
            self.submodels()
                .iter()
                .map(|s| format!("{} -> {}", s.id, s.model_ref))
                .collect::<Vec<_>>()
                .join(", "),
        ]
    }
}

impl TableRecord for ExternalModelDefinition {
    fn columns() -> Vec<String> {
        vec![
            "ID".to_string(),
            "Source".to_string(),
            "Model Ref".to_string(),
            "MD5".to_string(),
        ]
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.source.clone(),
            self.model_ref.clone().unwrap_or("None".to_string()),
            self.md5.clone().unwrap_or("None".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_models_and_emds() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true">
                 <model id="top">
                   <comp:listOfSubmodels><comp:submodel comp:id="sub" comp:modelRef="A"/></comp:listOfSubmodels>
                 </model>
                 <comp:listOfExternalModelDefinitions>
                   <comp:externalModelDefinition comp:id="A" comp:source="a.xml"/>
                 </comp:listOfExternalModelDefinitions>
               </sbml>"#,
        )
        .unwrap();

        let output = doc.to_string();
        assert!(output.contains("SBML Level 3 Version 1"));
        assert!(output.contains("sub -> A"));
        assert!(output.contains("a.xml"));
    }
}
