use std::collections::HashSet;

use crate::sbml::document::SBMLDocument;
use crate::sbml::model::Model;
use crate::validation::consistency::{
    model_location, Category, Diagnostic, Severity, ValidationReport,
};

/// Checks that quantities carry units.
///
/// Only declarations are checked; the dimensional analysis of MathML is not performed.
pub fn check_units(doc: &SBMLDocument, report: &mut ValidationReport) {
    for model in doc.model().into_iter().chain(doc.model_definitions()) {
        let Some(core) = model.element().namespace_core() else {
            continue;
        };
        let location = model_location(&model);
        let element = model.element();
        let mut warn = |id: Option<&str>, message: String| {
            report.add_result(Diagnostic::new(
                location.clone(),
                message,
                Severity::Warning,
                Category::Units,
                id.map(str::to_string),
            ));
        };

        for compartment in element.list_items(&core, "listOfCompartments", "compartment") {
            if compartment.attr("units").is_none() {
                warn(
                    compartment.attr("id"),
                    format!(
                        "Compartment '{}' has no units",
                        compartment.attr("id").unwrap_or_default()
                    ),
                );
            }
        }

        for parameter in element.list_items(&core, "listOfParameters", "parameter") {
            if parameter.attr("units").is_none() {
                warn(
                    parameter.attr("id"),
                    format!(
                        "Parameter '{}' has no units",
                        parameter.attr("id").unwrap_or_default()
                    ),
                );
            }
        }

        if model.count("listOfReactions") > 0 {
            let missing: Vec<&str> = ["timeUnits", "substanceUnits", "extentUnits"]
                .into_iter()
                .filter(|attribute| element.attr(attribute).is_none())
                .collect();
            if !missing.is_empty() {
                warn(
                    model.id(),
                    format!(
                        "Model has reactions but does not define {}",
                        missing.join(", ")
                    ),
                );
            }
        }
    }
}

/// Checks for values that are left undefined.
pub fn check_modeling_practice(doc: &SBMLDocument, report: &mut ValidationReport) {
    for model in doc.model().into_iter().chain(doc.model_definitions()) {
        let Some(core) = model.element().namespace_core() else {
            continue;
        };
        let location = model_location(&model);
        let element = model.element();
        let assigned = assigned_symbols(&model, &core);
        let mut warn = |id: Option<&str>, message: String| {
            report.add_result(Diagnostic::new(
                location.clone(),
                message,
                Severity::Warning,
                Category::ModelingPractice,
                id.map(str::to_string),
            ));
        };

        for compartment in element.list_items(&core, "listOfCompartments", "compartment") {
            let id = compartment.attr("id");
            if compartment.attr("size").is_none() && !id.is_some_and(|id| assigned.contains(id)) {
                warn(
                    id,
                    format!(
                        "Compartment '{}' has no size",
                        id.unwrap_or_default()
                    ),
                );
            }
        }

        for parameter in element.list_items(&core, "listOfParameters", "parameter") {
            let id = parameter.attr("id");
            if parameter.attr("value").is_none() && !id.is_some_and(|id| assigned.contains(id)) {
                warn(
                    id,
                    format!("Parameter '{}' has no value", id.unwrap_or_default()),
                );
            }
        }

        for species in element.list_items(&core, "listOfSpecies", "species") {
            let id = species.attr("id");
            let initialized = species.attr("initialAmount").is_some()
                || species.attr("initialConcentration").is_some()
                || id.is_some_and(|id| assigned.contains(id));
            if !initialized {
                warn(
                    id,
                    format!(
                        "Species '{}' has neither an initial amount nor an initial concentration",
                        id.unwrap_or_default()
                    ),
                );
            }
        }
    }
}

/// Symbols set by an initial assignment or an assignment rule.
fn assigned_symbols<'a>(model: &Model<'a>, core: &'a str) -> HashSet<&'a str> {
    let element = model.element();
    let mut assigned: HashSet<&str> = element
        .list_items(core, "listOfInitialAssignments", "initialAssignment")
        .filter_map(|ia| ia.attr("symbol"))
        .collect();
    assigned.extend(
        element
            .list_items(core, "listOfRules", "assignmentRule")
            .filter_map(|rule| rule.attr("variable")),
    );
    assigned
}
