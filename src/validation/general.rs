use std::collections::{BTreeMap, HashSet};

use crate::sbml::document::SBMLDocument;
use crate::sbml::model::Model;
use crate::sbml::packages::{KnownPackage, COMP_NS};
use crate::sbml::xml::Element;
use crate::validation::consistency::{
    model_location, Category, Diagnostic, Severity, ValidationReport,
};

/// Checks identifiers and references inside every model of the document.
///
/// # Arguments
///
/// * `doc` - The document to check.
/// * `report` - The report to add the results to.
pub fn check_general(doc: &SBMLDocument, report: &mut ValidationReport) {
    check_required_packages(doc, report);

    let models = doc.model().into_iter().chain(doc.model_definitions());
    for model in models {
        let location = model_location(&model);
        let Some(core) = model.element().namespace_core() else {
            continue;
        };

        let sids = model.sids();
        check_unique_sids(&sids, &location, report);

        let defined: HashSet<&str> = sids.iter().map(|(id, _)| *id).collect();
        check_references(&model, &core, &defined, &location, report);
        check_submodels(doc, &model, &location, report);
        check_fbc_strict(doc, &model, &location, report);
    }
}

fn check_required_packages(doc: &SBMLDocument, report: &mut ValidationReport) {
    for package in doc.packages() {
        if package.required == Some(true) && package.known().is_none() {
            report.add_result(Diagnostic::new(
                "/sbml".to_string(),
                format!(
                    "Package '{}' is required for the mathematical interpretation but is not supported",
                    package.name
                ),
                Severity::Error,
                Category::General,
                Some(package.name.clone()),
            ));
        }
    }
}

fn check_unique_sids(sids: &[(&str, &Element)], location: &str, report: &mut ValidationReport) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (id, _) in sids {
        *counts.entry(id).or_default() += 1;
    }

    for (id, count) in counts.into_iter().filter(|(_, count)| *count > 1) {
        report.add_result(Diagnostic::new(
            location.to_string(),
            format!("The identifier '{id}' is used by {count} elements"),
            Severity::Error,
            Category::General,
            Some(id.to_string()),
        ));
    }
}

fn check_references(
    model: &Model<'_>,
    core: &str,
    defined: &HashSet<&str>,
    location: &str,
    report: &mut ValidationReport,
) {
    let element = model.element();
    let compartments: HashSet<&str> = element
        .list_items(core, "listOfCompartments", "compartment")
        .filter_map(|c| c.attr("id"))
        .collect();
    let species: HashSet<&str> = element
        .list_items(core, "listOfSpecies", "species")
        .filter_map(|s| s.attr("id"))
        .collect();

    let mut missing = |id: Option<&str>, message: String| {
        report.add_result(Diagnostic::new(
            location.to_string(),
            message,
            Severity::Error,
            Category::General,
            id.map(str::to_string),
        ));
    };

    for s in element.list_items(core, "listOfSpecies", "species") {
        if let Some(compartment) = s.attr("compartment") {
            if !compartments.contains(compartment) {
                missing(
                    s.attr("id"),
                    format!(
                        "Species '{}' refers to the undefined compartment '{compartment}'",
                        s.attr("id").unwrap_or_default()
                    ),
                );
            }
        }
    }

    for reaction in element.list_items(core, "listOfReactions", "reaction") {
        let references = ["listOfReactants", "listOfProducts", "listOfModifiers"]
            .into_iter()
            .filter_map(|list| reaction.child(core, list))
            .flat_map(|list| list.elements());
        for reference in references {
            if let Some(target) = reference.attr("species") {
                if !species.contains(target) {
                    missing(
                        reaction.attr("id"),
                        format!(
                            "Reaction '{}' refers to the undefined species '{target}'",
                            reaction.attr("id").unwrap_or_default()
                        ),
                    );
                }
            }
        }
    }

    let mut targets: Vec<(&str, &str)> = Vec::new();
    if let Some(rules) = element.child(core, "listOfRules") {
        targets.extend(
            rules
                .elements()
                .filter_map(|rule| rule.attr("variable").map(|v| (v, "rule"))),
        );
    }
    targets.extend(
        element
            .list_items(core, "listOfInitialAssignments", "initialAssignment")
            .filter_map(|ia| ia.attr("symbol").map(|s| (s, "initial assignment"))),
    );
    for event in element.list_items(core, "listOfEvents", "event") {
        targets.extend(
            event
                .list_items(core, "listOfEventAssignments", "eventAssignment")
                .filter_map(|ea| ea.attr("variable").map(|v| (v, "event assignment"))),
        );
    }

    for (target, kind) in targets {
        if !defined.contains(target) {
            missing(
                Some(target),
                format!("The {kind} for '{target}' refers to an undefined identifier"),
            );
        }
    }
}

fn check_submodels(
    doc: &SBMLDocument,
    model: &Model<'_>,
    location: &str,
    report: &mut ValidationReport,
) {
    let externals: HashSet<String> = doc
        .external_model_definitions()
        .into_iter()
        .map(|emd| emd.id)
        .collect();

    for submodel in model.submodels() {
        let resolves = !submodel.model_ref.is_empty()
            && (doc.find_model(&submodel.model_ref).is_some()
                || externals.contains(&submodel.model_ref));

        if !resolves {
            report.add_result(Diagnostic::new(
                location.to_string(),
                format!(
                    "Submodel '{}' refers to '{}' which is neither a model definition nor an external model definition",
                    submodel.id, submodel.model_ref
                ),
                Severity::Error,
                Category::Comp,
                Some(submodel.id.clone()),
            ));
        } else if model.is_definition() && model.id() == Some(submodel.model_ref.as_str()) {
            report.add_result(Diagnostic::new(
                location.to_string(),
                format!("Submodel '{}' instantiates its own model", submodel.id),
                Severity::Error,
                Category::Comp,
                Some(submodel.id.clone()),
            ));
        }
    }

    let dangling = model
        .element()
        .child(COMP_NS, "listOfSubmodels")
        .is_some_and(|list| list.elements().next().is_none());
    if dangling {
        report.add_result(Diagnostic::new(
            location.to_string(),
            "Empty list of submodels".to_string(),
            Severity::Warning,
            Category::Comp,
            model.id().map(str::to_string),
        ));
    }
}

fn check_fbc_strict(
    doc: &SBMLDocument,
    model: &Model<'_>,
    location: &str,
    report: &mut ValidationReport,
) {
    let Some(fbc) = doc.package(KnownPackage::Fbc.name()) else {
        return;
    };
    let mandatory = KnownPackage::Fbc.mandatory_model_attributes(fbc.version().unwrap_or(1));

    for (attribute, _) in mandatory {
        if model.element().attr_ns(&fbc.uri, attribute).is_none() {
            report.add_result(Diagnostic::new(
                location.to_string(),
                format!(
                    "Model '{}' must carry the '{}:{attribute}' attribute",
                    model.id().unwrap_or_default(),
                    fbc.prefix
                ),
                Severity::Error,
                Category::Fbc,
                model.id().map(str::to_string),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_for(xml: &str) -> ValidationReport {
        let doc = SBMLDocument::from_xml_string(xml).expect("Failed to read document");
        let mut report = ValidationReport::new();
        check_general(&doc, &mut report);
        report
    }

    #[test]
    fn test_duplicate_sids() {
        let report = report_for(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1">
                 <model id="m">
                   <listOfCompartments><compartment id="x" constant="true"/></listOfCompartments>
                   <listOfParameters><parameter id="x" constant="true"/></listOfParameters>
                   <listOfReactions>
                     <reaction id="r" reversible="false">
                       <kineticLaw>
                         <listOfLocalParameters><localParameter id="x"/></listOfLocalParameters>
                       </kineticLaw>
                     </reaction>
                   </listOfReactions>
                 </model>
               </sbml>"#,
        );
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.filter_results("x").len(), 1);
    }

    #[test]
    fn test_undefined_references() {
        let report = report_for(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1">
                 <model id="m">
                   <listOfSpecies>
                     <species id="s" compartment="c" constant="false"/>
                   </listOfSpecies>
                   <listOfRules><assignmentRule variable="p"/></listOfRules>
                   <listOfReactions>
                     <reaction id="r" reversible="false">
                       <listOfReactants><speciesReference species="q" constant="true"/></listOfReactants>
                     </reaction>
                   </listOfReactions>
                 </model>
               </sbml>"#,
        );
        assert_eq!(report.error_count(), 3);
    }

    #[test]
    fn test_fbc_strict_required() {
        let report = report_for(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:fbc="http://www.sbml.org/sbml/level3/version1/fbc/version2" fbc:required="false">
                 <model id="m"/>
               </sbml>"#,
        );
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.by_category(Category::Fbc).len(), 1);
    }

    #[test]
    fn test_unknown_required_package() {
        let report = report_for(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:foo="http://www.sbml.org/sbml/level3/version1/foo/version1" foo:required="true">
                 <model id="m"/>
               </sbml>"#,
        );
        assert_eq!(report.error_count(), 1);
    }
}
