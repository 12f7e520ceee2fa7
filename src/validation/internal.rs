use std::collections::HashMap;

use crate::sbml::document::SBMLDocument;
use crate::sbml::packages::{PackageUri, COMP_NS};
use crate::sbml::xml::Element;
use crate::validation::consistency::{Category, Diagnostic, Severity, ValidationReport};

/// Checks the structure of the document: read problems, package declarations and the
/// uniqueness of model ids across the top model, model definitions and external
/// model definitions.
///
/// # Arguments
///
/// * `doc` - The document to check.
/// * `report` - The report to add the results to.
pub fn check_internal(doc: &SBMLDocument, report: &mut ValidationReport) {
    for diagnostic in doc.errors() {
        report.add_result(diagnostic.clone());
    }

    check_package_declarations(doc, report);
    check_model_ids(doc, report);
    check_external_model_definitions(doc, report);
}

fn check_package_declarations(doc: &SBMLDocument, report: &mut ValidationReport) {
    let packages = doc.packages();

    for package in &packages {
        if package.required.is_none() {
            report.add_result(Diagnostic::new(
                "/sbml".to_string(),
                format!(
                    "Package '{}' is declared without the '{}:required' attribute",
                    package.name, package.prefix
                ),
                Severity::Error,
                Category::Internal,
                Some(package.name.clone()),
            ));
        }
    }

    // Package content must be declared on the document itself
    let mut undeclared: Vec<String> = Vec::new();
    doc.root().walk(&mut |element: &Element| {
        let namespaces = element
            .namespace
            .iter()
            .chain(element.attributes.iter().filter_map(|a| a.namespace.as_ref()));
        for namespace in namespaces {
            if PackageUri::parse(namespace).is_some()
                && !packages.iter().any(|p| &p.uri == namespace)
                && !undeclared.contains(namespace)
            {
                undeclared.push(namespace.clone());
            }
        }
    });

    for namespace in undeclared {
        report.add_result(Diagnostic::new(
            "/sbml".to_string(),
            format!("Package namespace '{namespace}' is used but not declared on the <sbml> element"),
            Severity::Error,
            Category::Internal,
            None,
        ));
    }
}

fn check_model_ids(doc: &SBMLDocument, report: &mut ValidationReport) {
    let mut seen: HashMap<String, &'static str> = HashMap::new();

    let top_id = doc.model().and_then(|m| m.id()).map(str::to_string);
    let definitions = doc
        .model_definitions()
        .into_iter()
        .filter_map(|md| md.id().map(|id| (id.to_string(), "model definition")));
    let externals = doc
        .external_model_definitions()
        .into_iter()
        .map(|emd| (emd.id, "external model definition"));

    for (id, kind) in definitions.chain(externals) {
        if id.is_empty() {
            continue;
        }

        if let Some(previous) = seen.get(&id) {
            report.add_result(Diagnostic::new(
                "/sbml".to_string(),
                format!("The id '{id}' of a {kind} is already used by a {previous}"),
                Severity::Error,
                Category::Comp,
                Some(id.clone()),
            ));
            continue;
        }

        if top_id.as_deref() == Some(id.as_str()) {
            report.add_result(Diagnostic::new(
                "/sbml".to_string(),
                format!("The {kind} '{id}' shares its id with the top model"),
                Severity::Warning,
                Category::Comp,
                Some(id.clone()),
            ));
        }
        seen.insert(id, kind);
    }
}

fn check_external_model_definitions(doc: &SBMLDocument, report: &mut ValidationReport) {
    for emd in doc.external_model_definitions() {
        let location = format!(
            "/sbml/listOfExternalModelDefinitions/externalModelDefinition[@id='{}']",
            emd.id
        );
        if emd.id.is_empty() {
            report.add_result(Diagnostic::new(
                location.clone(),
                "External model definition without 'comp:id'".to_string(),
                Severity::Error,
                Category::Comp,
                None,
            ));
        }
        if emd.source.is_empty() {
            report.add_result(Diagnostic::new(
                location,
                format!("External model definition '{}' has no 'comp:source'", emd.id),
                Severity::Error,
                Category::Comp,
                Some(emd.id.clone()),
            ));
        }
    }

    if doc
        .root()
        .child(COMP_NS, "listOfExternalModelDefinitions")
        .is_some_and(|list| list.elements().next().is_none())
    {
        report.add_result(Diagnostic::new(
            "/sbml/listOfExternalModelDefinitions".to_string(),
            "Empty list of external model definitions".to_string(),
            Severity::Warning,
            Category::Comp,
            None,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_flag() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:fbc="http://www.sbml.org/sbml/level3/version1/fbc/version2">
                 <model id="m" fbc:strict="false"/>
               </sbml>"#,
        )
        .unwrap();
        let mut report = ValidationReport::new();
        check_internal(&doc, &mut report);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.filter_results("fbc").len(), 1);
    }

    #[test]
    fn test_undeclared_package_content() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1">
                 <model id="m" xmlns:fbc="http://www.sbml.org/sbml/level3/version1/fbc/version2"
                        fbc:strict="false"/>
               </sbml>"#,
        )
        .unwrap();
        let mut report = ValidationReport::new();
        check_internal(&doc, &mut report);
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn test_duplicate_model_ids() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true">
                 <model id="m"/>
                 <comp:listOfExternalModelDefinitions>
                   <comp:externalModelDefinition comp:id="A" comp:source="a.xml"/>
                 </comp:listOfExternalModelDefinitions>
                 <comp:listOfModelDefinitions>
                   <comp:modelDefinition id="A"/>
                   <comp:modelDefinition id="m"/>
                 </comp:listOfModelDefinitions>
               </sbml>"#,
        )
        .unwrap();
        let mut report = ValidationReport::new();
        check_internal(&doc, &mut report);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.warning_count(), 1);
    }
}
