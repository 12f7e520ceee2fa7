//! Package reconciliation after inlining
//!
//! Inlined model definitions carry the package data of their source documents. The
//! reconciler declares those packages on the receiving document and fills in the
//! model attributes a package makes mandatory, so that the result validates again.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    comp::rewriter::{strictest, PackageDemand},
    sbml::document::SBMLDocument,
};

/// A package whose data could not be carried over cleanly. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInstantiationWarning {
    /// Model the warning concerns, `None` for document level problems
    pub model_id: Option<String>,
    pub package: String,
    pub reason: String,
}

impl fmt::Display for PluginInstantiationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model_id {
            Some(model_id) => write!(f, "[{}] model '{}': {}", self.package, model_id, self.reason),
            None => write!(f, "[{}] {}", self.package, self.reason),
        }
    }
}

/// Outcome of [`reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Names of the packages that were newly declared
    pub enabled: Vec<String>,
    /// `(model id, attribute)` pairs that were filled in with their default
    pub defaulted: Vec<(String, String)>,
    pub warnings: Vec<PluginInstantiationWarning>,
}

/// Declares the demanded packages on `doc` and applies their mandatory model
/// attributes.
///
/// * Packages are enabled with their recorded prefix, or a fresh one when it is taken.
/// * `required` is raised to the strictest recorded value; an unset record leaves the
///   document unchanged.
/// * A package that is already declared with another version keeps its declaration and
///   yields a warning, as does a package that is not known.
/// * For every model, missing mandatory attributes (FBC version 2 `strict`) are set to
///   their default.
pub fn reconcile(doc: &mut SBMLDocument, demand: &PackageDemand) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for package in demand.iter() {
        let declared = doc.package(&package.name);

        if package.known().is_none() {
            report.warnings.push(PluginInstantiationWarning {
                model_id: None,
                package: package.name.clone(),
                reason: format!(
                    "unknown package '{}', its content is copied without checks",
                    package.uri
                ),
            });
        }

        if let Some(declared) = &declared {
            if declared.uri != package.uri {
                report.warnings.push(PluginInstantiationWarning {
                    model_id: None,
                    package: package.name.clone(),
                    reason: format!(
                        "declared as '{}' but inlined content uses '{}'",
                        declared.uri, package.uri
                    ),
                });
                continue;
            }
        }

        let prefix = doc.enable_package(&package.uri, &package.prefix, None);
        if declared.is_none() {
            debug!("Enabled package '{}' as '{prefix}'", package.name);
            report.enabled.push(package.name.clone());
        }

        let current = declared.and_then(|d| d.required);
        if let Some(required) = strictest(current, package.required) {
            if current != Some(required) {
                doc.set_package_required(&package.uri, required);
            }
        }
    }

    apply_mandatory_attributes(doc, demand, &mut report);

    for warning in &report.warnings {
        warn!("{warning}");
    }
    report
}

fn apply_mandatory_attributes(
    doc: &mut SBMLDocument,
    demand: &PackageDemand,
    report: &mut ReconcileReport,
) {
    // Attributes are written in the namespace the document declares
    let mandatory: Vec<(String, &str, &str)> = doc
        .packages()
        .into_iter()
        .filter(|declared| demand.get(&declared.uri).is_some())
        .filter_map(|declared| {
            let known = declared.known()?;
            let version = declared.version()?;
            Some(
                known
                    .mandatory_model_attributes(version)
                    .iter()
                    .map(move |(attribute, default)| (declared.uri.clone(), *attribute, *default))
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect();

    if mandatory.is_empty() {
        return;
    }

    doc.for_each_model_mut(|model| {
        for (uri, attribute, default) in &mandatory {
            if model.attr_ns(uri, attribute).is_none() {
                let model_id = model.attr("id").unwrap_or_default().to_string();
                debug!("Setting '{attribute}={default}' on model '{model_id}'");
                model.set_attr_ns(uri, attribute, *default);
                report.defaulted.push((model_id, attribute.to_string()));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbml::packages::{PackageDeclaration, FBC_V2_NS};

    const DOC: &str = r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
          xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true">
      <model id="top"/>
      <comp:listOfModelDefinitions>
        <comp:modelDefinition id="A"/>
      </comp:listOfModelDefinitions>
    </sbml>"#;

    #[test]
    fn test_fbc_is_enabled_with_strict_default() {
        let mut doc = SBMLDocument::from_xml_string(DOC).unwrap();
        let mut demand = PackageDemand::new();
        demand.record(PackageDeclaration::new(FBC_V2_NS, "fbc", Some(false)).unwrap());

        let report = reconcile(&mut doc, &demand);
        assert_eq!(report.enabled, vec!["fbc"]);
        assert!(report.warnings.is_empty());
        assert_eq!(doc.package("fbc").and_then(|p| p.required), Some(false));

        let definition = doc.model_definition("A").unwrap();
        assert_eq!(definition.element().attr_ns(FBC_V2_NS, "strict"), Some("false"));
        assert_eq!(report.defaulted.len(), 2);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut doc = SBMLDocument::from_xml_string(DOC).unwrap();
        let mut demand = PackageDemand::new();
        demand.record(PackageDeclaration::new(FBC_V2_NS, "fbc", Some(false)).unwrap());

        reconcile(&mut doc, &demand);
        let once = doc.root().clone();
        let report = reconcile(&mut doc, &demand);

        assert_eq!(doc.root(), &once);
        assert!(report.enabled.is_empty());
        assert!(report.defaulted.is_empty());
    }

    #[test]
    fn test_required_is_never_lowered() {
        let mut doc = SBMLDocument::from_xml_string(DOC).unwrap();
        let comp = "http://www.sbml.org/sbml/level3/version1/comp/version1";
        let mut demand = PackageDemand::new();
        demand.record(PackageDeclaration::new(comp, "comp", Some(false)).unwrap());

        reconcile(&mut doc, &demand);
        assert_eq!(doc.package("comp").and_then(|p| p.required), Some(true));
    }

    #[test]
    fn test_version_conflict_warns() {
        let mut doc = SBMLDocument::from_xml_string(DOC).unwrap();
        doc.enable_package(FBC_V2_NS, "fbc", Some(false));
        let fbc_v1 = "http://www.sbml.org/sbml/level3/version1/fbc/version1";
        let mut demand = PackageDemand::new();
        demand.record(PackageDeclaration::new(fbc_v1, "fbc", Some(false)).unwrap());

        let report = reconcile(&mut doc, &demand);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(doc.package("fbc").map(|p| p.uri), Some(FBC_V2_NS.to_string()));
    }
}
