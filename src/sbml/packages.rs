//! SBML Level 3 package inventory
//!
//! SBML Level 3 packages are declared on the `<sbml>` root element through an XML
//! namespace plus a `<prefix>:required` attribute. This module provides the namespace
//! constants used throughout the crate, parsing of package namespace URIs, the registry
//! of known packages and the two inventory operations:
//!
//! - [`declared_packages`] lists the packages a document declares
//! - [`package_used_by_model`] lists the packages a model actually carries data for

use std::{collections::BTreeSet, fmt};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sbml::{document::SBMLDocument, model::Model, xml::Element};

pub const SBML_L3V1_CORE: &str = "http://www.sbml.org/sbml/level3/version1/core";
pub const SBML_L3V2_CORE: &str = "http://www.sbml.org/sbml/level3/version2/core";
pub const COMP_NS: &str = "http://www.sbml.org/sbml/level3/version1/comp/version1";
pub const FBC_V2_NS: &str = "http://www.sbml.org/sbml/level3/version1/fbc/version2";
pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

lazy_static! {
    static ref PACKAGE_URI: Regex =
        Regex::new(r"^http://www\.sbml\.org/sbml/level3/version(\d+)/([a-z]+)/version(\d+)$")
            .expect("valid package uri pattern");
    static ref CORE_URI: Regex =
        Regex::new(r"^http://www\.sbml\.org/sbml/level(\d+)/version(\d+)(?:/core)?$")
            .expect("valid core uri pattern");
}

/// A package declared on a document: `(uri, prefix, name, required)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageDeclaration {
    pub uri: String,
    pub prefix: String,
    pub name: String,
    /// `None` when the `required` attribute is not set
    pub required: Option<bool>,
}

impl PackageDeclaration {
    /// Declaration for `uri` under `prefix`, or `None` if `uri` is not a package namespace.
    pub fn new(uri: &str, prefix: &str, required: Option<bool>) -> Option<Self> {
        let parsed = PackageUri::parse(uri)?;
        Some(Self {
            uri: uri.to_string(),
            prefix: prefix.to_string(),
            name: parsed.name,
            required,
        })
    }

    /// Package version encoded in the namespace URI.
    pub fn version(&self) -> Option<u32> {
        PackageUri::parse(&self.uri).map(|p| p.version)
    }

    /// Registry entry of the package, if known.
    pub fn known(&self) -> Option<KnownPackage> {
        KnownPackage::from_name(&self.name)
    }
}

impl fmt::Display for PackageDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let required = match self.required {
            Some(true) => "true",
            Some(false) => "false",
            None => "unset",
        };
        write!(f, "{} ({}, required={})", self.name, self.prefix, required)
    }
}

/// Components of a package namespace URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUri {
    /// Level 3 version the package was defined for
    pub core_version: u32,
    pub name: String,
    pub version: u32,
}

impl PackageUri {
    pub fn parse(uri: &str) -> Option<Self> {
        let captures = PACKAGE_URI.captures(uri)?;
        let name = captures.get(2)?.as_str();
        if name == "core" {
            return None;
        }
        Some(Self {
            core_version: captures.get(1)?.as_str().parse().ok()?,
            name: name.to_string(),
            version: captures.get(3)?.as_str().parse().ok()?,
        })
    }
}

/// Parses an SBML core namespace into `(level, version)`.
pub fn parse_core_uri(uri: &str) -> Option<(u32, u32)> {
    let captures = CORE_URI.captures(uri)?;
    Some((
        captures.get(1)?.as_str().parse().ok()?,
        captures.get(2)?.as_str().parse().ok()?,
    ))
}

/// Returns true if `uri` is the namespace of SBML core or of an SBML package.
pub fn is_sbml_namespace(uri: &str) -> bool {
    parse_core_uri(uri).is_some() || PackageUri::parse(uri).is_some()
}

/// SBML Level 3 packages this crate knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownPackage {
    Comp,
    Fbc,
    Distrib,
    Multi,
    Layout,
    Groups,
    Qual,
    Render,
    Spatial,
    Arrays,
    Dyn,
    Req,
}

impl KnownPackage {
    pub const ALL: [KnownPackage; 12] = [
        KnownPackage::Comp,
        KnownPackage::Fbc,
        KnownPackage::Distrib,
        KnownPackage::Multi,
        KnownPackage::Layout,
        KnownPackage::Groups,
        KnownPackage::Qual,
        KnownPackage::Render,
        KnownPackage::Spatial,
        KnownPackage::Arrays,
        KnownPackage::Dyn,
        KnownPackage::Req,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            KnownPackage::Comp => "comp",
            KnownPackage::Fbc => "fbc",
            KnownPackage::Distrib => "distrib",
            KnownPackage::Multi => "multi",
            KnownPackage::Layout => "layout",
            KnownPackage::Groups => "groups",
            KnownPackage::Qual => "qual",
            KnownPackage::Render => "render",
            KnownPackage::Spatial => "spatial",
            KnownPackage::Arrays => "arrays",
            KnownPackage::Dyn => "dyn",
            KnownPackage::Req => "req",
        }
    }

    /// Attributes every model must carry when the package is enabled, with the
    /// value filled in when they are missing.
    ///
    /// FBC version 2 and later require `strict` on each model. `false` is used
    /// as the default because it admits the larger class of models.
    pub fn mandatory_model_attributes(&self, version: u32) -> &'static [(&'static str, &'static str)] {
        match self {
            KnownPackage::Fbc if version >= 2 => &[("strict", "false")],
            _ => &[],
        }
    }
}

impl fmt::Display for KnownPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Enumerates the packages declared on the document root, ordered by prefix.
///
/// The `required` flag is read from the package-qualified `required` attribute on
/// the root and reported as `None` when it is not set.
pub fn declared_packages(doc: &SBMLDocument) -> Vec<PackageDeclaration> {
    let root = doc.root();
    let mut packages: Vec<PackageDeclaration> = root
        .namespaces
        .iter()
        .filter_map(|decl| {
            let prefix = decl.prefix.as_deref()?;
            let required = root
                .attr_ns(&decl.uri, "required")
                .and_then(parse_bool);
            PackageDeclaration::new(&decl.uri, prefix, required)
        })
        .collect();

    packages.sort_by(|a, b| a.prefix.cmp(&b.prefix));
    packages.dedup_by(|a, b| a.uri == b.uri);
    packages
}

/// Names of the packages whose namespace appears on any element or attribute of the
/// model, ignoring `<notes>` and `<annotation>` content.
pub fn package_used_by_model(model: &Model<'_>) -> BTreeSet<String> {
    let mut used = BTreeSet::new();
    collect_packages(model.element(), &mut used);
    used
}

fn collect_packages(element: &Element, used: &mut BTreeSet<String>) {
    let namespaces = element
        .namespace
        .iter()
        .chain(element.attributes.iter().filter_map(|a| a.namespace.as_ref()));
    for namespace in namespaces {
        if let Some(package) = PackageUri::parse(namespace) {
            used.insert(package.name);
        }
    }

    for child in element.elements() {
        if child.local == "notes" || child.local == "annotation" {
            continue;
        }
        collect_packages(child, used);
    }
}

/// Parses an XML schema boolean.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_uri() {
        let fbc = PackageUri::parse(FBC_V2_NS).expect("Failed to parse fbc uri");
        assert_eq!(fbc.name, "fbc");
        assert_eq!(fbc.version, 2);
        assert_eq!(fbc.core_version, 1);

        assert!(PackageUri::parse(SBML_L3V1_CORE).is_none());
        assert!(PackageUri::parse("http://www.w3.org/1998/Math/MathML").is_none());
    }

    #[test]
    fn test_parse_core_uri() {
        assert_eq!(parse_core_uri(SBML_L3V2_CORE), Some((3, 2)));
        assert_eq!(
            parse_core_uri("http://www.sbml.org/sbml/level2/version4"),
            Some((2, 4))
        );
        assert!(parse_core_uri(COMP_NS).is_none());
    }

    #[test]
    fn test_fbc_mandatory_attributes() {
        assert_eq!(
            KnownPackage::Fbc.mandatory_model_attributes(2),
            &[("strict", "false")]
        );
        assert!(KnownPackage::Fbc.mandatory_model_attributes(1).is_empty());
        assert!(KnownPackage::Comp.mandatory_model_attributes(1).is_empty());
    }

    #[test]
    fn test_declared_packages_reports_unset_required() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true"
                  xmlns:fbc="http://www.sbml.org/sbml/level3/version1/fbc/version2">
                 <model id="m"/>
               </sbml>"#,
        )
        .expect("Failed to read document");

        let packages = declared_packages(&doc);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "comp");
        assert_eq!(packages[0].required, Some(true));
        assert_eq!(packages[1].name, "fbc");
        assert_eq!(packages[1].required, None);
    }

    #[test]
    fn test_package_used_by_model_ignores_annotations() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:fbc="http://www.sbml.org/sbml/level3/version1/fbc/version2" fbc:required="false"
                  xmlns:layout="http://www.sbml.org/sbml/level3/version1/layout/version1" layout:required="false">
                 <model id="m" fbc:strict="true">
                   <annotation>
                     <layout:listOfLayouts/>
                   </annotation>
                 </model>
               </sbml>"#,
        )
        .expect("Failed to read document");

        let model = doc.model().expect("Missing model");
        let used = package_used_by_model(&model);
        assert_eq!(used.into_iter().collect::<Vec<_>>(), vec!["fbc".to_string()]);
    }
}
