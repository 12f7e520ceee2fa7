//! SBML document container
//!
//! [`SBMLDocument`] owns the `<sbml>` element tree of one document together with the
//! path it was read from and the soft problems found while reading it. All structural
//! access used by the comp tooling goes through this type: the top model, the comp
//! model definitions and external model definitions, and the package declarations on
//! the root element.
//!
//! Documents are created by reading bytes, a string or a file, mutated by the EMD
//! rewriter, the package reconciler and the comp flattener, and finally written to a
//! sink or dropped.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    sbml::{
        error::SBMLError,
        model::{ExternalModelDefinition, Model, ModelDefinition},
        packages::{
            declared_packages, is_sbml_namespace, parse_core_uri, KnownPackage,
            PackageDeclaration, PackageUri, COMP_NS, SBML_L3V1_CORE,
        },
        xml::{self, Element, NamespaceDecl},
    },
    validation::consistency::{Category, Diagnostic, Severity},
};

/// An SBML document held as a namespace-aware element tree
#[derive(Debug, Clone)]
pub struct SBMLDocument {
    root: Element,
    path: Option<PathBuf>,
    errors: Vec<Diagnostic>,
}

impl SBMLDocument {
    /// Creates an empty SBML Level 3 document with the given core version.
    pub fn new(version: u32) -> Self {
        let core = format!("http://www.sbml.org/sbml/level3/version{version}/core");
        let mut root = Element::new(Some(&core), "sbml");
        root.namespaces.push(NamespaceDecl::new(None, core.clone()));
        root.set_attr("level", "3");
        root.set_attr("version", version.to_string());

        Self {
            root,
            path: None,
            errors: Vec::new(),
        }
    }

    /// Parses a document from raw bytes.
    ///
    /// # Errors
    ///
    /// * `SBMLError::Xml` - the input is not well-formed XML
    /// * `SBMLError::NotSBML` - the root element is not `<sbml>`
    ///
    /// Problems that do not prevent further processing (unsupported level, missing
    /// model, unknown packages) are recorded and available through [`Self::errors`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SBMLError> {
        let root = xml::parse(bytes)?;

        let is_sbml = root.local == "sbml"
            && root
                .namespace
                .as_deref()
                .is_some_and(|ns| parse_core_uri(ns).is_some());
        if !is_sbml {
            return Err(SBMLError::NotSBML(root.local.clone()));
        }

        let mut doc = Self {
            root,
            path: None,
            errors: Vec::new(),
        };
        doc.errors = doc.check_read();
        Ok(doc)
    }

    /// Parses a document from an XML string.
    pub fn from_xml_string(xml: &str) -> Result<Self, SBMLError> {
        Self::from_bytes(xml.as_bytes())
    }

    /// Reads a document from a file. The path is remembered and used as the base for
    /// resolving relative references.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, SBMLError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| SBMLError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut doc = Self::from_bytes(&bytes)?;
        doc.path = Some(path.to_path_buf());
        debug!("Read SBML document '{}'", path.display());
        Ok(doc)
    }

    /// Serializes the document with canonical namespace ordering.
    pub fn write_to<W: Write>(&self, sink: W) -> Result<(), SBMLError> {
        xml::write(&self.root, sink).map_err(|err| match err {
            xml::XmlError::Write(message) => {
                SBMLError::WriteError(std::io::Error::other(message))
            }
            other => SBMLError::Xml(other),
        })
    }

    pub fn to_xml_string(&self) -> Result<String, SBMLError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        String::from_utf8(buffer).map_err(|err| SBMLError::Xml(xml::XmlError::Encoding(err.utf8_error())))
    }

    /// Writes the document to a file. The file is only created once serialization has
    /// succeeded, so failures never leave partial output behind.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), SBMLError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        fs::write(path.as_ref(), buffer)?;
        debug!("Wrote SBML document '{}'", path.as_ref().display());
        Ok(())
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// Directory relative references are resolved against; the current directory for
    /// documents that were not read from a file.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Soft problems found while reading.
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Records a soft problem found while processing the document, e.g. a checksum
    /// mismatch of an external source.
    pub(crate) fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    pub fn level(&self) -> Option<u32> {
        self.root.attr("level").and_then(|l| l.parse().ok())
    }

    pub fn version(&self) -> Option<u32> {
        self.root.attr("version").and_then(|v| v.parse().ok())
    }

    /// Namespace of SBML core elements in this document.
    pub fn core_namespace(&self) -> &str {
        self.root.namespace.as_deref().unwrap_or(SBML_L3V1_CORE)
    }

    pub fn model(&self) -> Option<Model<'_>> {
        let core = self.core_namespace();
        self.root.child(core, "model").map(Model::new)
    }

    pub(crate) fn model_element_mut(&mut self) -> Option<&mut Element> {
        let core = self.core_namespace().to_string();
        self.root.child_mut(&core, "model")
    }

    /// In-line model definitions, in document order.
    pub fn model_definitions(&self) -> Vec<Model<'_>> {
        self.root
            .list_items(COMP_NS, "listOfModelDefinitions", "modelDefinition")
            .map(Model::new)
            .collect()
    }

    pub fn model_definition(&self, id: &str) -> Option<Model<'_>> {
        self.model_definitions()
            .into_iter()
            .find(|md| md.id() == Some(id))
    }

    /// Top model or model definition with the given id.
    pub fn find_model(&self, id: &str) -> Option<Model<'_>> {
        self.model()
            .filter(|m| m.id() == Some(id))
            .or_else(|| self.model_definition(id))
    }

    pub fn external_model_definitions(&self) -> Vec<ExternalModelDefinition> {
        self.root
            .list_items(COMP_NS, "listOfExternalModelDefinitions", "externalModelDefinition")
            .map(ExternalModelDefinition::from_element)
            .collect()
    }

    /// Package declarations on the root element.
    pub fn packages(&self) -> Vec<PackageDeclaration> {
        declared_packages(self)
    }

    pub fn package(&self, name: &str) -> Option<PackageDeclaration> {
        self.packages().into_iter().find(|p| p.name == name)
    }

    /// Declares a package on the root element and returns the prefix it is bound to.
    ///
    /// Idempotent: a package that is already declared keeps its prefix. A fresh prefix
    /// is derived from `prefix` when that one is bound to another namespace. The
    /// `required` flag is only written when given.
    pub fn enable_package(&mut self, uri: &str, prefix: &str, required: Option<bool>) -> String {
        let existing = self
            .root
            .namespaces
            .iter()
            .find(|d| d.uri == uri && d.prefix.is_some())
            .and_then(|d| d.prefix.clone());

        let prefix = match existing {
            Some(prefix) => prefix,
            None => {
                let taken = |candidate: &str| {
                    self.root
                        .namespaces
                        .iter()
                        .any(|d| d.prefix.as_deref() == Some(candidate))
                };
                let mut candidate = prefix.to_string();
                let mut n = 2;
                while taken(&candidate) {
                    candidate = format!("{prefix}{n}");
                    n += 1;
                }
                self.root
                    .namespaces
                    .push(NamespaceDecl::new(Some(&candidate), uri));
                debug!("Enabled package '{uri}' with prefix '{candidate}'");
                candidate
            }
        };

        if let Some(required) = required {
            self.set_package_required(uri, required);
        }
        prefix
    }

    pub fn set_package_required(&mut self, uri: &str, required: bool) {
        self.root
            .set_attr_ns(uri, "required", if required { "true" } else { "false" });
    }

    /// Removes the declaration and the `required` flag of a package.
    pub fn disable_package(&mut self, uri: &str) {
        self.root.namespaces.retain(|d| d.uri != uri);
        self.root.remove_attr(Some(uri), "required");
    }

    /// Appends a model definition.
    ///
    /// # Errors
    ///
    /// * `SBMLError::ModelIdCollision` - a model definition with the same id exists
    pub fn add_model_definition(&mut self, definition: ModelDefinition) -> Result<(), SBMLError> {
        if let Some(id) = definition.id() {
            if self.model_definition(id).is_some() {
                return Err(SBMLError::ModelIdCollision { id: id.to_string() });
            }
        }

        if !self.root.namespaces.iter().any(|d| d.uri == COMP_NS) {
            self.enable_package(COMP_NS, "comp", Some(true));
        }

        let mut definition = definition;
        let core = self.core_namespace().to_string();
        if let Some(source_core) = definition.element().namespace_core() {
            definition.rebase_core(&source_core, &core);
        }

        self.comp_list_mut("listOfModelDefinitions")
            .push(definition.into_element());
        Ok(())
    }

    /// Removes the external model definition with the given id. The list element is
    /// dropped once it is empty.
    pub fn remove_external_model_definition(&mut self, id: &str) -> Option<ExternalModelDefinition> {
        let list = self
            .root
            .child_mut(COMP_NS, "listOfExternalModelDefinitions")?;
        let removed = list.remove_elements(|e| {
            e.is(COMP_NS, "externalModelDefinition")
                && e.package_attr(COMP_NS, "id") == Some(id)
        });
        let list_is_empty = list.elements().next().is_none();
        if list_is_empty {
            self.root
                .remove_elements(|e| e.is(COMP_NS, "listOfExternalModelDefinitions"));
        }
        removed.first().map(ExternalModelDefinition::from_element)
    }

    /// Removes all model definitions and their list element.
    pub(crate) fn take_model_definitions(&mut self) -> Vec<Element> {
        self.root
            .remove_elements(|e| e.is(COMP_NS, "listOfModelDefinitions"))
            .into_iter()
            .flat_map(|list| list.children)
            .filter_map(|node| match node {
                xml::Node::Element(e) if e.is(COMP_NS, "modelDefinition") => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Applies `f` to the top model and every model definition.
    pub(crate) fn for_each_model_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Element),
    {
        let core = self.core_namespace().to_string();
        for element in self.root.elements_mut() {
            if element.is(&core, "model") {
                f(element);
            } else if element.is(COMP_NS, "listOfModelDefinitions") {
                for definition in element
                    .elements_mut()
                    .filter(|e| e.is(COMP_NS, "modelDefinition"))
                {
                    f(definition);
                }
            }
        }
    }

    /// The comp list element `list` on the root, created in SBML order if missing.
    fn comp_list_mut(&mut self, list: &str) -> &mut Element {
        if self.root.child(COMP_NS, list).is_none() {
            let core = self.core_namespace().to_string();
            let anchor = ["listOfModelDefinitions", "listOfExternalModelDefinitions"];
            let index = self
                .root
                .children
                .iter()
                .rposition(|node| match node {
                    xml::Node::Element(e) => {
                        e.is(&core, "model")
                            || (list == "listOfModelDefinitions"
                                && anchor.iter().any(|a| e.is(COMP_NS, a)))
                    }
                    _ => false,
                })
                .map(|i| i + 1)
                .unwrap_or(self.root.children.len());
            self.root
                .insert(index, Element::with_prefix(COMP_NS, "comp", list));
        }

        self.root
            .child_mut(COMP_NS, list)
            .expect("list element was inserted above")
    }

    fn check_read(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut report = |severity, message: String| {
            diagnostics.push(Diagnostic::new(
                "/sbml".to_string(),
                message,
                severity,
                Category::Xml,
                None,
            ));
        };

        match (self.level(), self.version()) {
            (Some(3), Some(_)) => {}
            (Some(level), Some(version)) => report(
                Severity::Error,
                format!("SBML Level {level} Version {version} is not supported; Level 3 is required"),
            ),
            _ => report(
                Severity::Error,
                "The <sbml> element must carry 'level' and 'version' attributes".to_string(),
            ),
        }

        if self.model().is_none() {
            report(
                Severity::Warning,
                "The document does not contain a model".to_string(),
            );
        }

        for decl in &self.root.namespaces {
            if let Some(package) = PackageUri::parse(&decl.uri) {
                if KnownPackage::from_name(&package.name).is_none() {
                    report(
                        Severity::Warning,
                        format!("Unknown SBML package '{}' ({})", package.name, decl.uri),
                    );
                }
            } else if decl.uri.starts_with("http://www.sbml.org/") && !is_sbml_namespace(&decl.uri)
            {
                report(
                    Severity::Warning,
                    format!("Unrecognized SBML namespace '{}'", decl.uri),
                );
            }
        }

        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbml::packages::FBC_V2_NS;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
      xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true">
  <model id="top">
    <comp:listOfSubmodels>
      <comp:submodel comp:id="sub" comp:modelRef="A"/>
    </comp:listOfSubmodels>
  </model>
  <comp:listOfExternalModelDefinitions>
    <comp:externalModelDefinition comp:id="A" comp:source="a.xml" comp:modelRef="A"/>
  </comp:listOfExternalModelDefinitions>
</sbml>"#;

    #[test]
    fn test_read_document() {
        let doc = SBMLDocument::from_xml_string(DOC).expect("Failed to read document");
        assert_eq!(doc.level(), Some(3));
        assert_eq!(doc.version(), Some(1));
        assert!(doc.errors().is_empty());
        assert_eq!(doc.model().and_then(|m| m.id()), Some("top"));

        let emds = doc.external_model_definitions();
        assert_eq!(emds.len(), 1);
        assert_eq!(emds[0].source, "a.xml");
    }

    #[test]
    fn test_not_sbml() {
        let result = SBMLDocument::from_xml_string("<html/>");
        assert!(matches!(result, Err(SBMLError::NotSBML(name)) if name == "html"));
    }

    #[test]
    fn test_soft_errors() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level2/version4" level="2" version="4"/>"#,
        )
        .expect("Failed to read document");
        assert_eq!(doc.errors().len(), 2);
    }

    #[test]
    fn test_enable_package_is_idempotent() {
        let mut doc = SBMLDocument::from_xml_string(DOC).unwrap();
        let first = doc.enable_package(FBC_V2_NS, "fbc", Some(false));
        let second = doc.enable_package(FBC_V2_NS, "fbc", None);
        assert_eq!(first, "fbc");
        assert_eq!(second, "fbc");

        let fbc = doc.package("fbc").expect("fbc not declared");
        assert_eq!(fbc.required, Some(false));
        assert_eq!(doc.packages().len(), 2);
    }

    #[test]
    fn test_enable_package_avoids_taken_prefix() {
        let mut doc = SBMLDocument::from_xml_string(DOC).unwrap();
        let prefix = doc.enable_package(FBC_V2_NS, "comp", None);
        assert_eq!(prefix, "comp2");
    }

    #[test]
    fn test_remove_external_model_definition_drops_empty_list() {
        let mut doc = SBMLDocument::from_xml_string(DOC).unwrap();
        let removed = doc.remove_external_model_definition("A");
        assert_eq!(removed.map(|emd| emd.id), Some("A".to_string()));
        assert!(doc
            .root()
            .child(COMP_NS, "listOfExternalModelDefinitions")
            .is_none());
    }

    #[test]
    fn test_write_roundtrip() {
        let doc = SBMLDocument::from_xml_string(DOC).unwrap();
        let xml = doc.to_xml_string().expect("Failed to write document");
        let reread = SBMLDocument::from_xml_string(&xml).unwrap();
        assert!(doc.root().same_content(reread.root()));
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    }
}
