//! Models, model definitions and the comp elements that refer to them
//!
//! A [`Model`] is a borrowed view on a `<model>` or `<comp:modelDefinition>` element
//! of a document. [`ModelDefinition`] is the owned counterpart produced by
//! [`clone_model`], ready to be appended to another document.
//!
//! [`ExternalModelDefinition`] and [`Submodel`] are plain values read from the comp
//! elements of the same name.

use serde::{Deserialize, Serialize};

use crate::sbml::{
    packages::{parse_core_uri, PackageUri, COMP_NS},
    xml::{Element, Node},
};

/// Read-only view on a model element
#[derive(Debug, Clone, Copy)]
pub struct Model<'a> {
    element: &'a Element,
}

impl<'a> Model<'a> {
    pub fn new(element: &'a Element) -> Self {
        Self { element }
    }

    pub fn element(&self) -> &'a Element {
        self.element
    }

    pub fn id(&self) -> Option<&'a str> {
        self.element.attr("id")
    }

    pub fn name(&self) -> Option<&'a str> {
        self.element.attr("name")
    }

    /// True for `<comp:modelDefinition>`, false for the top `<model>`.
    pub fn is_definition(&self) -> bool {
        self.element.is(COMP_NS, "modelDefinition")
    }

    /// Submodels instantiated by this model, in document order.
    pub fn submodels(&self) -> Vec<Submodel> {
        self.element
            .list_items(COMP_NS, "listOfSubmodels", "submodel")
            .map(Submodel::from_element)
            .collect()
    }

    /// `(id, element)` of every element in the SId namespace of the model, in document
    /// order.
    ///
    /// Unit definitions, local parameters and ports live in their own namespaces and
    /// are skipped, as is everything below notes, annotations and MathML.
    pub fn sids(&self) -> Vec<(&'a str, &'a Element)> {
        let mut ids = Vec::new();
        if let Some(core) = self.element.namespace_core() {
            collect_sids(self.element, &core, &mut ids);
        }
        ids
    }

    /// Number of children of the `listOf<kind>` container in the core namespace.
    pub fn count(&self, list: &str) -> usize {
        self.element
            .elements()
            .find(|e| e.local == list && e.namespace == self.element.namespace_core())
            .map(|l| l.elements().count())
            .unwrap_or(0)
    }
}

/// Owned model subtree, detached from any document
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    element: Element,
}

impl ModelDefinition {
    /// Wraps a model element, renaming it to `<comp:modelDefinition>`.
    pub fn from_element(mut element: Element) -> Self {
        element.namespace = Some(COMP_NS.to_string());
        element.prefix = Some("comp".to_string());
        element.local = "modelDefinition".to_string();
        Self { element }
    }

    pub fn id(&self) -> Option<&str> {
        self.element.attr("id")
    }

    pub fn set_id(&mut self, id: &str) {
        self.element.set_attr("id", id);
    }

    pub fn view(&self) -> Model<'_> {
        Model::new(&self.element)
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut Element {
        &mut self.element
    }

    pub fn into_element(self) -> Element {
        self.element
    }

    /// Moves the core content of the definition from one SBML core namespace to another,
    /// e.g. when a Level 3 Version 2 model is inlined into a Version 1 document.
    pub fn rebase_core(&mut self, from: &str, to: &str) {
        if from != to {
            self.element.rename_namespace(from, to);
        }
    }
}

/// Produces a structurally identical deep copy of a model, including all package
/// attributes and children, as a model definition.
pub fn clone_model(model: &Model<'_>) -> ModelDefinition {
    ModelDefinition::from_element(model.element().clone())
}

/// `(id, source, modelRef)` of a `<comp:externalModelDefinition>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalModelDefinition {
    pub id: String,
    pub source: String,
    /// Model inside the source document; its top model when unset
    pub model_ref: Option<String>,
    pub md5: Option<String>,
    pub name: Option<String>,
}

impl ExternalModelDefinition {
    pub fn from_element(element: &Element) -> Self {
        let get = |local: &str| element.package_attr(COMP_NS, local).map(str::to_string);
        Self {
            id: get("id").unwrap_or_default(),
            source: get("source").unwrap_or_default(),
            model_ref: get("modelRef"),
            md5: get("md5"),
            name: get("name"),
        }
    }

    pub fn to_element(&self) -> Element {
        let mut element = Element::with_prefix(COMP_NS, "comp", "externalModelDefinition");
        element.set_attr_ns(COMP_NS, "id", &self.id);
        if let Some(name) = &self.name {
            element.set_attr_ns(COMP_NS, "name", name);
        }
        element.set_attr_ns(COMP_NS, "source", &self.source);
        if let Some(model_ref) = &self.model_ref {
            element.set_attr_ns(COMP_NS, "modelRef", model_ref);
        }
        if let Some(md5) = &self.md5 {
            element.set_attr_ns(COMP_NS, "md5", md5);
        }
        element
    }
}

/// `(id, modelRef)` of a `<comp:submodel>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Submodel {
    pub id: String,
    pub model_ref: String,
}

impl Submodel {
    pub fn from_element(element: &Element) -> Self {
        Self {
            id: element
                .package_attr(COMP_NS, "id")
                .unwrap_or_default()
                .to_string(),
            model_ref: element
                .package_attr(COMP_NS, "modelRef")
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// `<notes>` and `<annotation>` hold no model structure
pub(crate) fn is_opaque(element: &Element) -> bool {
    matches!(element.local.as_str(), "notes" | "annotation")
}

fn collect_sids<'a>(element: &'a Element, core: &str, ids: &mut Vec<(&'a str, &'a Element)>) {
    for child in element.elements() {
        if is_opaque(child) {
            continue;
        }

        match child.namespace.as_deref() {
            Some(ns) if ns == core => {
                if matches!(
                    child.local.as_str(),
                    "listOfUnitDefinitions" | "kineticLaw" | "math"
                ) {
                    continue;
                }
                if let Some(id) = child.attr("id") {
                    ids.push((id, child));
                }
            }
            Some(ns) if PackageUri::parse(ns).is_some() => {
                if child.local == "listOfPorts" {
                    continue;
                }
                if let Some(id) = child.attr_ns(ns, "id") {
                    ids.push((id, child));
                }
            }
            _ => continue,
        }

        collect_sids(child, core, ids);
    }
}

impl Element {
    /// Namespace SBML core content of this model lives in: the namespace of a
    /// `<model>` element, or of the first core child of a model definition.
    pub(crate) fn namespace_core(&self) -> Option<String> {
        let is_core = |ns: &Option<String>| ns.as_deref().and_then(parse_core_uri).is_some();
        if is_core(&self.namespace) {
            return self.namespace.clone();
        }
        self.children.iter().find_map(|node| match node {
            Node::Element(child) if is_core(&child.namespace) => child.namespace.clone(),
            _ => None,
        })
    }
}
