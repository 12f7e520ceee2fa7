//! Comp flattening converter
//!
//! Collapses the submodel hierarchy of a document into its top model. Each submodel is
//! instantiated from its model definition, which is flattened first, and merged into
//! the instantiating model:
//!
//! 1. deletions of the submodel remove elements from the instance
//! 2. replaced elements are removed from the instance and replacedBy elements take the
//!    identity of the element they replace
//! 3. every remaining id, metaid and unit id of the instance is prefixed with
//!    `<submodel id>__`, together with all references to it (SIdRef attributes,
//!    unit attributes, MathML `<ci>` and RDF `about` references)
//! 4. the `listOf*` containers of the instance are appended to the containers of the
//!    instantiating model, in SBML schema order
//!
//! Finally submodels, model definitions and external model definitions are removed.
//! The `comp` package is dropped when nothing of it remains.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::sbml::{
    document::SBMLDocument,
    error::SBMLError,
    model::{is_opaque, Model},
    packages::{package_used_by_model, COMP_NS, MATHML_NS},
    xml::{Element, Node},
};

/// Core `listOf*` containers of a model in schema order
const CORE_LISTS: [&str; 10] = [
    "listOfFunctionDefinitions",
    "listOfUnitDefinitions",
    "listOfCompartments",
    "listOfSpecies",
    "listOfParameters",
    "listOfInitialAssignments",
    "listOfRules",
    "listOfConstraints",
    "listOfReactions",
    "listOfEvents",
];

/// Attributes holding a reference to an SId, in core and in packages
const SIDREF_ATTRIBUTES: [&str; 14] = [
    "compartment",
    "species",
    "variable",
    "symbol",
    "outside",
    "conversionFactor",
    "speciesType",
    "reaction",
    "lowerFluxBound",
    "upperFluxBound",
    "associatedSpecies",
    "geneProduct",
    "qualitativeSpecies",
    "transitionEffect",
];

/// Attributes holding a reference to a unit definition
const UNIT_ATTRIBUTES: [&str; 7] = [
    "units",
    "substanceUnits",
    "timeUnits",
    "extentUnits",
    "volumeUnits",
    "areaUnits",
    "lengthUnits",
];

/// Converts a hierarchical document into a single flat model
pub trait CompFlattener {
    /// Flattens `doc` in place. On error the document is left unchanged.
    fn flatten(&self, doc: &mut SBMLDocument) -> Result<FlattenReport, SBMLError>;
}

/// Summary of a comp flattening
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenReport {
    /// Ids of the instantiated submodels, nested ones with their full prefix
    pub instances: Vec<String>,
    pub deleted: usize,
    pub replaced: usize,
    /// Constructs that were skipped
    pub warnings: Vec<String>,
}

impl FlattenReport {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

/// [`CompFlattener`] that inlines every submodel into the model instantiating it
#[derive(Debug, Clone)]
pub struct SubmodelInliner {
    /// Keep the ports of the top model
    pub leave_ports: bool,
}

impl Default for SubmodelInliner {
    fn default() -> Self {
        Self { leave_ports: true }
    }
}

impl SubmodelInliner {
    pub fn new(leave_ports: bool) -> Self {
        Self { leave_ports }
    }
}

impl CompFlattener for SubmodelInliner {
    fn flatten(&self, doc: &mut SBMLDocument) -> Result<FlattenReport, SBMLError> {
        if !doc.external_model_definitions().is_empty() {
            return Err(SBMLError::Unflattenable(
                "external model definitions must be inlined before flattening".to_string(),
            ));
        }

        let core = doc.core_namespace().to_string();
        let definitions: HashMap<String, Element> = doc
            .model_definitions()
            .into_iter()
            .filter_map(|md| Some((md.id()?.to_string(), md.element().clone())))
            .collect();

        let mut flat = doc.model().ok_or(SBMLError::MissingModel)?.element().clone();
        let mut context = Context {
            definitions: &definitions,
            core: &core,
            report: FlattenReport::default(),
        };
        let mut stack: Vec<String> = flat.attr("id").map(str::to_string).into_iter().collect();
        flatten_model(&mut flat, "", &mut stack, &mut context)?;

        if !self.leave_ports {
            flat.remove_elements(|e| e.is(COMP_NS, "listOfPorts"));
        }

        let comp_left = package_used_by_model(&Model::new(&flat)).contains("comp");
        if let Some(model) = doc.model_element_mut() {
            *model = flat;
        }
        doc.take_model_definitions();
        doc.root_mut()
            .remove_elements(|e| e.is(COMP_NS, "listOfExternalModelDefinitions"));
        if !comp_left {
            debug!("Dropping the comp package declaration");
            doc.disable_package(COMP_NS);
        }

        let report = context.report;
        info!(
            "Flattened {} submodel instance(s): {} deletion(s), {} replacement(s)",
            report.instances.len(),
            report.deleted,
            report.replaced
        );
        Ok(report)
    }
}

struct Context<'a> {
    definitions: &'a HashMap<String, Element>,
    core: &'a str,
    report: FlattenReport,
}

/// Element an `SBaseRef` points to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Id(String),
    MetaId(String),
    Unit(String),
}

impl Target {
    fn matches(&self, element: &Element) -> bool {
        match self {
            Target::Id(id) => {
                element.local != "unitDefinition" && element_id(element) == Some(id.as_str())
            }
            Target::MetaId(metaid) => element.attr("metaid") == Some(metaid.as_str()),
            Target::Unit(id) => {
                element.local == "unitDefinition" && element.attr("id") == Some(id.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replacement {
    ReplacedElement,
    ReplacedBy,
}

/// Identifier renaming applied to one instance
#[derive(Debug, Default)]
struct Renaming {
    ids: HashMap<String, String>,
    units: HashMap<String, String>,
    metaids: HashMap<String, String>,
}

/// Inlines every submodel of `model`, depth first.
fn flatten_model(
    model: &mut Element,
    path: &str,
    stack: &mut Vec<String>,
    context: &mut Context<'_>,
) -> Result<(), SBMLError> {
    let submodels: Vec<Element> = model
        .remove_elements(|e| e.is(COMP_NS, "listOfSubmodels"))
        .into_iter()
        .flat_map(|list| list.children)
        .filter_map(|node| match node {
            Node::Element(e) if e.is(COMP_NS, "submodel") => Some(e),
            _ => None,
        })
        .collect();

    for submodel in &submodels {
        let sub_id = submodel.package_attr(COMP_NS, "id").unwrap_or_default();
        let model_ref = submodel.package_attr(COMP_NS, "modelRef").unwrap_or_default();
        if sub_id.is_empty() {
            return Err(SBMLError::Unflattenable(
                "submodel without an id".to_string(),
            ));
        }

        let definition = context.definitions.get(model_ref).ok_or_else(|| {
            SBMLError::Unflattenable(format!(
                "submodel '{sub_id}' references '{model_ref}' which is not a model definition"
            ))
        })?;
        if stack.iter().any(|id| id == model_ref) {
            return Err(SBMLError::Unflattenable(format!(
                "model '{model_ref}' instantiates itself through submodel '{sub_id}'"
            )));
        }

        let mut instance = definition.clone();
        stack.push(model_ref.to_string());
        flatten_model(&mut instance, &format!("{path}{sub_id}__"), stack, context)?;
        stack.pop();
        debug!("Instantiating '{model_ref}' as '{path}{sub_id}'");
        context.report.instances.push(format!("{path}{sub_id}"));

        for attribute in ["timeConversionFactor", "extentConversionFactor"] {
            if let Some(factor) = submodel.package_attr(COMP_NS, attribute) {
                context.report.warn(format!(
                    "{attribute} '{factor}' of submodel '{sub_id}' is not applied"
                ));
            }
        }

        let ports = collect_ports(&instance);
        apply_deletions(submodel, &mut instance, &ports, context)?;

        let mut renaming = Renaming::default();
        apply_replacements(model, sub_id, &mut instance, &ports, &mut renaming, context)?;
        renaming.prefix_remaining(&instance, context.core, sub_id);
        rename(&mut instance, &renaming, &HashSet::new());

        merge(model, instance, context.core);
    }

    strip_unmatched_replacements(model, context);
    Ok(())
}

/// `comp:id` of the ports of an instance with the element each one exposes.
fn collect_ports(instance: &Element) -> HashMap<String, Target> {
    instance
        .list_items(COMP_NS, "listOfPorts", "port")
        .filter_map(|port| {
            let id = port.package_attr(COMP_NS, "id")?;
            let get = |local: &str| port.package_attr(COMP_NS, local).map(str::to_string);
            let target = get("idRef")
                .map(Target::Id)
                .or_else(|| get("metaIdRef").map(Target::MetaId))
                .or_else(|| get("unitRef").map(Target::Unit))?;
            Some((id.to_string(), target))
        })
        .collect()
}

/// Resolves an `SBaseRef` (deletion, replaced element, replacedBy) against an instance.
///
/// `sBaseRef` chains into nested submodels are followed through their `idRef`s. Other
/// chains are skipped with a warning.
fn resolve_target(
    reference: &Element,
    ports: &HashMap<String, Target>,
    context: &mut Context<'_>,
) -> Result<Option<Target>, SBMLError> {
    let get = |element: &Element, local: &str| {
        element.package_attr(COMP_NS, local).map(str::to_string)
    };

    let mut target = if let Some(id) = get(reference, "idRef") {
        Target::Id(id)
    } else if let Some(port) = get(reference, "portRef") {
        ports.get(&port).cloned().ok_or_else(|| {
            SBMLError::Unflattenable(format!("reference to the unknown port '{port}'"))
        })?
    } else if let Some(metaid) = get(reference, "metaIdRef") {
        Target::MetaId(metaid)
    } else if let Some(unit) = get(reference, "unitRef") {
        Target::Unit(unit)
    } else {
        return Err(SBMLError::Unflattenable(format!(
            "<{}> without a target",
            reference.local
        )));
    };

    let mut current = reference;
    while let Some(nested) = current.child(COMP_NS, "sBaseRef") {
        let has_target = ["idRef", "portRef", "metaIdRef", "unitRef"]
            .into_iter()
            .any(|local| get(nested, local).is_some());
        if !has_target {
            return Err(SBMLError::Unflattenable(
                "nested <sBaseRef> without a target".to_string(),
            ));
        }

        match (&target, get(nested, "idRef")) {
            (Target::Id(outer), Some(inner)) => target = Target::Id(format!("{outer}__{inner}")),
            _ => {
                context.report.warn(format!(
                    "<sBaseRef> chain below <{}> is not supported and was skipped",
                    reference.local
                ));
                return Ok(None);
            }
        }
        current = nested;
    }

    Ok(Some(target))
}

fn apply_deletions(
    submodel: &Element,
    instance: &mut Element,
    ports: &HashMap<String, Target>,
    context: &mut Context<'_>,
) -> Result<(), SBMLError> {
    for deletion in submodel.list_items(COMP_NS, "listOfDeletions", "deletion") {
        let Some(target) = resolve_target(deletion, ports, context)? else {
            continue;
        };
        if remove_target(instance, &target) {
            context.report.deleted += 1;
        } else {
            context
                .report
                .warn(format!("Deletion target {target:?} not found"));
        }
    }
    Ok(())
}

/// Processes the replacements `model` declares against the submodel `sub_id`.
fn apply_replacements(
    model: &mut Element,
    sub_id: &str,
    instance: &mut Element,
    ports: &HashMap<String, Target>,
    renaming: &mut Renaming,
    context: &mut Context<'_>,
) -> Result<(), SBMLError> {
    let mut replacements: Vec<(Element, Option<String>, bool, Replacement)> = Vec::new();
    model.walk(&mut |element: &Element| {
        let parent_id = element_id(element).map(str::to_string);
        let is_unit = element.local == "unitDefinition";
        let on_submodel =
            |r: &&Element| r.package_attr(COMP_NS, "submodelRef") == Some(sub_id);

        for replaced in element
            .list_items(COMP_NS, "listOfReplacedElements", "replacedElement")
            .filter(on_submodel)
        {
            replacements.push((replaced.clone(), parent_id.clone(), is_unit, Replacement::ReplacedElement));
        }
        for replaced_by in element
            .elements()
            .filter(|e| e.is(COMP_NS, "replacedBy"))
            .filter(on_submodel)
        {
            replacements.push((replaced_by.clone(), parent_id.clone(), is_unit, Replacement::ReplacedBy));
        }
    });

    for (reference, parent_id, is_unit, kind) in replacements {
        if reference.package_attr(COMP_NS, "deletion").is_some() {
            continue;
        }
        if let Some(factor) = reference.package_attr(COMP_NS, "conversionFactor") {
            context.report.warn(format!(
                "conversion factor '{factor}' of a replacement in submodel '{sub_id}' is not applied"
            ));
        }

        let Some(target) = resolve_target(&reference, ports, context)? else {
            continue;
        };
        let Some(parent_id) = parent_id else {
            context
                .report
                .warn(format!("Replacement of {target:?} by an element without id skipped"));
            continue;
        };
        let Some(target_id) = find_target(instance, &target)
            .and_then(element_id)
            .map(str::to_string)
        else {
            context
                .report
                .warn(format!("Replacement target {target:?} not found in submodel '{sub_id}'"));
            continue;
        };

        let map = if is_unit || matches!(target, Target::Unit(_)) {
            &mut renaming.units
        } else {
            &mut renaming.ids
        };
        map.insert(target_id, parent_id);

        if kind == Replacement::ReplacedElement {
            remove_target(instance, &target);
        }
        context.report.replaced += 1;
    }

    // Elements replaced by an instance element give way to it
    remove_matching(model, &|element: &Element| {
        element
            .elements()
            .any(|e| e.is(COMP_NS, "replacedBy") && e.package_attr(COMP_NS, "submodelRef") == Some(sub_id))
    });
    model.walk_mut(&mut |element: &mut Element| {
        if let Some(list) = element.child_mut(COMP_NS, "listOfReplacedElements") {
            list.remove_elements(|e| e.package_attr(COMP_NS, "submodelRef") == Some(sub_id));
        }
        element.remove_elements(|e| {
            e.is(COMP_NS, "listOfReplacedElements") && e.elements().next().is_none()
        });
    });

    Ok(())
}

/// Replacement markup left after all submodels were inlined refers to unknown submodels.
fn strip_unmatched_replacements(model: &mut Element, context: &mut Context<'_>) {
    let mut unmatched = 0;
    model.walk_mut(&mut |element: &mut Element| {
        unmatched += element
            .remove_elements(|e| {
                e.is(COMP_NS, "listOfReplacedElements") || e.is(COMP_NS, "replacedBy")
            })
            .len();
    });
    if unmatched > 0 {
        context.report.warn(format!(
            "{unmatched} replacement(s) refer to submodels that do not exist and were dropped"
        ));
    }
}

/// Id of an element: the core `id` or a package-qualified one.
fn element_id(element: &Element) -> Option<&str> {
    element.attr("id").or_else(|| {
        element
            .attributes
            .iter()
            .find(|a| a.local == "id" && a.namespace.is_some())
            .map(|a| a.value.as_str())
    })
}

fn find_target<'a>(element: &'a Element, target: &Target) -> Option<&'a Element> {
    for child in element.elements() {
        if is_opaque(child) {
            continue;
        }
        if target.matches(child) {
            return Some(child);
        }
        if child.local == "kineticLaw" {
            continue;
        }
        if let Some(found) = find_target(child, target) {
            return Some(found);
        }
    }
    None
}

/// Removes the first element matching `target` below `element`.
fn remove_target(element: &mut Element, target: &Target) -> bool {
    let mut removed = false;
    let children = std::mem::take(&mut element.children);
    for node in children {
        match node {
            Node::Element(child) if !removed && target.matches(&child) => removed = true,
            other => element.children.push(other),
        }
    }
    if removed {
        return true;
    }

    element
        .elements_mut()
        .filter(|child| !is_opaque(child) && child.local != "kineticLaw")
        .any(|child| remove_target(child, target))
}

/// Removes every element below `element` matching the predicate.
fn remove_matching<F>(element: &mut Element, predicate: &F) -> usize
where
    F: Fn(&Element) -> bool,
{
    let mut removed = element.remove_elements(|e| predicate(e)).len();
    for child in element.elements_mut() {
        if !is_opaque(child) {
            removed += remove_matching(child, predicate);
        }
    }
    removed
}

impl Renaming {
    /// Maps every id of the instance not taken by a replacement to `<prefix>__<id>`.
    fn prefix_remaining(&mut self, instance: &Element, core: &str, prefix: &str) {
        let prefixed = |id: &str| format!("{prefix}__{id}");

        for (id, _) in Model::new(instance).sids() {
            self.ids.entry(id.to_string()).or_insert_with(|| prefixed(id));
        }
        for unit in instance
            .list_items(core, "listOfUnitDefinitions", "unitDefinition")
            .filter_map(|u| u.attr("id"))
        {
            self.units
                .entry(unit.to_string())
                .or_insert_with(|| prefixed(unit));
        }

        let metaids = &mut self.metaids;
        instance.walk(&mut |element: &Element| {
            if let Some(metaid) = element.attr("metaid") {
                metaids
                    .entry(metaid.to_string())
                    .or_insert_with(|| prefixed(metaid));
            }
        });
    }
}

/// Applies a renaming to an instance. `shadowed` holds local parameter ids, which
/// hide model ids inside their kinetic law.
fn rename(element: &mut Element, renaming: &Renaming, shadowed: &HashSet<String>) {
    if element.local == "notes" {
        return;
    }
    if element.local == "annotation" {
        element.walk_mut(&mut |e: &mut Element| {
            for attribute in e.attributes.iter_mut().filter(|a| a.local == "about") {
                let renamed = attribute
                    .value
                    .strip_prefix('#')
                    .and_then(|reference| renaming.metaids.get(reference));
                if let Some(new) = renamed {
                    attribute.value = format!("#{new}");
                }
            }
        });
        return;
    }

    let lookup = |map: &HashMap<String, String>, value: &str| -> Option<String> {
        if shadowed.contains(value) {
            None
        } else {
            map.get(value).cloned()
        }
    };

    let is_unit_definition = element.local == "unitDefinition";
    for attribute in element.attributes.iter_mut() {
        let local = attribute.local.as_str();
        let renamed = if local == "id" && is_unit_definition {
            renaming.units.get(&attribute.value).cloned()
        } else if local == "id" || SIDREF_ATTRIBUTES.contains(&local) {
            lookup(&renaming.ids, &attribute.value)
        } else if local == "metaid" {
            renaming.metaids.get(&attribute.value).cloned()
        } else if UNIT_ATTRIBUTES.contains(&local) {
            renaming.units.get(&attribute.value).cloned()
        } else {
            None
        };
        if let Some(renamed) = renamed {
            attribute.value = renamed;
        }
    }

    if element.namespace.as_deref() == Some(MATHML_NS) && element.local == "ci" {
        let text = element.text();
        if let Some(renamed) = lookup(&renaming.ids, text.trim()) {
            element.set_text(&renamed);
        }
    }

    let shadowed = if element.local == "kineticLaw" {
        let mut local: HashSet<String> = shadowed.clone();
        local.extend(
            element
                .elements()
                .filter(|list| list.local == "listOfLocalParameters" || list.local == "listOfParameters")
                .flat_map(|list| list.elements())
                .filter_map(|p| p.attr("id"))
                .map(str::to_string),
        );
        local
    } else {
        shadowed.clone()
    };

    for child in element.elements_mut() {
        rename(child, renaming, &shadowed);
    }
}

/// Schema position of a child of a model
fn rank(element: &Element, core: &str) -> usize {
    match element.local.as_str() {
        "notes" => 0,
        "annotation" => 1,
        local if element.namespace.as_deref() == Some(core) => CORE_LISTS
            .iter()
            .position(|list| *list == local)
            .map(|i| i + 2)
            .unwrap_or(CORE_LISTS.len() + 2),
        _ => CORE_LISTS.len() + 3,
    }
}

/// Appends the containers of `instance` to the ones of `model`.
fn merge(model: &mut Element, instance: Element, core: &str) {
    for node in instance.children {
        let Node::Element(list) = node else {
            continue;
        };
        if is_opaque(&list)
            || list.is(COMP_NS, "listOfPorts")
            || list.is(COMP_NS, "listOfSubmodels")
        {
            continue;
        }

        let existing = model.children.iter().position(|node| {
            matches!(node, Node::Element(e) if e.namespace == list.namespace && e.local == list.local)
        });
        match existing {
            Some(index) => {
                if let Node::Element(target) = &mut model.children[index] {
                    target
                        .children
                        .extend(list.children.into_iter().filter(|n| matches!(n, Node::Element(_))));
                }
            }
            None => {
                let new_rank = rank(&list, core);
                let index = model
                    .children
                    .iter()
                    .rposition(|node| matches!(node, Node::Element(e) if rank(e, core) <= new_rank))
                    .map(|i| i + 1)
                    .unwrap_or(0);
                model.insert(index, list);
            }
        }
    }
}
