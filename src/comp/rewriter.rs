//! Rewriting of external model definitions into model definitions
//!
//! [`rewrite`] replaces every `<comp:externalModelDefinition>` of a document by a
//! `<comp:modelDefinition>` holding a deep copy of the referenced model. Submodels are
//! left untouched: the id of each new model definition is chosen so that every
//! `comp:modelRef` that named the EMD keeps resolving.
//!
//! All EMDs are resolved and all id collisions are checked before the document is
//! touched, so an error leaves the document exactly as it was.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    comp::resolver::{md5_mismatch_diagnostic, Resolver},
    sbml::{document::SBMLDocument, error::SBMLError, model::ModelDefinition, packages::PackageDeclaration},
    validation::consistency::Diagnostic,
};

/// Packages the inlined models need, keyed by namespace URI
///
/// When several sources declare the same package, the strictest `required` flag is
/// kept: `true` over `false` over unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDemand {
    packages: BTreeMap<String, PackageDeclaration>,
}

impl PackageDemand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a package, merging the `required` flag with an earlier record.
    pub fn record(&mut self, package: PackageDeclaration) {
        match self.packages.get_mut(&package.uri) {
            Some(existing) => existing.required = strictest(existing.required, package.required),
            None => {
                self.packages.insert(package.uri.clone(), package);
            }
        }
    }

    pub fn merge(&mut self, other: PackageDemand) {
        for package in other.packages.into_values() {
            self.record(package);
        }
    }

    pub fn get(&self, uri: &str) -> Option<&PackageDeclaration> {
        self.packages.get(uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageDeclaration> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Result of [`rewrite_with`]
#[derive(Debug, Clone, Default)]
pub struct RewriteSummary {
    pub demand: PackageDemand,
    /// Id of each rewritten EMD mapped to the id of the model definition replacing it
    pub definitions: HashMap<String, String>,
    /// Checksum mismatches, including those of nested sources. They are also recorded
    /// on the document.
    pub diagnostics: Vec<Diagnostic>,
}

/// `true` > `false` > unset
pub fn strictest(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), _) | (_, Some(false)) => Some(false),
        _ => None,
    }
}

/// Replaces the external model definitions of `doc` by model definitions.
///
/// Relative sources are resolved against the directory of the document. A document
/// without EMDs is left unchanged and yields an empty demand.
///
/// # Returns
///
/// The packages declared by the sources, to be handed to
/// [`reconcile`](crate::comp::reconciler::reconcile).
///
/// # Errors
///
/// * `SBMLError::UnresolvedReference` - a source cannot be loaded
/// * `SBMLError::MissingModelRef` - a source lacks the referenced model
/// * `SBMLError::CyclicReference` - sources refer back to a document being rewritten
/// * `SBMLError::ModelIdCollision` - an inlined model clashes with a model definition
pub fn rewrite(doc: &mut SBMLDocument) -> Result<PackageDemand, SBMLError> {
    let mut resolver = Resolver::for_document(doc);
    rewrite_with(doc, &mut resolver).map(|summary| summary.demand)
}

/// Same as [`rewrite`] with a caller-provided resolver, returning the full summary.
pub fn rewrite_with(
    doc: &mut SBMLDocument,
    resolver: &mut Resolver,
) -> Result<RewriteSummary, SBMLError> {
    let emds = doc.external_model_definitions();
    if emds.is_empty() {
        debug!("No external model definitions to rewrite");
        return Ok(RewriteSummary::default());
    }

    let base_dir = doc.base_dir();
    let referenced = referenced_models(doc);

    let mut demand = PackageDemand::new();
    let mut incoming: Vec<ModelDefinition> = Vec::new();
    let mut definitions = HashMap::new();
    let mut diagnostics = Vec::new();

    for emd in &emds {
        let resolved = resolver.resolve(emd, &base_dir)?;

        let mut definition = resolved.definition;
        let keeps_id = definition
            .id()
            .is_some_and(|id| id == emd.id || !referenced.contains(&emd.id));
        if !keeps_id {
            definition.set_id(&emd.id);
        }

        if let Some(digest) = resolved.md5_mismatch {
            diagnostics.push(md5_mismatch_diagnostic(emd, &digest));
        }
        diagnostics.extend(resolved.diagnostics);
        if let Some(id) = definition.id() {
            definitions.insert(emd.id.clone(), id.to_string());
        }
        for package in resolved.packages {
            demand.record(package);
        }

        incoming.push(definition);
        incoming.extend(resolved.dependencies);
    }

    let planned = plan_definitions(doc, incoming)?;

    for definition in planned {
        debug!(
            "Adding model definition '{}'",
            definition.id().unwrap_or_default()
        );
        doc.add_model_definition(definition)?;
    }
    for emd in &emds {
        doc.remove_external_model_definition(&emd.id);
    }
    for diagnostic in &diagnostics {
        doc.record_diagnostic(diagnostic.clone());
    }

    info!(
        "Rewrote {} external model definition(s) into model definitions",
        emds.len()
    );
    Ok(RewriteSummary {
        demand,
        definitions,
        diagnostics,
    })
}

/// Model ids referenced by submodels anywhere in the document.
fn referenced_models(doc: &SBMLDocument) -> HashSet<String> {
    doc.model()
        .into_iter()
        .chain(doc.model_definitions())
        .flat_map(|model| model.submodels())
        .map(|submodel| submodel.model_ref)
        .collect()
}

/// Drops repeated identical definitions and rejects any id clash.
///
/// An incoming definition may never share its id with a model definition already in
/// the document. Two incoming definitions with the same id are imported once when
/// their content is identical, e.g. a dependency shared by two sources.
fn plan_definitions(
    doc: &SBMLDocument,
    incoming: Vec<ModelDefinition>,
) -> Result<Vec<ModelDefinition>, SBMLError> {
    let mut planned: Vec<ModelDefinition> = Vec::new();

    for definition in incoming {
        let Some(id) = definition.id().map(str::to_string) else {
            planned.push(definition);
            continue;
        };

        if doc.model_definition(&id).is_some() {
            return Err(SBMLError::ModelIdCollision { id });
        }

        match planned.iter().find(|p| p.id() == Some(id.as_str())) {
            Some(previous) if previous.element().same_content(definition.element()) => {
                debug!("Sharing model definition '{id}'");
            }
            Some(_) => return Err(SBMLError::ModelIdCollision { id }),
            None => planned.push(definition),
        }
    }

    Ok(planned)
}
