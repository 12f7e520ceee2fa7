//! Resolution of external model definitions
//!
//! The [`Resolver`] loads the document an EMD points to, relative to an explicit base
//! directory, and extracts the referenced model. Referenced documents that carry EMDs
//! themselves are rewritten and reconciled first, with the same resolver, so the
//! returned model never refers to anything outside of the returned document.
//!
//! The resolver keeps a stack of the canonical paths currently being rewritten. A path
//! that is visited again while it is still on the stack is a cyclic reference. Loaded
//! and rewritten documents are cached per resolver by canonical path.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use url::Url;

use crate::{
    comp::{reconciler::reconcile, rewriter::rewrite_with},
    sbml::{
        document::SBMLDocument,
        error::SBMLError,
        model::{clone_model, ExternalModelDefinition, ModelDefinition},
        packages::PackageDeclaration,
    },
    validation::consistency::{Category, Diagnostic, Severity},
};

/// The model an EMD refers to, detached from its source
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    /// Deep copy of the referenced model
    pub definition: ModelDefinition,
    /// Model definitions of the source document the referenced model instantiates,
    /// directly or through other model definitions
    pub dependencies: Vec<ModelDefinition>,
    /// The rewritten source document
    pub document: SBMLDocument,
    /// Packages declared by the source document
    pub packages: Vec<PackageDeclaration>,
    /// Canonical path of the source document
    pub path: PathBuf,
    /// Digest of the source when it differs from the `md5` of the EMD
    pub md5_mismatch: Option<String>,
    /// Diagnostics raised while rewriting the source, such as checksum mismatches of
    /// the documents it refers to
    pub diagnostics: Vec<Diagnostic>,
}

/// Loads external model definitions, recursively
#[derive(Debug, Default)]
pub struct Resolver {
    stack: Vec<PathBuf>,
    cache: HashMap<PathBuf, CachedSource>,
}

#[derive(Debug, Clone)]
struct CachedSource {
    document: SBMLDocument,
    digest: String,
    /// EMD id of the source mapped to the id of the model definition replacing it
    definitions: HashMap<String, String>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver for rewriting `doc`. The path of the document is put on the stack so
    /// that references back to it are reported as cycles.
    pub fn for_document(doc: &SBMLDocument) -> Self {
        let mut resolver = Self::new();
        if let Some(path) = doc.path().and_then(|p| fs::canonicalize(p).ok()) {
            resolver.stack.push(path);
        }
        resolver
    }

    /// Paths of the documents currently being rewritten, outermost first.
    pub fn stack(&self) -> &[PathBuf] {
        &self.stack
    }

    /// Loads the model referenced by `emd`.
    ///
    /// # Arguments
    ///
    /// * `emd` - The external model definition to resolve.
    /// * `base_dir` - Directory relative sources are resolved against.
    ///
    /// # Errors
    ///
    /// * `SBMLError::UnresolvedReference` - the source cannot be located, read or parsed
    /// * `SBMLError::CyclicReference` - the source is already being rewritten
    /// * `SBMLError::MissingModelRef` - the source does not contain the referenced model
    /// * Any error raised while rewriting the source document
    pub fn resolve(
        &mut self,
        emd: &ExternalModelDefinition,
        base_dir: &Path,
    ) -> Result<ResolvedModel, SBMLError> {
        let path = source_path(emd, base_dir)?;
        let canonical = fs::canonicalize(&path).map_err(|err| SBMLError::UnresolvedReference {
            emd_id: emd.id.clone(),
            source_uri: emd.source.clone(),
            reason: err.to_string(),
        })?;

        if let Some(start) = self.stack.iter().position(|p| p == &canonical) {
            let mut chain = self.stack[start..].to_vec();
            chain.push(canonical);
            return Err(SBMLError::CyclicReference { chain });
        }

        let source = self.load(emd, &canonical)?;

        let md5_mismatch = match &emd.md5 {
            Some(expected) if !expected.trim().eq_ignore_ascii_case(&source.digest) => {
                warn!(
                    "MD5 checksum of '{}' does not match external model definition '{}': expected {}, found {}",
                    emd.source, emd.id, expected, source.digest
                );
                Some(source.digest.clone())
            }
            _ => None,
        };

        let CachedSource {
            document,
            definitions,
            diagnostics,
            ..
        } = source;
        let model = match &emd.model_ref {
            // a modelRef may name an EMD of the source, now inlined under its own id
            Some(model_ref) => document.find_model(
                definitions
                    .get(model_ref)
                    .map(String::as_str)
                    .unwrap_or(model_ref),
            ),
            None => document.model(),
        }
        .ok_or_else(|| SBMLError::MissingModelRef {
            emd_id: emd.id.clone(),
            source_uri: emd.source.clone(),
            model_ref: emd.model_ref.clone().unwrap_or_else(|| "<model>".to_string()),
        })?;

        let definition = clone_model(&model);
        let dependencies = dependencies(&document, model.id());
        let packages = document.packages();
        let diagnostics = diagnostics
            .into_iter()
            .map(|diagnostic| {
                Diagnostic::new(
                    diagnostic.location().to_string(),
                    format!("{} (in '{}')", diagnostic.message(), emd.source),
                    *diagnostic.severity(),
                    *diagnostic.category(),
                    diagnostic.identifier().clone(),
                )
            })
            .collect();
        debug!(
            "Resolved external model definition '{}' to model '{}' in '{}'",
            emd.id,
            model.id().unwrap_or_default(),
            canonical.display()
        );

        Ok(ResolvedModel {
            definition,
            dependencies,
            packages,
            path: canonical,
            md5_mismatch,
            diagnostics,
            document,
        })
    }

    /// Reads, rewrites and reconciles a source document, or takes it from the cache.
    fn load(
        &mut self,
        emd: &ExternalModelDefinition,
        canonical: &Path,
    ) -> Result<CachedSource, SBMLError> {
        if let Some(cached) = self.cache.get(canonical) {
            debug!("Using cached document '{}'", canonical.display());
            return Ok(cached.clone());
        }

        let unresolved = |reason: String| SBMLError::UnresolvedReference {
            emd_id: emd.id.clone(),
            source_uri: emd.source.clone(),
            reason,
        };

        let bytes = fs::read(canonical).map_err(|err| unresolved(err.to_string()))?;
        let digest = format!("{:x}", md5::compute(&bytes));
        let mut document = SBMLDocument::from_bytes(&bytes).map_err(|err| unresolved(err.to_string()))?;
        document.set_path(canonical);

        let mut definitions = HashMap::new();
        let mut diagnostics = Vec::new();
        if !document.external_model_definitions().is_empty() {
            debug!("Rewriting nested document '{}'", canonical.display());
            self.stack.push(canonical.to_path_buf());
            let rewritten = rewrite_with(&mut document, self);
            self.stack.pop();
            let summary = rewritten?;
            reconcile(&mut document, &summary.demand);
            definitions = summary.definitions;
            diagnostics = summary.diagnostics;
        }

        let source = CachedSource {
            document,
            digest,
            definitions,
            diagnostics,
        };
        self.cache.insert(canonical.to_path_buf(), source.clone());
        Ok(source)
    }
}

/// Warning for a source whose checksum differs from the `md5` of its EMD.
pub(crate) fn md5_mismatch_diagnostic(emd: &ExternalModelDefinition, digest: &str) -> Diagnostic {
    Diagnostic::new(
        format!(
            "/sbml/listOfExternalModelDefinitions/externalModelDefinition[@id='{}']",
            emd.id
        ),
        format!(
            "The MD5 checksum of '{}' is {digest}, the external model definition expects {}",
            emd.source,
            emd.md5.as_deref().unwrap_or_default()
        ),
        Severity::Warning,
        Category::Comp,
        Some(emd.id.clone()),
    )
}

/// Location of the source of an EMD on the local filesystem.
///
/// Plain paths and `file:` URIs without authority are URI references relative to
/// `base_dir` (percent-escapes are decoded); `file://` URIs are converted with
/// [`Url::to_file_path`]. Any other URI scheme is unsupported.
pub fn source_path(emd: &ExternalModelDefinition, base_dir: &Path) -> Result<PathBuf, SBMLError> {
    let unresolved = |reason: &str| SBMLError::UnresolvedReference {
        emd_id: emd.id.clone(),
        source_uri: emd.source.clone(),
        reason: reason.to_string(),
    };

    let source = emd.source.trim();
    if source.is_empty() {
        return Err(unresolved("empty source"));
    }

    if let Some(rest) = source.strip_prefix("file:") {
        if !rest.starts_with("//") {
            return join_reference(base_dir, rest).map_err(|reason| unresolved(&reason));
        }
        let url = Url::parse(source).map_err(|err| unresolved(&err.to_string()))?;
        return url
            .to_file_path()
            .map_err(|_| unresolved("not a local file URI"));
    }

    match Url::parse(source) {
        // single letter schemes are drive letters
        Ok(url) if url.scheme().len() > 1 => Err(unresolved(&format!(
            "unsupported URI scheme '{}'",
            url.scheme()
        ))),
        _ => join_reference(base_dir, source).map_err(|reason| unresolved(&reason)),
    }
}

/// Resolves a relative URI reference against a directory.
fn join_reference(base_dir: &Path, reference: &str) -> Result<PathBuf, String> {
    let base_dir = std::path::absolute(base_dir).map_err(|err| err.to_string())?;
    let base = Url::from_directory_path(&base_dir)
        .map_err(|_| format!("invalid base directory '{}'", base_dir.display()))?;
    base.join(reference)
        .map_err(|err| err.to_string())?
        .to_file_path()
        .map_err(|_| "not a local file URI".to_string())
}

/// Clones the model definitions the model `id` instantiates, transitively.
fn dependencies(document: &SBMLDocument, id: Option<&str>) -> Vec<ModelDefinition> {
    let Some(root) = id.and_then(|id| document.find_model(id)).or_else(|| document.model()) else {
        return Vec::new();
    };

    let mut visited: HashSet<String> = id.into_iter().map(str::to_string).collect();
    let mut queue: VecDeque<String> = root.submodels().into_iter().map(|s| s.model_ref).collect();
    let mut dependencies = Vec::new();

    while let Some(model_ref) = queue.pop_front() {
        if !visited.insert(model_ref.clone()) {
            continue;
        }
        let Some(definition) = document.model_definition(&model_ref) else {
            continue;
        };
        queue.extend(definition.submodels().into_iter().map(|s| s.model_ref));
        dependencies.push(clone_model(&definition));
    }

    dependencies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emd(source: &str) -> ExternalModelDefinition {
        ExternalModelDefinition {
            id: "emd".to_string(),
            source: source.to_string(),
            model_ref: None,
            md5: None,
            name: None,
        }
    }

    #[test]
    fn test_source_path_relative() {
        let base = Path::new("/models");
        assert_eq!(
            source_path(&emd("a.xml"), base).unwrap(),
            PathBuf::from("/models/a.xml")
        );
        assert_eq!(
            source_path(&emd("file:sub/a.xml"), base).unwrap(),
            PathBuf::from("/models/sub/a.xml")
        );
        assert_eq!(
            source_path(&emd("/abs/a.xml"), base).unwrap(),
            PathBuf::from("/abs/a.xml")
        );
    }

    #[test]
    fn test_source_path_decodes_escapes() {
        let base = Path::new("/models");
        assert_eq!(
            source_path(&emd("my%20model.xml"), base).unwrap(),
            PathBuf::from("/models/my model.xml")
        );
        assert_eq!(
            source_path(&emd("file:sub/a%2Bb.xml"), base).unwrap(),
            PathBuf::from("/models/sub/a+b.xml")
        );
        assert_eq!(
            source_path(&emd("../shared/a.xml"), base).unwrap(),
            PathBuf::from("/shared/a.xml")
        );
    }

    #[test]
    fn test_source_path_file_uri() {
        let path = source_path(&emd("file:///tmp/a.xml"), Path::new("/models")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/a.xml"));
    }

    #[test]
    fn test_source_path_rejects_remote_uri() {
        let result = source_path(&emd("https://example.org/a.xml"), Path::new("."));
        assert!(matches!(result, Err(SBMLError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = Resolver::new();
        let result = resolver.resolve(&emd("missing.xml"), dir.path());
        match result {
            Err(SBMLError::UnresolvedReference { emd_id, source_uri, .. }) => {
                assert_eq!(emd_id, "emd");
                assert_eq!(source_uri, "missing.xml");
            }
            other => panic!("Expected an unresolved reference, got {other:?}"),
        }
    }

    const MODEL_A: &str = r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1">
                               <model id="A"/>
                             </sbml>"#;

    #[test]
    fn test_loaded_sources_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xml");
        fs::write(&path, MODEL_A).unwrap();

        let mut resolver = Resolver::new();
        let mut reference = emd("a.xml");
        reference.model_ref = Some("A".to_string());
        let first = resolver.resolve(&reference, dir.path()).unwrap();

        fs::write(&path, "<not-sbml/>").unwrap();
        let second = resolver
            .resolve(&reference, dir.path())
            .expect("Source was loaded again");
        assert_eq!(second.definition.id(), Some("A"));
        assert_eq!(first.path, second.path);
    }

    #[test]
    fn test_model_ref_naming_nested_emd() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.xml"),
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1">
                 <model id="B"><listOfParameters><parameter id="k" value="1" constant="true"/></listOfParameters></model>
               </sbml>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("a.xml"),
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true">
                 <model id="A"/>
                 <comp:listOfExternalModelDefinitions>
                   <comp:externalModelDefinition comp:id="emd_B" comp:source="b.xml" comp:modelRef="B"
                                                 comp:md5="00000000000000000000000000000000"/>
                 </comp:listOfExternalModelDefinitions>
               </sbml>"#,
        )
        .unwrap();

        let mut resolver = Resolver::new();
        let mut reference = emd("a.xml");
        reference.model_ref = Some("emd_B".to_string());
        let resolved = resolver.resolve(&reference, dir.path()).unwrap();

        assert_eq!(resolved.definition.id(), Some("B"));
        assert_eq!(resolved.definition.view().count("listOfParameters"), 1);
        assert_eq!(resolved.diagnostics.len(), 1);
        assert_eq!(
            resolved.diagnostics[0].identifier().as_deref(),
            Some("emd_B")
        );
        assert!(resolved.diagnostics[0].message().contains("a.xml"));
    }

    #[test]
    fn test_dependencies_are_transitive() {
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1"
                  xmlns:comp="http://www.sbml.org/sbml/level3/version1/comp/version1" comp:required="true">
                 <model id="top">
                   <comp:listOfSubmodels><comp:submodel comp:id="s" comp:modelRef="A"/></comp:listOfSubmodels>
                 </model>
                 <comp:listOfModelDefinitions>
                   <comp:modelDefinition id="A">
                     <comp:listOfSubmodels><comp:submodel comp:id="s" comp:modelRef="B"/></comp:listOfSubmodels>
                   </comp:modelDefinition>
                   <comp:modelDefinition id="B"/>
                   <comp:modelDefinition id="C"/>
                 </comp:listOfModelDefinitions>
               </sbml>"#,
        )
        .unwrap();

        let ids: Vec<_> = dependencies(&doc, Some("top"))
            .iter()
            .filter_map(|md| md.id().map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }
}
