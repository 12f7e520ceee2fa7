//! Tests for the flattening pipeline.
//!
//! The fixtures under `tests/data` cover:
//! - documents without external model definitions
//! - single and recursive external model definitions
//! - package reconciliation of inlined FBC models
//! - unresolved sources, missing models, id collisions and cycles
//! - collapsing submodels into the top model

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use sbmlflat::{
        comp::{
            driver::{flatten_comp, flatten_emds, FlattenerBuilder},
            rewriter::rewrite,
        },
        io::read_sbml,
        sbml::{
            error::SBMLError,
            packages::{declared_packages, package_used_by_model, COMP_NS, FBC_V2_NS},
        },
        validation::consistency::Severity,
    };

    fn data(path: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/data")
            .join(path)
    }

    fn definition_ids(doc: &sbmlflat::sbml::document::SBMLDocument) -> Vec<String> {
        doc.model_definitions()
            .iter()
            .filter_map(|m| m.id().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_plain_document_is_unchanged() {
        let original = read_sbml(data("plain.xml")).expect("Failed to read SBML");
        let flattened = flatten_emds(data("plain.xml")).expect("Failed to flatten");

        assert!(original.root().same_content(flattened.root()));
        assert!(flattened.model_definitions().is_empty());
    }

    #[test]
    fn test_single_external_model_definition() {
        let doc = flatten_emds(data("single/top.xml")).expect("Failed to flatten");

        assert!(doc.external_model_definitions().is_empty());
        assert_eq!(definition_ids(&doc), vec!["A".to_string()]);

        let definition = doc.model_definition("A").expect("Model definition A missing");
        assert_eq!(definition.count("listOfCompartments"), 1);

        let model = doc.model().expect("Top model missing");
        let refs: Vec<String> = model.submodels().into_iter().map(|s| s.model_ref).collect();
        assert_eq!(refs, vec!["A".to_string()]);
    }

    #[test]
    fn test_submodel_references_keep_pointing_at_emd_id() {
        let original = read_sbml(data("single/top_emd_ref.xml")).expect("Failed to read SBML");
        let before: Vec<String> = original
            .model()
            .unwrap()
            .submodels()
            .into_iter()
            .map(|s| s.model_ref)
            .collect();

        let doc = flatten_emds(data("single/top_emd_ref.xml")).expect("Failed to flatten");
        let after: Vec<String> = doc
            .model()
            .unwrap()
            .submodels()
            .into_iter()
            .map(|s| s.model_ref)
            .collect();

        assert_eq!(before, after);
        assert_eq!(definition_ids(&doc), vec!["emd_A".to_string()]);
    }

    #[test]
    fn test_fbc_package_is_reconciled() {
        let outcome = FlattenerBuilder::default()
            .build()
            .unwrap()
            .run(data("fbc/top.xml"))
            .expect("Failed to flatten");
        let doc = &outcome.document;

        let fbc = doc.package("fbc").expect("FBC not declared");
        assert_eq!(fbc.uri, FBC_V2_NS);
        assert_eq!(fbc.required, Some(false));
        assert_eq!(outcome.reconcile.enabled, vec!["fbc".to_string()]);

        let definition = doc.model_definition("A").expect("Model definition A missing");
        assert_eq!(
            definition.element().attr_ns(FBC_V2_NS, "strict"),
            Some("false")
        );
        assert!(!outcome.has_validation_errors());
    }

    #[test]
    fn test_declared_packages_cover_used_packages() {
        for fixture in ["single/top.xml", "fbc/top.xml", "recursive/top.xml"] {
            let doc = flatten_emds(data(fixture)).expect("Failed to flatten");
            let declared: Vec<String> = declared_packages(&doc)
                .into_iter()
                .map(|p| p.name)
                .collect();

            for model in doc.model().into_iter().chain(doc.model_definitions()) {
                for package in package_used_by_model(&model) {
                    assert!(
                        declared.contains(&package),
                        "{fixture}: package {package} used but not declared"
                    );
                }
            }
        }
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.xml");
        let result = FlattenerBuilder::default()
            .output(output.clone())
            .build()
            .unwrap()
            .run(data("errors/missing.xml"));

        match result {
            Err(SBMLError::UnresolvedReference { emd_id, .. }) => assert_eq!(emd_id, "emd_A"),
            other => panic!("Expected UnresolvedReference, got {other:?}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_model_ref() {
        let result = flatten_emds(data("errors/missing_ref.xml"));
        match result {
            Err(err @ SBMLError::MissingModelRef { .. }) => assert_eq!(err.exit_code(), 2),
            other => panic!("Expected MissingModelRef, got {other:?}"),
        }
    }

    #[test]
    fn test_model_id_collision() {
        let result = flatten_emds(data("errors/collision.xml"));
        match result {
            Err(SBMLError::ModelIdCollision { id }) => assert_eq!(id, "A"),
            other => panic!("Expected ModelIdCollision, got {other:?}"),
        }
    }

    #[test]
    fn test_cyclic_reference() {
        let result = flatten_emds(data("cycle/top.xml"));
        match result {
            Err(SBMLError::CyclicReference { chain }) => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
                assert!(chain[1].ends_with("a.xml"));
            }
            other => panic!("Expected CyclicReference, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference() {
        let result = flatten_emds(data("cycle/self.xml"));
        assert!(matches!(result, Err(SBMLError::CyclicReference { .. })));
    }

    #[test]
    fn test_recursive_external_model_definitions() {
        let doc = flatten_emds(data("recursive/top.xml")).expect("Failed to flatten");

        let mut ids = definition_ids(&doc);
        ids.sort();
        assert_eq!(ids, vec!["A".to_string(), "B".to_string()]);
        assert!(doc.external_model_definitions().is_empty());

        let a = doc.model_definition("A").unwrap();
        let refs: Vec<String> = a.submodels().into_iter().map(|s| s.model_ref).collect();
        assert_eq!(refs, vec!["B".to_string()]);
    }

    #[test]
    fn test_model_ref_through_nested_emd() {
        let doc = flatten_emds(data("chain/top.xml")).expect("Failed to flatten");

        assert_eq!(definition_ids(&doc), vec!["X".to_string()]);
        let definition = doc.model_definition("X").unwrap();
        assert_eq!(definition.count("listOfParameters"), 1);
        assert!(doc.external_model_definitions().is_empty());
    }

    #[test]
    fn test_nested_md5_mismatch_reaches_top_document() {
        let doc = flatten_emds(data("chain/top_md5.xml")).expect("Failed to flatten");

        let mut ids = definition_ids(&doc);
        ids.sort();
        assert_eq!(ids, vec!["B".to_string(), "X".to_string()]);

        let mismatch = doc
            .errors()
            .iter()
            .find(|d| d.identifier().as_deref() == Some("emd_B"))
            .expect("Nested md5 mismatch not reported");
        assert_eq!(mismatch.severity(), &Severity::Warning);
        assert!(mismatch.message().contains("a_md5.xml"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let mut doc = flatten_emds(data("recursive/top.xml")).expect("Failed to flatten");
        let once = doc.clone();

        let demand = rewrite(&mut doc).expect("Failed to rewrite");
        assert!(demand.is_empty());
        assert!(once.root().same_content(doc.root()));
    }

    #[test]
    fn test_md5_mismatch_is_reported() {
        let outcome = FlattenerBuilder::default()
            .build()
            .unwrap()
            .run(data("single/top_md5.xml"))
            .expect("Failed to flatten");

        assert_eq!(definition_ids(&outcome.document), vec!["A".to_string()]);

        let report = outcome.validation.expect("Validation missing");
        let mismatch = report
            .filter_results("emd_A")
            .into_iter()
            .find(|d| d.message().contains("MD5"))
            .expect("md5 mismatch not reported");
        assert_eq!(mismatch.severity(), &Severity::Warning);
    }

    #[test]
    fn test_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("flat.xml");
        let outcome = FlattenerBuilder::default()
            .output(output.clone())
            .build()
            .unwrap()
            .run(data("fbc/top.xml"))
            .expect("Failed to flatten");

        let reread = read_sbml(&output).expect("Failed to read output");
        assert!(outcome.document.root().same_content(reread.root()));
        assert!(reread.external_model_definitions().is_empty());
    }

    #[test]
    fn test_flatten_comp_collapses_hierarchy() {
        let doc = flatten_comp(data("recursive/top.xml")).expect("Failed to flatten");

        assert!(doc.model_definitions().is_empty());
        assert!(doc.package("comp").is_none());
        assert!(!doc.root().namespaces.iter().any(|d| d.uri == COMP_NS));

        let model = doc.model().expect("Top model missing");
        let core = doc.core_namespace();
        let compartments: Vec<&str> = model
            .element()
            .list_items(core, "listOfCompartments", "compartment")
            .filter_map(|c| c.attr("id"))
            .collect();
        let parameters: Vec<&str> = model
            .element()
            .list_items(core, "listOfParameters", "parameter")
            .filter_map(|p| p.attr("id"))
            .collect();

        assert_eq!(compartments, vec!["a__c"]);
        assert_eq!(parameters, vec!["a__b__k"]);
        assert!(model.submodels().is_empty());
    }

    #[test]
    fn test_flatten_comp_single_instance() {
        let doc = flatten_comp(data("single/top.xml")).expect("Failed to flatten");
        let model = doc.model().unwrap();
        let core = doc.core_namespace();
        let compartments: Vec<&str> = model
            .element()
            .list_items(core, "listOfCompartments", "compartment")
            .filter_map(|c| c.attr("id"))
            .collect();

        assert_eq!(compartments, vec!["cell", "sub__c"]);
    }

    #[test]
    fn test_read_errors_map_to_exit_code_one() {
        let err = flatten_emds(data("does_not_exist.xml")).unwrap_err();
        assert!(matches!(err, SBMLError::ReadError { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
