//! SBML comp flattening library
//!
//! This library provides functionality for working with hierarchical SBML models, including:
//! - Reading and writing SBML Level 3 documents with arbitrary packages
//! - Inlining external model definitions as model definitions
//! - Reconciling package declarations of inlined models
//! - Collapsing submodels into a single flat model
//! - Validating SBML documents

#![warn(unused_imports)]

/// Commonly used types and functionality re-exported for convenience
pub mod prelude {
    pub use crate::comp::driver::*;
    pub use crate::comp::flatten::{CompFlattener, FlattenReport, SubmodelInliner};
    pub use crate::comp::reconciler::{reconcile, PluginInstantiationWarning, ReconcileReport};
    pub use crate::comp::rewriter::{rewrite, PackageDemand, RewriteSummary};
    pub use crate::io::*;
    pub use crate::sbml::document::SBMLDocument;
    pub use crate::sbml::error::SBMLError;
    pub use crate::sbml::model::*;
    pub use crate::sbml::packages::{declared_packages, package_used_by_model, PackageDeclaration};
    pub use crate::validation::consistency::*;
}

/// SBML documents and their XML representation
pub mod sbml {
    /// Namespace-aware XML element tree
    pub mod xml;
    /// Error types for reading, rewriting and writing
    pub mod error;
    /// Document container
    pub mod document;
    /// Models, model definitions and comp references
    pub mod model;
    /// Package declarations and the registry of known packages
    pub mod packages;
}

/// Hierarchical model composition
pub mod comp {
    /// Resolution of external model definitions
    pub mod resolver;
    /// Rewriting of external model definitions into model definitions
    pub mod rewriter;
    /// Package reconciliation
    pub mod reconciler;
    /// Collapsing submodels into the top model
    pub mod flatten;
    /// Flattening pipeline
    pub mod driver;
}

/// Validation of SBML documents
pub mod validation {
    /// Main consistency interface
    pub mod consistency;
    /// Checks of identifiers and references
    mod general;
    /// Checks of the document structure
    mod internal;
    /// Units and modeling practice checks
    mod practice;
}

/// IO functionality
pub mod io;

/// Display of documents and reports
pub mod info;
