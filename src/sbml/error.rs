use std::path::PathBuf;

use itertools::Itertools;
use thiserror::Error;

use crate::sbml::xml::XmlError;

/// Errors that can occur while reading, rewriting, flattening and writing SBML documents
#[derive(Debug, Error)]
pub enum SBMLError {
    /// Error when an SBML file cannot be opened or read
    #[error("Failed to read SBML file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error when the input is not well-formed XML or not an SBML document
    #[error("Failed to parse SBML document: {0}")]
    Xml(#[from] XmlError),

    /// Error when the root element is not `<sbml>`
    #[error("Not an SBML document: root element is <{0}>")]
    NotSBML(String),

    /// Error when writing the document fails
    #[error("Failed to write SBML document: {0}")]
    WriteError(#[from] std::io::Error),

    /// Error when the source of an external model definition cannot be opened or parsed
    #[error("Unresolved reference in external model definition '{emd_id}': cannot load '{source_uri}' ({reason})")]
    UnresolvedReference {
        emd_id: String,
        source_uri: String,
        reason: String,
    },

    /// Error when the referenced model is not part of the source document
    #[error("External model definition '{emd_id}' references model '{model_ref}' which is not defined in '{source_uri}'")]
    MissingModelRef {
        emd_id: String,
        source_uri: String,
        model_ref: String,
    },

    /// Error when a chain of external model definitions revisits a document
    #[error("Cyclic reference between external model definitions: {}", .chain.iter().map(|p| p.display()).join(" -> "))]
    CyclicReference { chain: Vec<PathBuf> },

    /// Error when an incoming model definition clashes with an existing one
    #[error("Model definition id collision: '{id}' already exists in the document")]
    ModelIdCollision { id: String },

    /// Error when the SBML document doesn't contain a model
    #[error("SBML document does not contain a model")]
    MissingModel,

    /// Error when the comp flattening converter cannot handle the document
    #[error("Cannot flatten comp model: {0}")]
    Unflattenable(String),
}

impl SBMLError {
    /// Process exit code used by the command line interface.
    ///
    /// * `1` read or write failures
    /// * `2` unresolved references and missing model references
    /// * `4` cyclic references and id collisions
    ///
    /// Exit code `3` (validation errors after rewriting) is not an error value and is
    /// decided by the caller.
    pub fn exit_code(&self) -> i32 {
        match self {
            SBMLError::ReadError { .. }
            | SBMLError::Xml(_)
            | SBMLError::NotSBML(_)
            | SBMLError::WriteError(_)
            | SBMLError::MissingModel
            | SBMLError::Unflattenable(_) => 1,
            SBMLError::UnresolvedReference { .. } | SBMLError::MissingModelRef { .. } => 2,
            SBMLError::CyclicReference { .. } | SBMLError::ModelIdCollision { .. } => 4,
        }
    }
}
