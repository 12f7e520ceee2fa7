use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::sbml::{document::SBMLDocument, error::SBMLError};

/// Reads an SBML document from a file.
///
/// The path is kept on the document and serves as the base directory for resolving the
/// sources of external model definitions.
///
/// # Arguments
///
/// * `path` - Path to the SBML file
///
/// # Errors
///
/// This function will return an error if:
/// * The file cannot be opened or read (`SBMLError::ReadError`)
/// * The file is not well-formed XML (`SBMLError::Xml`)
/// * The root element is not `<sbml>` (`SBMLError::NotSBML`)
pub fn read_sbml(path: impl Into<PathBuf>) -> Result<SBMLDocument, SBMLError> {
    SBMLDocument::read(path.into())
}

/// Writes an SBML document to a file.
///
/// The document is serialized completely before the file is created, so a failing
/// serialization never leaves a partial file behind.
///
/// # Arguments
///
/// * `doc` - The document to write
/// * `path` - Path of the output file
pub fn write_sbml(doc: &SBMLDocument, path: impl Into<PathBuf>) -> Result<(), SBMLError> {
    doc.write(path.into())
}

/// Saves a report (validation, reconciliation, flattening) as pretty-printed JSON.
///
/// # Arguments
///
/// * `path` - Path of the JSON file
/// * `report` - The report to save
pub fn save_report<T: Serialize>(path: impl Into<PathBuf>, report: &T) -> Result<(), IOError> {
    let path = path.into();
    let file = std::fs::File::create(path).map_err(IOError::FileNotFound)?;
    serde_json::to_writer_pretty(file, report).map_err(IOError::JsonParseError)
}

/// Represents errors that can occur while saving reports.
#[derive(Error, Debug)]
pub enum IOError {
    /// Indicates that the specified file could not be created or opened.
    #[error("File not found: {0}")]
    FileNotFound(#[from] std::io::Error),

    /// Indicates that the report could not be serialized to JSON.
    #[error("Failed to serialize JSON: {0}")]
    JsonParseError(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::consistency::ValidationReport;

    #[test]
    fn test_write_and_read_sbml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.xml");
        let doc = SBMLDocument::from_xml_string(
            r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1">
                 <model id="m"/>
               </sbml>"#,
        )
        .unwrap();

        write_sbml(&doc, &path).expect("Failed to write SBML");
        let reread = read_sbml(&path).expect("Failed to read SBML");
        assert!(doc.root().same_content(reread.root()));
        assert_eq!(reread.path(), Some(path.as_path()));
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_sbml("does/not/exist.xml");
        assert!(matches!(result, Err(SBMLError::ReadError { .. })));
    }

    #[test]
    fn test_save_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        save_report(&path, &ValidationReport::new()).expect("Failed to save report");

        let content = std::fs::read_to_string(&path).unwrap();
        let report: ValidationReport = serde_json::from_str(&content).unwrap();
        assert!(report.is_valid);
    }
}
