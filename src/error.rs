//! Error types for the docfill library.

use std::io;
use thiserror::Error;

/// Result type alias for docfill operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while processing DOCX templates.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file format is not recognized as DOCX.
    #[error("Unknown file format: not a valid DOCX")]
    UnknownFormat,

    /// The ZIP container is damaged or cannot be read.
    #[error("Package error: {0}")]
    Package(String),

    /// A required package part is missing.
    #[error("Missing package part: {0}")]
    MissingPart(String),

    /// Error parsing a WordprocessingML part.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// The replacement map JSON could not be read.
    #[error("Replacement map error: {0}")]
    Fields(String),

    /// The logo image could not be loaded or measured.
    #[error("Logo image error: {0}")]
    Logo(String),

    /// Error writing the aggregated report.
    #[error("Report error: {0}")]
    Report(String),

    /// A date string could not be interpreted.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            zip::result::ZipError::FileNotFound => {
                Error::MissingPart("file not found in archive".to_string())
            }
            _ => Error::Package(err.to_string()),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Fields(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Report(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Logo(err.to_string())
    }
}
