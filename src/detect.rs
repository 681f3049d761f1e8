//! DOCX format detection and validation.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// DOCX container information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocxFormat {
    /// Name of the first archive entry (usually "[Content_Types].xml").
    /// Empty when the header was too short to carry the name.
    pub first_entry: String,
}

impl std::fmt::Display for DocxFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.first_entry.is_empty() {
            write!(f, "DOCX package")
        } else {
            write!(f, "DOCX package ({})", self.first_entry)
        }
    }
}

/// ZIP local file header magic: PK\x03\x04
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// Fixed portion of a ZIP local file header.
const ZIP_HEADER_LEN: usize = 30;
/// Byte offset of the entry-name length field.
const NAME_LEN_OFFSET: usize = 26;

/// Detect DOCX format from a file path.
///
/// # Arguments
/// * `path` - Path to the DOCX file
///
/// # Returns
/// * `Ok(DocxFormat)` if the file looks like a DOCX package
/// * `Err(Error::UnknownFormat)` otherwise
///
/// # Example
/// ```no_run
/// use docfill::detect::detect_format_from_path;
///
/// let format = detect_format_from_path("document.docx").unwrap();
/// println!("{}", format);
/// ```
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<DocxFormat> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(64);
    BufReader::new(file).take(64).read_to_end(&mut header)?;
    detect_format_from_bytes(&header)
}

/// Detect DOCX format from bytes.
///
/// # Arguments
/// * `data` - Byte slice containing at least the first ZIP local file header
///
/// # Returns
/// * `Ok(DocxFormat)` if the data starts with a DOCX-looking ZIP header
/// * `Err(Error::UnknownFormat)` otherwise
pub fn detect_format_from_bytes(data: &[u8]) -> Result<DocxFormat> {
    if data.len() < ZIP_HEADER_LEN {
        return Err(Error::UnknownFormat);
    }

    if !data.starts_with(ZIP_MAGIC) {
        return Err(Error::UnknownFormat);
    }

    // First entry name sits right after the fixed header
    let name_len =
        u16::from_le_bytes([data[NAME_LEN_OFFSET], data[NAME_LEN_OFFSET + 1]]) as usize;
    let first_entry = if data.len() >= ZIP_HEADER_LEN + name_len {
        String::from_utf8_lossy(&data[ZIP_HEADER_LEN..ZIP_HEADER_LEN + name_len]).to_string()
    } else {
        String::new()
    };

    if !first_entry.is_empty() && !is_package_entry_name(&first_entry) {
        return Err(Error::UnknownFormat);
    }

    Ok(DocxFormat { first_entry })
}

/// Check whether an entry name belongs to an OOXML package layout.
fn is_package_entry_name(name: &str) -> bool {
    name == "[Content_Types].xml"
        || name.starts_with("_rels/")
        || name.starts_with("word/")
        || name.starts_with("docProps/")
        || name.starts_with("customXml/")
}

/// Check if a file is a valid DOCX package.
///
/// # Arguments
/// * `path` - Path to the file
///
/// # Returns
/// * `true` if the file looks like a DOCX package
/// * `false` otherwise
pub fn is_docx<P: AsRef<Path>>(path: P) -> bool {
    detect_format_from_path(path).is_ok()
}

/// Check if bytes represent a valid DOCX package.
///
/// # Arguments
/// * `data` - Byte slice to check
///
/// # Returns
/// * `true` if the data starts with a DOCX-looking header
/// * `false` otherwise
pub fn is_docx_bytes(data: &[u8]) -> bool {
    detect_format_from_bytes(data).is_ok()
}
