//! # docfill
//!
//! Batch template resolution for DOCX policy and procedure documents.
//!
//! This library fills `<token>` placeholders with client values across
//! whole document trees, places a client logo into marked slots, and
//! keeps version-control tables current, without disturbing the
//! formatting of the templates it edits.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docfill::{Docfill, Result};
//!
//! fn main() -> Result<()> {
//!     let reports = Docfill::new()
//!         .field("<company name>", "Acme Care Pty Ltd")
//!         .field("<abn>", "51 824 753 556")
//!         .with_logo("logo.png")
//!         .fill_dir("./policies")?;
//!
//!     for report in &reports {
//!         println!("{}: changed={}", report.file.display(), report.changed);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Cross-run tokens**: placeholders survive Word's run splitting
//!   and resolve wherever their text lands
//! - **Possessive grammar**: `<company name>'s` renders as `Acme's` or
//!   `Jones'` depending on the value
//! - **Logo placement**: context-tiered widths for body, tables,
//!   headers, footers, and cover pages
//! - **Image-safe pruning**: paragraphs emptied by blank values are
//!   removed, never images or their anchors
//! - **Version-control tables**: drafted and review dates rolled
//!   forward to a reference date
//! - **Batch reports**: per-document counters with CSV aggregation

pub mod detect;
pub mod docx;
pub mod error;
pub mod fill;
pub mod model;
pub mod xml;

// Re-export commonly used types
pub use detect::{
    detect_format_from_bytes, detect_format_from_path, is_docx, is_docx_bytes, DocxFormat,
};
pub use docx::DocxDocument;
pub use error::{Error, Result};
pub use fill::{fill_directory, fill_document, FillOptions};
pub use model::{write_csv_report, DocumentReport, ReplacementMap, LOGO_TOKEN};

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Fill one document with default options.
///
/// # Arguments
///
/// * `input` - Path to the DOCX template
/// * `output` - Path to write the filled document (may equal `input`)
/// * `fields` - Token replacement map
///
/// # Example
///
/// ```no_run
/// use docfill::{fill_file, ReplacementMap};
///
/// let mut fields = ReplacementMap::new();
/// fields.insert("<company name>", "Acme Care Pty Ltd");
/// let report = fill_file("template.docx", "out.docx", &fields);
/// assert!(report.changed);
/// ```
pub fn fill_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    fields: &ReplacementMap,
) -> DocumentReport {
    fill_document(input, output, fields, &FillOptions::default())
}

/// Fill one document with custom options.
///
/// # Example
///
/// ```no_run
/// use docfill::{fill_file_with_options, FillOptions, ReplacementMap};
///
/// let fields = ReplacementMap::new();
/// let options = FillOptions {
///     dry_run: true,
///     ..FillOptions::default()
/// };
/// let report = fill_file_with_options("template.docx", "out.docx", &fields, &options);
/// println!("would change: {}", report.changed);
/// ```
pub fn fill_file_with_options<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    fields: &ReplacementMap,
    options: &FillOptions,
) -> DocumentReport {
    fill_document(input, output, fields, options)
}

/// Builder for configuring and running fills.
///
/// # Example
///
/// ```no_run
/// use docfill::Docfill;
///
/// let report = Docfill::new()
///     .field("<company name>", "Acme Care Pty Ltd")
///     .with_logo("logo.png")
///     .with_logo_width_mm(30.0)
///     .fill("template.docx", "out.docx");
/// # let _ = report;
/// ```
pub struct Docfill {
    fields: ReplacementMap,
    options: FillOptions,
}

impl Docfill {
    /// Create a new builder with an empty field map.
    pub fn new() -> Self {
        Self {
            fields: ReplacementMap::new(),
            options: FillOptions::default(),
        }
    }

    /// Add one replacement field.
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key, value);
        self
    }

    /// Merge fields from a flat JSON object file. Later sources win on
    /// collisions.
    pub fn fields_from_json<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let loaded = ReplacementMap::from_json_file(path)?;
        self.fields.merge(loaded);
        Ok(self)
    }

    /// Set the logo image to place at logo slots.
    pub fn with_logo(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.logo = Some(path.into());
        self
    }

    /// Set the base logo width in millimetres.
    pub fn with_logo_width_mm(mut self, width: f64) -> Self {
        self.options.logo_width_mm = width;
        self
    }

    /// Report what would change without writing anything.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.options.dry_run = enabled;
        self
    }

    /// Pin the version-control reference date (defaults to today).
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.options.reference_date = Some(date);
        self
    }

    /// Fill one document.
    pub fn fill<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> DocumentReport {
        fill_document(input, output, &self.fields, &self.options)
    }

    /// Fill one document in place.
    pub fn fill_in_place<P: AsRef<Path>>(&self, path: P) -> DocumentReport {
        let path = path.as_ref();
        fill_document(path, path, &self.fields, &self.options)
    }

    /// Fill every document under a directory, in place.
    pub fn fill_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<DocumentReport>> {
        fill_directory(dir, &self.fields, &self.options)
    }
}

impl Default for Docfill {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_fields_and_options() {
        let docfill = Docfill::new()
            .field("<company name>", "Acme")
            .field("<abn>", "123")
            .with_logo("logo.png")
            .with_logo_width_mm(28.0)
            .dry_run(true)
            .with_reference_date(NaiveDate::from_ymd_opt(2025, 8, 14).unwrap());

        assert_eq!(docfill.fields.get("<company name>"), Some("Acme"));
        assert_eq!(docfill.fields.len(), 2);
        assert_eq!(docfill.options.logo, Some(PathBuf::from("logo.png")));
        assert_eq!(docfill.options.logo_width_mm, 28.0);
        assert!(docfill.options.dry_run);
        assert!(docfill.options.reference_date.is_some());
    }

    #[test]
    fn test_fill_missing_file_reports_untouched() {
        let report = Docfill::new()
            .field("<x>", "y")
            .fill("/definitely/missing.docx", "/tmp/out.docx");
        assert!(!report.changed);
        assert_eq!(report.xml_paras_changed, 0);
    }
}
