//! Per-document processing report and CSV aggregation.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Outcome of processing a single document.
///
/// Sets are ordered so that aggregated output is deterministic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentReport {
    /// Source path.
    pub file: PathBuf,
    /// Destination path (same as `file` for in-place runs).
    pub output: PathBuf,
    /// Whether anything changed (or would change, on a dry run).
    pub changed: bool,
    /// Token-triggered and fallback logo insertions into the body.
    pub logos_inserted_body: u32,
    /// Logo insertions into header and footer parts.
    pub logos_inserted_headers: u32,
    /// Whether the version-control table was rewritten or re-anchored.
    pub version_control_processed: bool,
    /// Logo-token hits counted by the structural passes, including hits
    /// inside drawing and text-box shapes.
    pub xml_logo_hits: u32,
    /// Paragraphs changed by the structural passes.
    pub xml_paras_changed: u32,
    /// Paragraphs pruned (counted but not removed on dry runs).
    pub xml_paras_pruned: u32,
    /// Well-formed tokens seen before substitution.
    pub placeholders_found: BTreeSet<String>,
    /// Tokens left unresolved after substitution.
    pub placeholders_missing: BTreeSet<String>,
}

impl DocumentReport {
    /// Create an empty report for the given source/destination pair.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(file: P, output: Q) -> Self {
        DocumentReport {
            file: file.into(),
            output: output.into(),
            ..Default::default()
        }
    }
}

/// Column order is stable; downstream spreadsheets rely on it.
const CSV_COLUMNS: [&str; 11] = [
    "file",
    "output",
    "changed",
    "logos_inserted_body",
    "logos_inserted_headers",
    "version_control_processed",
    "xml_logo_hits",
    "xml_paras_changed",
    "xml_paras_pruned",
    "placeholders_found",
    "placeholders_missing",
];

/// Write reports as CSV, one row per document.
pub fn write_csv_report<P: AsRef<Path>>(path: P, reports: &[DocumentReport]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_COLUMNS)?;
    for report in reports {
        writer.write_record([
            report.file.display().to_string(),
            report.output.display().to_string(),
            report.changed.to_string(),
            report.logos_inserted_body.to_string(),
            report.logos_inserted_headers.to_string(),
            report.version_control_processed.to_string(),
            report.xml_logo_hits.to_string(),
            report.xml_paras_changed.to_string(),
            report.xml_paras_pruned.to_string(),
            join_tokens(&report.placeholders_found),
            join_tokens(&report.placeholders_missing),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn join_tokens(tokens: &BTreeSet<String>) -> String {
    tokens.iter().cloned().collect::<Vec<_>>().join("; ")
}
