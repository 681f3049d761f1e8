//! Domain model types for template resolution.
//!
//! This module defines the inputs and outputs that bridge the DOCX layer
//! and the fill passes: the replacement map the passes resolve against,
//! and the per-document report the pipeline emits.

mod fields;
mod report;

pub use fields::{ReplacementMap, LOGO_TOKEN};
pub use report::{write_csv_report, DocumentReport};
