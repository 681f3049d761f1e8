//! Per-document fill pipeline.
//!
//! One document flows through a fixed stage order: cover logo, shape
//! text, body paragraphs, headers and footers, the structural passes,
//! version-control dates, a fallback logo, and the save. A stage that
//! fails logs and is skipped; the document still moves through the
//! remaining stages and always yields a report. Only the load step is
//! fatal, and even that returns an (empty) report rather than an error.

use crate::docx::{
    content_root, first_paragraph, part_paragraphs, set_paragraph_alignment,
    shape_text_containers, DocxDocument, PartKind, DOCUMENT_PART,
};
use crate::error::Result;
use crate::fill::logo::{
    is_cover_eligible, LogoContext, LogoImage, LogoInserter, DEFAULT_LOGO_WIDTH_MM,
    HEADER_FOOTER_MAX_MM,
};
use crate::fill::prune::{
    is_image_bearing, structural_body_pass, structural_header_footer_pass, StructuralCounts,
};
use crate::fill::resolver::Resolver;
use crate::fill::version::VersionControlUpdater;
use crate::model::{DocumentReport, ReplacementMap};
use chrono::{Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

/// Options for a fill run.
#[derive(Debug, Clone)]
pub struct FillOptions {
    /// Logo image file to place at logo slots. `None` leaves slots as
    /// cleared text.
    pub logo: Option<PathBuf>,
    /// Base render width; context tiers scale off this.
    pub logo_width_mm: f64,
    /// Resolve and count without inserting images, pruning paragraphs,
    /// rewriting dates, or writing any output.
    pub dry_run: bool,
    /// Reference date for version-control rewriting. `None` means
    /// today.
    pub reference_date: Option<NaiveDate>,
}

impl Default for FillOptions {
    fn default() -> Self {
        FillOptions {
            logo: None,
            logo_width_mm: DEFAULT_LOGO_WIDTH_MM,
            dry_run: false,
            reference_date: None,
        }
    }
}

/// Fill one document and report what happened.
///
/// Never fails: a document that cannot be loaded yields an untouched
/// report, and any failing stage is logged and skipped. `input` and
/// `output` may be the same path; the save is atomic.
pub fn fill_document<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    fields: &ReplacementMap,
    options: &FillOptions,
) -> DocumentReport {
    let input = input.as_ref();
    let output = output.as_ref();
    let mut report = DocumentReport::new(input, output);

    let mut document = match DocxDocument::open(input) {
        Ok(document) => document,
        Err(e) => {
            log::error!("cannot load {}: {e}", input.display());
            return report;
        }
    };

    let resolver = Resolver::new(fields);
    let mut inserter = load_logo(options);
    let (package, body, header_footers) = document.parts_mut();

    // Cover page logo, by file name.
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cover_eligible = is_cover_eligible(&file_name);
    if cover_eligible && !options.dry_run {
        if let Some(ins) = inserter.as_mut() {
            match ins.insert_cover(package, body, options.logo_width_mm) {
                Ok(()) => report.changed = true,
                Err(e) => log::warn!("cover logo failed for {}: {e}", input.display()),
            }
        }
    }

    // Text inside shapes and text boxes of the body. A logo slot found
    // here cannot host the image itself; the hit is recorded so the
    // fallback stage can satisfy it.
    let mut shape_counts = StructuralCounts::default();
    for (container, tag) in shape_text_containers(body) {
        let outcome = resolver.resolve_container(body, container, tag);
        shape_counts.absorb(&outcome);
    }
    report.changed |= shape_counts.any_change();
    report.xml_logo_hits += shape_counts.logo_hits;
    report.placeholders_found.extend(shape_counts.found);
    report.placeholders_missing.extend(shape_counts.unresolved);

    // Body paragraphs, including table cells. The first paragraph of a
    // cover-eligible document is reserved for the cover logo, and
    // paragraphs that carry an image are left alone.
    let reserved = if cover_eligible {
        first_paragraph(body)
    } else {
        None
    };
    for paragraph in part_paragraphs(body) {
        if Some(paragraph) == reserved || is_image_bearing(body, paragraph) {
            continue;
        }
        let outcome = resolver.resolve_container(body, paragraph, "w:t");
        report.changed |= outcome.changed;
        report.placeholders_found.extend(outcome.found);
        report.placeholders_missing.extend(outcome.unresolved);
        if !outcome.logo_requested || options.dry_run {
            continue;
        }
        if let Some(ins) = inserter.as_mut() {
            let context = LogoContext::for_paragraph(body, paragraph, PartKind::Body);
            let width = context.width_mm(options.logo_width_mm);
            set_paragraph_alignment(body, paragraph, "right");
            match ins.insert_into_paragraph(package, DOCUMENT_PART, body, paragraph, width) {
                Ok(()) => {
                    report.logos_inserted_body += 1;
                    report.changed = true;
                }
                Err(e) => log::warn!("body logo failed for {}: {e}", input.display()),
            }
        }
    }

    // Header and footer paragraphs, at capped width and with the part's
    // own alignment kept.
    for part in header_footers.iter_mut() {
        for paragraph in part_paragraphs(&part.tree) {
            if is_image_bearing(&part.tree, paragraph) {
                continue;
            }
            let outcome = resolver.resolve_container(&mut part.tree, paragraph, "w:t");
            report.changed |= outcome.changed;
            report.placeholders_found.extend(outcome.found);
            report.placeholders_missing.extend(outcome.unresolved);
            if !outcome.logo_requested || options.dry_run {
                continue;
            }
            if let Some(ins) = inserter.as_mut() {
                let context = LogoContext::for_paragraph(&part.tree, paragraph, part.kind);
                let width = context
                    .width_mm(options.logo_width_mm)
                    .min(HEADER_FOOTER_MAX_MM);
                match ins.insert_into_paragraph(
                    package,
                    &part.name,
                    &mut part.tree,
                    paragraph,
                    width,
                ) {
                    Ok(()) => {
                        report.logos_inserted_headers += 1;
                        report.changed = true;
                    }
                    Err(e) => {
                        log::warn!("header logo failed in {}: {e}", part.name)
                    }
                }
            }
        }
    }

    // Structural body pass: every paragraph element, pruning allowed.
    let counts = structural_body_pass(&resolver, body, options.dry_run);
    report.changed |= counts.any_change();
    report.xml_logo_hits += counts.logo_hits;
    report.xml_paras_changed += counts.paras_changed;
    report.xml_paras_pruned += counts.pruned;
    report.placeholders_found.extend(counts.found);
    report.placeholders_missing.extend(counts.unresolved);

    // Structural header/footer pass.
    for part in header_footers.iter_mut() {
        let counts = structural_header_footer_pass(&resolver, &mut part.tree);
        report.changed |= counts.any_change();
        report.xml_logo_hits += counts.logo_hits;
        report.xml_paras_changed += counts.paras_changed;
        report.placeholders_found.extend(counts.found);
        report.placeholders_missing.extend(counts.unresolved);
    }

    // Version-control dates.
    if !options.dry_run {
        let reference = options
            .reference_date
            .unwrap_or_else(|| Local::now().date_naive());
        let outcome = VersionControlUpdater::new(reference).apply(body);
        report.version_control_processed = outcome.processed;
        report.changed |= outcome.changed;
    }

    // A document asked for a logo but no slot took one: put it on the
    // first body paragraph so the request is not silently dropped.
    let placed = report.logos_inserted_body + report.logos_inserted_headers;
    if report.xml_logo_hits > 0 && placed == 0 && !options.dry_run {
        if let Some(ins) = inserter.as_mut() {
            let paragraph = match first_paragraph(body) {
                Some(p) => p,
                None => {
                    let root = content_root(body);
                    let p = body.create_element("w:p");
                    body.append_child(root, p);
                    p
                }
            };
            set_paragraph_alignment(body, paragraph, "right");
            let width = LogoContext::Body.width_mm(options.logo_width_mm);
            match ins.insert_into_paragraph(package, DOCUMENT_PART, body, paragraph, width) {
                Ok(()) => {
                    report.logos_inserted_body += 1;
                    report.changed = true;
                }
                Err(e) => {
                    log::warn!("fallback logo failed for {}: {e}", input.display())
                }
            }
        }
    }

    if !options.dry_run {
        if let Err(e) = document.save(output) {
            log::error!("cannot save {}: {e}", output.display());
        }
    }
    report
}

/// Fill every document under a directory tree, in place.
///
/// Files are visited in sorted path order. Word lock files (`~$`) and
/// hidden files are skipped. Returns one report per document.
pub fn fill_directory<P: AsRef<Path>>(
    dir: P,
    fields: &ReplacementMap,
    options: &FillOptions,
) -> Result<Vec<DocumentReport>> {
    let mut files = Vec::new();
    collect_docx_files(dir.as_ref(), &mut files)?;
    files.sort();
    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        reports.push(fill_document(&file, &file, fields, options));
    }
    Ok(reports)
}

fn collect_docx_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("~$") || name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            collect_docx_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("docx"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn load_logo(options: &FillOptions) -> Option<LogoInserter> {
    let path = options.logo.as_ref()?;
    match LogoImage::open(path) {
        Ok(image) => Some(LogoInserter::new(image)),
        Err(e) => {
            log::warn!("logo unavailable: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = FillOptions::default();
        assert!(options.logo.is_none());
        assert_eq!(options.logo_width_mm, 35.0);
        assert!(!options.dry_run);
        assert!(options.reference_date.is_none());
    }

    #[test]
    fn test_collect_skips_lock_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.docx"), b"x").unwrap();
        fs::write(dir.path().join("~$a.docx"), b"x").unwrap();
        fs::write(dir.path().join(".draft.docx"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.DOCX"), b"x").unwrap();

        let mut files = Vec::new();
        collect_docx_files(dir.path(), &mut files).unwrap();
        files.sort();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.docx", "b.DOCX"]);
    }

    #[test]
    fn test_unreadable_document_yields_untouched_report() {
        let fields = ReplacementMap::new();
        let report = fill_document(
            "/no/such/file.docx",
            "/no/such/out.docx",
            &fields,
            &FillOptions::default(),
        );
        assert!(!report.changed);
        assert_eq!(report.xml_logo_hits, 0);
        assert_eq!(report.logos_inserted_body, 0);
        assert!(report.placeholders_found.is_empty());
        assert_eq!(report.file, PathBuf::from("/no/such/file.docx"));
    }
}
