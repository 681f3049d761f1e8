//! Logo image placement.
//!
//! A logo token marks a slot; placement decides how wide the image may
//! render there. Width is tiered by context (body, header, footer, and
//! their table variants) as a fraction of the caller's base width, so a
//! footer logo never balloons to body size. Insertion writes the media
//! entry, content-type default, and part relationship once, then grafts
//! a `wp:inline` drawing run into the target paragraph.

use crate::docx::{
    content_root, set_paragraph_alignment, set_paragraph_spacing, DocxPackage, PartKind,
    DOCUMENT_PART,
};
use crate::error::{Error, Result};
use crate::xml::{NodeId, XmlTree};
use image::ImageFormat;
use std::fs;
use std::path::Path;

/// English Metric Units per millimetre.
const EMU_PER_MM: f64 = 36000.0;

/// Default base width when the caller gives none.
pub const DEFAULT_LOGO_WIDTH_MM: f64 = 35.0;

/// Hard ceiling for header and footer insertions.
pub const HEADER_FOOTER_MAX_MM: f64 = 20.0;

/// Twentieths of a point: 15 mm above and 3 mm below a cover logo.
const COVER_SPACING_BEFORE_TWIPS: u32 = 850;
const COVER_SPACING_AFTER_TWIPS: u32 = 170;

/// File-name fragments that mark a document as cover-bearing.
const COVER_PATTERNS: [&str; 9] = [
    "policy and procedure manual",
    "business plan",
    "00",
    "policy and procedures",
    "handbook",
    "psychological assessment form",
    "risk assessment guide and checklist",
    "service agreement and schedule of support",
    "evaluation of competency",
];

/// Whether a document gets a dedicated cover-page logo paragraph.
pub fn is_cover_eligible(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    COVER_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Where a logo slot sits, for width selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoContext {
    Body,
    BodyTable,
    Header,
    HeaderTable,
    Footer,
    FooterTable,
}

impl LogoContext {
    /// Context of a slot paragraph: the part it lives in, refined by
    /// whether a table cell encloses it.
    pub fn for_paragraph(tree: &XmlTree, paragraph: NodeId, kind: PartKind) -> Self {
        let in_table = tree.ancestors(paragraph).any(|a| tree.name(a) == "w:tc");
        match (kind, in_table) {
            (PartKind::Body, false) => LogoContext::Body,
            (PartKind::Body, true) => LogoContext::BodyTable,
            (PartKind::Header, false) => LogoContext::Header,
            (PartKind::Header, true) => LogoContext::HeaderTable,
            (PartKind::Footer, false) => LogoContext::Footer,
            (PartKind::Footer, true) => LogoContext::FooterTable,
        }
    }

    /// Render width for this context, scaled off the caller's base
    /// width. Ratios follow the historical 35 mm body size.
    pub fn width_mm(self, base_mm: f64) -> f64 {
        let numerator = match self {
            LogoContext::Body => 35.0,
            LogoContext::BodyTable => 25.0,
            LogoContext::Header => 20.0,
            LogoContext::HeaderTable => 18.0,
            LogoContext::Footer => 15.0,
            LogoContext::FooterTable => 12.0,
        };
        base_mm * numerator / 35.0
    }
}

/// A decoded logo, loaded once per run.
pub struct LogoImage {
    bytes: Vec<u8>,
    width_px: u32,
    height_px: u32,
    extension: &'static str,
    content_type: &'static str,
}

impl LogoImage {
    /// Load and decode a logo file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| Error::Logo(format!("cannot read logo {}: {e}", path.display())))?;
        Self::from_bytes(bytes)
    }

    /// Decode logo bytes and record pixel dimensions.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes)
            .map_err(|e| Error::Logo(format!("unrecognized logo data: {e}")))?;
        let (extension, content_type) = match format {
            ImageFormat::Png => ("png", "image/png"),
            ImageFormat::Jpeg => ("jpeg", "image/jpeg"),
            ImageFormat::Gif => ("gif", "image/gif"),
            ImageFormat::Bmp => ("bmp", "image/bmp"),
            ImageFormat::Tiff => ("tiff", "image/tiff"),
            other => {
                return Err(Error::Logo(format!(
                    "unsupported logo format {other:?}"
                )))
            }
        };
        let decoded = image::load_from_memory(&bytes)?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(Error::Logo("logo image has zero extent".to_string()));
        }
        Ok(LogoImage {
            width_px: decoded.width(),
            height_px: decoded.height(),
            bytes,
            extension,
            content_type,
        })
    }

    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    pub fn height_px(&self) -> u32 {
        self.height_px
    }

    /// Drawing extent in EMU for a render width, height from the pixel
    /// aspect ratio.
    pub fn extent_emu(&self, width_mm: f64) -> (u64, u64) {
        let cx = width_mm * EMU_PER_MM;
        let cy = cx * self.height_px as f64 / self.width_px as f64;
        (cx.round() as u64, cy.round() as u64)
    }
}

/// Inserts one logo into any number of slots of one package. The media
/// entry is written on first use and shared by every insertion; each
/// part gets (at most) one image relationship.
pub struct LogoInserter {
    image: LogoImage,
    media_name: Option<String>,
}

impl LogoInserter {
    pub fn new(image: LogoImage) -> Self {
        LogoInserter {
            image,
            media_name: None,
        }
    }

    /// Append a drawing run carrying the logo to `paragraph`.
    pub fn insert_into_paragraph(
        &mut self,
        package: &mut DocxPackage,
        part_name: &str,
        tree: &mut XmlTree,
        paragraph: NodeId,
        width_mm: f64,
    ) -> Result<()> {
        let media = self.ensure_media(package)?;
        let target = media.strip_prefix("word/").unwrap_or(&media).to_string();
        let rel_id = package.add_image_relationship(part_name, &target)?;
        let (cx, cy) = self.image.extent_emu(width_mm);
        let doc_pr_id = next_doc_pr_id(tree);
        let run_xml = drawing_run_xml(&rel_id, doc_pr_id, cx, cy);
        let fragment = XmlTree::parse_str(&run_xml)?;
        let run = tree.import_tree(&fragment, fragment.root());
        tree.append_child(paragraph, run);
        Ok(())
    }

    /// Prepend a left-aligned cover paragraph to the body and place the
    /// logo there at full base width, spaced off the title below it.
    pub fn insert_cover(
        &mut self,
        package: &mut DocxPackage,
        tree: &mut XmlTree,
        width_mm: f64,
    ) -> Result<()> {
        let body = content_root(tree);
        let paragraph = tree.create_element("w:p");
        tree.insert_child(body, 0, paragraph);
        set_paragraph_alignment(tree, paragraph, "left");
        set_paragraph_spacing(
            tree,
            paragraph,
            COVER_SPACING_BEFORE_TWIPS,
            COVER_SPACING_AFTER_TWIPS,
        );
        self.insert_into_paragraph(package, DOCUMENT_PART, tree, paragraph, width_mm)
    }

    fn ensure_media(&mut self, package: &mut DocxPackage) -> Result<String> {
        if let Some(name) = &self.media_name {
            return Ok(name.clone());
        }
        let name = package.add_media(self.image.extension, &self.image.bytes);
        package.ensure_content_type_default(self.image.extension, self.image.content_type)?;
        self.media_name = Some(name.clone());
        Ok(name)
    }
}

/// Smallest docPr id not already used in this part.
fn next_doc_pr_id(tree: &XmlTree) -> u32 {
    let mut max_id = 0u32;
    for node in tree.descendants_named(tree.root(), "wp:docPr") {
        if let Some(value) = tree.attr(node, "id") {
            if let Ok(id) = value.parse::<u32>() {
                max_id = max_id.max(id);
            }
        }
    }
    max_id + 1
}

/// A complete `w:r`/`w:drawing` subtree for one inline picture. All
/// drawing namespaces are declared inline so the run is valid in any
/// part.
fn drawing_run_xml(rel_id: &str, doc_pr_id: u32, cx: u64, cy: u64) -> String {
    format!(
        "<w:r><w:drawing>\
         <wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\" \
         xmlns:wp=\"http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing\" \
         xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
         xmlns:pic=\"http://schemas.openxmlformats.org/drawingml/2006/picture\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
         <wp:extent cx=\"{cx}\" cy=\"{cy}\"/>\
         <wp:effectExtent l=\"0\" t=\"0\" r=\"0\" b=\"0\"/>\
         <wp:docPr id=\"{doc_pr_id}\" name=\"Picture {doc_pr_id}\"/>\
         <wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect=\"1\"/></wp:cNvGraphicFramePr>\
         <a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">\
         <pic:pic>\
         <pic:nvPicPr><pic:cNvPr id=\"{doc_pr_id}\" name=\"Picture {doc_pr_id}\"/><pic:cNvPicPr/></pic:nvPicPr>\
         <pic:blipFill><a:blip r:embed=\"{rel_id}\"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>\
         <pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>\
         <a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr>\
         </pic:pic>\
         </a:graphicData></a:graphic>\
         </wp:inline>\
         </w:drawing></w:r>"
    )
}
