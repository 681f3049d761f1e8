//! High-level DOCX document: parsed parts, structural traversal, and the
//! WordprocessingML conventions (property ordering, run construction) the
//! fill passes rely on.

mod package;

pub use package::DocxPackage;

use crate::error::{Error, Result};
use crate::xml::{NodeId, XmlTree};
use std::path::Path;

/// Main document part name.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Elements fragment collection never descends into. Text boxes live
/// behind these, and they are separate containers from the host paragraph.
pub const DRAWING_BARRIERS: [&str; 3] = ["w:drawing", "w:pict", "w:object"];

/// Which kind of part a paragraph lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Body,
    Header,
    Footer,
}

/// One parsed header or footer part.
#[derive(Debug)]
pub struct HeaderFooterPart {
    /// Package part name, for example `word/header1.xml`.
    pub name: String,
    pub kind: PartKind,
    pub tree: XmlTree,
}

/// A DOCX document with its body and header/footer parts parsed into
/// mutable trees. [`save`](Self::save) serializes the trees back into the
/// package and writes it out.
#[derive(Debug)]
pub struct DocxDocument {
    package: DocxPackage,
    body: XmlTree,
    header_footers: Vec<HeaderFooterPart>,
}

impl DocxDocument {
    /// Open and parse a document from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_package(DocxPackage::open(path)?)
    }

    /// Open and parse a document from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_package(DocxPackage::from_bytes(data)?)
    }

    fn from_package(package: DocxPackage) -> Result<Self> {
        let body_data = package
            .part(DOCUMENT_PART)
            .ok_or_else(|| Error::MissingPart(DOCUMENT_PART.to_string()))?;
        let body = XmlTree::parse(body_data)?;
        if body.find_child(body.root(), "w:body").is_none() {
            return Err(Error::XmlParse(format!("{DOCUMENT_PART} has no w:body")));
        }

        let mut header_footers = Vec::new();
        for name in package.header_footer_names() {
            let data = match package.part(&name) {
                Some(data) => data,
                None => continue,
            };
            let tree = match XmlTree::parse(data) {
                Ok(tree) => tree,
                Err(e) => {
                    log::warn!("skipping unparseable part {name}: {e}");
                    continue;
                }
            };
            let kind = if name.starts_with("word/header") {
                PartKind::Header
            } else {
                PartKind::Footer
            };
            header_footers.push(HeaderFooterPart { name, kind, tree });
        }

        Ok(DocxDocument {
            package,
            body,
            header_footers,
        })
    }

    /// The underlying package.
    pub fn package(&self) -> &DocxPackage {
        &self.package
    }

    /// Mutable access to the underlying package.
    pub fn package_mut(&mut self) -> &mut DocxPackage {
        &mut self.package
    }

    /// The parsed `word/document.xml` tree.
    pub fn body(&self) -> &XmlTree {
        &self.body
    }

    /// Mutable access to the body tree.
    pub fn body_mut(&mut self) -> &mut XmlTree {
        &mut self.body
    }

    /// Parsed header and footer parts, sorted by part name.
    pub fn header_footers(&self) -> &[HeaderFooterPart] {
        &self.header_footers
    }

    /// Mutable access to header and footer parts.
    pub fn header_footers_mut(&mut self) -> &mut [HeaderFooterPart] {
        &mut self.header_footers
    }

    /// Borrow the package, body tree, and header/footer parts at once.
    /// Logo insertion touches the package and a part tree together.
    pub fn parts_mut(
        &mut self,
    ) -> (&mut DocxPackage, &mut XmlTree, &mut [HeaderFooterPart]) {
        (
            &mut self.package,
            &mut self.body,
            &mut self.header_footers,
        )
    }

    /// Serialize all parsed trees back into the package.
    fn flush_parts(&mut self) -> Result<()> {
        self.package.set_part(DOCUMENT_PART, self.body.to_bytes()?);
        for part in &self.header_footers {
            self.package.set_part(&part.name, part.tree.to_bytes()?);
        }
        Ok(())
    }

    /// Serialize the whole document to DOCX bytes.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.flush_parts()?;
        self.package.to_bytes()
    }

    /// Write the document to disk (temp file + atomic persist).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.flush_parts()?;
        self.package.save(path)
    }
}

/// The element paragraphs hang off: `w:body` for the main part, the part
/// root itself for headers and footers.
pub fn content_root(tree: &XmlTree) -> NodeId {
    tree.find_child(tree.root(), "w:body")
        .unwrap_or_else(|| tree.root())
}

/// All paragraphs of a part in document order, including paragraphs nested
/// in tables (and tables within tables), excluding text-box paragraphs.
pub fn part_paragraphs(tree: &XmlTree) -> Vec<NodeId> {
    let mut out = Vec::new();
    collect_paragraphs(tree, content_root(tree), &mut out);
    out
}

/// Paragraphs directly inside a container (recursing through tables).
pub fn collect_paragraphs(tree: &XmlTree, container: NodeId, out: &mut Vec<NodeId>) {
    for &child in tree.children(container) {
        match tree.name(child) {
            "w:p" => out.push(child),
            "w:tbl" => {
                for &row in tree.children(child) {
                    if tree.name(row) != "w:tr" {
                        continue;
                    }
                    for &cell in tree.children(row) {
                        if tree.name(cell) == "w:tc" {
                            collect_paragraphs(tree, cell, out);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// First top-level paragraph of a part, ignoring tables before it.
pub fn first_paragraph(tree: &XmlTree) -> Option<NodeId> {
    tree.find_child(content_root(tree), "w:p")
}

/// Top-level tables of a part in document order.
pub fn top_level_tables(tree: &XmlTree) -> Vec<NodeId> {
    tree.children(content_root(tree))
        .iter()
        .copied()
        .filter(|&c| tree.name(c) == "w:tbl")
        .collect()
}

/// Text fragments of one container. Collection stops at drawing
/// boundaries so text-box content never merges into the host paragraph.
pub fn paragraph_fragments(tree: &XmlTree, container: NodeId, tag: &str) -> Vec<NodeId> {
    tree.descendants_named_guarded(container, tag, &DRAWING_BARRIERS)
}

/// Visible text of a paragraph: its own fragments concatenated.
pub fn paragraph_text(tree: &XmlTree, paragraph: NodeId) -> String {
    let mut out = String::new();
    for fragment in paragraph_fragments(tree, paragraph, "w:t") {
        out.push_str(&tree.element_text(fragment));
    }
    out
}

/// Text of a table cell: its paragraphs joined by newlines.
pub fn cell_text(tree: &XmlTree, cell: NodeId) -> String {
    let mut paragraphs = Vec::new();
    collect_paragraphs(tree, cell, &mut paragraphs);
    paragraphs
        .iter()
        .map(|&p| paragraph_text(tree, p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text containers living inside drawing and VML shapes: DrawingML
/// paragraphs (`a:p` with `a:t` fragments) and text-box paragraphs
/// (`w:p` with `w:t` fragments). Both alternate-content branches are
/// included so edits stay consistent whichever one a renderer picks.
pub fn shape_text_containers(tree: &XmlTree) -> Vec<(NodeId, &'static str)> {
    let mut out = Vec::new();
    for shape_name in DRAWING_BARRIERS {
        for shape in tree.descendants_named(tree.root(), shape_name) {
            for drawing_para in tree.descendants_named(shape, "a:p") {
                out.push((drawing_para, "a:t"));
            }
            for boxed in tree.descendants_named(shape, "w:txbxContent") {
                let mut paragraphs = Vec::new();
                collect_paragraphs(tree, boxed, &mut paragraphs);
                out.extend(paragraphs.into_iter().map(|p| (p, "w:t")));
            }
        }
    }
    out
}

/// Set a fragment's text, marking significant edge whitespace.
pub fn set_fragment_text(tree: &mut XmlTree, fragment: NodeId, text: &str) {
    tree.set_element_text(fragment, text);
    if !text.is_empty() && text.trim() != text {
        tree.set_attr(fragment, "xml:space", "preserve");
    }
}

/// Get or create the `w:pPr` child of a paragraph, keeping it first.
pub fn paragraph_properties(tree: &mut XmlTree, paragraph: NodeId) -> NodeId {
    if let Some(props) = tree.find_child(paragraph, "w:pPr") {
        return props;
    }
    let props = tree.create_element("w:pPr");
    tree.insert_child(paragraph, 0, props);
    props
}

/// Set paragraph alignment (`left`, `right`, `center`, `both`).
pub fn set_paragraph_alignment(tree: &mut XmlTree, paragraph: NodeId, value: &str) {
    let props = paragraph_properties(tree, paragraph);
    let jc = match tree.find_child(props, "w:jc") {
        Some(jc) => jc,
        None => {
            let jc = tree.create_element("w:jc");
            insert_before_run_props(tree, props, jc);
            jc
        }
    };
    tree.set_attr(jc, "w:val", value);
}

/// Keep a paragraph on the same page as the next one.
pub fn set_keep_with_next(tree: &mut XmlTree, paragraph: NodeId) {
    let props = paragraph_properties(tree, paragraph);
    if tree.find_child(props, "w:keepNext").is_some() {
        return;
    }
    let keep = tree.create_element("w:keepNext");
    // Schema order: keepNext sits right after pStyle when one exists.
    let index = tree
        .find_child(props, "w:pStyle")
        .and_then(|s| tree.position_in_parent(s))
        .map(|i| i + 1)
        .unwrap_or(0);
    tree.insert_child(props, index, keep);
}

/// Set spacing before/after a paragraph, in twentieths of a point.
pub fn set_paragraph_spacing(tree: &mut XmlTree, paragraph: NodeId, before: u32, after: u32) {
    let props = paragraph_properties(tree, paragraph);
    let spacing = match tree.find_child(props, "w:spacing") {
        Some(spacing) => spacing,
        None => {
            let spacing = tree.create_element("w:spacing");
            let index = tree
                .find_child(props, "w:jc")
                .and_then(|jc| tree.position_in_parent(jc));
            match index {
                Some(index) => tree.insert_child(props, index, spacing),
                None => insert_before_run_props(tree, props, spacing),
            }
            spacing
        }
    };
    tree.set_attr(spacing, "w:before", &before.to_string());
    tree.set_attr(spacing, "w:after", &after.to_string());
}

/// Insert a pPr child before the trailing `w:rPr`, or append.
fn insert_before_run_props(tree: &mut XmlTree, props: NodeId, node: NodeId) {
    match tree
        .find_child(props, "w:rPr")
        .and_then(|r| tree.position_in_parent(r))
    {
        Some(pos) => tree.insert_child(props, pos, node),
        None => tree.append_child(props, node),
    }
}

/// Build a detached `w:r` carrying optional (already-detached) run
/// properties and the given text; embedded newlines become `w:br`.
pub fn make_text_run(tree: &mut XmlTree, run_props: Option<NodeId>, text: &str) -> NodeId {
    let run = tree.create_element("w:r");
    if let Some(props) = run_props {
        tree.append_child(run, props);
    }
    for (index, segment) in text.split('\n').enumerate() {
        if index > 0 {
            let br = tree.create_element("w:br");
            tree.append_child(run, br);
        }
        if !segment.is_empty() {
            let t = tree.create_element("w:t");
            tree.append_child(run, t);
            set_fragment_text(tree, t, segment);
        }
    }
    run
}
