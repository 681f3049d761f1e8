//! Structural passes and image-safe paragraph pruning.
//!
//! The structural passes re-walk every `w:p` element of a part after the
//! model-level passes ran, catching paragraphs those passes cannot reach
//! (nested content controls, text boxes, odd containers). The body pass
//! is the only place paragraphs are ever removed, and removal is fenced
//! by image detection on the paragraph, its snapshot neighbors, and its
//! enclosing structures. Anything that might be an image counts as one.

use crate::docx::{content_root, paragraph_text};
use crate::fill::resolver::{ResolveOutcome, Resolver};
use crate::model::LOGO_TOKEN;
use crate::xml::{NodeId, XmlTree};
use std::collections::BTreeSet;

/// Element names that definitely carry an image or drawing.
const IMAGE_ELEMENT_NAMES: [&str; 6] = [
    "w:drawing",
    "w:pict",
    "w:object",
    "v:imagedata",
    "a:blip",
    "pic:pic",
];

/// Name fragments that suggest graphic content under an unexpected
/// prefix (AlternateContent wrappers, vendor namespaces).
const IMAGE_NAME_MARKERS: [&str; 6] =
    ["drawing", "pict", "imagedata", "blip", "graphic", "embed"];

/// Containers whose images protect every paragraph inside them.
const PROTECTED_ANCESTOR_NAMES: [&str; 7] = [
    "w:tc",
    "w:tr",
    "w:tbl",
    "w:sdt",
    "w:txbxContent",
    "w:hdr",
    "w:ftr",
];

/// Image evidence inside a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePresence {
    /// A known image element was seen.
    Present,
    /// No image-like element names at all.
    Absent,
    /// An element name merely resembles graphic content. Treated as
    /// `Present` wherever the distinction would risk deleting an image.
    Unknown,
}

/// Classify a subtree by element names only. Text content never
/// contributes, so a paragraph that talks about drawings stays `Absent`.
pub fn classify_images(tree: &XmlTree, node: NodeId) -> ImagePresence {
    let mut unknown = false;
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
        if !tree.is_element(id) {
            continue;
        }
        let name = tree.name(id);
        if IMAGE_ELEMENT_NAMES.contains(&name) {
            return ImagePresence::Present;
        }
        let lower = name.to_ascii_lowercase();
        if IMAGE_NAME_MARKERS.iter().any(|m| lower.contains(m)) {
            unknown = true;
        }
        stack.extend(tree.children(id).iter().copied());
    }
    if unknown {
        ImagePresence::Unknown
    } else {
        ImagePresence::Absent
    }
}

/// Whether a subtree holds anything that could be an image.
pub fn is_image_bearing(tree: &XmlTree, node: NodeId) -> bool {
    classify_images(tree, node) != ImagePresence::Absent
}

/// Whether any protecting ancestor of `node` carries an image.
pub fn has_protected_ancestor_with_image(tree: &XmlTree, node: NodeId) -> bool {
    tree.ancestors(node)
        .filter(|&a| PROTECTED_ANCESTOR_NAMES.contains(&tree.name(a)))
        .any(|a| is_image_bearing(tree, a))
}

/// Aggregate result of a structural pass.
#[derive(Debug, Default)]
pub struct StructuralCounts {
    /// Containers whose text changed.
    pub paras_changed: u32,
    pub logo_hits: u32,
    pub pruned: u32,
    pub found: BTreeSet<String>,
    pub unresolved: BTreeSet<String>,
}

impl StructuralCounts {
    pub(crate) fn absorb(&mut self, outcome: &ResolveOutcome) {
        if outcome.changed {
            self.paras_changed += 1;
        }
        if outcome.logo_requested {
            self.logo_hits += 1;
        }
        self.found.extend(outcome.found.iter().cloned());
        self.unresolved.extend(outcome.unresolved.iter().cloned());
    }

    /// Whether the pass modified or would modify the part.
    pub fn any_change(&self) -> bool {
        self.paras_changed > 0 || self.pruned > 0
    }
}

/// Resolve every paragraph under the body, pruning those whose
/// placeholders produced nothing.
///
/// A paragraph is dropped only when it held at least one token, every
/// one of those tokens maps to a blank or missing value, and no image
/// protection applies. A token nobody defined counts as missing, so a
/// paragraph left holding only unknown placeholders goes away with
/// them. Neighbor protection reads a snapshot taken before any
/// resolution, so a paragraph next to an image keeps its slot even as
/// text around it changes. With `dry_run` the prune counter still
/// advances but nothing is detached.
pub fn structural_body_pass(
    resolver: &Resolver,
    tree: &mut XmlTree,
    dry_run: bool,
) -> StructuralCounts {
    let mut counts = StructuralCounts::default();
    let root = content_root(tree);
    let paragraphs = tree.descendants_named(root, "w:p");
    let bearing: Vec<bool> = paragraphs
        .iter()
        .map(|&p| is_image_bearing(tree, p))
        .collect();

    for (index, &paragraph) in paragraphs.iter().enumerate() {
        let before = paragraph_text(tree, paragraph);
        let has_logo_token = before.to_lowercase().contains(LOGO_TOKEN);
        let tokens = resolver.tokens_in(&before);

        let outcome = resolver.resolve_container(tree, paragraph, "w:t");
        counts.absorb(&outcome);

        // Logo slots and image paragraphs are resolved but never pruned.
        if has_logo_token || bearing[index] {
            continue;
        }
        if tokens.is_empty() {
            continue;
        }
        if !tokens.iter().all(|t| resolver.fields().is_blank(t)) {
            continue;
        }
        if index > 0 && bearing[index - 1] {
            continue;
        }
        if index + 1 < bearing.len() && bearing[index + 1] {
            continue;
        }
        if has_protected_ancestor_with_image(tree, paragraph) {
            continue;
        }
        counts.pruned += 1;
        if !dry_run {
            tree.detach(paragraph);
        }
    }
    counts
}

/// Resolve every paragraph and drawing-text container of a header or
/// footer part. Image-bearing paragraphs are left alone and nothing is
/// ever pruned here.
pub fn structural_header_footer_pass(
    resolver: &Resolver,
    tree: &mut XmlTree,
) -> StructuralCounts {
    let mut counts = StructuralCounts::default();
    let root = tree.root();

    for paragraph in tree.descendants_named(root, "w:p") {
        if is_image_bearing(tree, paragraph) {
            continue;
        }
        let outcome = resolver.resolve_container(tree, paragraph, "w:t");
        counts.absorb(&outcome);
    }
    for container in tree.descendants_named(root, "a:p") {
        let outcome = resolver.resolve_container(tree, container, "a:t");
        counts.absorb(&outcome);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReplacementMap;

    fn map(entries: &[(&str, &str)]) -> ReplacementMap {
        let mut fields = ReplacementMap::new();
        for (key, value) in entries {
            fields.insert(key, value);
        }
        fields
    }

    fn body_paragraph_count(tree: &XmlTree) -> usize {
        tree.descendants_named(content_root(tree), "w:p").len()
    }

    #[test]
    fn test_classify_present_for_drawing() {
        let tree = XmlTree::parse_str(
            "<w:p><w:r><w:drawing><wp:inline/></w:drawing></w:r></w:p>",
        )
        .unwrap();
        assert_eq!(classify_images(&tree, tree.root()), ImagePresence::Present);
    }

    #[test]
    fn test_classify_present_for_deep_blip() {
        let tree = XmlTree::parse_str(
            "<w:p><w:r><w:x><pic:pic><a:blip r:embed=\"rId5\"/></pic:pic></w:x></w:r></w:p>",
        )
        .unwrap();
        assert_eq!(classify_images(&tree, tree.root()), ImagePresence::Present);
    }

    #[test]
    fn test_classify_unknown_for_odd_prefix() {
        let tree = XmlTree::parse_str(
            "<w:p><mc:AlternateContent><wps:graphicFrame/></mc:AlternateContent></w:p>",
        )
        .unwrap();
        assert_eq!(classify_images(&tree, tree.root()), ImagePresence::Unknown);
        assert!(is_image_bearing(&tree, tree.root()));
    }

    #[test]
    fn test_classify_ignores_text_content() {
        let tree =
            XmlTree::parse_str("<w:p><w:r><w:t>a drawing of a blip</w:t></w:r></w:p>").unwrap();
        assert_eq!(classify_images(&tree, tree.root()), ImagePresence::Absent);
    }

    #[test]
    fn test_prunes_blank_token_paragraph() {
        let fields = map(&[("<abn>", "  ")]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:t>keep</w:t></w:r></w:p>\
             <w:p><w:r><w:t>&lt;abn&gt;</w:t></w:r></w:p>\
             <w:p><w:r><w:t>keep too</w:t></w:r></w:p></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        assert_eq!(counts.pruned, 1);
        assert_eq!(counts.paras_changed, 1);
        assert!(counts.any_change());
        assert_eq!(body_paragraph_count(&tree), 2);
    }

    #[test]
    fn test_token_free_empty_paragraph_kept() {
        let fields = map(&[]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:t>   </w:t></w:r></w:p><w:p/></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        assert_eq!(counts.pruned, 0);
        assert_eq!(body_paragraph_count(&tree), 2);
    }

    #[test]
    fn test_unknown_token_paragraph_pruned_and_reported() {
        let fields = map(&[]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:t>&lt;mystery&gt;</w:t></w:r></w:p></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        // A token nobody defined still goes into the report, and the
        // paragraph holding nothing else is removed.
        assert_eq!(counts.pruned, 1);
        assert!(counts.unresolved.contains("<mystery>"));
        assert_eq!(body_paragraph_count(&tree), 0);
    }

    #[test]
    fn test_unknown_token_prunes_despite_label_text() {
        let fields = map(&[]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:t>Fax: &lt;fax number&gt;</w:t></w:r></w:p></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        assert_eq!(counts.pruned, 1);
        assert_eq!(body_paragraph_count(&tree), 0);
    }

    #[test]
    fn test_neighbor_image_protects() {
        let fields = map(&[("<abn>", "")]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:drawing/></w:r></w:p>\
             <w:p><w:r><w:t>&lt;abn&gt;</w:t></w:r></w:p></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        assert_eq!(counts.pruned, 0);
        assert_eq!(body_paragraph_count(&tree), 2);
        // Token still resolved away even though the slot survives.
        let second = tree.descendants_named(content_root(&tree), "w:p")[1];
        assert_eq!(paragraph_text(&tree, second), "");
    }

    #[test]
    fn test_ancestor_image_protects_cell_paragraph() {
        let fields = map(&[("<abn>", "")]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:tbl><w:tr><w:tc>\
             <w:p><w:r><w:drawing/></w:r></w:p>\
             <w:p/>\
             <w:p/>\
             <w:p><w:r><w:t>&lt;abn&gt;</w:t></w:r></w:p>\
             </w:tc></w:tr></w:tbl></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        assert_eq!(counts.pruned, 0);
        assert_eq!(body_paragraph_count(&tree), 4);
    }

    #[test]
    fn test_logo_paragraph_resolved_but_kept() {
        let fields = map(&[]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:t>&lt;logo&gt;</w:t></w:r></w:p></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        assert_eq!(counts.logo_hits, 1);
        assert_eq!(counts.pruned, 0);
        assert_eq!(counts.paras_changed, 1);
        assert_eq!(body_paragraph_count(&tree), 1);
        let paragraph = tree.descendants_named(content_root(&tree), "w:p")[0];
        assert_eq!(paragraph_text(&tree, paragraph), "");
    }

    #[test]
    fn test_dry_run_counts_without_detaching() {
        let fields = map(&[("<abn>", "")]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:t>&lt;abn&gt;</w:t></w:r></w:p></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, true);
        assert_eq!(counts.pruned, 1);
        assert_eq!(body_paragraph_count(&tree), 1);
    }

    #[test]
    fn test_mixed_values_do_not_prune() {
        let fields = map(&[("<abn>", ""), ("<name>", "Acme")]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:body><w:p><w:r><w:t>&lt;abn&gt; &lt;name&gt;</w:t></w:r></w:p></w:body>",
        )
        .unwrap();
        let counts = structural_body_pass(&resolver, &mut tree, false);
        assert_eq!(counts.pruned, 0);
        let paragraph = tree.descendants_named(content_root(&tree), "w:p")[0];
        assert_eq!(paragraph_text(&tree, paragraph), " Acme");
    }

    #[test]
    fn test_header_pass_resolves_shape_text() {
        let fields = map(&[("<company name>", "Acme")]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:hdr><w:p><w:r><w:t>for &lt;company name&gt;</w:t></w:r></w:p>\
             <w:p><w:r><w:drawing><a:p><a:r><a:t>&lt;company name&gt; dept</a:t></a:r></a:p></w:drawing></w:r></w:p></w:hdr>",
        )
        .unwrap();
        let counts = structural_header_footer_pass(&resolver, &mut tree);
        assert_eq!(counts.paras_changed, 2);
        assert_eq!(counts.pruned, 0);
        let serialized = tree.serialize_node(tree.root()).unwrap();
        assert!(serialized.contains("for Acme"));
        assert!(serialized.contains("Acme dept"));
    }

    #[test]
    fn test_header_pass_never_prunes() {
        let fields = map(&[("<abn>", "")]);
        let resolver = Resolver::new(&fields);
        let mut tree = XmlTree::parse_str(
            "<w:hdr><w:p><w:r><w:t>&lt;abn&gt;</w:t></w:r></w:p></w:hdr>",
        )
        .unwrap();
        let counts = structural_header_footer_pass(&resolver, &mut tree);
        assert_eq!(counts.pruned, 0);
        assert_eq!(tree.descendants_named(tree.root(), "w:p").len(), 1);
    }
}
