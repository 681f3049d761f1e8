//! Arena-backed mutable XML tree for WordprocessingML parts.
//!
//! Parts are parsed once into an arena of nodes addressed by stable
//! [`NodeId`]s. Detaching a node only edits its parent's child list, so a
//! pass can snapshot a list of ids up front, then mutate or delete without
//! invalidating anything it still holds. Namespace prefixes are kept
//! literal (`w:p`, `a:t`), which is how WordprocessingML is written in
//! practice.

use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// Stable handle to a node in an [`XmlTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<NodeId>,
        self_closing: bool,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// A parsed XML part held in an arena.
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<Node>,
    root: NodeId,
    has_decl: bool,
}

impl XmlTree {
    /// Parse an XML document or fragment.
    ///
    /// Exactly one root element is required. Text is stored unescaped;
    /// whitespace is kept verbatim because `w:t` content is significant.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(data);
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;
        let mut has_decl = false;
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                Error::XmlParse(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Eof => break,
                Event::Decl(_) => has_decl = true,
                Event::Start(e) => {
                    let id = read_element(&mut nodes, &e, false)?;
                    attach_parsed(&mut nodes, &stack, &mut root, id)?;
                    stack.push(id);
                }
                Event::Empty(e) => {
                    let id = read_element(&mut nodes, &e, true)?;
                    attach_parsed(&mut nodes, &stack, &mut root, id)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::XmlParse(e.to_string()))?
                        .into_owned();
                    if let Some(&parent) = stack.last() {
                        let id = alloc(&mut nodes, NodeKind::Text(text));
                        link(&mut nodes, parent, id);
                    } else if !text.trim().is_empty() {
                        return Err(Error::XmlParse("text outside root element".to_string()));
                    }
                }
                Event::CData(e) => {
                    if let Some(&parent) = stack.last() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        let id = alloc(&mut nodes, NodeKind::Text(text));
                        link(&mut nodes, parent, id);
                    }
                }
                Event::Comment(e) => {
                    if let Some(&parent) = stack.last() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        let id = alloc(&mut nodes, NodeKind::Comment(text));
                        link(&mut nodes, parent, id);
                    }
                }
                Event::PI(_) | Event::DocType(_) => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(Error::XmlParse("unclosed element".to_string()));
        }
        let root = root.ok_or_else(|| Error::XmlParse("no root element".to_string()))?;
        Ok(XmlTree {
            nodes,
            root,
            has_decl,
        })
    }

    /// Parse from a string slice.
    pub fn parse_str(data: &str) -> Result<Self> {
        Self::parse(data.as_bytes())
    }

    /// The root element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Serialize the whole tree, re-emitting the XML declaration when the
    /// source carried one.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        if self.has_decl {
            writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        }
        self.write_node(self.root, &mut writer)?;
        Ok(writer.into_inner().into_inner())
    }

    /// Serialize one subtree without a declaration.
    pub fn serialize_node(&self, id: NodeId) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write_node(id, &mut writer)?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| Error::XmlParse(e.to_string()))
    }

    fn write_node<W: std::io::Write>(&self, id: NodeId, writer: &mut Writer<W>) -> Result<()> {
        match &self.nodes[id.0].kind {
            NodeKind::Element {
                name,
                attrs,
                children,
                self_closing,
            } => {
                let mut start = BytesStart::new(name.as_str());
                for (key, value) in attrs {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if children.is_empty() && *self_closing {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for &child in children {
                        self.write_node(child, writer)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            NodeKind::Text(text) => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            NodeKind::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?;
            }
        }
        Ok(())
    }

    /// Element name, or `""` for text and comment nodes.
    pub fn name(&self, id: NodeId) -> &str {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => name,
            _ => "",
        }
    }

    /// Whether the node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Child ids in document order (empty for non-elements).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { children, .. } => children,
            _ => &[],
        }
    }

    /// Parent id, if the node is attached.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Iterator over ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            current: self.nodes[id.0].parent,
        }
    }

    /// Attribute value by key.
    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Set (or replace) an attribute.
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(entry) = attrs.iter_mut().find(|(k, _)| k == key) {
                entry.1 = value.to_string();
            } else {
                attrs.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attr(&mut self, id: NodeId, key: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            attrs.retain(|(k, _)| k != key);
        }
    }

    /// Payload of a text node.
    pub fn node_text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Concatenated direct text children of an element.
    pub fn element_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            if let Some(text) = self.node_text(child) {
                out.push_str(text);
            }
        }
        out
    }

    /// Replace all children of an element with a single text node
    /// (no node at all for empty text).
    pub fn set_element_text(&mut self, id: NodeId, text: &str) {
        let old: Vec<NodeId> = self.children(id).to_vec();
        for child in old {
            self.detach(child);
        }
        if !text.is_empty() {
            let node = alloc(&mut self.nodes, NodeKind::Text(text.to_string()));
            self.append_child(id, node);
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            match &self.nodes[node.0].kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element { children, .. } => {
                    stack.extend(children.iter().rev().copied());
                }
                NodeKind::Comment(_) => {}
            }
        }
        out
    }

    /// Snapshot of all descendant elements with the given name, in
    /// document order. The root itself is not included.
    pub fn descendants_named(&self, root: NodeId, name: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let NodeKind::Element {
                name: node_name,
                children,
                ..
            } = &self.nodes[id.0].kind
            {
                if node_name == name {
                    out.push(id);
                }
                stack.extend(children.iter().rev().copied());
            }
        }
        out
    }

    /// Like [`descendants_named`](Self::descendants_named), but never
    /// descends into elements named in `barriers`.
    pub fn descendants_named_guarded(
        &self,
        root: NodeId,
        name: &str,
        barriers: &[&str],
    ) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let NodeKind::Element {
                name: node_name,
                children,
                ..
            } = &self.nodes[id.0].kind
            {
                if barriers.iter().any(|b| b == node_name) {
                    continue;
                }
                if node_name == name {
                    out.push(id);
                }
                stack.extend(children.iter().rev().copied());
            }
        }
        out
    }

    /// First descendant element with the given name, document order.
    pub fn find_descendant(&self, root: NodeId, name: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let NodeKind::Element {
                name: node_name,
                children,
                ..
            } = &self.nodes[id.0].kind
            {
                if node_name == name {
                    return Some(id);
                }
                stack.extend(children.iter().rev().copied());
            }
        }
        None
    }

    /// First direct child element with the given name.
    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.name(c) == name)
    }

    /// Index of a node within its parent's child list.
    pub fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id.0].parent?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        alloc(
            &mut self.nodes,
            NodeKind::Element {
                name: name.to_string(),
                attrs: Vec::new(),
                children: Vec::new(),
                self_closing: true,
            },
        )
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        alloc(&mut self.nodes, NodeKind::Text(text.to_string()))
    }

    /// Append a child, detaching it from any previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        if let NodeKind::Element { children, .. } = &mut self.nodes[parent.0].kind {
            children.push(child);
        }
    }

    /// Insert a child at the given index of the parent's child list.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        if let NodeKind::Element { children, .. } = &mut self.nodes[parent.0].kind {
            let index = index.min(children.len());
            children.insert(index, child);
        }
    }

    /// Remove a node from its parent's child list. The id stays valid but
    /// the node no longer serializes.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            if let NodeKind::Element { children, .. } = &mut self.nodes[parent.0].kind {
                children.retain(|&c| c != id);
            }
        }
    }

    /// Deep-copy a subtree within this arena; returns the detached copy.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.0].kind.clone();
        match kind {
            NodeKind::Element {
                name,
                attrs,
                children,
                self_closing,
            } => {
                let copy = alloc(
                    &mut self.nodes,
                    NodeKind::Element {
                        name,
                        attrs,
                        children: Vec::new(),
                        self_closing,
                    },
                );
                for child in children {
                    let child_copy = self.clone_subtree(child);
                    self.append_child(copy, child_copy);
                }
                copy
            }
            other => alloc(&mut self.nodes, other),
        }
    }

    /// Deep-copy a subtree from another tree into this arena; returns the
    /// detached copy.
    pub fn import_tree(&mut self, other: &XmlTree, other_id: NodeId) -> NodeId {
        match &other.nodes[other_id.0].kind {
            NodeKind::Element {
                name,
                attrs,
                children,
                self_closing,
            } => {
                let copy = alloc(
                    &mut self.nodes,
                    NodeKind::Element {
                        name: name.clone(),
                        attrs: attrs.clone(),
                        children: Vec::new(),
                        self_closing: *self_closing,
                    },
                );
                let child_ids: Vec<NodeId> = children.clone();
                for child in child_ids {
                    let child_copy = self.import_tree(other, child);
                    self.append_child(copy, child_copy);
                }
                copy
            }
            other_kind => alloc(&mut self.nodes, other_kind.clone()),
        }
    }
}

/// Iterator over a node's ancestors, nearest first.
pub struct Ancestors<'a> {
    tree: &'a XmlTree,
    current: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.current?;
        self.current = self.tree.nodes[id.0].parent;
        Some(id)
    }
}

fn alloc(nodes: &mut Vec<Node>, kind: NodeKind) -> NodeId {
    nodes.push(Node { parent: None, kind });
    NodeId(nodes.len() - 1)
}

fn link(nodes: &mut [Node], parent: NodeId, child: NodeId) {
    nodes[child.0].parent = Some(parent);
    if let NodeKind::Element { children, .. } = &mut nodes[parent.0].kind {
        children.push(child);
    }
}

fn read_element(nodes: &mut Vec<Node>, start: &BytesStart<'_>, self_closing: bool) -> Result<NodeId> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::XmlParse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::XmlParse(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(alloc(
        nodes,
        NodeKind::Element {
            name,
            attrs,
            children: Vec::new(),
            self_closing,
        },
    ))
}

fn attach_parsed(
    nodes: &mut [Node],
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    id: NodeId,
) -> Result<()> {
    if let Some(&parent) = stack.last() {
        link(nodes, parent, id);
    } else if root.is_some() {
        return Err(Error::XmlParse("multiple root elements".to_string()));
    } else {
        *root = Some(id);
    }
    Ok(())
}
