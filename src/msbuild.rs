//! In-memory MSBuild build-file tree.
//!
//! A build file (`.csproj`, `.vbproj`, …) is held as an arena of element and
//! text nodes addressed by [`NodeId`] handles.  Handles stay valid for the
//! lifetime of the tree, including across [`BuildTree::detach`]: a detached
//! node simply has no parent until it is re-inserted.
//!
//! Parsing goes through [`roxmltree`]; serialization through [`quick_xml`]
//! with two-space indentation and a `utf-8` XML declaration.  Comments and
//! processing instructions are not retained.

use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
//  Well-known names
// ═══════════════════════════════════════════════════════════════════════════════

pub const PROJECT: &str = "Project";
pub const PROPERTY_GROUP: &str = "PropertyGroup";
pub const ITEM_GROUP: &str = "ItemGroup";
pub const PACKAGE_REFERENCE: &str = "PackageReference";
pub const PROJECT_REFERENCE: &str = "ProjectReference";
pub const FRAMEWORK_REFERENCE: &str = "FrameworkReference";
pub const EMBEDDED_RESOURCE: &str = "EmbeddedResource";
pub const LINK: &str = "Link";

pub const INCLUDE: &str = "Include";
pub const UPDATE: &str = "Update";
pub const REMOVE: &str = "Remove";

// ═══════════════════════════════════════════════════════════════════════════════
//  Arena
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable handle to a node of a [`BuildTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element { name: String, attributes: Vec<Attribute> },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct BuildTree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl BuildTree {
    /// Create a tree holding a single root element.
    pub fn new(root_name: &str) -> Self {
        let mut tree = Self { nodes: Vec::new(), root: NodeId(0) };
        tree.root = tree.create_element(root_name);
        tree
    }

    /// Parse a build file from its XML source.  `path` only labels errors.
    pub fn parse(source: &str, path: impl AsRef<Path>) -> Result<Self> {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        let doc = roxmltree::Document::parse(source)
            .map_err(|e| Error::xml(&path, e.to_string()))?;
        let root_node = doc.root_element();

        let mut tree = Self::new(root_node.tag_name().name());
        let root = tree.root;

        // Namespace declarations are not attributes in roxmltree; restore the
        // ones declared on the root so `xmlns="…"` survives a round trip.
        for ns in root_node.namespaces() {
            if ns.name() == Some("xml") {
                continue;
            }
            let name = match ns.name() {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            tree.set_attribute(root, &name, ns.uri());
        }
        for attr in root_node.attributes() {
            tree.set_attribute(root, attr.name(), attr.value());
        }
        tree.import_children(root_node, root);

        Ok(tree)
    }

    /// Load and parse a build file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&source, path)
    }

    fn import_children(&mut self, from: roxmltree::Node, to: NodeId) {
        for child in from.children() {
            if child.is_element() {
                let id = self.create_element(child.tag_name().name());
                for attr in child.attributes() {
                    self.set_attribute(id, attr.name(), attr.value());
                }
                self.append_child(to, id);
                self.import_children(child, id);
            } else if child.is_text() {
                let text = child.text().unwrap_or("");
                if !text.trim().is_empty() {
                    let id = self.push(NodeKind::Text(text.to_string()));
                    self.append_child(to, id);
                }
            }
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData { kind, parent: None, children: Vec::new() });
        id
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Element name, or `None` for a text node.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Direct element children named `name`, in document order.
    pub fn child_elements<'a>(&'a self, id: NodeId, name: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.name(c) == Some(name))
    }

    /// All attached elements named `name` below the root, in document order.
    pub fn descendants_named(&self, name: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if self.name(id) == Some(name) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev());
        }
        found
    }

    /// Content of a text node, `None` for elements.
    pub fn as_text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element { .. } => None,
        }
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self, id: NodeId) -> Option<String> {
        let parts: Vec<&str> = self
            .children(id)
            .iter()
            .filter_map(|&c| self.as_text(c))
            .collect();
        (!parts.is_empty()).then(|| parts.concat())
    }

    // ─── Mutation ────────────────────────────────────────────────────────

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element { name: name.to_string(), attributes: Vec::new() })
    }

    /// Set (or overwrite) an attribute, keeping its original position.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            match attributes.iter_mut().find(|a| a.name == name) {
                Some(attr) => attr.value = value.to_string(),
                None => attributes.push(Attribute { name: name.to_string(), value: value.to_string() }),
            }
        }
    }

    /// Append a text child.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let text_id = self.push(NodeKind::Text(text.to_string()));
        self.append_child(id, text_id);
    }

    /// Move `child` (detaching it first if needed) to the end of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Move `node` to become the next sibling of `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) -> Result<()> {
        self.detach(node);
        let parent = self
            .parent(anchor)
            .ok_or_else(|| Error::invariant("insertion anchor has no parent"))?;
        let siblings = &mut self.nodes[parent.0].children;
        let pos = siblings
            .iter()
            .position(|&s| s == anchor)
            .ok_or_else(|| Error::invariant("insertion anchor is not a child of its parent"))?;
        siblings.insert(pos + 1, node);
        self.nodes[node.0].parent = Some(parent);
        Ok(())
    }

    /// Remove `node` from its parent.  No-op for detached nodes.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    // ─── Serialization ───────────────────────────────────────────────────

    /// Serialize to indented UTF-8 XML with a declaration.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.write_node(&mut writer, self.root)?;

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| Error::xml("<build file>", e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => emit(writer, Event::Text(BytesText::new(text))),
            NodeKind::Element { name, attributes } => {
                let mut start = BytesStart::new(name.as_str());
                for attr in attributes {
                    start.push_attribute((attr.name.as_str(), attr.value.as_str()));
                }
                let children = self.children(id);
                if children.is_empty() {
                    return emit(writer, Event::Empty(start));
                }
                emit(writer, Event::Start(start))?;
                for &child in children {
                    self.write_node(writer, child)?;
                }
                emit(writer, Event::End(BytesEnd::new(name.as_str())))
            }
        }
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::xml("<build file>", e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
