//! Arena-backed document tree.
//!
//! Nodes live in a flat vector and refer to each other through [`NodeId`]
//! indices, so a detached node keeps its data (a removed directive can still
//! answer attribute queries) until the whole [`Document`] is dropped. A node
//! belongs to exactly one document; moving structure between documents goes
//! through [`Document::adopt`], which deep-copies into the receiving arena.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to a template's tree. Every mutation takes the lock, which
/// gives each tree a single writer even while directive hooks run together.
pub type Tree = Arc<Mutex<Document>>;

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written in the source (`k:block`, `div`)
    pub name: String,
    /// Attributes in source order
    pub attributes: Vec<Attribute>,
}

impl Element {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// The namespace prefix of the qualified name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// The name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }

    /// Sets an attribute, keeping its position when it already exists.
    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|attribute| attribute.name == name) {
            Some(attribute) => attribute.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentType {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub internal_subset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Fragment,
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    DocumentType(DocumentType),
    EntityReference(String),
    Notation(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An ordered tree of typed nodes rooted at a document (or fragment) node.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::with_root(NodeKind::Document)
    }

    fn with_root(kind: NodeKind) -> Self {
        Self {
            nodes: vec![Node {
                kind,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.kind_mut(id) {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Qualified element name, `None` for any other node kind.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// The first element directly under the root.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|child| self.element(*child).is_some())
    }

    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element<S: Into<String>>(&mut self, name: S) -> NodeId {
        self.create(NodeKind::Element(Element::new(name)))
    }

    pub fn create_text<S: Into<String>>(&mut self, text: S) -> NodeId {
        self.create(NodeKind::Text(text.into()))
    }

    pub fn create_comment<S: Into<String>>(&mut self, text: S) -> NodeId {
        self.create(NodeKind::Comment(text.into()))
    }

    /// Appends `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Inserts `child` right before `reference` in the reference's parent.
    /// Returns false (and leaves the tree untouched) when `reference` is
    /// detached.
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) -> bool {
        if reference == child {
            return false;
        }
        let Some(parent) = self.parent(reference) else {
            return false;
        };
        self.detach(child);
        let siblings = &mut self.nodes[parent.0].children;
        let position = siblings
            .iter()
            .position(|sibling| *sibling == reference)
            .unwrap_or(siblings.len());
        siblings.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
        true
    }

    /// Removes `id` from its parent. Detaching a detached node is a no-op.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    /// Whether `id` is still reachable from the root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        id == self.root() || self.ancestors(id).any(|ancestor| ancestor == self.root())
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// All nodes below `id` in document order (pre-order), `id` excluded.
    ///
    /// The result is a snapshot: callers may mutate the tree while walking it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        result
    }

    /// Snapshot of every node in the document matching `predicate`, in
    /// document order.
    pub fn select<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.descendants(self.root())
            .into_iter()
            .filter(|id| predicate(self, *id))
            .collect()
    }

    /// Whether any ancestor element of `id` satisfies `predicate`.
    pub fn has_ancestor_element<F>(&self, id: NodeId, predicate: F) -> bool
    where
        F: Fn(&Element) -> bool,
    {
        self.ancestors(id)
            .filter_map(|ancestor| self.element(ancestor))
            .any(predicate)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.get(name))
    }

    pub fn set_attribute<N: Into<String>, V: Into<String>>(&mut self, id: NodeId, name: N, value: V) {
        if let Some(element) = self.element_mut(id) {
            element.set(name, value);
        }
    }

    pub fn attributes(&self, id: NodeId) -> IndexMap<String, String> {
        self.element(id)
            .map(|element| {
                element
                    .attributes
                    .iter()
                    .map(|attribute| (attribute.name.clone(), attribute.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deep-copies `node` (and everything below it) out of `source` into this
    /// document. The copy is detached; insert it where it belongs.
    pub fn adopt(&mut self, source: &Document, node: NodeId) -> NodeId {
        let copy = self.create(source.kind(node).clone());
        for child in source.children(node) {
            let adopted = self.adopt(source, *child);
            self.append_child(copy, adopted);
        }
        copy
    }

    /// Replaces `element` by its own children, in place.
    pub fn unwrap_element(&mut self, element: NodeId) {
        let children = self.children(element).to_vec();
        match self.parent(element) {
            Some(_) => {
                for child in children {
                    self.insert_before(element, child);
                }
            }
            None => {
                for child in children {
                    self.detach(child);
                }
            }
        }
        self.detach(element);
    }

    /// Merges adjacent text nodes and drops empty ones below `id`.
    pub fn normalize(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        let mut previous_text: Option<NodeId> = None;
        for child in children {
            let text = match self.kind(child) {
                NodeKind::Text(text) => Some(text.clone()),
                _ => None,
            };
            match (text, previous_text) {
                (Some(text), _) if text.is_empty() => self.detach(child),
                (Some(text), Some(previous)) => {
                    if let NodeKind::Text(existing) = self.kind_mut(previous) {
                        existing.push_str(&text);
                    }
                    self.detach(child);
                }
                (Some(_), None) => previous_text = Some(child),
                (None, _) => {
                    previous_text = None;
                    self.normalize(child);
                }
            }
        }
    }
}
