//! Directives: the `k:`-prefixed elements that drive template processing.
//!
//! Every directive is bound to one element of its template's tree (its
//! [`Anchor`]) and takes part in two lifecycle hooks. `prepare` runs while
//! the template is being built and may insert markup, including new
//! directives, which the template picks up on its next extraction pass.
//! `render` runs once placeholders are substituted; whatever it inserts is
//! final. Afterwards every directive removes its anchor from the tree.

use std::any::Any;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use indexmap::IndexMap;

use crate::dom::{Document, NodeId, NodeKind, Tree};
use crate::error::Result;
use crate::template::Template;

pub mod block;
pub mod include;
pub mod registry;
pub mod require;
pub mod script;
pub mod style;

pub use block::Block;
pub use include::Include;
pub use registry::{Constructor, FeatureRegistry};
pub use require::Require;
pub use script::Script;
pub use style::Style;

/// The element a directive is bound to, together with what was captured
/// from it at extraction time.
pub struct Anchor {
    tree: Tree,
    node: NodeId,
    name: String,
    value: String,
}

impl Anchor {
    /// Binds to `node`, capturing its lower-cased local name and the text of
    /// its direct character-data children.
    pub fn capture(document: &Document, tree: Tree, node: NodeId) -> Self {
        let name = document
            .element(node)
            .map(|element| element.local_name().to_lowercase())
            .unwrap_or_default();
        let value = document
            .children(node)
            .iter()
            .filter_map(|child| match document.kind(*child) {
                NodeKind::Text(text) | NodeKind::CData(text) | NodeKind::Comment(text) => {
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect();

        Self {
            tree,
            node,
            name,
            value,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn attributes(&self) -> IndexMap<String, String> {
        self.tree.lock().attributes(self.node)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.tree.lock().attribute(self.node, name).map(str::to_string)
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.tree.lock().set_attribute(self.node, name, value);
    }

    /// Inserts a new element right before the anchor.
    pub fn insert_element(&self, name: &str, attributes: &[(&str, &str)], text: Option<&str>) {
        let mut document = self.tree.lock();
        let element = document.create_element(name);
        for (attribute, value) in attributes {
            document.set_attribute(element, *attribute, *value);
        }
        if let Some(text) = text {
            let text = document.create_text(text);
            document.append_child(element, text);
        }
        document.insert_before(self.node, element);
    }

    /// Removes the anchor from its parent, if it still has one.
    pub fn detach(&self) {
        self.tree.lock().detach(self.node);
    }
}

/// Behaviour shared by all directives.
///
/// Implementors provide [`Directive::anchor`] and [`Directive::as_any`] and
/// override the hooks they need; everything else has a working default.
pub trait Directive: Send + Sync + 'static {
    fn anchor(&self) -> &Anchor;

    /// Gives access to the concrete type, e.g. to reach [`Block::duplicate`].
    fn as_any(&self) -> &dyn Any;

    fn name(&self) -> &str {
        self.anchor().name()
    }

    fn attributes(&self) -> IndexMap<String, String> {
        self.anchor().attributes()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.anchor().attribute(name)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.anchor().set_attribute(name, value);
    }

    /// Text content of the element as it was when the directive was created.
    fn value(&self) -> &str {
        self.anchor().value()
    }

    fn node(&self) -> NodeId {
        self.anchor().node()
    }

    fn dom(&self) -> &Tree {
        self.anchor().tree()
    }

    /// Removes the anchor element from the tree. Safe to call repeatedly.
    fn clean(&self) {
        self.anchor().detach();
    }

    fn prepare<'a>(&'a self, _template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn render<'a>(&'a self, _template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async { Ok(()) }.boxed()
    }
}

/// Directive used for any name without a registered constructor. It does
/// nothing beyond removing itself on cleanup.
pub struct DefaultDirective {
    anchor: Anchor,
}

impl DefaultDirective {
    pub fn new(anchor: Anchor) -> Self {
        Self { anchor }
    }
}

impl Directive for DefaultDirective {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
