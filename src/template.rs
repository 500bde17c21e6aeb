//! Template loading, preparation and rendering.
//!
//! A [`Template`] owns one tree. Loading resolves the source through the
//! engine's cache, wraps and parses it, then extracts and prepares directives
//! until a pass finds nothing new. Rendering substitutes placeholders, runs
//! every directive's render hook, removes the directives and unwraps the
//! synthetic root before serializing.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use indexmap::IndexMap;
use log::{debug, warn};
use parking_lot::Mutex;
use regex::Regex;

use crate::cache::ResourceCache;
use crate::constants::{
    DEFAULT_KEY, DIRECTIVE_NAMESPACE, DIRECTIVE_PREFIX, EXTRACTED_ATTRIBUTE, WRAPPER_TAG,
};
use crate::dom::{Document, NodeId, NodeKind, Tree};
use crate::error::{Error, Result};
use crate::feature::{Anchor, Block, Directive, FeatureRegistry};
use crate::parser::parse;
use crate::placeholder::{
    attribute_placeholders, is_valid_key, split_text, value_text, Binding, Resolved, Segment,
};
use crate::serializer::{serialize, SerializeOptions};

static XML_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<\?xml\s[^>]*\?>").expect("invalid declaration regex"));

static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*<!DOCTYPE[^>]*>").expect("invalid doctype regex"));

/// Shared services for templates: the source cache, the directive registry
/// and the default serialization options. Cloning is cheap and clones share
/// the cache and registry.
#[derive(Clone)]
pub struct Engine {
    cache: ResourceCache,
    registry: Arc<FeatureRegistry>,
    options: SerializeOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    /// Creates an engine with a fresh cache and the built-in directives.
    pub fn new() -> Self {
        Self::with_parts(ResourceCache::new(), Arc::new(FeatureRegistry::with_builtins()))
    }

    pub fn with_parts(cache: ResourceCache, registry: Arc<FeatureRegistry>) -> Self {
        Self {
            cache,
            registry,
            options: SerializeOptions::default(),
        }
    }

    /// Replaces the options [`Template::render`] serializes with.
    pub fn with_options(mut self, options: SerializeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn options(&self) -> &SerializeOptions {
        &self.options
    }

    /// Loads a template from a markup file path or from literal markup.
    ///
    /// # Errors
    /// * `Error::XmlError` if the markup cannot be parsed
    /// * any error raised by a directive's prepare hook
    pub async fn template(&self, source: &str) -> Result<Template> {
        Template::load(self, source, None).await
    }
}

/// Lifecycle of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Loading,
    Preparing,
    Ready,
    Rendering,
    Rendered,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Loading => "loading",
            State::Preparing => "preparing",
            State::Ready => "ready",
            State::Rendering => "rendering",
            State::Rendered => "rendered",
        };
        f.write_str(name)
    }
}

struct Registered {
    name: String,
    directive: Arc<dyn Directive>,
}

struct TemplateInner {
    engine: Engine,
    tree: Tree,
    state: Mutex<State>,
    features: Mutex<Vec<Registered>>,
    bindings: Mutex<IndexMap<String, Binding>>,
    children: Mutex<Vec<Template>>,
    passes: AtomicUsize,
}

/// A loaded template. Clones are handles to the same template.
#[derive(Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("state", &self.state())
            .field("features", &self.inner.features.lock().len())
            .field("children", &self.inner.children.lock().len())
            .finish()
    }
}

/// Moves a leading xml declaration and doctype out of the way and wraps the
/// rest in the synthetic root that declares the directive namespace.
pub fn wrap_source(source: &str) -> String {
    let (declaration, rest) = split_leading(&XML_DECLARATION, source);
    let (doctype, rest) = split_leading(&DOCTYPE, rest);
    format!(
        r#"{declaration}{doctype}<{WRAPPER_TAG} xmlns:{DIRECTIVE_PREFIX}="{DIRECTIVE_NAMESPACE}">{rest}</{WRAPPER_TAG}>"#
    )
}

fn split_leading<'a>(pattern: &Regex, source: &'a str) -> (&'a str, &'a str) {
    match pattern.find(source) {
        Some(found) => (found.as_str().trim_start(), &source[found.end()..]),
        None => ("", source),
    }
}

/// Whether `id` is a directive element that still has to be extracted: it
/// carries the directive prefix, sits inside no other directive element and
/// is not marked as extracted.
fn is_unprocessed(document: &Document, id: NodeId) -> bool {
    let Some(element) = document.element(id) else {
        return false;
    };
    element.prefix() == Some(DIRECTIVE_PREFIX)
        && element.get(EXTRACTED_ATTRIBUTE) != Some("true")
        && !document.has_ancestor_element(id, |ancestor| ancestor.prefix() == Some(DIRECTIVE_PREFIX))
}

fn is_script(name: &str) -> bool {
    name.eq_ignore_ascii_case("script")
}

impl Template {
    /// Loads `source` and prepares it until no unprocessed directive is
    /// left. When `parent` is given the new template becomes one of its
    /// children, so the parent's directive search can reach it.
    ///
    /// # Errors
    /// * `Error::XmlError` if the markup cannot be parsed
    /// * any error raised by a directive's prepare hook
    pub async fn load(engine: &Engine, source: &str, parent: Option<&Template>) -> Result<Template> {
        let text = engine.cache().load(source).await;
        let document = parse(&wrap_source(&text))?;

        let template = Template {
            inner: Arc::new(TemplateInner {
                engine: engine.clone(),
                tree: Arc::new(Mutex::new(document)),
                state: Mutex::new(State::Loading),
                features: Mutex::new(Vec::new()),
                bindings: Mutex::new(IndexMap::new()),
                children: Mutex::new(Vec::new()),
                passes: AtomicUsize::new(0),
            }),
        };

        template.set_state(State::Preparing);
        template.prepare().await?;
        template.set_state(State::Ready);

        if let Some(parent) = parent {
            parent.add_child(template.clone());
        }
        Ok(template)
    }

    async fn prepare(&self) -> Result<()> {
        loop {
            let batch = self.extract();
            if batch.is_empty() {
                break;
            }
            let pass = self.inner.passes.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("Preparation pass {} with {} directive(s)", pass, batch.len());
            try_join_all(batch.iter().map(|directive| directive.prepare(self))).await?;
        }
        Ok(())
    }

    /// Marks every unprocessed directive element as extracted, instantiates
    /// its directive and registers it. Returns the new directives.
    fn extract(&self) -> Vec<Arc<dyn Directive>> {
        let anchors: Vec<Anchor> = {
            let mut document = self.inner.tree.lock();
            let nodes = document.select(is_unprocessed);
            for node in &nodes {
                document.set_attribute(*node, EXTRACTED_ATTRIBUTE, "true");
            }
            nodes
                .into_iter()
                .map(|node| Anchor::capture(&document, Arc::clone(&self.inner.tree), node))
                .collect()
        };

        let registry = self.inner.engine.registry();
        let batch: Vec<Registered> = anchors
            .into_iter()
            .map(|anchor| {
                let name = anchor.name().to_string();
                let directive = registry.instantiate(&name, anchor);
                Registered { name, directive }
            })
            .collect();

        let directives = batch.iter().map(|entry| Arc::clone(&entry.directive)).collect();
        self.inner.features.lock().extend(batch);
        directives
    }

    /// Directives of this template matching `kind` (when given) and every
    /// attribute in `filter`, in registration order. With
    /// `include_children` the same query is run on every child template and
    /// appended; each template is visited once even when bindings form a
    /// cycle.
    pub fn features(
        &self,
        kind: Option<&str>,
        filter: &[(&str, &str)],
        include_children: bool,
    ) -> Vec<Arc<dyn Directive>> {
        let mut visited = Vec::new();
        let mut found = Vec::new();
        self.collect_features(kind, filter, include_children, &mut visited, &mut found);
        found
    }

    fn collect_features(
        &self,
        kind: Option<&str>,
        filter: &[(&str, &str)],
        include_children: bool,
        visited: &mut Vec<Template>,
        found: &mut Vec<Arc<dyn Directive>>,
    ) {
        if visited.iter().any(|seen| seen.is_same(self)) {
            return;
        }
        visited.push(self.clone());

        let candidates: Vec<(String, Arc<dyn Directive>)> = self
            .inner
            .features
            .lock()
            .iter()
            .filter(|entry| kind.map_or(true, |kind| kind == entry.name))
            .map(|entry| (entry.name.clone(), Arc::clone(&entry.directive)))
            .collect();

        found.extend(
            candidates
                .into_iter()
                .filter(|(_, directive)| {
                    filter
                        .iter()
                        .all(|(name, value)| directive.attribute(name).as_deref() == Some(*value))
                })
                .map(|(_, directive)| directive),
        );

        if include_children {
            for child in self.children() {
                child.collect_features(kind, filter, true, visited, found);
            }
        }
    }

    /// Creates a new instance of the block named `name`, or `None` when the
    /// template has no such block.
    ///
    /// # Errors
    /// * any error from loading the block instance
    pub async fn block(&self, name: &str) -> Result<Option<Template>> {
        let found = self.features(Some("block"), &[("name", name)], false);
        let Some(block) = found
            .iter()
            .find_map(|directive| directive.as_any().downcast_ref::<Block>())
        else {
            return Ok(None);
        };
        block.duplicate(self).await.map(Some)
    }

    /// Binds `key` for placeholder substitution. Keys that are not
    /// identifiers are reported and ignored. A bound template also becomes a
    /// child of this one.
    pub fn assign<K, V>(&self, key: K, value: V)
    where
        K: AsRef<str>,
        V: Into<Binding>,
    {
        let key = key.as_ref();
        if !is_valid_key(key) {
            warn!("Ignoring binding for invalid key '{}'", key);
            return;
        }
        self.bind(key, value.into());
    }

    pub fn assign_all<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Binding>,
    {
        for (key, value) in pairs {
            self.assign(key, value);
        }
    }

    /// Binds the resolver used for every key without a binding of its own.
    pub fn assign_default<F>(&self, resolve: F)
    where
        F: Fn(&str, Option<&str>) -> String + Send + Sync + 'static,
    {
        self.bind(DEFAULT_KEY, Binding::resolver(resolve));
    }

    fn bind(&self, key: &str, binding: Binding) {
        if let Binding::Template(template) = &binding {
            self.add_child(template.clone());
        }
        self.inner.bindings.lock().insert(key.to_string(), binding);
    }

    /// A template is never its own child, and each child is kept once.
    fn add_child(&self, child: Template) {
        if child.is_same(self) {
            debug!("Not adding a template as its own child");
            return;
        }
        let mut children = self.inner.children.lock();
        if !children.iter().any(|existing| existing.is_same(&child)) {
            children.push(child);
        }
    }

    fn is_same(&self, other: &Template) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    async fn resolve(&self, key: &str, default: Option<&str>) -> Result<Resolved> {
        let (binding, fallback) = {
            let bindings = self.inner.bindings.lock();
            (bindings.get(key).cloned(), bindings.get(DEFAULT_KEY).cloned())
        };

        let resolved = match binding {
            Some(Binding::Literal(text)) => Resolved::Text(text),
            Some(Binding::Value(value)) => Resolved::Text(value_text(&value)),
            Some(Binding::Resolver(resolve)) => Resolved::Text(resolve(key, default)),
            Some(Binding::Template(template)) => Resolved::Tree(template.render_tree().await?),
            None => match fallback {
                Some(Binding::Resolver(resolve)) => Resolved::Text(resolve(key, default)),
                _ => Resolved::Text(default.unwrap_or_default().to_string()),
            },
        };
        Ok(resolved)
    }

    /// Replaces placeholders in text nodes and attribute values outside
    /// script content.
    async fn substitute(&self) -> Result<()> {
        let tree = &self.inner.tree;

        let texts = tree.lock().select(|document, id| {
            matches!(document.kind(id), NodeKind::Text(text) if text.contains('{') && text.contains('}'))
                && !document.has_ancestor_element(id, |element| is_script(&element.name))
        });
        for node in texts {
            let text = match tree.lock().kind(node) {
                NodeKind::Text(text) => text.clone(),
                _ => continue,
            };
            let segments = split_text(&text);
            if !segments.iter().any(|segment| matches!(segment, Segment::Placeholder(_))) {
                continue;
            }

            let mut parts = Vec::with_capacity(segments.len());
            for segment in segments {
                parts.push(match segment {
                    Segment::Text(text) => Resolved::Text(text),
                    Segment::Placeholder(placeholder) => {
                        self.resolve(&placeholder.key, placeholder.default.as_deref())
                            .await?
                    }
                });
            }

            let mut document = tree.lock();
            for part in parts {
                match part {
                    Resolved::Text(text) => {
                        let created = document.create_text(text);
                        document.insert_before(node, created);
                    }
                    Resolved::Tree(fragment) => {
                        for child in fragment.children(fragment.root()) {
                            let adopted = document.adopt(&fragment, *child);
                            document.insert_before(node, adopted);
                        }
                    }
                }
            }
            document.detach(node);
        }

        let attributes: Vec<(NodeId, String, String)> = {
            let document = tree.lock();
            document
                .select(|document, id| {
                    document
                        .element(id)
                        .is_some_and(|element| !is_script(&element.name))
                        && !document.has_ancestor_element(id, |element| is_script(&element.name))
                })
                .into_iter()
                .flat_map(|id| {
                    document
                        .attributes(id)
                        .into_iter()
                        .filter(|(_, value)| value.contains('{') && value.contains('}'))
                        .map(move |(name, value)| (id, name, value))
                })
                .collect()
        };
        for (node, name, value) in attributes {
            let mut result = String::with_capacity(value.len());
            let mut last = 0;
            for (range, placeholder) in attribute_placeholders(&value) {
                result.push_str(&value[last..range.start]);
                match self
                    .resolve(&placeholder.key, placeholder.default.as_deref())
                    .await?
                {
                    Resolved::Text(text) => result.push_str(&text),
                    Resolved::Tree(fragment) => {
                        result.push_str(&serialize(&fragment, self.inner.engine.options()))
                    }
                }
                last = range.end;
            }
            result.push_str(&value[last..]);
            tree.lock().set_attribute(node, name, result.trim());
        }
        Ok(())
    }

    /// Runs the render pipeline once. Rendered templates, and templates
    /// already rendering further up the call chain, are left as they are.
    async fn complete(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                State::Ready => *state = State::Rendering,
                State::Rendering | State::Rendered => return Ok(()),
                other => {
                    return Err(Error::TemplateError(format!(
                        "cannot render a template that is {other}"
                    )))
                }
            }
        }

        self.substitute().await?;

        let directives: Vec<Arc<dyn Directive>> = self
            .inner
            .features
            .lock()
            .iter()
            .map(|entry| Arc::clone(&entry.directive))
            .collect();
        for directive in &directives {
            directive.render(self).await?;
        }
        for directive in &directives {
            directive.clean();
        }

        {
            let mut document = self.inner.tree.lock();
            if let Some(wrapper) = document.document_element() {
                if document.name(wrapper) == Some(WRAPPER_TAG) {
                    document.unwrap_element(wrapper);
                }
            }
            let root = document.root();
            document.normalize(root);
        }

        self.set_state(State::Rendered);
        debug!("Rendered template with {} directive(s)", directives.len());
        Ok(())
    }

    /// Renders with the engine's serialization options.
    ///
    /// # Errors
    /// * any error raised by a render hook or a nested template
    pub async fn render(&self) -> Result<String> {
        let options = self.inner.engine.options().clone();
        self.render_with(&options).await
    }

    pub async fn render_with(&self, options: &SerializeOptions) -> Result<String> {
        self.complete().await?;
        let document = self.inner.tree.lock();
        Ok(serialize(&document, options))
    }

    /// Renders and returns a copy of the resulting tree instead of text.
    pub fn render_tree(&self) -> BoxFuture<'_, Result<Document>> {
        async move {
            self.complete().await?;
            let document = self.inner.tree.lock().clone();
            Ok(document)
        }
        .boxed()
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn state(&self) -> State {
        *self.inner.state.lock()
    }

    fn set_state(&self, state: State) {
        debug!("Template is {}", state);
        *self.inner.state.lock() = state;
    }

    /// Number of extraction passes that found at least one directive.
    pub fn passes(&self) -> usize {
        self.inner.passes.load(Ordering::SeqCst)
    }

    pub fn children(&self) -> Vec<Template> {
        self.inner.children.lock().clone()
    }

    pub fn tree(&self) -> &Tree {
        &self.inner.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_source_plain() {
        assert_eq!(
            wrap_source("<p>a</p><p>b</p>"),
            r#"<scaffold-root xmlns:k="/"><p>a</p><p>b</p></scaffold-root>"#
        );
    }

    #[test]
    fn test_wrap_source_hoists_doctype_and_declaration() {
        let wrapped = wrap_source("<?xml version=\"1.0\"?>\n<!DOCTYPE html>\n<html/>");
        assert_eq!(
            wrapped,
            "<?xml version=\"1.0\"?><!DOCTYPE html><scaffold-root xmlns:k=\"/\">\n<html/></scaffold-root>"
        );
    }

    #[test]
    fn test_is_unprocessed() {
        let document = parse(&wrap_source(
            r#"<k:block name="a"><k:require file="x.js"/></k:block><k:script extracted="true"/>"#,
        ))
        .unwrap();
        let found = document.select(is_unprocessed);
        assert_eq!(found.len(), 1);
        assert_eq!(document.name(found[0]), Some("k:block"));
    }

    #[test]
    fn test_is_script() {
        assert!(is_script("script"));
        assert!(is_script("SCRIPT"));
        assert!(!is_script("k:script"));
        assert!(!is_script("noscript"));
    }
}
