use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use super::{Anchor, Block, DefaultDirective, Directive, Include, Require, Script, Style};

/// Builds a directive for an extracted element.
///
/// Constructors run outside the tree lock and may read the anchor freely.
pub type Constructor = Arc<dyn Fn(Anchor) -> Arc<dyn Directive> + Send + Sync>;

/// Wraps a closure as a [`Constructor`].
pub fn constructor<F>(build: F) -> Constructor
where
    F: Fn(Anchor) -> Arc<dyn Directive> + Send + Sync + 'static,
{
    Arc::new(build)
}

/// Maps directive names to constructors, with a fallback for unknown names.
///
/// Registrations only affect directives instantiated afterwards.
pub struct FeatureRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
    fallback: Constructor,
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        FeatureRegistry::with_builtins()
    }
}

impl FeatureRegistry {
    /// Creates a registry that knows no directive names at all.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
            fallback: constructor(|anchor| Arc::new(DefaultDirective::new(anchor))),
        }
    }

    /// Creates a registry with `block`, `include`, `require`, `script` and
    /// `style` registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_many([
            ("block", constructor(|anchor| Arc::new(Block::new(anchor)))),
            ("include", constructor(|anchor| Arc::new(Include::new(anchor)))),
            ("require", constructor(|anchor| Arc::new(Require::new(anchor)))),
            ("script", constructor(|anchor| Arc::new(Script::new(anchor)))),
            ("style", constructor(|anchor| Arc::new(Style::new(anchor)))),
        ]);
        registry
    }

    pub fn register<S, F>(&self, name: S, build: F)
    where
        S: Into<String>,
        F: Fn(Anchor) -> Arc<dyn Directive> + Send + Sync + 'static,
    {
        self.insert(name.into(), constructor(build));
    }

    pub fn register_many<I, S>(&self, constructors: I)
    where
        I: IntoIterator<Item = (S, Constructor)>,
        S: Into<String>,
    {
        for (name, build) in constructors {
            self.insert(name.into(), build);
        }
    }

    fn insert(&self, name: String, build: Constructor) {
        debug!("Registering directive '{}'", name);
        self.constructors.write().insert(name, build);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.read().contains_key(name)
    }

    /// Builds the directive registered under `name`, or the default
    /// directive when the name is unknown.
    pub fn instantiate(&self, name: &str, anchor: Anchor) -> Arc<dyn Directive> {
        let build = self
            .constructors
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback));
        build(anchor)
    }
}
