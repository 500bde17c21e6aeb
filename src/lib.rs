//! Scaffold is a server-side markup templating engine.
//! It loads XML/HTML-like sources, expands `k:`-prefixed directive elements,
//! substitutes `{name}`/`{name:default}` placeholders and serializes the
//! resulting tree with format-aware escaping.

/// Process-wide cache resolving template sources (files or literal markup)
pub mod cache;

/// Command-line interface module for the Scaffold binary
pub mod cli;

/// Variables files and output configuration
/// Supports JSON and YAML variables files
pub mod config;

/// Reserved names shared across the engine
pub mod constants;

/// Arena-backed document tree
pub mod dom;

/// Error types and handling for Scaffold
pub mod error;

/// Directive contract, registry and built-in directives:
/// - block
/// - include
/// - require
/// - script
/// - style
pub mod feature;

/// Logger bootstrap for the binary
pub mod logger;

/// Markup parsing into document trees
pub mod parser;

/// Placeholder syntax, key validation and bindings
pub mod placeholder;

/// Tree serialization with html, xhtml and xml output rules
pub mod serializer;

/// Template loading, preparation and rendering
pub mod template;

pub use error::{Error, Result};
pub use feature::{Directive, FeatureRegistry};
pub use placeholder::Binding;
pub use serializer::{CommentPolicy, OutputFormat, SerializeOptions};
pub use template::{Engine, State, Template};
