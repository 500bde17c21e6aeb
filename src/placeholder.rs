//! Placeholder syntax and bindings.
//!
//! A placeholder is `{key}` or `{key:default}`. The key runs up to the first
//! `:` or `}`, the default up to the first `}`. Spans that do not match stay
//! literal text.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::dom::Document;
use crate::template::Template;

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z_][a-z0-9_]*$").expect("invalid key regex"));

static TEXT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([^:}]+)(?::([^}]+))?\}$").expect("invalid placeholder regex"));

static ATTRIBUTE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^:}]+)(?::([^}]+))?\}").expect("invalid placeholder regex"));

/// Whether `key` may be bound with `assign`.
pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN.is_match(key)
}

/// A parsed `{key:default}` span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub key: String,
    pub default: Option<String>,
}

impl Placeholder {
    fn from_captures(captures: &regex::Captures<'_>) -> Self {
        Self {
            key: captures[1].to_string(),
            default: captures.get(2).map(|m| m.as_str().to_string()),
        }
    }
}

/// A piece of a text node: literal text or a placeholder to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Placeholder(Placeholder),
}

/// Splits text node content into literal and placeholder segments.
///
/// Each span runs from a `{` to the next `}`, left to right. A `{` with no
/// closing brace after it ends the scan.
pub fn split_text(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
            break;
        };
        match TEXT_SPAN.captures(&rest[open..=close]) {
            Some(captures) => {
                literal.push_str(&rest[..open]);
                if !literal.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(Placeholder::from_captures(&captures)));
            }
            None => literal.push_str(&rest[..=close]),
        }
        rest = &rest[close + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }
    segments
}

/// Every placeholder in an attribute value, with its byte range.
pub fn attribute_placeholders(value: &str) -> Vec<(Range<usize>, Placeholder)> {
    ATTRIBUTE_SPAN
        .captures_iter(value)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            Some((whole.range(), Placeholder::from_captures(&captures)))
        })
        .collect()
}

/// Called with the key and the inline default of the placeholder.
pub type Resolver = Arc<dyn Fn(&str, Option<&str>) -> String + Send + Sync>;

/// What a placeholder key is bound to.
#[derive(Clone)]
pub enum Binding {
    /// Inserted verbatim
    Literal(String),
    /// Strings and numbers verbatim, anything else tagged with its type
    Value(Value),
    Resolver(Resolver),
    /// Spliced in as the template's rendered tree
    Template(Template),
}

impl Binding {
    pub fn resolver<F>(resolve: F) -> Self
    where
        F: Fn(&str, Option<&str>) -> String + Send + Sync + 'static,
    {
        Binding::Resolver(Arc::new(resolve))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Binding::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Binding::Resolver(_) => f.write_str("Resolver(..)"),
            Binding::Template(_) => f.write_str("Template(..)"),
        }
    }
}

impl From<&str> for Binding {
    fn from(value: &str) -> Self {
        Binding::Literal(value.to_string())
    }
}

impl From<String> for Binding {
    fn from(value: String) -> Self {
        Binding::Literal(value)
    }
}

impl From<&String> for Binding {
    fn from(value: &String) -> Self {
        Binding::Literal(value.clone())
    }
}

macro_rules! literal_binding {
    ($($number:ty),*) => {
        $(
            impl From<$number> for Binding {
                fn from(value: $number) -> Self {
                    Binding::Literal(value.to_string())
                }
            }
        )*
    };
}

literal_binding!(i32, i64, u32, u64, usize, f64);

impl From<bool> for Binding {
    fn from(value: bool) -> Self {
        Binding::Value(Value::Bool(value))
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Value(value)
    }
}

impl From<Template> for Binding {
    fn from(template: Template) -> Self {
        Binding::Template(template)
    }
}

impl From<&Template> for Binding {
    fn from(template: &Template) -> Self {
        Binding::Template(template.clone())
    }
}

/// A resolved placeholder.
#[derive(Debug, Clone)]
pub enum Resolved {
    Text(String),
    Tree(Document),
}

/// Text for a bound JSON value. Strings and numbers are used as they are;
/// other values are prefixed with their type so they stand out in output.
pub fn value_text(value: &Value) -> String {
    let kind = match value {
        Value::String(text) => return text.clone(),
        Value::Number(number) => return number.to_string(),
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    format!("({kind}){value}")
}
