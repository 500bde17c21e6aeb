//! Format-aware tree serialization.
//!
//! The output format (html, xhtml or xml) is taken from the options when set,
//! otherwise detected from the first document type or processing instruction
//! met during the walk. Only html relaxes the output: value-less boolean
//! attributes, unquoted attribute values and `>`-terminated void elements.
//! Text is entity-encoded in every format, script and style content included.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;

use crate::dom::{Document, DocumentType, Element, NodeId, NodeKind};
use crate::parser::is_void_element;

static FORMAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)x?(?:ht)?ml").expect("invalid format regex"));

static UNQUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[^"'=><` ]+$"#).expect("invalid attribute value regex"));

/// A named reference such as `&nbsp;` at the start of the input
static NAMED_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&([A-Za-z][A-Za-z0-9]*);").expect("invalid named reference regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// Attributes written without a value in html output
const BOOLEAN_ATTRIBUTES: [&str; 16] = [
    "autofocus", "autoplay", "async", "checked", "controls", "defer", "disabled", "hidden",
    "loop", "multiple", "open", "readonly", "required", "scoped", "selected", "novalidate",
];

const PREDEFINED_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "quot", "apos"];

/// Elements whose text keeps its whitespace
const PRESERVE_WHITESPACE: [&str; 4] = ["pre", "script", "style", "textarea"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Html,
    Xhtml,
    Xml,
}

impl OutputFormat {
    pub fn is_html(self) -> bool {
        self == OutputFormat::Html
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Html => "html",
            OutputFormat::Xhtml => "xhtml",
            OutputFormat::Xml => "xml",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "xhtml" => Ok(OutputFormat::Xhtml),
            "xml" => Ok(OutputFormat::Xml),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Which comments survive serialization.
#[derive(Clone, Default)]
pub enum CommentPolicy {
    #[default]
    Strip,
    Keep,
    /// Keep the comments whose text the predicate accepts
    Filter(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl CommentPolicy {
    pub fn filter<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        CommentPolicy::Filter(Arc::new(predicate))
    }

    pub fn admits(&self, text: &str) -> bool {
        match self {
            CommentPolicy::Strip => false,
            CommentPolicy::Keep => true,
            CommentPolicy::Filter(predicate) => predicate(text),
        }
    }
}

impl From<bool> for CommentPolicy {
    fn from(keep: bool) -> Self {
        if keep {
            CommentPolicy::Keep
        } else {
            CommentPolicy::Strip
        }
    }
}

impl fmt::Debug for CommentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentPolicy::Strip => f.write_str("Strip"),
            CommentPolicy::Keep => f.write_str("Keep"),
            CommentPolicy::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    /// Keep whitespace runs in every text node, not only preformatted ones
    pub preserve_whitespace: bool,
    pub preserve_comments: CommentPolicy,
    /// Skips format detection when set
    pub format: Option<OutputFormat>,
}

/// Extracts the output format named in a doctype identifier or processing
/// instruction (`-//W3C//DTD XHTML 1.0 Strict//EN` gives xhtml).
pub fn detect_format(value: &str) -> Option<OutputFormat> {
    let found = FORMAT_PATTERN.find(value)?.as_str().to_ascii_lowercase();
    match found.as_str() {
        "html" => Some(OutputFormat::Html),
        "xhtml" => Some(OutputFormat::Xhtml),
        _ => Some(OutputFormat::Xml),
    }
}

/// Serializes a whole document.
pub fn serialize(document: &Document, options: &SerializeOptions) -> String {
    serialize_node(document, document.root(), options)
}

/// Serializes `node` and everything below it.
pub fn serialize_node(document: &Document, node: NodeId, options: &SerializeOptions) -> String {
    let mut serializer = Serializer {
        document,
        options,
        format: options.format,
        buffer: String::new(),
    };
    serializer.write(node);
    serializer.buffer
}

struct Serializer<'a> {
    document: &'a Document,
    options: &'a SerializeOptions,
    format: Option<OutputFormat>,
    buffer: String,
}

impl Serializer<'_> {
    fn is_html(&self) -> bool {
        self.format.is_some_and(OutputFormat::is_html)
    }

    fn detect(&mut self, value: &str) {
        if self.format.is_none() {
            self.format = detect_format(value);
        }
    }

    fn write(&mut self, id: NodeId) {
        let document = self.document;
        match document.kind(id) {
            NodeKind::Document | NodeKind::Fragment => self.write_children(id),
            NodeKind::Element(element) => self.write_element(id, element),
            NodeKind::Text(text) => self.write_text(id, text),
            NodeKind::CData(data) => {
                self.buffer.push_str("<![CDATA[");
                self.buffer.push_str(data);
                self.buffer.push_str("]]>");
            }
            NodeKind::Comment(text) => {
                if self.options.preserve_comments.admits(text) {
                    self.buffer.push_str("<!--");
                    self.buffer.push_str(text);
                    self.buffer.push_str("-->");
                }
            }
            NodeKind::DocumentType(doctype) => self.write_doctype(doctype),
            NodeKind::ProcessingInstruction { target, data } => {
                self.detect(if target.is_empty() { data } else { target });
                self.buffer.push_str("<?");
                self.buffer.push_str(target);
                if !data.is_empty() {
                    self.buffer.push(' ');
                    self.buffer.push_str(data);
                }
                self.buffer.push_str("?>");
            }
            NodeKind::EntityReference(name) => {
                self.buffer.push('&');
                self.buffer.push_str(name);
                self.buffer.push(';');
            }
            NodeKind::Notation(name) => {
                self.buffer.push_str("??");
                self.buffer.push_str(name);
            }
        }
    }

    fn write_children(&mut self, id: NodeId) {
        let document = self.document;
        for child in document.children(id) {
            self.write(*child);
        }
    }

    fn write_element(&mut self, id: NodeId, element: &Element) {
        self.buffer.push('<');
        self.buffer.push_str(&element.name);
        for attribute in &element.attributes {
            self.write_attribute(&attribute.name, &attribute.value);
        }

        if !self.document.children(id).is_empty() || !is_void_element(&element.name) {
            self.buffer.push('>');
            self.write_children(id);
            self.buffer.push_str("</");
            self.buffer.push_str(&element.name);
            self.buffer.push('>');
        } else if self.is_html() {
            self.buffer.push('>');
        } else {
            self.buffer.push_str("/>");
        }
    }

    fn write_attribute(&mut self, name: &str, value: &str) {
        let boolean = BOOLEAN_ATTRIBUTES.iter().any(|b| b.eq_ignore_ascii_case(name));
        self.buffer.push(' ');
        self.buffer.push_str(name);
        if boolean && self.is_html() {
            return;
        }

        let value = if boolean && value.is_empty() { name } else { value };
        let quote = if self.is_html() && UNQUOTED_VALUE.is_match(value) {
            None
        } else if value.contains('"') {
            Some('\'')
        } else {
            Some('"')
        };

        self.buffer.push('=');
        match quote {
            Some(quote) => {
                self.buffer.push(quote);
                self.buffer.push_str(&encode_attribute(value, &['&', '<', quote]));
                self.buffer.push(quote);
            }
            None => self.buffer.push_str(&encode_attribute(value, &['&', '<'])),
        }
    }

    fn write_text(&mut self, id: NodeId, text: &str) {
        let document = self.document;
        let parent = document
            .parent(id)
            .and_then(|parent| document.name(parent))
            .unwrap_or_default();
        let in_any = |names: &[&str]| names.iter().any(|name| name.eq_ignore_ascii_case(parent));

        let value = encode(text, &['<', '&']);

        if self.options.preserve_whitespace || in_any(&PRESERVE_WHITESPACE) {
            self.buffer.push_str(&value);
        } else {
            self.buffer.push_str(&WHITESPACE.replace_all(&value, " "));
        }
    }

    fn write_doctype(&mut self, doctype: &DocumentType) {
        let identifier = [&doctype.public_id, &doctype.system_id]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
            .unwrap_or(&doctype.name);
        self.detect(identifier);

        self.buffer.push_str("<!DOCTYPE ");
        self.buffer.push_str(&doctype.name);
        if let Some(public_id) = doctype.public_id.as_deref().filter(|id| !id.is_empty()) {
            self.buffer.push_str(" PUBLIC \"");
            self.buffer.push_str(public_id);
            self.buffer.push('"');
        }
        // "." stands for "no system identifier"
        if let Some(system_id) = doctype.system_id.as_deref().filter(|id| !id.is_empty() && *id != ".") {
            if doctype.public_id.as_deref().map_or(true, str::is_empty) {
                self.buffer.push_str(" SYSTEM");
            }
            self.buffer.push_str(" \"");
            self.buffer.push_str(system_id);
            self.buffer.push('"');
        }
        if let Some(subset) = doctype.internal_subset.as_deref().filter(|s| !s.is_empty()) {
            self.buffer.push_str(" [");
            self.buffer.push_str(subset);
            self.buffer.push(']');
        }
        self.buffer.push('>');
    }
}

/// Replaces every character of `value` listed in `special` by its entity.
fn encode(value: &str, special: &[char]) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            result.push_str(&entity(c));
        } else {
            result.push(c);
        }
    }
    result
}

/// Like [`encode`], but a named reference the parser kept verbatim (any name
/// other than the five predefined ones) is written back unchanged.
fn encode_attribute(value: &str, special: &[char]) -> String {
    let mut result = String::with_capacity(value.len());
    for (index, c) in value.char_indices() {
        let kept = c == '&'
            && NAMED_REFERENCE
                .captures(&value[index..])
                .is_some_and(|captures| !PREDEFINED_ENTITIES.contains(&&captures[1]));
        if !kept && special.contains(&c) {
            result.push_str(&entity(c));
        } else {
            result.push(c);
        }
    }
    result
}

/// Named entity when one is known, numeric character reference otherwise.
fn entity(c: char) -> String {
    match c {
        '<' => "&lt;".to_string(),
        '>' => "&gt;".to_string(),
        '&' => "&amp;".to_string(),
        '"' => "&quot;".to_string(),
        other => format!("&#{};", other as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("html"), Some(OutputFormat::Html));
        assert_eq!(
            detect_format("-//W3C//DTD XHTML 1.0 Strict//EN"),
            Some(OutputFormat::Xhtml)
        );
        assert_eq!(detect_format("xml-stylesheet"), Some(OutputFormat::Xml));
        assert_eq!(detect_format("about:legacy-compat"), None);
    }

    #[test]
    fn test_entity_fallback_is_numeric() {
        assert_eq!(encode("it's", &['\'']), "it&#39;s");
        assert_eq!(encode("a<b&c", &['<', '&']), "a&lt;b&amp;c");
    }

    #[test]
    fn test_attribute_keeps_unknown_named_references() {
        assert_eq!(
            encode_attribute("a&b&nbsp;c&amp;", &['&', '<', '"']),
            "a&amp;b&nbsp;c&amp;amp;"
        );
        assert_eq!(encode_attribute("x && y", &['&']), "x &amp;&amp; y");
    }

    #[test]
    fn test_comment_policy() {
        assert!(!CommentPolicy::default().admits("x"));
        assert!(CommentPolicy::from(true).admits("x"));
        let policy = CommentPolicy::filter(|text| text.starts_with('!'));
        assert!(policy.admits("! keep"));
        assert!(!policy.admits("drop"));
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("XHTML".parse::<OutputFormat>(), Ok(OutputFormat::Xhtml));
        assert!("json".parse::<OutputFormat>().is_err());
    }
}
