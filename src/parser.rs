//! Markup parser producing [`Document`] trees.
//!
//! The parser is an XML reader with a few HTML allowances: end tags that
//! close nothing are ignored, void elements (`<br>`) never open a scope,
//! attributes may be unquoted or value-less, a `&` that starts no reference
//! is read as text, and named entities the XML reader does not know survive
//! as entity-reference nodes (or verbatim inside attribute values).

use std::borrow::Cow;
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;

use crate::constants::{DIRECTIVE_NAMESPACE, DIRECTIVE_PREFIX, FRAGMENT_TAG, VOID_ELEMENTS};
use crate::dom::{Attribute, Document, DocumentType, Element, NodeId, NodeKind};
use crate::error::Result;

/// `name [PUBLIC "pid" ["sid"] | SYSTEM "sid"] [[subset]]`
/// A complete entity or character reference at the start of the input
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[A-Za-z_:][\w.:-]*|#[0-9]+|#[xX][0-9A-Fa-f]+);")
        .expect("invalid reference regex")
});

/// Sections copied without looking for references
const VERBATIM_SECTIONS: [(&str, &str); 3] =
    [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>")];

static DOCTYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)^\s*([^\s\[>]+)(?:\s+(?i:PUBLIC)\s+(?:"([^"]*)"|'([^']*)')(?:\s+(?:"([^"]*)"|'([^']*)'))?|\s+(?i:SYSTEM)\s+(?:"([^"]*)"|'([^']*)'))?\s*(?:\[(.*)\])?\s*$"#,
    )
    .expect("invalid doctype regex")
});

/// Parses a complete document.
///
/// # Errors
/// * `Error::XmlError` if the markup is not well-formed enough to read
/// * `Error::EncodingError` if names or text cannot be decoded
pub fn parse(markup: &str) -> Result<Document> {
    let markup = escape_stray_ampersands(markup);
    let mut reader = Reader::from_str(&markup);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut builder = TreeBuilder::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let element = decode_element(&reader, &e)?;
                let is_void = is_void_element(&element.name);
                let id = builder.append(NodeKind::Element(element));
                if !is_void {
                    builder.open.push(id);
                }
            }
            Event::Empty(e) => {
                let element = decode_element(&reader, &e)?;
                builder.append(NodeKind::Element(element));
            }
            Event::End(e) => {
                let qname = e.name();
                let name = reader.decoder().decode(qname.as_ref())?;
                builder.close(&name);
            }
            Event::Text(e) => {
                let text = reader.decoder().decode(&e)?;
                builder.append_text(&text);
            }
            Event::GeneralRef(e) => {
                let entity = reader.decoder().decode(&e)?;
                match decode_entity(&entity) {
                    Some(text) => builder.append_text(&text),
                    None => {
                        builder.append(NodeKind::EntityReference(entity.into_owned()));
                    }
                }
            }
            Event::CData(e) => {
                builder.append(NodeKind::CData(String::from_utf8_lossy(&e).into_owned()));
            }
            Event::Comment(e) => {
                let text = reader.decoder().decode(&e)?;
                builder.append(NodeKind::Comment(text.into_owned()));
            }
            Event::Decl(e) => {
                let mut data = Vec::new();
                if let Ok(version) = e.version() {
                    data.push(format!("version=\"{}\"", String::from_utf8_lossy(&version)));
                }
                if let Some(Ok(encoding)) = e.encoding() {
                    data.push(format!("encoding=\"{}\"", String::from_utf8_lossy(&encoding)));
                }
                if let Some(Ok(standalone)) = e.standalone() {
                    data.push(format!("standalone=\"{}\"", String::from_utf8_lossy(&standalone)));
                }
                builder.append(NodeKind::ProcessingInstruction {
                    target: "xml".to_string(),
                    data: data.join(" "),
                });
            }
            Event::PI(e) => {
                let target = reader.decoder().decode(e.target())?.into_owned();
                let data = reader.decoder().decode(e.content())?.trim().to_string();
                builder.append(NodeKind::ProcessingInstruction { target, data });
            }
            Event::DocType(e) => {
                let content = reader.decoder().decode(&e)?;
                builder.append(NodeKind::DocumentType(parse_doctype(&content)));
            }
            Event::Eof => break,
        }
        buf.clear();
    }

    Ok(builder.document)
}

/// Parses markup that may have several top-level nodes into a document
/// whose root is a fragment node.
pub fn parse_fragment(markup: &str) -> Result<Document> {
    let wrapped = format!(
        r#"<{FRAGMENT_TAG} xmlns:{DIRECTIVE_PREFIX}="{DIRECTIVE_NAMESPACE}">{markup}</{FRAGMENT_TAG}>"#
    );
    let mut document = parse(&wrapped)?;
    if let Some(wrapper) = document.document_element() {
        document.unwrap_element(wrapper);
    }
    let root = document.root();
    *document.kind_mut(root) = NodeKind::Fragment;
    Ok(document)
}

/// Splits the content of a `<!DOCTYPE ...>` declaration into its parts.
pub fn parse_doctype(content: &str) -> DocumentType {
    let Some(captures) = DOCTYPE_PATTERN.captures(content) else {
        return DocumentType {
            name: content.trim().to_string(),
            ..Default::default()
        };
    };
    let group = |indexes: &[usize]| {
        indexes
            .iter()
            .find_map(|index| captures.get(*index))
            .map(|m| m.as_str().to_string())
    };

    DocumentType {
        name: group(&[1]).unwrap_or_default(),
        public_id: group(&[2, 3]),
        system_id: group(&[4, 5, 6, 7]),
        internal_subset: group(&[8]),
    }
}

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(name))
}

struct TreeBuilder {
    document: Document,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            document: Document::new(),
            open: Vec::new(),
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or_else(|| self.document.root())
    }

    fn append(&mut self, kind: NodeKind) -> NodeId {
        let parent = self.current();
        let id = self.document.create(kind);
        self.document.append_child(parent, id);
        id
    }

    /// Text split around entity references ends up in a single node.
    fn append_text(&mut self, text: &str) {
        let parent = self.current();
        if let Some(last) = self.document.children(parent).last().copied() {
            if let NodeKind::Text(existing) = self.document.kind_mut(last) {
                existing.push_str(text);
                return;
            }
        }
        self.append(NodeKind::Text(text.to_string()));
    }

    /// Closes the innermost open element called `name`, along with anything
    /// left open inside it. Unknown end tags are dropped.
    fn close(&mut self, name: &str) {
        let position = self
            .open
            .iter()
            .rposition(|id| self.document.name(*id) == Some(name));
        if let Some(position) = position {
            self.open.truncate(position);
        }
    }
}

fn decode_element<R>(reader: &Reader<R>, e: &BytesStart) -> Result<Element> {
    let qname = e.name();
    let name = reader.decoder().decode(qname.as_ref())?.into_owned();
    let attributes = e
        .html_attributes()
        .flatten()
        .map(|attr| {
            let name = reader.decoder().decode(attr.key.as_ref()).map_or_else(
                |_| String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                Cow::into_owned,
            );
            let raw = reader.decoder().decode(&attr.value).map_or_else(
                |_| String::from_utf8_lossy(&attr.value).into_owned(),
                Cow::into_owned,
            );
            let value = unescape_lenient(&raw);
            Attribute { name, value }
        })
        .collect();

    Ok(Element { name, attributes })
}

/// Replaces every `&` that does not start a reference with `&amp;`, leaving
/// comments, CDATA sections and processing instructions untouched.
fn escape_stray_ampersands(markup: &str) -> Cow<'_, str> {
    if !markup.contains('&') {
        return Cow::Borrowed(markup);
    }

    let mut result = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(index) = rest.find(&['&', '<'][..]) {
        let (head, tail) = rest.split_at(index);
        result.push_str(head);

        let verbatim = VERBATIM_SECTIONS.iter().find_map(|(open, close)| {
            tail.starts_with(open).then(|| {
                tail[open.len()..]
                    .find(close)
                    .map_or(tail.len(), |end| open.len() + end + close.len())
            })
        });
        if let Some(end) = verbatim {
            result.push_str(&tail[..end]);
            rest = &tail[end..];
            continue;
        }

        if tail.starts_with('&') && !REFERENCE.is_match(tail) {
            result.push_str("&amp;");
        } else {
            result.push_str(&tail[..1]);
        }
        rest = &tail[1..];
    }
    result.push_str(rest);
    Cow::Owned(result)
}

/// Resolves the references in an attribute value that [`decode_entity`]
/// knows; any other reference stays as written.
fn unescape_lenient(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(index) = rest.find('&') {
        result.push_str(&rest[..index]);
        let tail = &rest[index..];
        let decoded = tail.find(';').and_then(|end| {
            decode_entity(&tail[1..end]).map(|text| (text, end + 1))
        });
        match decoded {
            Some((text, consumed)) => {
                result.push_str(&text);
                rest = &tail[consumed..];
            }
            None => {
                result.push('&');
                rest = &tail[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

/// Resolves predefined and numeric references; `None` for anything else.
fn decode_entity(entity: &str) -> Option<String> {
    let text = match entity {
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "amp" => "&".to_string(),
        "apos" => "'".to_string(),
        "quot" => "\"".to_string(),
        s if s.starts_with('#') => {
            let code = if s.starts_with("#x") || s.starts_with("#X") {
                u32::from_str_radix(&s[2..], 16).ok()
            } else {
                s[1..].parse::<u32>().ok()
            };
            return code.and_then(char::from_u32).map(|c| c.to_string());
        }
        _ => return None,
    };
    Some(text)
}
