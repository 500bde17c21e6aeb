use pretty_assertions::assert_eq;
use scaffold::dom::{Document, DocumentType, NodeKind};
use scaffold::parser::parse;
use scaffold::serializer::{serialize, CommentPolicy, OutputFormat, SerializeOptions};

fn with_format(format: OutputFormat) -> SerializeOptions {
    SerializeOptions {
        format: Some(format),
        ..Default::default()
    }
}

fn render(markup: &str, options: &SerializeOptions) -> String {
    serialize(&parse(markup).unwrap(), options)
}

#[test]
fn test_void_element_html_vs_xml() {
    let document = parse("<p><br></p>").unwrap();
    assert_eq!(serialize(&document, &with_format(OutputFormat::Html)), "<p><br></p>");
    assert_eq!(serialize(&document, &with_format(OutputFormat::Xml)), "<p><br/></p>");
    assert_eq!(serialize(&document, &with_format(OutputFormat::Xhtml)), "<p><br/></p>");
}

#[test]
fn test_empty_non_void_element_keeps_closing_tag() {
    let options = with_format(OutputFormat::Html);
    assert_eq!(render("<div></div><span/>", &options), "<div></div><span></span>");
}

#[test]
fn test_boolean_attribute_html_vs_xml() {
    let document = parse(r#"<input disabled type="text">"#).unwrap();
    assert_eq!(
        serialize(&document, &with_format(OutputFormat::Html)),
        "<input disabled type=text>"
    );
    assert_eq!(
        serialize(&document, &with_format(OutputFormat::Xml)),
        r#"<input disabled="disabled" type="text"/>"#
    );
    assert_eq!(
        render(r#"<input disabled="true"/>"#, &with_format(OutputFormat::Xml)),
        r#"<input disabled="true"/>"#
    );
}

#[test]
fn test_xhtml_doctype_requires_quoting() {
    let markup = concat!(
        r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#,
        r#"<input disabled="" value="a"/>"#,
    );
    assert_eq!(
        render(markup, &SerializeOptions::default()),
        concat!(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#,
            r#"<input disabled="disabled" value="a"/>"#,
        )
    );
}

#[test]
fn test_html_doctype_enables_html_rules() {
    assert_eq!(
        render(r#"<!DOCTYPE html><input checked value="a b" name=q>"#, &SerializeOptions::default()),
        r#"<!DOCTYPE html><input checked value="a b" name=q>"#
    );
}

#[test]
fn test_processing_instruction_selects_xml() {
    assert_eq!(
        render(r#"<?xml version="1.0"?><root><br/></root>"#, &SerializeOptions::default()),
        r#"<?xml version="1.0"?><root><br/></root>"#
    );
}

#[test]
fn test_attribute_quoting() {
    let options = with_format(OutputFormat::Xml);
    assert_eq!(
        render(r#"<p title='say "hi"' data-x="a &amp; b &lt; c"/>"#, &options),
        r#"<p title='say "hi"' data-x="a &amp; b &lt; c"></p>"#
    );
}

#[test]
fn test_text_encoding() {
    let options = with_format(OutputFormat::Xml);
    assert_eq!(
        render("<p>a &lt; b &amp; c &gt; d</p>", &options),
        "<p>a &lt; b &amp; c > d</p>"
    );
    assert_eq!(render("<p>&nbsp;</p>", &options), "<p>&nbsp;</p>");
}

#[test]
fn test_script_text_is_encoded_in_every_format() {
    let markup = "<script>if (a &lt; b) {}</script>";
    assert_eq!(
        render(markup, &with_format(OutputFormat::Html)),
        "<script>if (a &lt; b) {}</script>"
    );
    assert_eq!(
        render(markup, &with_format(OutputFormat::Xml)),
        "<script>if (a &lt; b) {}</script>"
    );
}

#[test]
fn test_cdata_is_verbatim() {
    assert_eq!(
        render("<x><![CDATA[a < b]]></x>", &SerializeOptions::default()),
        "<x><![CDATA[a < b]]></x>"
    );
}

#[test]
fn test_comment_policies() {
    let markup = "<p><!--drop--><!--!keep-->x</p>";
    assert_eq!(render(markup, &SerializeOptions::default()), "<p>x</p>");

    let keep = SerializeOptions {
        preserve_comments: CommentPolicy::Keep,
        ..Default::default()
    };
    assert_eq!(render(markup, &keep), "<p><!--drop--><!--!keep-->x</p>");

    let filter = SerializeOptions {
        preserve_comments: CommentPolicy::filter(|text| text.starts_with('!')),
        ..Default::default()
    };
    assert_eq!(render(markup, &filter), "<p><!--!keep-->x</p>");
}

#[test]
fn test_whitespace_collapse() {
    let markup = "<div>\n  a   b\n<pre>  x\n  y</pre></div>";
    assert_eq!(
        render(markup, &SerializeOptions::default()),
        "<div> a b <pre>  x\n  y</pre></div>"
    );

    let preserve = SerializeOptions {
        preserve_whitespace: true,
        ..Default::default()
    };
    assert_eq!(render(markup, &preserve), markup);
}

#[test]
fn test_doctype_system_sentinel() {
    let mut document = Document::new();
    let root = document.root();
    let doctype = document.create(NodeKind::DocumentType(DocumentType {
        name: "note".to_string(),
        public_id: None,
        system_id: Some(".".to_string()),
        internal_subset: None,
    }));
    document.append_child(root, doctype);
    assert_eq!(serialize(&document, &SerializeOptions::default()), "<!DOCTYPE note>");

    let mut document = Document::new();
    let root = document.root();
    let doctype = document.create(NodeKind::DocumentType(DocumentType {
        name: "note".to_string(),
        public_id: None,
        system_id: Some("note.dtd".to_string()),
        internal_subset: Some("<!ELEMENT note (#PCDATA)>".to_string()),
    }));
    document.append_child(root, doctype);
    assert_eq!(
        serialize(&document, &SerializeOptions::default()),
        r#"<!DOCTYPE note SYSTEM "note.dtd" [<!ELEMENT note (#PCDATA)>]>"#
    );
}

#[test]
fn test_unknown_node_placeholder() {
    let mut document = Document::new();
    let root = document.root();
    let notation = document.create(NodeKind::Notation("gif".to_string()));
    document.append_child(root, notation);
    assert_eq!(serialize(&document, &SerializeOptions::default()), "??gif");
}
