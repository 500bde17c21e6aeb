use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use scaffold::cache::ResourceCache;
use scaffold::feature::{Anchor, Directive, FeatureRegistry};
use scaffold::{Binding, CommentPolicy, Engine, Error, Result, SerializeOptions, State, Template};
use serde_json::json;
use tempfile::TempDir;
use test_log::test;

async fn render(source: &str) -> String {
    Engine::new().template(source).await.unwrap().render().await.unwrap()
}

#[test(tokio::test)]
async fn test_inline_default() {
    assert_eq!(render("<p>{greeting:hi}</p>").await, "<p>hi</p>");
}

#[test(tokio::test)]
async fn test_literal_binding() {
    let template = Engine::new().template("<p>{greeting:hi}</p>").await.unwrap();
    template.assign("greeting", "hello");
    assert_eq!(template.render().await.unwrap(), "<p>hello</p>");
}

#[test(tokio::test)]
async fn test_resolver_receives_key_and_default() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);

    let template = Engine::new().template("<p>{greeting:hi}</p>").await.unwrap();
    template.assign(
        "greeting",
        Binding::resolver(move |key, default| {
            seen.lock().push((key.to_string(), default.map(str::to_string)));
            "from resolver".to_string()
        }),
    );

    assert_eq!(template.render().await.unwrap(), "<p>from resolver</p>");
    assert_eq!(
        *calls.lock(),
        vec![("greeting".to_string(), Some("hi".to_string()))]
    );
}

#[test(tokio::test)]
async fn test_default_resolver_covers_unbound_keys() {
    let template = Engine::new().template("<p>{a} {b:x}</p>").await.unwrap();
    template.assign("a", 1);
    template.assign_default(|key, default| format!("{}={}", key, default.unwrap_or("-")));
    assert_eq!(template.render().await.unwrap(), "<p>1 b=x</p>");
}

#[test(tokio::test)]
async fn test_unbound_key_without_default_is_empty() {
    assert_eq!(render("<p>[{missing}]</p>").await, "<p>[]</p>");
}

#[test(tokio::test)]
async fn test_invalid_key_is_ignored() {
    let template = Engine::new().template("<p>{first-name:anon}</p>").await.unwrap();
    template.assign("first-name", "Ada");
    assert_eq!(template.render().await.unwrap(), "<p>anon</p>");
}

#[test(tokio::test)]
async fn test_value_bindings() {
    let template = Engine::new()
        .template("<p>{count} {ratio} {flag} {list} {name}</p>")
        .await
        .unwrap();
    template.assign_all([
        ("count", json!(3)),
        ("ratio", json!(0.5)),
        ("flag", json!(true)),
        ("list", json!([1, 2])),
        ("name", json!("Ada")),
    ]);
    assert_eq!(
        template.render().await.unwrap(),
        "<p>3 0.5 (boolean)true (array)[1,2] Ada</p>"
    );
}

#[test(tokio::test)]
async fn test_resolved_text_is_not_rescanned() {
    let template = Engine::new().template("<p>{a}{b}</p>").await.unwrap();
    template.assign("a", "{b}");
    template.assign("b", "B");
    assert_eq!(template.render().await.unwrap(), "<p>{b}B</p>");
}

#[test(tokio::test)]
async fn test_attribute_substitution() {
    let template = Engine::new()
        .template(r#"<a href="/users/{id}" class=" {kind:plain} ">{id}</a>"#)
        .await
        .unwrap();
    template.assign("id", 7);
    assert_eq!(
        template.render().await.unwrap(),
        r#"<a href="/users/7" class="plain">7</a>"#
    );
}

#[test(tokio::test)]
async fn test_script_content_is_left_alone() {
    let template = Engine::new()
        .template(r#"<script data-x="{t}">var a = {t};</script><p title="{t}">{t}</p>"#)
        .await
        .unwrap();
    template.assign("t", "T");
    assert_eq!(
        template.render().await.unwrap(),
        r#"<script data-x="{t}">var a = {t};</script><p title="T">T</p>"#
    );
}

#[test(tokio::test)]
async fn test_nested_template_is_spliced_as_tree() {
    let engine = Engine::new();
    let inner = engine.template("<b>{name}</b><i>!</i>").await.unwrap();
    inner.assign("name", "Ada");

    let outer = engine.template("<div>{inner}</div>").await.unwrap();
    outer.assign("inner", &inner);

    assert_eq!(outer.children().len(), 1);
    assert_eq!(outer.render().await.unwrap(), "<div><b>Ada</b><i>!</i></div>");
    assert_eq!(inner.state(), State::Rendered);
}

#[test(tokio::test)]
async fn test_nested_template_in_attribute_is_text() {
    let engine = Engine::new();
    let inner = engine.template("plain {word}").await.unwrap();
    inner.assign("word", "text");

    let outer = engine.template(r#"<p title="{inner}"/>"#).await.unwrap();
    outer.assign("inner", inner);
    assert_eq!(outer.render().await.unwrap(), r#"<p title="plain text"></p>"#);
}

#[test(tokio::test)]
async fn test_doctype_is_kept_outside_the_wrapper() {
    let output = render("<!DOCTYPE html>\n<input disabled=\"\" value=\"{v:a}\">").await;
    assert_eq!(output, "<!DOCTYPE html> <input disabled value=a>");
}

#[test(tokio::test)]
async fn test_second_render_reserializes() {
    let template = Engine::new().template("<p>{x:1}<!--note--></p>").await.unwrap();
    assert_eq!(template.state(), State::Ready);

    assert_eq!(template.render().await.unwrap(), "<p>1</p>");
    assert_eq!(template.state(), State::Rendered);

    template.assign("x", "2");
    let options = SerializeOptions {
        preserve_comments: CommentPolicy::Keep,
        ..Default::default()
    };
    assert_eq!(template.render_with(&options).await.unwrap(), "<p>1<!--note--></p>");
}

#[test(tokio::test)]
async fn test_block_duplication() {
    let template = Engine::new()
        .template(r#"<ul><k:block name="row"><li class="{_parity}">{_position}:{label} ({_name})</li></k:block></ul>"#)
        .await
        .unwrap();

    for label in ["a", "b", "c"] {
        let row = template.block("row").await.unwrap().unwrap();
        row.assign("label", label);
    }
    assert!(template.block("missing").await.unwrap().is_none());

    let options = SerializeOptions {
        preserve_comments: CommentPolicy::Keep,
        ..Default::default()
    };
    assert_eq!(
        template.render_with(&options).await.unwrap(),
        concat!(
            r#"<ul><li class="even">0:a (row)</li>"#,
            r#"<li class="odd">1:b (row)</li>"#,
            r#"<li class="even">2:c (row)</li></ul>"#,
        )
    );
}

#[test(tokio::test)]
async fn test_unused_block_leaves_nothing() {
    let options = SerializeOptions {
        preserve_comments: CommentPolicy::Keep,
        ..Default::default()
    };
    let template = Engine::new()
        .template(r#"<div><k:block name="row"><p>x</p></k:block></div>"#)
        .await
        .unwrap();
    assert_eq!(template.render_with(&options).await.unwrap(), "<div></div>");
}

/// Inserts one more `k:grow` before itself until `depth` reaches the limit.
struct Grow {
    anchor: Anchor,
    limit: usize,
    prepared: Arc<AtomicUsize>,
}

impl Directive for Grow {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn prepare<'a>(&'a self, _template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async move {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            let depth: usize = self
                .attribute("depth")
                .and_then(|depth| depth.parse().ok())
                .unwrap_or(0);
            if depth < self.limit {
                let next = (depth + 1).to_string();
                self.anchor
                    .insert_element("k:grow", &[("depth", next.as_str())], None);
            }
            Ok(())
        }
        .boxed()
    }
}

#[test(tokio::test)]
async fn test_preparation_reaches_fixed_point() {
    const LIMIT: usize = 3;
    let prepared = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&prepared);

    let registry = FeatureRegistry::with_builtins();
    registry.register("grow", move |anchor| {
        Arc::new(Grow {
            anchor,
            limit: LIMIT,
            prepared: Arc::clone(&counter),
        })
    });
    let engine = Engine::with_parts(ResourceCache::new(), Arc::new(registry));

    let template = engine.template(r#"<div><k:grow depth="0"/></div>"#).await.unwrap();
    assert_eq!(template.passes(), LIMIT + 1);
    assert_eq!(prepared.load(Ordering::SeqCst), LIMIT + 1);
    assert_eq!(template.features(Some("grow"), &[], false).len(), LIMIT + 1);
    assert_eq!(template.render().await.unwrap(), "<div></div>");
}

#[test(tokio::test)]
async fn test_extracted_elements_are_not_reprocessed() {
    let template = Engine::new()
        .template(r#"<k:unknown extracted="true"/><k:other/>"#)
        .await
        .unwrap();
    assert_eq!(template.passes(), 1);
    assert_eq!(template.features(None, &[], false).len(), 1);
}

#[test(tokio::test)]
async fn test_include_splices_file_and_rescans() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("part.html");
    std::fs::write(&path, r#"<p>part {x}</p><k:require file="site.css"/>"#).unwrap();

    let source = format!(
        r#"<head><k:style/></head><body><k:include file="{}"/></body>"#,
        path.display()
    );
    let template = Engine::new().template(&source).await.unwrap();
    assert_eq!(template.passes(), 2);

    template.assign("x", 1);
    assert_eq!(
        template.render().await.unwrap(),
        r#"<head><link type="text/css" rel="stylesheet" href="site.css"/></head><body><p>part 1</p></body>"#
    );
}

#[test(tokio::test)]
async fn test_include_without_file_is_an_error() {
    match Engine::new().template("<div><k:include/></div>").await {
        Err(Error::MissingAttribute {
            directive,
            attribute,
        }) => {
            assert_eq!(directive, "include");
            assert_eq!(attribute, "file");
        }
        other => panic!("Expected MissingAttribute, got {:?}", other),
    }
}

#[test(tokio::test)]
async fn test_include_of_missing_file_inserts_nothing() {
    let output = render(r#"<div><k:include file="/no/such/part.html"/></div>"#).await;
    assert_eq!(output, "<div></div>");
}

#[test(tokio::test)]
async fn test_template_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("page.xhtml");
    std::fs::write(&path, "<h1>{title}</h1>").unwrap();

    let template = Engine::new().template(path.to_str().unwrap()).await.unwrap();
    template.assign("title", "Welcome");
    assert_eq!(template.render().await.unwrap(), "<h1>Welcome</h1>");
}

#[test(tokio::test)]
async fn test_features_filter() {
    let template = Engine::new()
        .template(r#"<k:require file="a.js"/><k:require file="b.css" media="print"/><k:style/>"#)
        .await
        .unwrap();

    assert_eq!(template.features(None, &[], false).len(), 3);
    assert_eq!(template.features(Some("require"), &[], false).len(), 2);
    let print = template.features(Some("require"), &[("media", "print")], false);
    assert_eq!(print.len(), 1);
    assert_eq!(print[0].attribute("file").as_deref(), Some("b.css"));
    assert!(template
        .features(Some("require"), &[("media", "screen")], false)
        .is_empty());
}

#[test(tokio::test)]
async fn test_attribute_entities_round_trip() {
    assert_eq!(
        render(r#"<p title="a&amp;b&nbsp;c">x</p>"#).await,
        r#"<p title="a&amp;b&nbsp;c">x</p>"#
    );
}

#[test(tokio::test)]
async fn test_inline_script_with_bare_ampersands_loads() {
    assert_eq!(
        render("<!DOCTYPE html><html><script>if (a && b) { x(); }</script></html>").await,
        "<!DOCTYPE html><html><script>if (a &amp;&amp; b) { x(); }</script></html>"
    );
}

#[test(tokio::test)]
async fn test_self_binding_does_not_recurse() {
    let template = Engine::new().template("<p>{me}</p><k:script/>").await.unwrap();
    template.assign("me", &template);

    assert!(template.children().is_empty());
    assert_eq!(template.features(None, &[], true).len(), 1);
    assert!(template.render().await.is_ok());
    assert_eq!(template.state(), State::Rendered);
}

#[test(tokio::test)]
async fn test_binding_cycle_visits_each_template_once() {
    let engine = Engine::new();
    let first = engine.template(r#"<k:require file="a.js"/>{second}"#).await.unwrap();
    let second = engine.template(r#"<k:require file="b.js"/>{first}"#).await.unwrap();
    first.assign("second", &second);
    second.assign("first", &first);

    let files: Vec<Option<String>> = first
        .features(Some("require"), &[], true)
        .iter()
        .map(|directive| directive.attribute("file"))
        .collect();
    assert_eq!(files, vec![Some("a.js".to_string()), Some("b.js".to_string())]);
}
