use std::any::Any;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::debug;

use super::require::{collect_assets, Asset};
use super::{Anchor, Directive};
use crate::error::Result;
use crate::template::Template;

/// Emits stylesheet links and inline `<style>` elements for every required
/// stylesheet.
pub struct Style {
    anchor: Anchor,
}

impl Style {
    pub fn new(anchor: Anchor) -> Self {
        Self { anchor }
    }
}

impl Directive for Style {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render<'a>(&'a self, template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async move {
            let assets = collect_assets(template, &["text/css"]);
            debug!("Emitting {} stylesheet(s)", assets.len());
            for asset in assets {
                match asset {
                    Asset::Linked(file) => self.anchor.insert_element(
                        "link",
                        &[("type", "text/css"), ("rel", "stylesheet"), ("href", file.as_str())],
                        None,
                    ),
                    Asset::Inline(text) => {
                        self.anchor
                            .insert_element("style", &[("type", "text/css")], Some(text.as_str()))
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }
}
