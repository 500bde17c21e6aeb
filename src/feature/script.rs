use std::any::Any;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::debug;

use super::require::{collect_assets, Asset};
use super::{Anchor, Directive};
use crate::error::Result;
use crate::template::Template;

const SCRIPT_TYPES: [&str; 2] = ["application/javascript", "text/javascript"];

/// Emits a `<script>` element for every required script, where the
/// directive stands.
pub struct Script {
    anchor: Anchor,
}

impl Script {
    pub fn new(anchor: Anchor) -> Self {
        Self { anchor }
    }
}

impl Directive for Script {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render<'a>(&'a self, template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async move {
            let assets = collect_assets(template, &SCRIPT_TYPES);
            debug!("Emitting {} script(s)", assets.len());
            for asset in assets {
                match asset {
                    Asset::Linked(file) => self.anchor.insert_element(
                        "script",
                        &[("type", "text/javascript"), ("src", file.as_str())],
                        None,
                    ),
                    Asset::Inline(text) => self.anchor.insert_element(
                        "script",
                        &[("type", "text/javascript")],
                        Some(text.as_str()),
                    ),
                }
            }
            Ok(())
        }
        .boxed()
    }
}
