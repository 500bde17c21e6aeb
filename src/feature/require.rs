use std::any::Any;
use std::collections::HashSet;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::{Anchor, Directive};
use crate::error::Result;
use crate::template::Template;

/// Declares a resource (script, stylesheet, ...) the page needs.
///
/// Requirements produce no output of their own. Emitters such as
/// [`super::Script`] and [`super::Style`] collect them with
/// [`collect_assets`] at render time.
pub struct Require {
    anchor: Anchor,
}

impl Require {
    pub fn new(anchor: Anchor) -> Self {
        Self { anchor }
    }
}

impl Directive for Require {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Fills in a missing `type` from the extension of `file`.
    fn prepare<'a>(&'a self, _template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async move {
            let Some(file) = self.attribute("file") else {
                return Ok(());
            };
            if self.attribute("type").map_or(true, |kind| kind.is_empty()) {
                let guessed = mime_guess::from_path(&file).first_or_octet_stream();
                self.set_attribute("type", guessed.essence_str());
            }
            Ok(())
        }
        .boxed()
    }
}

/// A resource to emit, either by reference or with its content inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Linked(String),
    Inline(String),
}

/// Gathers the requirements of `template` and its children whose `type` is
/// one of `types`, in registration order.
///
/// A file is linked once unless one of its requirements says
/// `multiple="true"`. A requirement without `file` contributes its text as
/// inline content when that text is not blank.
pub fn collect_assets(template: &Template, types: &[&str]) -> Vec<Asset> {
    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    for requirement in template.features(Some("require"), &[], true) {
        let kind = requirement.attribute("type").unwrap_or_default();
        if !types.contains(&kind.as_str()) {
            continue;
        }
        match requirement.attribute("file").filter(|file| !file.is_empty()) {
            Some(file) => {
                let multiple = requirement.attribute("multiple").as_deref() == Some("true");
                if multiple || seen.insert(file.clone()) {
                    assets.push(Asset::Linked(file));
                }
            }
            None => {
                let text = requirement.value().trim();
                if !text.is_empty() {
                    assets.push(Asset::Inline(text.to_string()));
                }
            }
        }
    }

    assets
}
