use std::any::Any;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::{debug, warn};

use super::{Anchor, Directive};
use crate::error::{Error, Result};
use crate::parser::parse_fragment;
use crate::template::Template;

/// Splices the content of another markup file in place of the directive.
///
/// The inserted markup is part of the template from then on, so directives
/// it contains are picked up by the next extraction pass.
pub struct Include {
    anchor: Anchor,
}

impl Include {
    pub fn new(anchor: Anchor) -> Self {
        Self { anchor }
    }
}

impl Directive for Include {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn prepare<'a>(&'a self, _template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async move {
            let file = self.attribute("file").ok_or_else(|| Error::MissingAttribute {
                directive: self.name().to_string(),
                attribute: "file".to_string(),
            })?;

            let content = match tokio::fs::read_to_string(&file).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Cannot include '{}': {}", file, e);
                    return Ok(());
                }
            };
            let fragment = parse_fragment(&content)?;

            let mut document = self.dom().lock();
            let node = self.node();
            for child in fragment.children(fragment.root()) {
                let adopted = document.adopt(&fragment, *child);
                document.insert_before(node, adopted);
            }
            debug!("Included '{}'", file);
            Ok(())
        }
        .boxed()
    }
}
