use std::any::Any;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::debug;
use parking_lot::Mutex;

use super::{Anchor, Directive};
use crate::constants::{BLOCK_NAME_KEY, BLOCK_PARITY_KEY, BLOCK_POSITION_KEY};
use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::serializer::{serialize_node, CommentPolicy, OutputFormat, SerializeOptions};
use crate::template::Template;

/// Repeatable region of a template.
///
/// On prepare the block captures its content as markup, leaves a marker
/// comment where it stood and takes itself out of the tree. Each
/// [`Block::duplicate`] turns the captured markup into a new child template;
/// on render the duplicates are inserted before the marker in the order they
/// were requested.
pub struct Block {
    anchor: Anchor,
    state: Mutex<BlockState>,
}

#[derive(Default)]
struct BlockState {
    source: Option<String>,
    marker: Option<NodeId>,
    requested: usize,
    instances: Vec<(usize, Template)>,
}

impl Block {
    pub fn new(anchor: Anchor) -> Self {
        Self {
            anchor,
            state: Mutex::new(BlockState::default()),
        }
    }

    /// Creates a new instance of the block as a child of `template`.
    ///
    /// The instance gets `_position` (zero-based request order), `_parity`
    /// (`even`/`odd`) and `_name` (the block's `name` attribute) bound.
    ///
    /// # Errors
    /// * `Error::TemplateError` if the block has not been prepared yet
    /// * any error from loading the instance
    pub async fn duplicate(&self, template: &Template) -> Result<Template> {
        let (source, position) = {
            let mut state = self.state.lock();
            let source = state.source.clone().ok_or_else(|| {
                Error::TemplateError("cannot duplicate a block before it is prepared".to_string())
            })?;
            let position = state.requested;
            state.requested += 1;
            (source, position)
        };

        let instance = Template::load(template.engine(), &source, Some(template)).await?;
        instance.assign(BLOCK_POSITION_KEY, position);
        instance.assign(
            BLOCK_PARITY_KEY,
            if position % 2 == 0 { "even" } else { "odd" },
        );
        instance.assign(BLOCK_NAME_KEY, self.attribute("name").unwrap_or_default());

        let mut state = self.state.lock();
        let index = state
            .instances
            .partition_point(|(existing, _)| *existing < position);
        state.instances.insert(index, (position, instance.clone()));
        Ok(instance)
    }
}

impl Directive for Block {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn prepare<'a>(&'a self, _template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async move {
            let options = SerializeOptions {
                preserve_whitespace: true,
                preserve_comments: CommentPolicy::Keep,
                format: Some(OutputFormat::Xml),
            };
            let name = self.attribute("name").unwrap_or_default();
            let node = self.node();

            let (source, marker) = {
                let mut document = self.dom().lock();
                let source: String = document
                    .children(node)
                    .iter()
                    .map(|child| serialize_node(&document, *child, &options))
                    .collect();
                let marker = document.create_comment(format!("block '{name}'"));
                document.insert_before(node, marker);
                document.detach(node);
                (source, marker)
            };

            debug!("Captured block '{}' ({} bytes)", name, source.len());
            let mut state = self.state.lock();
            state.source = Some(source);
            state.marker = Some(marker);
            Ok(())
        }
        .boxed()
    }

    fn render<'a>(&'a self, _template: &'a Template) -> BoxFuture<'a, Result<()>> {
        async move {
            let (marker, instances) = {
                let state = self.state.lock();
                let instances: Vec<Template> =
                    state.instances.iter().map(|(_, instance)| instance.clone()).collect();
                (state.marker, instances)
            };
            let Some(marker) = marker else {
                return Ok(());
            };

            for instance in instances {
                let rendered = instance.render_tree().await?;
                let mut document = self.dom().lock();
                for child in rendered.children(rendered.root()) {
                    let adopted = document.adopt(&rendered, *child);
                    document.insert_before(marker, adopted);
                }
            }

            self.dom().lock().detach(marker);
            Ok(())
        }
        .boxed()
    }
}
