//! Normalized text → [`RenderTree`].
//!
//! Rendering happens in three steps: math and extension spans are cut out of
//! the text ([`crate::scan`]), the rest is parsed as CommonMark by
//! pulldown-cmark and folded into nodes, and a handful of tree passes put the
//! spans back, recognise alerts and diagrams, and hoist block-level spans out
//! of their paragraphs.

mod builder;
mod passes;

use std::panic::{AssertUnwindSafe, catch_unwind};

use pulldown_cmark::{Options, Parser};

use crate::extension::{ExtensionRegistry, Features};
use crate::scan;
use crate::types::{Node, RenderTree};

use builder::TreeBuilder;

fn parser_options(features: Features) -> Options {
    let mut options =
        Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS | Options::ENABLE_HEADING_ATTRIBUTES;
    if features.tables {
        options.insert(Options::ENABLE_TABLES);
    }
    if features.footnotes {
        options.insert(Options::ENABLE_FOOTNOTES);
    }
    options
}

/// Render already-normalized text. Never fails: constructs that can't be
/// rendered become [`Node::Error`] in place.
#[tracing::instrument(level = "debug", skip_all, fields(len = text.len()))]
pub fn render(text: &str, registry: &ExtensionRegistry) -> RenderTree {
    match catch_unwind(AssertUnwindSafe(|| render_inner(text, registry))) {
        Ok(tree) => tree,
        Err(_) => {
            tracing::warn!("renderer panicked, falling back to plain text");
            RenderTree::new(vec![Node::paragraph(vec![Node::text(text)])])
        }
    }
}

fn render_inner(text: &str, registry: &ExtensionRegistry) -> RenderTree {
    let features = registry.features();
    let extracted = scan::extract(text, registry.extensions());
    tracing::trace!(spans = extracted.spans.len(), "extracted spans");

    let parser = Parser::new_ext(&extracted.text, parser_options(features));
    let mut children = TreeBuilder::new().build(parser);

    passes::merge_text(&mut children);
    passes::restore_literals(&mut children, &extracted.spans);
    passes::expand_placeholders(&mut children, &extracted.spans, registry);
    if features.alerts {
        passes::detect_alerts(&mut children);
    }
    passes::diagrams(&mut children, registry);
    passes::lift_blocks(&mut children);

    RenderTree::new(children)
}
