//! Cellmark renderer
//!
//! Turns the Markdown-ish text found in spreadsheet and database cells into a
//! sanitized, typed [`RenderTree`]: [`normalize`] repairs the raw text,
//! [`render`] parses it with math, diagrams, alerts and registered syntax
//! extensions recognised, and [`sanitize`] strips anything unsafe from the
//! markup the engines and the author produced. [`to_html`] writes the result
//! out.
//!

pub mod engine;
pub mod entities;
pub mod extension;
pub mod html;
pub mod math;
pub mod normalize;
pub mod render;
pub mod sanitize;
mod scan;
pub mod types;

pub use engine::{DiagramEngine, EngineError, FormulaEngine};
pub use extension::{
    ExtensionMatch, ExtensionRegistry, ExtensionRegistryBuilder, Features, SyntaxExtension,
};
pub use html::{HtmlWriter, to_html};
pub use math::MathMlEngine;
pub use normalize::{Normalizer, normalize, normalize_value};
pub use render::render;
pub use sanitize::{DIAGRAM_SVG_STYLE, SanitizerPolicy, is_safe_url, sanitize, sanitize_html};
pub use types::{AlertKind, Alignment, ErrorKind, Node, RenderTree, TableCell};

/// Raw cell text to a display-ready tree: normalize with the registry's
/// normalizer, render, sanitize.
#[tracing::instrument(level = "debug", skip_all, fields(len = raw.len()))]
pub fn process(raw: &str, registry: &ExtensionRegistry, policy: &SanitizerPolicy) -> RenderTree {
    let normalized = registry.normalizer().normalize(raw);
    let tree = render(&normalized, registry);
    sanitize(tree, policy)
}

/// [`process`], written out as HTML.
pub fn render_html(raw: &str, registry: &ExtensionRegistry, policy: &SanitizerPolicy) -> String {
    to_html(&process(raw, registry, policy))
}
