//! Allowlist sanitizer for render trees and the markup they carry.
//!
//! Only markup that did not come out of our own HTML writer needs cleaning:
//! raw HTML from the source text and whatever the formula, diagram and
//! extension engines produced. Link and image URLs are checked too. Both
//! [`sanitize`] and [`sanitize_html`] are idempotent.

mod allowlist;
mod html;

use cellmark_common::SanitizerConfig;

use crate::entities::decode_entities_fully;
use crate::types::{Node, RenderTree};

use allowlist::{
    DENIED_TAGS, GLOBAL_ATTRIBUTES, HTML_TAGS, MATHML_ATTRIBUTES, MATHML_TAGS, SVG_ATTRIBUTES,
    SVG_TAGS, TAG_ATTRIBUTES, canonical,
};

/// Style forced onto the root `<svg>` of diagram markup.
pub const DIAGRAM_SVG_STYLE: &str = "max-width: 100%; height: auto; overflow: hidden";

/// Which tags and attributes survive sanitizing. The built-in lists can be
/// extended, but `script`, `style` and `on*` attributes are always removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizerPolicy {
    extra_tags: Vec<String>,
    extra_attributes: Vec<String>,
}

fn is_event_handler(name: &str) -> bool {
    name.len() > 2 && name.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("on"))
}

pub(crate) fn is_denied_tag(name: &str) -> bool {
    DENIED_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(name))
}

impl SanitizerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SanitizerConfig) -> Self {
        let policy = config
            .extra_tags
            .iter()
            .fold(Self::new(), |policy, tag| policy.allow_tag(tag));
        config
            .extra_attributes
            .iter()
            .fold(policy, |policy, attr| policy.allow_attribute(attr))
    }

    pub fn allow_tag(mut self, tag: &str) -> Self {
        if is_denied_tag(tag) {
            tracing::debug!(tag, "refusing to allow a denylisted tag");
        } else {
            self.extra_tags.push(tag.to_ascii_lowercase());
        }
        self
    }

    pub fn allow_attribute(mut self, attribute: &str) -> Self {
        if is_event_handler(attribute) {
            tracing::debug!(attribute, "refusing to allow an event handler attribute");
        } else {
            self.extra_attributes.push(attribute.to_ascii_lowercase());
        }
        self
    }

    /// Canonical spelling of `name` if the tag is allowed.
    pub(crate) fn tag<'a>(&'a self, name: &str) -> Option<&'a str> {
        if is_denied_tag(name) {
            return None;
        }
        canonical(HTML_TAGS, name)
            .or_else(|| canonical(SVG_TAGS, name))
            .or_else(|| canonical(MATHML_TAGS, name))
            .or_else(|| {
                self.extra_tags
                    .iter()
                    .find(|tag| tag.eq_ignore_ascii_case(name))
                    .map(String::as_str)
            })
    }

    /// Canonical spelling of `name` if it may appear on `tag`.
    pub(crate) fn attribute<'a>(&'a self, tag: &str, name: &str) -> Option<&'a str> {
        if is_event_handler(name) {
            return None;
        }
        let per_tag = TAG_ATTRIBUTES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(tag))
            .and_then(|(_, attributes)| canonical(attributes, name));
        per_tag
            .or_else(|| canonical(GLOBAL_ATTRIBUTES, name))
            .or_else(|| canonical(SVG_ATTRIBUTES, name))
            .or_else(|| canonical(MATHML_ATTRIBUTES, name))
            .or_else(|| {
                self.extra_attributes
                    .iter()
                    .find(|attr| attr.eq_ignore_ascii_case(name))
                    .map(String::as_str)
            })
    }

    /// Clean a fragment of HTML, SVG or MathML.
    pub fn clean(&self, markup: &str) -> String {
        html::clean(markup, self, false)
    }

    /// [`clean`](Self::clean), then pin root `<svg>` elements to
    /// [`DIAGRAM_SVG_STYLE`].
    pub fn clean_diagram(&self, markup: &str) -> String {
        html::clean(markup, self, true)
    }
}

/// Whether a URL may be kept. Relative URLs and fragments are fine, as are
/// `http`, `https` and `mailto`. Images may also use `data:image/`.
pub fn is_safe_url(url: &str, image: bool) -> bool {
    let decoded = decode_entities_fully(url);
    let squashed: String = decoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let Some(colon) = squashed.find(':') else {
        return true;
    };
    if squashed[..colon].contains(['/', '?', '#']) {
        return true;
    }
    match &squashed[..colon] {
        "http" | "https" | "mailto" => true,
        "data" => image && squashed.starts_with("data:image/"),
        _ => false,
    }
}

/// Whether a `style` value is free of script vectors.
pub(crate) fn is_safe_style(style: &str) -> bool {
    let decoded = decode_entities_fully(style);
    let squashed: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\\')
        .collect::<String>()
        .to_ascii_lowercase();
    const VECTORS: &[&str] = &[
        "expression(",
        "javascript:",
        "vbscript:",
        "@import",
        "behavior",
        "-moz-binding",
        "/*",
    ];
    !VECTORS.iter().any(|vector| squashed.contains(vector))
}

/// Sanitize all engine and raw markup in the tree and drop unsafe URLs.
#[tracing::instrument(level = "debug", skip_all)]
pub fn sanitize(mut tree: RenderTree, policy: &SanitizerPolicy) -> RenderTree {
    for node in &mut tree.children {
        node.visit_mut(&mut |node| match node {
            Node::Html { markup, .. } | Node::Math { markup, .. } | Node::Extension { markup, .. } => {
                *markup = policy.clean(markup);
            }
            Node::Diagram { markup, .. } => *markup = policy.clean_diagram(markup),
            Node::Link { url, .. } => {
                if !is_safe_url(url, false) {
                    tracing::trace!(url = %url, "dropping unsafe link url");
                    url.clear();
                }
            }
            Node::Image { url, .. } => {
                if !is_safe_url(url, true) {
                    tracing::trace!(url = %url, "dropping unsafe image url");
                    url.clear();
                }
            }
            _ => {}
        });
    }
    tree
}

/// Clean a markup fragment with the default policy.
pub fn sanitize_html(markup: &str) -> String {
    SanitizerPolicy::default().clean(markup)
}
