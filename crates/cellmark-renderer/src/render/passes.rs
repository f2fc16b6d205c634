//! Tree rewrites applied after the CommonMark parse.

use smol_str::SmolStr;

use crate::engine::guarded;
use crate::extension::ExtensionRegistry;
use crate::math::render_with_repair;
use crate::normalize::lines::ALERT_MARKER_RE;
use crate::scan::{Piece, Span, SpanKind, has_placeholder, restore, split_placeholders};
use crate::types::{AlertKind, ErrorKind, Node};

/// Every child list directly below `node`, table cells and alert titles
/// included.
fn child_lists_mut(node: &mut Node) -> Vec<&mut Vec<Node>> {
    match node {
        Node::Alert {
            title, children, ..
        } => vec![title, children],
        Node::Table { header, rows, .. } => header
            .iter_mut()
            .chain(rows.iter_mut().flatten())
            .map(|cell| &mut cell.children)
            .collect(),
        other => other.children_mut().into_iter().collect(),
    }
}

/// Apply `f` to `nodes`, then to every nested child list.
fn for_each_list(nodes: &mut Vec<Node>, f: &mut impl FnMut(&mut Vec<Node>)) {
    f(nodes);
    for node in nodes.iter_mut() {
        for list in child_lists_mut(node) {
            for_each_list(list, f);
        }
    }
}

/// pulldown-cmark splits text at brackets and entities; join the pieces back
/// up so later passes see whole runs.
pub(crate) fn merge_text(nodes: &mut Vec<Node>) {
    for_each_list(nodes, &mut |list| {
        let mut merged: Vec<Node> = Vec::with_capacity(list.len());
        for node in std::mem::take(list) {
            if let Node::Text { text } = &node {
                if let Some(Node::Text { text: prev }) = merged.last_mut() {
                    prev.push_str(text);
                    continue;
                }
            }
            merged.push(node);
        }
        *list = merged;
    });
}

/// Placeholders that landed in code, raw HTML, URLs or image alt text get
/// their source back verbatim.
pub(crate) fn restore_literals(nodes: &mut [Node], spans: &[Span]) {
    if spans.is_empty() {
        return;
    }
    for node in nodes {
        node.visit_mut(&mut |node| match node {
            Node::Code { code } | Node::CodeBlock { code, .. } => *code = restore(code, spans),
            Node::Html { markup, .. } => *markup = restore(markup, spans),
            Node::Link { url, title, .. } => {
                *url = restore(url, spans);
                *title = restore(title, spans);
            }
            Node::Image { url, title, alt } => {
                *url = restore(url, spans);
                *title = restore(title, spans);
                *alt = restore(alt, spans);
            }
            _ => {}
        });
    }
}

/// Turn placeholders in text into math and extension nodes, rendering them
/// on the way.
pub(crate) fn expand_placeholders(
    nodes: &mut Vec<Node>,
    spans: &[Span],
    registry: &ExtensionRegistry,
) {
    if spans.is_empty() {
        return;
    }
    for_each_list(nodes, &mut |list| {
        let needs_expansion = list
            .iter()
            .any(|node| matches!(node, Node::Text { text } if has_placeholder(text)));
        if !needs_expansion {
            return;
        }
        let mut expanded = Vec::with_capacity(list.len() + 2);
        for node in std::mem::take(list) {
            match node {
                Node::Text { text } if has_placeholder(&text) => {
                    for piece in split_placeholders(&text, spans.len()) {
                        match piece {
                            Piece::Text(text) => expanded.push(Node::text(text)),
                            Piece::Span(index) => expanded.push(span_node(&spans[index], registry)),
                        }
                    }
                }
                other => expanded.push(other),
            }
        }
        *list = expanded;
    });
}

fn span_node(span: &Span, registry: &ExtensionRegistry) -> Node {
    match &span.kind {
        SpanKind::Math { display, tex } => {
            match render_with_repair(&*registry.formula, tex, *display) {
                Ok(markup) => Node::Math {
                    display: *display,
                    tex: tex.clone(),
                    markup,
                },
                Err(error) => {
                    tracing::warn!(%error, tex = %tex, "formula failed to render");
                    Node::Error {
                        kind: ErrorKind::Formula,
                        message: error.to_string(),
                        source: span.source.clone(),
                    }
                }
            }
        }
        SpanKind::Extension {
            index,
            payload,
            block,
        } => {
            let Some(extension) = registry.extensions.get(*index) else {
                return Node::text(span.source.clone());
            };
            match guarded("extension", || extension.render(payload, *block)) {
                Ok(markup) => Node::Extension {
                    name: SmolStr::new(extension.name()),
                    payload: payload.clone(),
                    block: *block,
                    markup,
                },
                Err(error) => {
                    tracing::warn!(%error, extension = extension.name(), "extension failed to render");
                    Node::Error {
                        kind: ErrorKind::Extension,
                        message: error.to_string(),
                        source: span.source.clone(),
                    }
                }
            }
        }
    }
}

/// Split inline content at the first line break: `(first line, rest)`.
fn split_first_line(mut inlines: Vec<Node>) -> (Vec<Node>, Option<Vec<Node>>) {
    match inlines
        .iter()
        .position(|node| matches!(node, Node::SoftBreak | Node::HardBreak))
    {
        Some(at) => {
            let rest = inlines.split_off(at + 1);
            inlines.pop();
            (inlines, Some(rest))
        }
        None => (inlines, None),
    }
}

/// The alert kind and the byte length of the `[!TYPE]` marker, if `inlines`
/// opens with one.
fn take_alert_marker(inlines: &[Node]) -> Option<(AlertKind, usize)> {
    let Some(Node::Text { text }) = inlines.first() else {
        return None;
    };
    let caps = ALERT_MARKER_RE.captures(text)?;
    let kind = AlertKind::from_marker(caps.get(1)?.as_str())?;
    Some((kind, caps.get(0)?.end()))
}

fn trim_inline(mut nodes: Vec<Node>) -> Vec<Node> {
    if let Some(Node::Text { text }) = nodes.first_mut() {
        let trimmed = text.trim_start();
        if trimmed.len() != text.len() {
            *text = trimmed.to_owned();
        }
    }
    if let Some(Node::Text { text }) = nodes.last_mut() {
        text.truncate(text.trim_end().len());
    }
    nodes.retain(|node| !matches!(node, Node::Text { text } if text.is_empty()));
    nodes
}

/// `(kind, title, body)` for a paragraph's inline content that opens with an
/// alert marker. A one-line alert has an empty title and the remainder as
/// its body; otherwise the first line is the title.
fn split_alert(mut inlines: Vec<Node>) -> Result<(AlertKind, Vec<Node>, Vec<Node>), Vec<Node>> {
    let Some((kind, marker_end)) = take_alert_marker(&inlines) else {
        return Err(inlines);
    };
    if let Some(Node::Text { text }) = inlines.first_mut() {
        text.replace_range(..marker_end, "");
    }
    let (first_line, rest) = split_first_line(inlines);
    let first_line = trim_inline(first_line);
    Ok(match rest {
        None => (kind, Vec::new(), paragraph_if_any(first_line)),
        Some(rest) => (kind, first_line, paragraph_if_any(trim_inline(rest))),
    })
}

fn paragraph_if_any(inlines: Vec<Node>) -> Vec<Node> {
    if inlines.is_empty() {
        Vec::new()
    } else {
        vec![Node::paragraph(inlines)]
    }
}

fn into_alert(node: Node) -> Node {
    match node {
        Node::Paragraph { children } => match split_alert(children) {
            Ok((kind, title, children)) => Node::Alert {
                kind,
                title,
                children,
            },
            Err(children) => Node::Paragraph { children },
        },
        Node::BlockQuote { mut children } => {
            let first = match children.first_mut() {
                Some(Node::Paragraph { children: inlines }) => std::mem::take(inlines),
                _ => return Node::BlockQuote { children },
            };
            match split_alert(first) {
                Ok((kind, title, mut body)) => {
                    body.extend(children.into_iter().skip(1));
                    Node::Alert {
                        kind,
                        title,
                        children: body,
                    }
                }
                Err(first) => {
                    children[0] = Node::paragraph(first);
                    Node::BlockQuote { children }
                }
            }
        }
        other => other,
    }
}

fn starts_with_alert(node: &Node) -> bool {
    let inlines = match node {
        Node::Paragraph { children } => children,
        Node::BlockQuote { children } => match children.first() {
            Some(Node::Paragraph { children }) => children,
            _ => return false,
        },
        _ => return false,
    };
    take_alert_marker(inlines).is_some()
}

/// Paragraphs and block quotes opening with `[!TYPE]` become alerts. Alert
/// bodies are not searched again.
pub(crate) fn detect_alerts(nodes: &mut Vec<Node>) {
    for node in nodes.iter_mut() {
        if starts_with_alert(node) {
            let taken = std::mem::replace(node, Node::Rule);
            *node = into_alert(taken);
            continue;
        }
        for list in child_lists_mut(node) {
            detect_alerts(list);
        }
    }
}

/// Code blocks in a diagram language become diagram nodes, rendered by the
/// registry's diagram engine if there is one.
pub(crate) fn diagrams(nodes: &mut [Node], registry: &ExtensionRegistry) {
    for node in nodes {
        node.visit_mut(&mut |node| {
            let Node::CodeBlock {
                lang: Some(lang),
                code,
            } = node
            else {
                return;
            };
            if !registry.is_diagram_language(lang) {
                return;
            }
            let lang = lang.clone();
            let source = std::mem::take(code);
            *node = match &registry.diagram {
                None => Node::Diagram {
                    lang,
                    source,
                    markup: String::new(),
                },
                Some(engine) => match guarded("diagram", || engine.render_diagram(&source)) {
                    Ok(markup) => Node::Diagram {
                        lang,
                        source,
                        markup,
                    },
                    Err(error) => {
                        tracing::warn!(%error, lang = %lang, "diagram failed to render");
                        Node::Error {
                            kind: ErrorKind::Diagram,
                            message: error.to_string(),
                            source,
                        }
                    }
                },
            };
        });
    }
}

fn is_filler(node: &Node) -> bool {
    match node {
        Node::SoftBreak | Node::HardBreak => true,
        Node::Text { text } => text.trim().is_empty(),
        _ => false,
    }
}

fn flush_run(run: &mut Vec<Node>, out: &mut Vec<Node>) {
    let mut inlines = std::mem::take(run);
    while inlines.last().is_some_and(is_filler) {
        inlines.pop();
    }
    let leading = inlines.iter().take_while(|node| is_filler(node)).count();
    inlines.drain(..leading);
    if !inlines.is_empty() {
        out.push(Node::paragraph(trim_inline(inlines)));
    }
}

/// Display math and block extensions sitting in a paragraph are hoisted out,
/// splitting the paragraph around them.
pub(crate) fn lift_blocks(nodes: &mut Vec<Node>) {
    for_each_list(nodes, &mut |list| {
        let needs_lift = list.iter().any(|node| {
            matches!(node, Node::Paragraph { children } if children.iter().any(Node::is_block))
        });
        if !needs_lift {
            return;
        }
        let mut lifted = Vec::with_capacity(list.len() + 2);
        for node in std::mem::take(list) {
            match node {
                Node::Paragraph { children } if children.iter().any(Node::is_block) => {
                    let mut run = Vec::new();
                    for child in children {
                        if child.is_block() {
                            flush_run(&mut run, &mut lifted);
                            lifted.push(child);
                        } else {
                            run.push(child);
                        }
                    }
                    flush_run(&mut run, &mut lifted);
                }
                other => lifted.push(other),
            }
        }
        *list = lifted;
    });
}
