use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The parsed, repaired and (once sanitized) safe form of one cell's Markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderTree {
    pub children: Vec<Node>,
}

impl RenderTree {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first walk over every node.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        for node in &self.children {
            node.walk(f);
        }
    }

    /// Concatenated text content of the whole tree.
    pub fn plain_text(&self) -> String {
        plain_text(&self.children)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Note,
    Tip,
    Important,
    Warning,
    Caution,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Note => "note",
            AlertKind::Tip => "tip",
            AlertKind::Important => "important",
            AlertKind::Warning => "warning",
            AlertKind::Caution => "caution",
        }
    }

    /// Case-insensitive match on the word inside `[!...]`.
    pub fn from_marker(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "note" => Some(AlertKind::Note),
            "tip" => Some(AlertKind::Tip),
            "important" => Some(AlertKind::Important),
            "warning" => Some(AlertKind::Warning),
            "caution" => Some(AlertKind::Caution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_css(self) -> Option<&'static str> {
        match self {
            Alignment::None => None,
            Alignment::Left => Some("left"),
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
        }
    }
}

impl From<pulldown_cmark::Alignment> for Alignment {
    fn from(value: pulldown_cmark::Alignment) -> Self {
        match value {
            pulldown_cmark::Alignment::None => Alignment::None,
            pulldown_cmark::Alignment::Left => Alignment::Left,
            pulldown_cmark::Alignment::Center => Alignment::Center,
            pulldown_cmark::Alignment::Right => Alignment::Right,
        }
    }
}

/// What went wrong when a node had to be replaced by [`Node::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Formula,
    Diagram,
    Extension,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Formula => "formula",
            ErrorKind::Diagram => "diagram",
            ErrorKind::Extension => "extension",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub alignment: Alignment,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Heading {
        level: u8,
        id: Option<SmolStr>,
        children: Vec<Node>,
    },
    Paragraph {
        children: Vec<Node>,
    },
    BlockQuote {
        children: Vec<Node>,
    },
    List {
        ordered: bool,
        /// Only set for ordered lists that don't start at 1.
        start: Option<u64>,
        items: Vec<Node>,
    },
    ListItem {
        /// Task list state, `None` for plain items.
        checked: Option<bool>,
        children: Vec<Node>,
    },
    CodeBlock {
        lang: Option<SmolStr>,
        code: String,
    },
    Math {
        display: bool,
        tex: String,
        /// Engine output, empty until rendered.
        markup: String,
    },
    Diagram {
        lang: SmolStr,
        source: String,
        markup: String,
    },
    Alert {
        kind: AlertKind,
        title: Vec<Node>,
        children: Vec<Node>,
    },
    Table {
        alignments: Vec<Alignment>,
        header: Vec<TableCell>,
        rows: Vec<Vec<TableCell>>,
    },
    Rule,
    Html {
        markup: String,
        block: bool,
    },
    Link {
        url: String,
        title: String,
        children: Vec<Node>,
    },
    Image {
        url: String,
        title: String,
        alt: String,
    },
    Emphasis {
        children: Vec<Node>,
    },
    Strong {
        children: Vec<Node>,
    },
    Strikethrough {
        children: Vec<Node>,
    },
    Code {
        code: String,
    },
    Text {
        text: String,
    },
    SoftBreak,
    HardBreak,
    FootnoteReference {
        label: SmolStr,
    },
    FootnoteDefinition {
        label: SmolStr,
        children: Vec<Node>,
    },
    /// Output of a registered syntax extension.
    Extension {
        name: SmolStr,
        payload: String,
        block: bool,
        markup: String,
    },
    /// Replaces a construct that could not be rendered. `source` keeps the
    /// original text so nothing the author wrote is lost.
    Error {
        kind: ErrorKind,
        message: String,
        source: String,
    },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text { text: text.into() }
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        Node::Paragraph { children }
    }

    /// Child nodes, if this variant has any. Table cells are not included.
    pub fn children(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Heading { children, .. }
            | Node::Paragraph { children }
            | Node::BlockQuote { children }
            | Node::ListItem { children, .. }
            | Node::Alert { children, .. }
            | Node::Link { children, .. }
            | Node::Emphasis { children }
            | Node::Strong { children }
            | Node::Strikethrough { children }
            | Node::FootnoteDefinition { children, .. } => Some(children),
            Node::List { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Heading { children, .. }
            | Node::Paragraph { children }
            | Node::BlockQuote { children }
            | Node::ListItem { children, .. }
            | Node::Alert { children, .. }
            | Node::Link { children, .. }
            | Node::Emphasis { children }
            | Node::Strong { children }
            | Node::Strikethrough { children }
            | Node::FootnoteDefinition { children, .. } => Some(children),
            Node::List { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Whether the node renders as a block on its own.
    pub fn is_block(&self) -> bool {
        match self {
            Node::Heading { .. }
            | Node::Paragraph { .. }
            | Node::BlockQuote { .. }
            | Node::List { .. }
            | Node::ListItem { .. }
            | Node::CodeBlock { .. }
            | Node::Diagram { .. }
            | Node::Alert { .. }
            | Node::Table { .. }
            | Node::Rule
            | Node::FootnoteDefinition { .. } => true,
            Node::Math { display, .. } => *display,
            Node::Html { block, .. } | Node::Extension { block, .. } => *block,
            _ => false,
        }
    }

    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        match self {
            Node::Alert { title, children, .. } => {
                for node in title.iter().chain(children) {
                    node.walk(f);
                }
            }
            Node::Table { header, rows, .. } => {
                for cell in header.iter().chain(rows.iter().flatten()) {
                    for node in &cell.children {
                        node.walk(f);
                    }
                }
            }
            other => {
                if let Some(children) = other.children() {
                    for node in children {
                        node.walk(f);
                    }
                }
            }
        }
    }

    /// Mutable depth-first visit, parents before children.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        match self {
            Node::Alert { title, children, .. } => {
                for node in title.iter_mut().chain(children.iter_mut()) {
                    node.visit_mut(f);
                }
            }
            Node::Table { header, rows, .. } => {
                for cell in header.iter_mut().chain(rows.iter_mut().flatten()) {
                    for node in &mut cell.children {
                        node.visit_mut(f);
                    }
                }
            }
            other => {
                if let Some(children) = other.children_mut() {
                    for node in children {
                        node.visit_mut(f);
                    }
                }
            }
        }
    }
}

/// Text content of a node list, ignoring markup. Code spans, math source
/// and breaks contribute their text; images contribute their alt text.
pub fn plain_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        push_plain_text(node, &mut out);
    }
    out
}

fn push_plain_text(node: &Node, out: &mut String) {
    match node {
        Node::Text { text } => out.push_str(text),
        Node::Code { code } => out.push_str(code),
        Node::CodeBlock { code, .. } => out.push_str(code),
        Node::Math { tex, .. } => out.push_str(tex),
        Node::Diagram { source, .. } => out.push_str(source),
        Node::Image { alt, .. } => out.push_str(alt),
        Node::Extension { payload, .. } => out.push_str(payload),
        Node::Error { source, .. } => out.push_str(source),
        Node::SoftBreak | Node::HardBreak => out.push('\n'),
        Node::Alert {
            title, children, ..
        } => {
            for child in title.iter().chain(children) {
                push_plain_text(child, out);
            }
        }
        Node::Table { header, rows, .. } => {
            for cell in header.iter().chain(rows.iter().flatten()) {
                for child in &cell.children {
                    push_plain_text(child, out);
                }
            }
        }
        other => {
            if let Some(children) = other.children() {
                for child in children {
                    push_plain_text(child, out);
                }
            }
        }
    }
}
