//! Folds the pulldown-cmark event stream into [`Node`]s with a frame stack.

use pulldown_cmark::{CodeBlockKind, Event, Tag};
use smol_str::SmolStr;

use crate::types::{Alignment, Node, TableCell, plain_text};

enum Frame {
    Root,
    Paragraph,
    Heading {
        level: u8,
        id: Option<SmolStr>,
    },
    BlockQuote,
    List {
        start: Option<u64>,
    },
    Item {
        checked: Option<bool>,
    },
    CodeBlock {
        lang: Option<SmolStr>,
        code: String,
    },
    HtmlBlock {
        markup: String,
    },
    FootnoteDefinition {
        label: SmolStr,
    },
    Table {
        alignments: Vec<Alignment>,
        header: Vec<TableCell>,
        rows: Vec<Vec<TableCell>>,
    },
    TableHead,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Strikethrough,
    Link {
        url: String,
        title: String,
    },
    Image {
        url: String,
        title: String,
        alt: String,
    },
    /// A container we have no node for; its children are spliced into the
    /// parent.
    Transparent,
}

struct Open {
    frame: Frame,
    children: Vec<Node>,
    cells: Vec<TableCell>,
}

impl Open {
    fn new(frame: Frame) -> Self {
        Self {
            frame,
            children: Vec::new(),
            cells: Vec::new(),
        }
    }
}

pub(crate) struct TreeBuilder {
    stack: Vec<Open>,
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            stack: vec![Open::new(Frame::Root)],
        }
    }

    pub(crate) fn build<'a>(mut self, events: impl Iterator<Item = Event<'a>>) -> Vec<Node> {
        for event in events {
            self.event(event);
        }
        // Unbalanced streams shouldn't happen, but close whatever is open.
        while self.stack.len() > 1 {
            self.end();
        }
        self.stack.pop().map(|root| root.children).unwrap_or_default()
    }

    fn top(&mut self) -> &mut Open {
        // The root frame is never popped before `build` finishes.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Inside an image, nested nodes only contribute their text to the alt.
    fn push_node(&mut self, node: Node) {
        let open = self.top();
        if let Frame::Image { alt, .. } = &mut open.frame {
            alt.push_str(&plain_text(std::slice::from_ref(&node)));
        } else {
            open.children.push(node);
        }
    }

    fn text(&mut self, text: &str) {
        let open = self.top();
        match &mut open.frame {
            Frame::CodeBlock { code, .. } => code.push_str(text),
            Frame::HtmlBlock { markup } => markup.push_str(text),
            Frame::Image { alt, .. } => alt.push_str(text),
            _ => open.children.push(Node::text(text)),
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                if let Frame::Image { alt, .. } = &mut self.top().frame {
                    alt.push_str(&code);
                } else {
                    self.push_node(Node::Code {
                        code: code.into_string(),
                    });
                }
            }
            Event::Html(html) => {
                if let Frame::HtmlBlock { markup } = &mut self.top().frame {
                    markup.push_str(&html);
                } else {
                    self.push_node(Node::Html {
                        markup: html.into_string(),
                        block: true,
                    });
                }
            }
            Event::InlineHtml(html) => self.push_node(Node::Html {
                markup: html.into_string(),
                block: false,
            }),
            Event::FootnoteReference(label) => self.push_node(Node::FootnoteReference {
                label: SmolStr::new(&*label),
            }),
            Event::SoftBreak => {
                if let Frame::Image { alt, .. } = &mut self.top().frame {
                    alt.push(' ');
                } else {
                    self.push_node(Node::SoftBreak);
                }
            }
            Event::HardBreak => {
                if let Frame::Image { alt, .. } = &mut self.top().frame {
                    alt.push(' ');
                } else {
                    self.push_node(Node::HardBreak);
                }
            }
            Event::Rule => self.push_node(Node::Rule),
            Event::TaskListMarker(checked) => {
                let item = self
                    .stack
                    .iter_mut()
                    .rev()
                    .find_map(|open| match &mut open.frame {
                        Frame::Item { checked } => Some(checked),
                        _ => None,
                    });
                if let Some(slot) = item {
                    *slot = Some(checked);
                }
            }
            // Math and other optional syntaxes are not enabled in the parser.
            other => {
                tracing::trace!(event = ?other, "ignoring unexpected event");
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let frame = match tag {
            Tag::Paragraph => Frame::Paragraph,
            Tag::Heading { level, id, .. } => Frame::Heading {
                level: level as u8,
                id: id.map(|id| SmolStr::new(&*id)),
            },
            Tag::BlockQuote(_) => Frame::BlockQuote,
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .filter(|lang| !lang.is_empty())
                        .map(SmolStr::new),
                    CodeBlockKind::Indented => None,
                };
                Frame::CodeBlock {
                    lang,
                    code: String::new(),
                }
            }
            Tag::HtmlBlock => Frame::HtmlBlock {
                markup: String::new(),
            },
            Tag::List(start) => Frame::List { start },
            Tag::Item => Frame::Item { checked: None },
            Tag::FootnoteDefinition(label) => Frame::FootnoteDefinition {
                label: SmolStr::new(&*label),
            },
            Tag::Table(alignments) => Frame::Table {
                alignments: alignments.into_iter().map(Alignment::from).collect(),
                header: Vec::new(),
                rows: Vec::new(),
            },
            Tag::TableHead => Frame::TableHead,
            Tag::TableRow => Frame::TableRow,
            Tag::TableCell => Frame::TableCell,
            Tag::Emphasis => Frame::Emphasis,
            Tag::Strong => Frame::Strong,
            Tag::Strikethrough => Frame::Strikethrough,
            Tag::Link {
                dest_url, title, ..
            } => Frame::Link {
                url: dest_url.into_string(),
                title: title.into_string(),
            },
            Tag::Image {
                dest_url, title, ..
            } => Frame::Image {
                url: dest_url.into_string(),
                title: title.into_string(),
                alt: String::new(),
            },
            _ => Frame::Transparent,
        };
        self.stack.push(Open::new(frame));
    }

    fn end(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some(open) = self.stack.pop() else {
            return;
        };
        let Open {
            frame,
            children,
            cells,
        } = open;
        let node = match frame {
            Frame::Root => return,
            Frame::Paragraph => Node::Paragraph { children },
            Frame::Heading { level, id } => Node::Heading {
                level,
                id,
                children,
            },
            Frame::BlockQuote => Node::BlockQuote { children },
            Frame::List { start } => Node::List {
                ordered: start.is_some(),
                start: start.filter(|&n| n != 1),
                items: children,
            },
            Frame::Item { checked } => Node::ListItem { checked, children },
            Frame::CodeBlock { lang, code } => Node::CodeBlock { lang, code },
            Frame::HtmlBlock { markup } => Node::Html {
                markup,
                block: true,
            },
            Frame::FootnoteDefinition { label } => Node::FootnoteDefinition { label, children },
            Frame::Table {
                alignments,
                header,
                rows,
            } => finish_table(alignments, header, rows),
            Frame::TableHead => {
                if let Frame::Table { header, .. } = &mut self.top().frame {
                    *header = cells;
                }
                return;
            }
            Frame::TableRow => {
                if let Frame::Table { rows, .. } = &mut self.top().frame {
                    rows.push(cells);
                }
                return;
            }
            Frame::TableCell => {
                self.top().cells.push(TableCell {
                    alignment: Alignment::None,
                    children,
                });
                return;
            }
            Frame::Emphasis => Node::Emphasis { children },
            Frame::Strong => Node::Strong { children },
            Frame::Strikethrough => Node::Strikethrough { children },
            Frame::Link { url, title } => Node::Link {
                url,
                title,
                children,
            },
            Frame::Image { url, title, alt } => Node::Image { url, title, alt },
            Frame::Transparent => {
                for child in children {
                    self.push_node(child);
                }
                return;
            }
        };
        self.push_node(node);
    }
}

/// Fix every row to the header's width and stamp column alignment onto each
/// cell.
fn finish_table(
    alignments: Vec<Alignment>,
    mut header: Vec<TableCell>,
    mut rows: Vec<Vec<TableCell>>,
) -> Node {
    let columns = header.len();
    let alignment_of = |column: usize| alignments.get(column).copied().unwrap_or_default();

    for (column, cell) in header.iter_mut().enumerate() {
        cell.alignment = alignment_of(column);
    }
    for (index, row) in rows.iter_mut().enumerate() {
        if row.len() > columns {
            tracing::debug!(row = index, cells = row.len(), columns, "truncating table row");
            row.truncate(columns);
        }
        while row.len() < columns {
            row.push(TableCell {
                alignment: Alignment::None,
                children: Vec::new(),
            });
        }
        for (column, cell) in row.iter_mut().enumerate() {
            cell.alignment = alignment_of(column);
        }
    }

    let mut alignments = alignments;
    alignments.resize(columns, Alignment::None);
    Node::Table {
        alignments,
        header,
        rows,
    }
}
