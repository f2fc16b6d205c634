//! HTML serialization of a sanitized [`RenderTree`].

use std::collections::HashMap;

use pulldown_cmark_escape::{StrWrite, escape_href, escape_html, escape_html_body_text};
use smol_str::SmolStr;

use crate::types::{AlertKind, Alignment, Node, RenderTree, TableCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    Head,
    Body,
}

pub struct HtmlWriter<W: StrWrite> {
    writer: W,
    /// Whether or not the last write wrote a newline.
    end_newline: bool,
    /// Footnote labels in order of first appearance.
    numbers: HashMap<SmolStr, usize>,
}

impl<W: StrWrite> HtmlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            end_newline: true,
            numbers: HashMap::new(),
        }
    }

    pub fn run(mut self, tree: &RenderTree) -> Result<W, W::Error> {
        self.write_nodes(&tree.children)?;
        Ok(self.writer)
    }

    /// Writes a new line.
    #[inline]
    fn write_newline(&mut self) -> Result<(), W::Error> {
        self.end_newline = true;
        self.writer.write_str("\n")
    }

    /// Writes a buffer, and tracks whether or not a newline was written.
    #[inline]
    fn write(&mut self, s: &str) -> Result<(), W::Error> {
        self.writer.write_str(s)?;

        if !s.is_empty() {
            self.end_newline = s.ends_with('\n');
        }
        Ok(())
    }

    /// Start a block element on a fresh line.
    fn block_start(&mut self, s: &str) -> Result<(), W::Error> {
        if !self.end_newline {
            self.write_newline()?;
        }
        self.write(s)
    }

    fn text(&mut self, text: &str) -> Result<(), W::Error> {
        escape_html_body_text(&mut self.writer, text)?;
        if !text.is_empty() {
            self.end_newline = text.ends_with('\n');
        }
        Ok(())
    }

    fn attr(&mut self, value: &str) -> Result<(), W::Error> {
        escape_html(&mut self.writer, value)
    }

    fn footnote_number(&mut self, label: &SmolStr) -> usize {
        let next = self.numbers.len() + 1;
        *self.numbers.entry(label.clone()).or_insert(next)
    }

    fn write_nodes(&mut self, nodes: &[Node]) -> Result<(), W::Error> {
        for node in nodes {
            self.write_node(node)?;
        }
        Ok(())
    }

    fn write_node(&mut self, node: &Node) -> Result<(), W::Error> {
        match node {
            Node::Heading {
                level,
                id,
                children,
            } => {
                self.block_start("<")?;
                write!(&mut self.writer, "h{}", level)?;
                if let Some(id) = id {
                    self.write(" id=\"")?;
                    self.attr(id)?;
                    self.write("\"")?;
                }
                self.write(">")?;
                self.write_nodes(children)?;
                write!(&mut self.writer, "</h{}>", level)?;
                self.write_newline()
            }
            Node::Paragraph { children } => {
                self.block_start("<p>")?;
                self.write_nodes(children)?;
                self.write("</p>\n")
            }
            Node::BlockQuote { children } => {
                self.block_start("<blockquote>\n")?;
                self.write_nodes(children)?;
                self.block_start("</blockquote>\n")
            }
            Node::List {
                ordered,
                start,
                items,
            } => {
                match (ordered, start) {
                    (true, Some(start)) => {
                        self.block_start("<ol start=\"")?;
                        write!(&mut self.writer, "{}", start)?;
                        self.write("\">\n")?;
                    }
                    (true, None) => self.block_start("<ol>\n")?,
                    (false, _) => self.block_start("<ul>\n")?,
                }
                self.write_nodes(items)?;
                self.block_start(if *ordered { "</ol>\n" } else { "</ul>\n" })
            }
            Node::ListItem { checked, children } => {
                self.block_start("<li>")?;
                match checked {
                    Some(true) => {
                        self.write("<input disabled=\"\" type=\"checkbox\" checked=\"\"/>\n")?
                    }
                    Some(false) => self.write("<input disabled=\"\" type=\"checkbox\"/>\n")?,
                    None => {}
                }
                self.write_nodes(children)?;
                self.write("</li>\n")
            }
            Node::CodeBlock { lang, code } => {
                match lang {
                    Some(lang) => {
                        self.block_start("<pre><code class=\"language-")?;
                        self.attr(lang)?;
                        self.write("\">")?;
                    }
                    None => self.block_start("<pre><code>")?,
                }
                self.text(code)?;
                self.write("</code></pre>\n")
            }
            Node::Math {
                display: true,
                markup,
                ..
            } => {
                self.block_start("<div class=\"math math-display\">")?;
                self.write(markup)?;
                self.write("</div>\n")
            }
            Node::Math {
                display: false,
                markup,
                ..
            } => {
                self.write("<span class=\"math math-inline\">")?;
                self.write(markup)?;
                self.write("</span>")
            }
            Node::Diagram {
                lang,
                source,
                markup,
            } => {
                if markup.is_empty() {
                    // No engine: leave the source for a client-side renderer.
                    self.block_start("<pre class=\"diagram diagram-")?;
                    self.attr(lang)?;
                    self.write("\"><code>")?;
                    self.text(source)?;
                    self.write("</code></pre>\n")
                } else {
                    self.block_start("<div class=\"diagram diagram-")?;
                    self.attr(lang)?;
                    self.write("\">")?;
                    self.write(markup)?;
                    self.write("</div>\n")
                }
            }
            Node::Alert {
                kind,
                title,
                children,
            } => {
                self.block_start("<div class=\"markdown-alert markdown-alert-")?;
                self.write(kind.as_str())?;
                self.write("\">\n<p class=\"markdown-alert-title\">")?;
                if title.is_empty() {
                    self.write(alert_label(*kind))?;
                } else {
                    self.write_nodes(title)?;
                }
                self.write("</p>\n")?;
                self.write_nodes(children)?;
                self.block_start("</div>\n")
            }
            Node::Table {
                alignments,
                header,
                rows,
            } => {
                self.block_start("<table><thead><tr>")?;
                self.write_row(header, alignments, TableState::Head)?;
                self.write("</tr></thead><tbody>\n")?;
                for row in rows {
                    self.write("<tr>")?;
                    self.write_row(row, alignments, TableState::Body)?;
                    self.write("</tr>\n")?;
                }
                self.write("</tbody></table>\n")
            }
            Node::Rule => self.block_start("<hr />\n"),
            Node::Html { markup, block } => {
                if *block {
                    self.block_start(markup)
                } else {
                    self.write(markup)
                }
            }
            Node::Link {
                url,
                title,
                children,
            } => {
                if url.is_empty() {
                    self.write("<a")?;
                } else {
                    self.write("<a href=\"")?;
                    escape_href(&mut self.writer, url)?;
                    self.write("\"")?;
                }
                if !title.is_empty() {
                    self.write(" title=\"")?;
                    self.attr(title)?;
                    self.write("\"")?;
                }
                self.write(">")?;
                self.write_nodes(children)?;
                self.write("</a>")
            }
            Node::Image { url, title, alt } => {
                self.write("<img src=\"")?;
                escape_href(&mut self.writer, url)?;
                self.write("\" alt=\"")?;
                self.attr(alt)?;
                if !title.is_empty() {
                    self.write("\" title=\"")?;
                    self.attr(title)?;
                }
                self.write("\" />")
            }
            Node::Emphasis { children } => self.wrap_inline("em", children),
            Node::Strong { children } => self.wrap_inline("strong", children),
            Node::Strikethrough { children } => self.wrap_inline("del", children),
            Node::Code { code } => {
                self.write("<code>")?;
                self.text(code)?;
                self.write("</code>")
            }
            Node::Text { text } => self.text(text),
            Node::SoftBreak => self.write_newline(),
            Node::HardBreak => self.write("<br />\n"),
            Node::FootnoteReference { label } => {
                let number = self.footnote_number(label);
                self.write("<sup class=\"footnote-reference\"><a href=\"#")?;
                self.attr(label)?;
                self.write("\">")?;
                write!(&mut self.writer, "{}", number)?;
                self.write("</a></sup>")
            }
            Node::FootnoteDefinition { label, children } => {
                let number = self.footnote_number(label);
                self.block_start("<div class=\"footnote-definition\" id=\"")?;
                self.attr(label)?;
                self.write("\"><sup class=\"footnote-definition-label\">")?;
                write!(&mut self.writer, "{}", number)?;
                self.write("</sup>\n")?;
                self.write_nodes(children)?;
                self.block_start("</div>\n")
            }
            Node::Extension {
                name,
                block,
                markup,
                ..
            } => {
                let element = if *block { "div" } else { "span" };
                if *block {
                    self.block_start("<")?;
                } else {
                    self.write("<")?;
                }
                self.write(element)?;
                self.write(" class=\"extension extension-")?;
                self.attr(name)?;
                self.write("\">")?;
                self.write(markup)?;
                self.write("</")?;
                self.write(element)?;
                self.write(">")?;
                if *block {
                    self.write_newline()?;
                }
                Ok(())
            }
            Node::Error {
                kind,
                message,
                source,
            } => {
                self.write("<span class=\"render-error render-error-")?;
                self.write(kind.as_str())?;
                self.write("\" title=\"")?;
                self.attr(message)?;
                self.write("\"><code>")?;
                self.text(source)?;
                self.write("</code></span>")
            }
        }
    }

    fn wrap_inline(&mut self, tag: &str, children: &[Node]) -> Result<(), W::Error> {
        write!(&mut self.writer, "<{}>", tag)?;
        self.write_nodes(children)?;
        write!(&mut self.writer, "</{}>", tag)?;
        self.end_newline = false;
        Ok(())
    }

    fn write_row(
        &mut self,
        cells: &[TableCell],
        alignments: &[Alignment],
        state: TableState,
    ) -> Result<(), W::Error> {
        let tag = match state {
            TableState::Head => "th",
            TableState::Body => "td",
        };
        for (index, cell) in cells.iter().enumerate() {
            write!(&mut self.writer, "<{}", tag)?;
            // Cells carry their column's alignment; fall back to the table's.
            let alignment = match cell.alignment {
                Alignment::None => alignments.get(index).copied().unwrap_or_default(),
                alignment => alignment,
            };
            match alignment.as_css() {
                Some(css) => write!(&mut self.writer, " style=\"text-align: {}\">", css)?,
                None => self.write(">")?,
            }
            self.write_nodes(&cell.children)?;
            write!(&mut self.writer, "</{}>", tag)?;
        }
        self.end_newline = false;
        Ok(())
    }
}

fn alert_label(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Note => "Note",
        AlertKind::Tip => "Tip",
        AlertKind::Important => "Important",
        AlertKind::Warning => "Warning",
        AlertKind::Caution => "Caution",
    }
}

/// Serialize a tree to HTML. Engine and raw markup is written as-is, so the
/// tree should have been through [`crate::sanitize`] first.
pub fn to_html(tree: &RenderTree) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = HtmlWriter::new(&mut out).run(tree);
    out
}
