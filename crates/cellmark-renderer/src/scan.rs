//! Pre-parse scanning for math delimiters and custom syntax extensions.
//!
//! Matched spans are cut out of the text and replaced by placeholders, so
//! CommonMark never sees their contents. After parsing, placeholders in
//! ordinary text become [`Node::Math`](crate::types::Node::Math) or
//! [`Node::Extension`](crate::types::Node::Extension) nodes, and placeholders
//! that ended up in code, URLs or attributes get their source text back.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::extension::SyntaxExtension;
use crate::normalize::lines::{closes_fence, fence_open};

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SpanKind {
    Math {
        display: bool,
        tex: String,
    },
    Extension {
        index: usize,
        payload: String,
        block: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    /// The text as written, delimiters included.
    pub source: String,
    pub kind: SpanKind,
}

#[derive(Debug, Default)]
pub(crate) struct Extracted {
    pub text: String,
    pub spans: Vec<Span>,
}

pub(crate) enum Piece<'a> {
    Text(&'a str),
    Span(usize),
}

/// Byte ranges of fenced code blocks, fence lines included.
fn fenced_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        match open {
            Some((fence, start)) => {
                if closes_fence(content, &fence) {
                    ranges.push((start, offset + line.len()));
                    open = None;
                }
            }
            None => {
                if let Some(fence) = fence_open(content) {
                    open = Some((fence, offset));
                }
            }
        }
        offset += line.len();
    }
    if let Some((_, start)) = open {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Offset of the first blank line at or after `from`, or the end of text.
fn paragraph_end(text: &str, from: usize) -> usize {
    let mut offset = from;
    let mut first = true;
    for line in text[from..].split_inclusive('\n') {
        if !first && line.trim().is_empty() {
            return offset;
        }
        first = false;
        offset += line.len();
    }
    text.len()
}

/// A backtick run at `at`. Returns where scanning resumes: after the closing
/// run if the code span is closed, otherwise after the opening run.
fn skip_code_span(text: &str, at: usize) -> usize {
    let run = text[at..].bytes().take_while(|&b| b == b'`').count();
    let limit = paragraph_end(text, at);
    let mut i = at + run;
    while i < limit {
        let Some(offset) = text[i..limit].find('`') else {
            break;
        };
        let start = i + offset;
        let len = text[start..limit].bytes().take_while(|&b| b == b'`').count();
        if len == run {
            return start + len;
        }
        i = start + len;
    }
    at + run
}

/// Find `close` after `from`, skipping backslash escapes other than the
/// closer itself. Gives up at `limit`.
fn find_closer(text: &str, from: usize, limit: usize, close: &str) -> Option<usize> {
    let mut i = from;
    while i < limit {
        let rest = &text[i..limit];
        if rest.starts_with(close) {
            return Some(i);
        }
        let c = rest.chars().next()?;
        if c == '\\' {
            let next = rest[1..].chars().next().map_or(0, char::len_utf8);
            i += 1 + next;
        } else {
            i += c.len_utf8();
        }
    }
    None
}

struct Scanner<'a> {
    text: &'a str,
    extensions: &'a [Arc<dyn SyntaxExtension>],
    fenced: Vec<(usize, usize)>,
    spans: Vec<(usize, usize, Span)>,
}

impl<'a> Scanner<'a> {
    /// Start of the next fenced block after `at`. Spans never reach into code.
    fn fence_boundary(&self, at: usize) -> usize {
        self.fenced
            .iter()
            .map(|&(start, _)| start)
            .find(|&start| start > at)
            .unwrap_or(self.text.len())
    }

    fn fenced_block_at(&self, at: usize) -> Option<usize> {
        self.fenced
            .iter()
            .find(|&&(start, end)| start <= at && at < end)
            .map(|&(_, end)| end)
    }

    fn push_math(&mut self, start: usize, end: usize, display: bool, tex: &str) {
        self.spans.push((
            start,
            end,
            Span {
                source: self.text[start..end].to_owned(),
                kind: SpanKind::Math {
                    display,
                    tex: tex.trim().to_owned(),
                },
            },
        ));
    }

    /// `open ... close` with a non-empty body. Returns the end offset.
    fn delimited(
        &mut self,
        at: usize,
        open: &str,
        close: &str,
        display: bool,
        limit: usize,
    ) -> Option<usize> {
        let body_start = at + open.len();
        let close_at = find_closer(self.text, body_start, limit, close)?;
        let tex = &self.text[body_start..close_at];
        if tex.trim().is_empty() {
            return None;
        }
        let end = close_at + close.len();
        self.push_math(at, end, display, tex);
        Some(end)
    }

    /// A single `$`. Spans with a line break inside are display math; the
    /// rest follow the pandoc rules: no space just inside either delimiter and
    /// no digit right after the closing one.
    fn single_dollar(&mut self, at: usize) -> Option<usize> {
        let limit = paragraph_end(self.text, at).min(self.fence_boundary(at));
        let body_start = at + 1;
        let close_at = find_closer(self.text, body_start, limit, "$")?;
        let tex = &self.text[body_start..close_at];
        if tex.trim().is_empty() {
            return None;
        }
        let end = close_at + 1;
        if tex.contains('\n') {
            self.push_math(at, end, true, tex);
            return Some(end);
        }
        let opens_tight = !tex.starts_with(char::is_whitespace);
        let closes_tight = !tex.ends_with(char::is_whitespace);
        let digit_after = self.text[end..].starts_with(|c: char| c.is_ascii_digit());
        if !opens_tight || !closes_tight || digit_after {
            return None;
        }
        self.push_math(at, end, false, tex);
        Some(end)
    }

    fn try_extensions(&mut self, at: usize, c: char) -> Option<usize> {
        let limit = self.fence_boundary(at);
        for (index, extension) in self.extensions.iter().enumerate() {
            if !extension.triggers().contains(&c) {
                continue;
            }
            let Some(found) = extension.scan(self.text, at) else {
                continue;
            };
            if found.end <= at || found.end > limit || !self.text.is_char_boundary(found.end) {
                tracing::debug!(
                    extension = extension.name(),
                    at,
                    end = found.end,
                    "ignoring out of range extension match"
                );
                continue;
            }
            let span = Span {
                source: self.text[at..found.end].to_owned(),
                kind: SpanKind::Extension {
                    index,
                    payload: found.payload,
                    block: found.block,
                },
            };
            self.spans.push((at, found.end, span));
            return Some(found.end);
        }
        None
    }

    fn run(&mut self) {
        let len = self.text.len();
        let mut i = 0;
        while i < len {
            if let Some(end) = self.fenced_block_at(i) {
                i = end;
                continue;
            }
            let Some(c) = self.text[i..].chars().next() else {
                break;
            };
            if c == '`' {
                i = skip_code_span(self.text, i);
                continue;
            }
            let text = self.text;
            let rest = &text[i..];
            let matched = match c {
                '\\' if rest.starts_with("\\$") => None,
                '\\' if rest.starts_with("\\[") => {
                    let limit = self.fence_boundary(i);
                    self.delimited(i, "\\[", "\\]", true, limit)
                }
                '\\' if rest.starts_with("\\(") => {
                    let limit = paragraph_end(self.text, i).min(self.fence_boundary(i));
                    self.delimited(i, "\\(", "\\)", false, limit)
                }
                '$' if rest.starts_with("$$") => {
                    let limit = self.fence_boundary(i);
                    self.delimited(i, "$$", "$$", true, limit)
                }
                '$' => self.single_dollar(i),
                _ => None,
            };
            // Host extensions only see positions math did not claim.
            let matched = matched.or_else(|| self.try_extensions(i, c));
            i = match matched {
                Some(end) => end,
                None if c == '\\' => {
                    // Skip the escaped character too.
                    let next = rest[1..].chars().next().map_or(0, char::len_utf8);
                    i + 1 + next
                }
                None if rest.starts_with("$$") => i + 2,
                None => i + c.len_utf8(),
            };
        }
    }
}

/// Cut math and extension spans out of `text`.
pub(crate) fn extract(text: &str, extensions: &[Arc<dyn SyntaxExtension>]) -> Extracted {
    // Stray placeholder characters in the input would be misread later.
    let cleaned;
    let text = if text.contains([OPEN, CLOSE]) {
        cleaned = text.replace([OPEN, CLOSE], "\u{FFFD}");
        cleaned.as_str()
    } else {
        text
    };

    let mut scanner = Scanner {
        text,
        extensions,
        fenced: fenced_ranges(text),
        spans: Vec::new(),
    };
    scanner.run();

    let mut out = String::with_capacity(text.len());
    let mut spans = Vec::with_capacity(scanner.spans.len());
    let mut last = 0;
    for (index, (start, end, span)) in scanner.spans.into_iter().enumerate() {
        out.push_str(&text[last..start]);
        out.push(OPEN);
        out.push_str(&index.to_string());
        out.push(CLOSE);
        spans.push(span);
        last = end;
    }
    out.push_str(&text[last..]);
    Extracted { text: out, spans }
}

pub(crate) fn has_placeholder(text: &str) -> bool {
    text.contains(OPEN)
}

/// Split text around placeholders. Placeholder indices without a matching
/// span are kept as text.
pub(crate) fn split_placeholders(text: &str, span_count: usize) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(index) = digits.as_str().parse::<usize>() else {
            continue;
        };
        if index >= span_count {
            continue;
        }
        if whole.start() > last {
            pieces.push(Piece::Text(&text[last..whole.start()]));
        }
        pieces.push(Piece::Span(index));
        last = whole.end();
    }
    if last < text.len() {
        pieces.push(Piece::Text(&text[last..]));
    }
    pieces
}

/// Put the original source back in place of every placeholder.
pub(crate) fn restore(text: &str, spans: &[Span]) -> String {
    if !has_placeholder(text) {
        return text.to_owned();
    }
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| spans.get(index))
                .map(|span| span.source.clone())
                .unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}
