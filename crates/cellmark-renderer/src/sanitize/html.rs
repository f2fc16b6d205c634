//! A small tolerant tokenizer that re-emits only allowlisted markup.
//!
//! Output is canonical: tag and attribute names in their allowlist spelling,
//! attribute values double-quoted, text and values decoded then re-escaped.
//! Feeding the output back in yields the same output.

use super::{DIAGRAM_SVG_STYLE, SanitizerPolicy, is_denied_tag, is_safe_style, is_safe_url};
use crate::entities::{canonical_attr, canonical_text};

use super::allowlist::URL_ATTRIBUTES;

struct Attribute<'a> {
    name: &'a str,
    value: Option<&'a str>,
}

struct Tag<'a> {
    name: &'a str,
    attributes: Vec<Attribute<'a>>,
    self_closing: bool,
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b':' || c == b'_'
}

/// Tag name starting at `at`. Returns the name and the offset after it.
fn read_name(input: &str, at: usize) -> (&str, usize) {
    let len = input[at..].bytes().take_while(|&b| is_name_char(b)).count();
    (&input[at..at + len], at + len)
}

fn skip_whitespace(input: &str, at: usize) -> usize {
    at + input[at..]
        .bytes()
        .take_while(|b| b.is_ascii_whitespace())
        .count()
}

/// Parse a start tag's attributes, beginning right after the tag name.
/// Returns `None` if the tag is never closed with `>`.
fn read_start_tag<'a>(input: &'a str, name: &'a str, mut i: usize) -> Option<(Tag<'a>, usize)> {
    let bytes = input.as_bytes();
    let mut attributes = Vec::new();
    loop {
        i = skip_whitespace(input, i);
        match bytes.get(i)? {
            b'>' => {
                return Some((
                    Tag {
                        name,
                        attributes,
                        self_closing: false,
                    },
                    i + 1,
                ));
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Some((
                    Tag {
                        name,
                        attributes,
                        self_closing: true,
                    },
                    i + 2,
                ));
            }
            b'/' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let name_len = input[i..]
            .bytes()
            .take_while(|&b| !b.is_ascii_whitespace() && b != b'=' && b != b'>' && b != b'/')
            .count();
        let attr_name = &input[i..i + name_len];
        i = skip_whitespace(input, i + name_len);
        let mut value = None;
        if bytes.get(i) == Some(&b'=') {
            i = skip_whitespace(input, i + 1);
            match bytes.get(i)? {
                quote @ (b'"' | b'\'') => {
                    let close = input[i + 1..].find(*quote as char)?;
                    value = Some(&input[i + 1..i + 1 + close]);
                    i += close + 2;
                }
                _ => {
                    let len = input[i..]
                        .bytes()
                        .take_while(|&b| !b.is_ascii_whitespace() && b != b'>')
                        .count();
                    value = Some(&input[i..i + len]);
                    i += len;
                }
            }
        }
        if !attr_name.is_empty() {
            attributes.push(Attribute {
                name: attr_name,
                value,
            });
        }
    }
}

/// Offset just past the `</name ...>` closing a raw-text element, or the end
/// of input if it is never closed.
fn skip_raw_text(input: &str, name: &str, from: usize) -> usize {
    let needle = format!("</{}", name.to_ascii_lowercase());
    let haystack = input[from..].to_ascii_lowercase();
    match haystack.find(&needle) {
        Some(offset) => {
            let after = from + offset + needle.len();
            input[after..]
                .find('>')
                .map_or(input.len(), |close| after + close + 1)
        }
        None => input.len(),
    }
}

struct Cleaner<'p> {
    policy: &'p SanitizerPolicy,
    out: String,
    /// Raw text not yet written. Text on both sides of a dropped tag is
    /// escaped as one run, so entities split by the tag stay consistent.
    pending: String,
    force_svg_style: bool,
    svg_depth: usize,
}

impl Cleaner<'_> {
    fn text(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.out.push_str(&canonical_text(&self.pending));
            self.pending.clear();
        }
    }

    fn start_tag(&mut self, tag: &Tag<'_>) {
        let policy = self.policy;
        let Some(name) = policy.tag(tag.name) else {
            tracing::trace!(tag = tag.name, "unwrapping disallowed tag");
            return;
        };
        self.flush();
        let root_svg = self.force_svg_style && name == "svg" && self.svg_depth == 0;
        if name == "svg" && !tag.self_closing {
            self.svg_depth += 1;
        }

        self.out.push('<');
        self.out.push_str(name);
        let mut seen: Vec<&str> = Vec::with_capacity(tag.attributes.len());
        for attribute in &tag.attributes {
            let Some(attr) = policy.attribute(name, attribute.name) else {
                tracing::trace!(tag = name, attribute = attribute.name, "dropping attribute");
                continue;
            };
            if seen.contains(&attr) || (root_svg && attr == "style") {
                continue;
            }
            let value = attribute.value.unwrap_or("");
            if URL_ATTRIBUTES.contains(&attr) && !is_safe_url(value, name == "img") {
                tracing::trace!(tag = name, attribute = attr, "dropping unsafe url");
                continue;
            }
            if attr == "style" && !is_safe_style(value) {
                tracing::trace!(tag = name, "dropping unsafe style");
                continue;
            }
            seen.push(attr);
            self.out.push(' ');
            self.out.push_str(attr);
            self.out.push_str("=\"");
            self.out.push_str(&canonical_attr(value));
            self.out.push('"');
        }
        if root_svg {
            self.out.push_str(" style=\"");
            self.out.push_str(DIAGRAM_SVG_STYLE);
            self.out.push('"');
        }
        self.out
            .push_str(if tag.self_closing { "/>" } else { ">" });
    }

    fn end_tag(&mut self, name: &str) {
        let policy = self.policy;
        let Some(name) = policy.tag(name) else {
            return;
        };
        self.flush();
        if name == "svg" {
            self.svg_depth = self.svg_depth.saturating_sub(1);
        }
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }
}

pub(super) fn clean(input: &str, policy: &SanitizerPolicy, force_svg_style: bool) -> String {
    let mut cleaner = Cleaner {
        policy,
        out: String::with_capacity(input.len()),
        pending: String::new(),
        force_svg_style,
        svg_depth: 0,
    };
    let bytes = input.as_bytes();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let rest = &input[i..];
        let next = bytes.get(i + 1).copied();

        // Comments, doctypes and processing instructions are dropped whole.
        let skip_to = if rest.starts_with("<!--") {
            Some(rest[4..].find("-->").map_or(input.len(), |end| i + 4 + end + 3))
        } else if matches!(next, Some(b'!') | Some(b'?')) {
            Some(rest.find('>').map_or(input.len(), |end| i + end + 1))
        } else {
            None
        };
        if let Some(end) = skip_to {
            cleaner.text(&input[text_start..i]);
            tracing::trace!("dropping comment or declaration");
            i = end;
            text_start = i;
            continue;
        }

        if next == Some(b'/') && bytes.get(i + 2).is_some_and(u8::is_ascii_alphabetic) {
            let (name, after) = read_name(input, i + 2);
            if let Some(close) = input[after..].find('>') {
                cleaner.text(&input[text_start..i]);
                cleaner.end_tag(name);
                i = after + close + 1;
                text_start = i;
                continue;
            }
        } else if next.is_some_and(|b| b.is_ascii_alphabetic()) {
            let (name, after) = read_name(input, i + 1);
            if let Some((tag, end)) = read_start_tag(input, name, after) {
                cleaner.text(&input[text_start..i]);
                if is_denied_tag(name) {
                    tracing::trace!(tag = name, "removing denylisted element");
                    i = if tag.self_closing {
                        end
                    } else {
                        skip_raw_text(input, name, end)
                    };
                } else {
                    cleaner.start_tag(&tag);
                    i = end;
                }
                text_start = i;
                continue;
            }
        }

        // A stray `<` is text.
        i += 1;
    }
    cleaner.text(&input[text_start..]);
    cleaner.flush();
    cleaner.out
}
