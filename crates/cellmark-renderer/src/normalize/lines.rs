//! Line-level block classification shared by the repair passes and the
//! extension scanner.

use regex::Regex;
use std::sync::LazyLock;

pub static ALERT_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[ \t]{0,3}\[!(note|tip|important|warning|caution)\]").unwrap()
});

static ORDERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(\d{1,9})[.)][ \t]+\S").unwrap());

static BULLET_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*([-*+])[ \t]+\S").unwrap());

static RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$").unwrap()
});

static TABLE_DELIMITER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*\|?[ \t]*:?-+:?[ \t]*(?:\|[ \t]*:?-+:?[ \t]*)+\|?[ \t]*$").unwrap()
});

static SETEXT_DASHES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}-+[ \t]*$").unwrap());

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,6}(?:[ \t]|$)").unwrap());

/// An open code fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    pub marker: char,
    pub len: usize,
}

/// Column width of the leading whitespace, tabs rounding up to the next
/// multiple of four.
pub fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4 - (width % 4),
            _ => break,
        }
    }
    width
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub fn fence_open(line: &str) -> Option<Fence> {
    if indent_width(line) > 3 {
        return None;
    }
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&c| c == marker).count();
    if len < 3 {
        return None;
    }
    // A backtick fence's info string cannot itself contain backticks.
    if marker == '`' && trimmed[len..].contains('`') {
        return None;
    }
    Some(Fence { marker, len })
}

pub fn closes_fence(line: &str, fence: &Fence) -> bool {
    if indent_width(line) > 3 {
        return false;
    }
    let trimmed = line.trim_start();
    let len = trimmed.chars().take_while(|&c| c == fence.marker).count();
    len >= fence.len && trimmed[len * fence.marker.len_utf8()..].trim().is_empty()
}

pub fn is_rule(line: &str) -> bool {
    RULE_RE.is_match(line)
}

/// `- | :-:` and the like: the row under a table header.
pub fn is_table_delimiter(line: &str) -> bool {
    TABLE_DELIMITER_RE.is_match(line)
}

/// A run of dashes that would underline a paragraph line as a level 2
/// heading.
pub fn is_setext_dashes(line: &str) -> bool {
    SETEXT_DASHES_RE.is_match(line)
}

pub fn is_heading(line: &str) -> bool {
    HEADING_RE.is_match(line)
}

pub fn is_alert_marker(line: &str) -> bool {
    ALERT_MARKER_RE.is_match(line)
}

/// A list item marker with content after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListMarker {
    /// `-`, `*` or `+` for bullets, `.` or `)` for ordered items.
    pub kind: char,
    pub indent: usize,
}

pub fn list_marker(line: &str) -> Option<ListMarker> {
    if is_rule(line) || is_table_delimiter(line) {
        return None;
    }
    let indent = indent_width(line);
    if let Some(caps) = BULLET_ITEM_RE.captures(line) {
        let kind = caps.get(1)?.as_str().chars().next()?;
        return Some(ListMarker { kind, indent });
    }
    if let Some(caps) = ORDERED_ITEM_RE.captures(line) {
        let number = caps.get(1)?;
        let kind = line[number.end()..].chars().next()?;
        return Some(ListMarker { kind, indent });
    }
    None
}

/// Apply `f` to every line outside code. Fence lines, fenced content and
/// indented code blocks pass through untouched.
pub fn map_prose_lines(text: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut fence: Option<Fence> = None;
    let mut indented_code = false;
    // An indented code block may start here: after a blank line or a block
    // that cannot continue, like a heading.
    let mut after_blank = true;
    // Indent of the outermost open list item.
    let mut list: Option<usize> = None;
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if let Some(open) = fence {
            if closes_fence(line, &open) {
                fence = None;
                after_blank = true;
            }
            out.push_str(line);
            continue;
        }
        if is_blank(line) {
            after_blank = true;
            out.push_str(line);
            continue;
        }
        let indent = indent_width(line);
        let was_after_blank = std::mem::replace(&mut after_blank, false);
        if indent >= 4 && (indented_code || (was_after_blank && list.is_none())) {
            indented_code = true;
            out.push_str(line);
            continue;
        }
        indented_code = false;

        if let Some(open) = fence_open(line) {
            fence = Some(open);
            list = None;
            out.push_str(line);
            continue;
        }
        match list_marker(line) {
            Some(item) if item.indent < 4 || list.is_some() => {
                list = Some(list.map_or(item.indent, |outer| outer.min(item.indent)));
            }
            _ => {
                let leaves = was_after_blank && list.is_some_and(|outer| indent <= outer);
                if is_heading(line) || is_rule(line) {
                    list = None;
                    after_blank = true;
                } else if leaves {
                    list = None;
                }
            }
        }
        match f(line) {
            Some(replaced) => out.push_str(&replaced),
            None => out.push_str(line),
        }
    }
    out
}
