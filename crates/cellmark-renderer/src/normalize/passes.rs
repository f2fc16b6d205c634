//! The individual repair passes. Each one is a pure `&str -> String`
//! function and is idempotent on its own.

use regex::Regex;
use std::sync::LazyLock;

use super::lines::{
    Fence, ListMarker, closes_fence, fence_open, indent_width, is_alert_marker, is_blank,
    is_heading, is_rule, is_setext_dashes, list_marker, map_prose_lines,
};
use crate::entities::decode_entities_fully;

static BULLET_GLYPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)[•●◦○][ \t]*(?P<rest>.*)$").unwrap()
});

static ORDERED_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)(?P<num>\d{1,9})[.)](?P<rest>.*)$").unwrap()
});

pub fn decode_entities(text: &str) -> String {
    decode_entities_fully(text).into_owned()
}

pub fn unify_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// `• item` → `- item`
pub fn canonicalize_bullets(text: &str) -> String {
    map_prose_lines(text, |line| {
        let caps = BULLET_GLYPH_RE.captures(line)?;
        let indent = &caps["indent"];
        let rest = caps["rest"].trim_end();
        if rest.is_empty() {
            Some(format!("{indent}-"))
        } else {
            Some(format!("{indent}- {rest}"))
        }
    })
}

/// `3)item`, `3.item`, `3)   item` → `3. item`
pub fn canonicalize_ordered_markers(text: &str) -> String {
    map_prose_lines(text, |line| {
        let caps = ORDERED_MARKER_RE.captures(line)?;
        let rest = &caps["rest"];
        let content = rest.trim_start();
        // `3.14` is a number, and a bare `3.` has nothing to list.
        if content.is_empty() || rest.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let canonical = format!("{}{}. {}", &caps["indent"], &caps["num"], content);
        (canonical != line).then_some(canonical)
    })
}

/// Blank lines around fences and rules, before the first item of a list run,
/// and none between consecutive items of one run. Dashes directly under
/// paragraph text underline a heading and are left where they are.
pub fn separate_blocks(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut fence: Option<Fence> = None;
    let mut pending_blanks: Vec<&str> = Vec::new();
    // Open list runs, outermost first. Non-empty means we are inside a list.
    let mut runs: Vec<ListMarker> = Vec::new();
    let mut last_was_item = false;
    let mut need_blank_after = false;
    // The previous line is paragraph text outside any list.
    let mut in_paragraph = false;

    for line in text.split('\n') {
        if let Some(open) = fence {
            if closes_fence(line, &open) {
                fence = None;
                need_blank_after = true;
            }
            out.push(line);
            continue;
        }
        if is_blank(line) {
            pending_blanks.push(line);
            in_paragraph = false;
            continue;
        }

        let had_blanks = !pending_blanks.is_empty();
        let opens_fence = fence_open(line);
        let underline = in_paragraph && is_setext_dashes(line);
        let rule = opens_fence.is_none() && !underline && is_rule(line);
        let marker = if opens_fence.is_none() && !rule {
            // Outside a list, a deeply indented marker is code or lazy text.
            list_marker(line).filter(|m| m.indent < 4 || !runs.is_empty())
        } else {
            None
        };

        let mut separate = need_blank_after || opens_fence.is_some() || rule;
        let mut collapse = false;

        match marker {
            Some(item) => {
                while runs.last().is_some_and(|top| top.indent > item.indent) {
                    runs.pop();
                }
                let continues = runs.last() == Some(&item);
                let nested = !continues && runs.last().is_some_and(|top| top.indent < item.indent);
                if continues {
                    collapse = had_blanks && last_was_item;
                } else {
                    if !nested {
                        separate = true;
                        if runs.last().is_some_and(|top| top.indent == item.indent) {
                            runs.pop();
                        }
                    }
                    runs.push(item);
                }
                last_was_item = true;
            }
            None => {
                let interrupts = opens_fence.is_some()
                    || rule
                    || is_heading(line)
                    || is_alert_marker(line);
                let leaves_list = had_blanks
                    && runs
                        .last()
                        .is_none_or(|top| indent_width(line) <= top.indent);
                if interrupts || leaves_list {
                    runs.clear();
                }
                last_was_item = false;
            }
        }

        if collapse {
            pending_blanks.clear();
        }
        let blank_before = !pending_blanks.is_empty();
        out.append(&mut pending_blanks);
        if separate && !blank_before && !out.is_empty() {
            out.push("");
        }
        out.push(line);
        need_blank_after = rule;
        if opens_fence.is_some() {
            fence = opens_fence;
        }
        let indented_code = indent_width(line) >= 4 && (had_blanks || !in_paragraph);
        in_paragraph = marker.is_none()
            && runs.is_empty()
            && !underline
            && !rule
            && opens_fence.is_none()
            && !indented_code
            && !is_heading(line)
            && !is_alert_marker(line);
    }
    out.append(&mut pending_blanks);
    out.join("\n")
}

/// Surround each `[!TYPE] ...` span with blank lines. A span runs to the next
/// blank line, alert marker or fence.
pub fn isolate_alerts(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut fence: Option<Fence> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;
        if let Some(open) = fence {
            if closes_fence(line, &open) {
                fence = None;
            }
            out.push(line);
            continue;
        }
        if let Some(open) = fence_open(line) {
            fence = Some(open);
            out.push(line);
            continue;
        }
        if !is_alert_marker(line) {
            out.push(line);
            continue;
        }

        if out.last().is_some_and(|prev| !is_blank(prev)) {
            out.push("");
        }
        out.push(line);
        while i < lines.len()
            && !is_blank(lines[i])
            && !is_alert_marker(lines[i])
            && fence_open(lines[i]).is_none()
        {
            out.push(lines[i]);
            i += 1;
        }
        if i < lines.len() && !is_blank(lines[i]) {
            out.push("");
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings() {
        assert_eq!(unify_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn bullet_glyphs() {
        assert_eq!(
            canonicalize_bullets("• one\n  ●two\n◦ three\n○\nnot • here"),
            "- one\n  - two\n- three\n-\nnot • here"
        );
    }

    #[test]
    fn bullet_glyphs_inside_code_are_kept() {
        let text = "```\n• literal\n```";
        assert_eq!(canonicalize_bullets(text), text);
    }

    #[test]
    fn ordered_markers() {
        assert_eq!(
            canonicalize_ordered_markers("1)first\n2.second\n  10)   third\n4. fine"),
            "1. first\n2. second\n  10. third\n4. fine"
        );
    }

    #[test]
    fn ordered_markers_skip_decimals_and_bare_numbers() {
        let text = "3.14 is pi\n2.\n7)";
        assert_eq!(canonicalize_ordered_markers(text), text);
    }

    #[test]
    fn blank_line_before_first_item() {
        assert_eq!(
            separate_blocks("Shopping:\n- eggs\n- milk"),
            "Shopping:\n\n- eggs\n- milk"
        );
    }

    #[test]
    fn blank_lines_between_items_collapse() {
        assert_eq!(
            separate_blocks("1. a\n\n2. b\n\n\n3. c"),
            "1. a\n2. b\n3. c"
        );
    }

    #[test]
    fn blank_lines_after_continuation_are_kept() {
        let text = "- a\n\n  more about a\n\n- b";
        assert_eq!(separate_blocks(text), text);
    }

    #[test]
    fn nested_items_get_no_separator() {
        let text = "- a\n  - nested\n- b";
        assert_eq!(separate_blocks(text), text);
    }

    #[test]
    fn marker_change_starts_a_new_run() {
        assert_eq!(separate_blocks("- a\n1. b"), "- a\n\n1. b");
    }

    #[test]
    fn lazy_continuation_stays_in_the_list() {
        let text = "- a\nlazy\n- b";
        assert_eq!(separate_blocks(text), text);
    }

    #[test]
    fn fences_and_rules_are_separated() {
        assert_eq!(
            separate_blocks("text\n```\n- not a list\n\n- still code\n```\nafter\n* * *\nend"),
            "text\n\n```\n- not a list\n\n- still code\n```\n\nafter\n\n* * *\n\nend"
        );
    }

    #[test]
    fn setext_underline_is_not_a_rule() {
        let text = "Title\n---\nbody";
        assert_eq!(separate_blocks(text), text);
        assert_eq!(separate_blocks("Title\n\n---\nbody"), "Title\n\n---\n\nbody");
        assert_eq!(separate_blocks("- item\n---"), "- item\n\n---");
        assert_eq!(separate_blocks("# Head\n---"), "# Head\n\n---");
    }

    #[test]
    fn table_delimiter_row_stays_under_its_header() {
        let text = "a | b\n- | -\n1 | 2";
        assert_eq!(separate_blocks(text), text);
    }

    #[test]
    fn indented_code_keeps_its_markers() {
        let text = "para\n\n    1)code\n    • dot";
        assert_eq!(canonicalize_ordered_markers(text), text);
        assert_eq!(canonicalize_bullets(text), text);
        assert_eq!(
            canonicalize_ordered_markers("- a\n\n    1)b"),
            "- a\n\n    1. b"
        );
    }

    #[test]
    fn deeply_indented_marker_outside_list_is_text() {
        let text = "para\n    - not an item";
        assert_eq!(separate_blocks(text), text);
    }

    #[test]
    fn trailing_newline_survives() {
        assert_eq!(separate_blocks("a\n- b\n"), "a\n\n- b\n");
    }

    #[test]
    fn alert_span_is_isolated() {
        assert_eq!(
            isolate_alerts("before\n[!NOTE] heads up\nstill note\nafter? no\n\nnext"),
            "before\n\n[!NOTE] heads up\nstill note\nafter? no\n\nnext"
        );
    }

    #[test]
    fn consecutive_alerts_are_split() {
        assert_eq!(
            isolate_alerts("[!TIP] one\n[!caution] two"),
            "[!TIP] one\n\n[!caution] two"
        );
    }

    #[test]
    fn alert_markers_in_code_are_ignored() {
        let text = "```\nx\n[!NOTE] y\n```";
        assert_eq!(isolate_alerts(text), text);
    }
}
