//! HTML character references: decoding for the normalizer, and the
//! decode-then-escape canonical form the sanitizer relies on.

use std::borrow::Cow;

use pulldown_cmark_escape::{escape_html, escape_html_body_text};

const NAMED: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("copy", '©'),
    ("reg", '®'),
    ("trade", '™'),
    ("hellip", '…'),
    ("mdash", '—'),
    ("ndash", '–'),
    ("lsquo", '‘'),
    ("rsquo", '’'),
    ("ldquo", '“'),
    ("rdquo", '”'),
    ("bull", '•'),
    ("middot", '·'),
    ("times", '×'),
    ("divide", '÷'),
    ("deg", '°'),
    ("plusmn", '±'),
    ("para", '¶'),
    ("sect", '§'),
    ("laquo", '«'),
    ("raquo", '»'),
    ("euro", '€'),
    ("pound", '£'),
    ("yen", '¥'),
    ("cent", '¢'),
];

/// Longest reference we try to parse, including `&` and `;`.
const MAX_REFERENCE_LEN: usize = 12;

/// Decode one level of character references. Unknown or malformed references
/// are left as written.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        match parse_reference(candidate) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode repeatedly until no reference is left, so `&amp;lt;` ends up as
/// `<`. Every successful decode shortens the text, which bounds the loop.
pub fn decode_entities_fully(input: &str) -> Cow<'_, str> {
    let mut current = decode_entities(input);
    loop {
        let next = decode_entities(&current);
        if next == current {
            return current;
        }
        current = Cow::Owned(next.into_owned());
    }
}

/// `s` starts with `&`. Returns the decoded char and the bytes consumed.
fn parse_reference(s: &str) -> Option<(char, usize)> {
    let end = s
        .char_indices()
        .nth(MAX_REFERENCE_LEN)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let window = &s[..end];
    let semi = window.find(';')?;
    let body = &window[1..semi];
    let ch = if let Some(num) = body.strip_prefix('#') {
        let value = if let Some(hex) = num.strip_prefix(['x', 'X']) {
            if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            u32::from_str_radix(hex, 16).ok()?
        } else {
            if num.is_empty() || !num.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            num.parse::<u32>().ok()?
        };
        match value {
            0 => '\u{fffd}',
            v => char::from_u32(v).unwrap_or('\u{fffd}'),
        }
    } else {
        NAMED
            .iter()
            .find(|(name, _)| *name == body)
            .map(|(_, ch)| *ch)?
    };
    Some((ch, semi + 1))
}

/// Canonical text form: decode fully, then escape `&`, `<` and `>`.
pub(crate) fn canonical_text(raw: &str) -> String {
    let decoded = decode_entities_fully(raw);
    let mut out = String::with_capacity(decoded.len());
    // Writing into a String cannot fail.
    let _ = escape_html_body_text(&mut out, &decoded);
    out
}

/// Canonical attribute value form, suitable for a double-quoted attribute.
pub(crate) fn canonical_attr(raw: &str) -> String {
    let decoded = decode_entities_fully(raw);
    let mut out = String::with_capacity(decoded.len());
    let _ = escape_html(&mut out, &decoded);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_and_numeric() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#65;&#x42;&#X43;"), "ABC");
        assert_eq!(decode_entities("it&apos;s &quot;x&quot;"), "it's \"x\"");
    }

    #[test]
    fn malformed_left_alone() {
        assert_eq!(decode_entities("AT&T"), "AT&T");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
        assert_eq!(decode_entities("&#;"), "&#;");
        assert_eq!(decode_entities("&#xZZ;"), "&#xZZ;");
        assert_eq!(decode_entities("trailing &"), "trailing &");
    }

    #[test]
    fn invalid_code_points_become_replacement() {
        assert_eq!(decode_entities("&#0;"), "\u{fffd}");
        assert_eq!(decode_entities("&#xD800;"), "\u{fffd}");
    }

    #[test]
    fn nested_references_decode_fully() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities_fully("&amp;lt;"), "<");
        assert_eq!(decode_entities_fully("&amp;amp;amp;"), "&");
    }

    #[test]
    fn canonical_forms_are_stable() {
        let once = canonical_text("1 &lt; 2 & 3 > &amp;");
        assert_eq!(once, "1 &lt; 2 &amp; 3 &gt; &amp;");
        assert_eq!(canonical_text(&once), "1 &lt; 2 &amp; 3 &gt; &amp;");
        let attr = canonical_attr("say \"hi\"");
        assert_eq!(canonical_attr(&attr), attr);
    }
}
