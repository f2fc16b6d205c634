use cellmark_common::Config;
use cellmark_renderer::{
    AlertKind, EngineError, ExtensionRegistry, Node, SanitizerPolicy, normalize, process,
    render_html, sanitize_html,
};
use proptest::prelude::*;

fn markdown_fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "\n", "\n\n", "\r\n", "\r", "  ", "- ", "* ", "• ", "◦", "1.", "2)", "10) ", "3.14",
        "# ", "## ", "---", "```", "~~~", "```mermaid\n", "> ", "[!NOTE] ", "[!tip]", "| a |",
        "|---|", "$", "$$", "\\(", "\\)", "&amp;", "&lt;", "&#35;", "&", "word", "x", "<b>",
        "    ",
    ])
}

fn html_fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "<b>", "</b>", "<script>", "</script>", "<style>", "<svg viewBox='0 0 1 1'>", "</svg>",
        "<a href=\"javascript:x\">", "<a href=/ok title=t>", "</a>", "<img src=x onerror=y>",
        "<blink>", "</blink>", "<!--", "-->", "<!x>", "&amp;", "&lt", "&#60;", ";", "<", ">",
        "\"", "'", "=", "/", "text", " ", "<p", "<B CLASS=c>",
    ])
}

proptest! {
    #[test]
    fn normalize_is_idempotent(parts in prop::collection::vec(markdown_fragment(), 0..24)) {
        let text = parts.concat();
        let once = normalize(&text);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn sanitize_html_is_idempotent(parts in prop::collection::vec(html_fragment(), 0..24)) {
        let markup = parts.concat();
        let once = sanitize_html(&markup);
        prop_assert_eq!(sanitize_html(&once), once.clone());
        prop_assert!(!once.to_ascii_lowercase().contains("<script"));
        prop_assert!(!once.to_ascii_lowercase().contains("onerror"));
    }
}

#[test]
fn raw_script_never_reaches_the_output() {
    let html = render_html(
        "<script>alert(1)</script>\n\nhi <img src=x onclick=\"steal()\">",
        &ExtensionRegistry::default(),
        &SanitizerPolicy::default(),
    );
    assert!(!html.contains("script"));
    assert!(!html.contains("onclick"));
    assert!(html.contains("<img src=\"x\">"));
}

#[test]
fn pasted_list_becomes_one_ordered_list() {
    let tree = process(
        "Steps:\n5)mix\n\n6)bake",
        &ExtensionRegistry::default(),
        &SanitizerPolicy::default(),
    );
    let lists: Vec<&Node> = tree
        .children
        .iter()
        .filter(|node| matches!(node, Node::List { .. }))
        .collect();
    assert_eq!(lists.len(), 1);
    let Node::List {
        ordered,
        start,
        items,
    } = lists[0]
    else {
        unreachable!();
    };
    assert!(*ordered);
    assert_eq!(*start, Some(5));
    assert_eq!(items.len(), 2);
}

#[test]
fn inline_warning_alert() {
    let tree = process(
        "\n[!WARNING] do X\n",
        &ExtensionRegistry::default(),
        &SanitizerPolicy::default(),
    );
    let [Node::Alert { kind, children, .. }] = tree.children.as_slice() else {
        panic!("expected a single alert: {tree:?}");
    };
    assert_eq!(*kind, AlertKind::Warning);
    assert_eq!(cellmark_renderer::types::plain_text(children), "do X");
}

#[test]
fn diagram_svg_is_sanitized_and_pinned() {
    let registry = ExtensionRegistry::builder()
        .diagram_engine(|_: &str| -> Result<String, EngineError> {
            Ok(r#"<svg style="width: 4000px" onload="x()"><script>bad()</script><rect width="1"/></svg>"#.into())
        })
        .build();
    let html = render_html("```mermaid\ngraph TD\n```", &registry, &SanitizerPolicy::default());
    assert_eq!(
        html,
        "<div class=\"diagram diagram-mermaid\"><svg style=\"max-width: 100%; height: auto; \
         overflow: hidden\"><rect width=\"1\"/></svg></div>\n"
    );
}

#[test]
fn math_renders_to_mathml() {
    let html = render_html(
        "$$x^2$$",
        &ExtensionRegistry::default(),
        &SanitizerPolicy::default(),
    );
    assert!(html.starts_with("<div class=\"math math-display\"><math"));
    assert!(html.contains("<msup>"));
}

#[test]
fn registry_and_policy_from_config() {
    let config = Config::from_json_str(
        r#"{
            "render": { "diagram_languages": ["dot"], "alerts": false },
            "sanitizer": { "extra_tags": ["marquee"] }
        }"#,
    )
    .unwrap();
    let registry = ExtensionRegistry::from_config(&config.render);
    let policy = SanitizerPolicy::from_config(&config.sanitizer);

    assert!(registry.is_diagram_language("dot"));
    assert!(!registry.is_diagram_language("mermaid"));

    let tree = process("[!NOTE] plain\n\n<marquee>hi</marquee>", &registry, &policy);
    assert!(matches!(tree.children[0], Node::Paragraph { .. }));
    assert!(
        cellmark_renderer::to_html(&tree).contains("<marquee>hi</marquee>"),
        "{tree:?}"
    );
}

#[test]
fn table_with_bare_delimiter_row_survives_normalization() {
    let tree = process(
        "a | b\n- | -\n1 | 2",
        &ExtensionRegistry::default(),
        &SanitizerPolicy::default(),
    );
    let [Node::Table { header, rows, .. }] = tree.children.as_slice() else {
        panic!("expected a single table: {tree:?}");
    };
    assert_eq!(header.len(), 2);
    assert_eq!(rows.len(), 1);
}

#[test]
fn setext_heading_survives_normalization() {
    let tree = process(
        "Title\n---\nbody",
        &ExtensionRegistry::default(),
        &SanitizerPolicy::default(),
    );
    let [Node::Heading { level, children, .. }, Node::Paragraph { .. }] =
        tree.children.as_slice()
    else {
        panic!("expected a heading and a paragraph: {tree:?}");
    };
    assert_eq!(*level, 2);
    assert_eq!(cellmark_renderer::types::plain_text(children), "Title");
}

#[test]
fn indented_code_is_left_verbatim() {
    let tree = process(
        "para\n\n    1)code\n    • dot",
        &ExtensionRegistry::default(),
        &SanitizerPolicy::default(),
    );
    let [Node::Paragraph { .. }, Node::CodeBlock { lang, code }] = tree.children.as_slice() else {
        panic!("expected a paragraph and a code block: {tree:?}");
    };
    assert_eq!(*lang, None);
    assert_eq!(code, "1)code\n• dot\n");
}
