//! LaTeX math rendering via pulldown-latex → MathML, plus the one-shot repair
//! applied to formulas that fail to parse.

use pulldown_latex::{
    Parser, Storage, config::DisplayMode, config::RenderConfig, mathml::push_mathml,
};

use crate::engine::{EngineError, FormulaEngine, guarded};

/// The default formula engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathMlEngine;

impl FormulaEngine for MathMlEngine {
    fn render_formula(&self, tex: &str, display: bool) -> Result<String, EngineError> {
        render_mathml(tex, display)
    }
}

/// Render LaTeX (without delimiters) to a MathML `<math>` element.
pub fn render_mathml(latex: &str, display: bool) -> Result<String, EngineError> {
    let storage = Storage::new();
    let parser = Parser::new(latex, &storage);
    let config = RenderConfig {
        display_mode: if display {
            DisplayMode::Block
        } else {
            DisplayMode::Inline
        },
        ..Default::default()
    };

    let events: Vec<_> = parser.collect();
    let errors: Vec<String> = events
        .iter()
        .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
        .collect();
    if !errors.is_empty() {
        return Err(EngineError::Formula(errors.join("; ")));
    }

    let mut mathml = String::new();
    push_mathml(&mut mathml, events.into_iter(), config)
        .map_err(|e| EngineError::Formula(e.to_string()))?;
    Ok(mathml)
}

/// Render with one repair attempt: if the formula fails as written, try
/// [`repair_tex`] once. Returns the original error if the repair changes
/// nothing or still fails.
pub fn render_with_repair(
    engine: &dyn FormulaEngine,
    tex: &str,
    display: bool,
) -> Result<String, EngineError> {
    let error = match guarded("formula", || engine.render_formula(tex, display)) {
        Ok(markup) => return Ok(markup),
        Err(error) => error,
    };
    let repaired = repair_tex(tex);
    if repaired == tex {
        return Err(error);
    }
    tracing::debug!(%error, "retrying formula after repair");
    guarded("formula", || engine.render_formula(&repaired, display)).map_err(|_| error)
}

/// Best-effort fixes for common TeX damage: unbalanced `\left`/`\right`,
/// unbalanced braces, and bare single-character sub/superscripts.
pub fn repair_tex(tex: &str) -> String {
    let balanced = balance_delimiters(tex);
    let braced = balance_braces(&balanced);
    group_scripts(&braced)
}

/// Counts `\left` and `\right` commands. `\leftarrow` and friends don't count.
fn count_command(tex: &str, command: &str) -> usize {
    let mut count = 0;
    let mut rest = tex;
    while let Some(pos) = rest.find(command) {
        let after = &rest[pos + command.len()..];
        if !after.starts_with(|c: char| c.is_ascii_alphabetic()) {
            count += 1;
        }
        rest = after;
    }
    count
}

fn balance_delimiters(tex: &str) -> String {
    let lefts = count_command(tex, "\\left");
    let rights = count_command(tex, "\\right");
    let mut out = String::with_capacity(tex.len() + 8);
    for _ in lefts..rights {
        out.push_str("\\left. ");
    }
    out.push_str(tex);
    for _ in rights..lefts {
        out.push_str(" \\right.");
    }
    out
}

fn balance_braces(tex: &str) -> String {
    let mut depth: usize = 0;
    let mut missing_open = 0;
    let mut chars = tex.chars();
    while let Some(c) = chars.next() {
        match c {
            // `\{` and `\}` are literal braces
            '\\' => {
                chars.next();
            }
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    missing_open += 1;
                } else {
                    depth -= 1;
                }
            }
            _ => {}
        }
    }
    if depth == 0 && missing_open == 0 {
        return tex.to_owned();
    }
    let mut out = String::with_capacity(tex.len() + depth + missing_open);
    out.extend(std::iter::repeat_n('{', missing_open));
    out.push_str(tex);
    out.extend(std::iter::repeat_n('}', depth));
    out
}

/// `x_a` → `x_{a}`, `e^2` → `e^{2}`. Scripts already followed by a group,
/// a command or whitespace are left alone.
fn group_scripts(tex: &str) -> String {
    let mut out = String::with_capacity(tex.len() + 8);
    let mut chars = tex.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }
        if c != '_' && c != '^' {
            continue;
        }
        if let Some(&next) = chars.peek() {
            if next.is_alphanumeric() {
                chars.next();
                out.push('{');
                out.push(next);
                out.push('}');
            }
        }
    }
    out
}
