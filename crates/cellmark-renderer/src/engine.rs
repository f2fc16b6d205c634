//! Pluggable formula and diagram engines.
//!
//! Engines turn source text into markup. They may fail, and a panicking
//! engine is treated the same as one that returned an error: the renderer
//! never lets either escape.

use std::panic::{AssertUnwindSafe, catch_unwind};

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EngineError {
    #[error("formula did not parse: {0}")]
    #[diagnostic(code(cellmark::engine::formula))]
    Formula(String),

    #[error("diagram did not render: {0}")]
    #[diagnostic(code(cellmark::engine::diagram))]
    Diagram(String),

    #[error("{engine} panicked while rendering")]
    #[diagnostic(
        code(cellmark::engine::panicked),
        help("the engine is skipped for this node and the source is shown instead")
    )]
    Panicked { engine: &'static str },
}

/// Renders TeX to markup.
pub trait FormulaEngine {
    fn render_formula(&self, tex: &str, display: bool) -> Result<String, EngineError>;
}

/// Renders diagram source (e.g. a mermaid block) to markup, usually SVG.
pub trait DiagramEngine {
    fn render_diagram(&self, source: &str) -> Result<String, EngineError>;
}

impl<F> FormulaEngine for F
where
    F: Fn(&str, bool) -> Result<String, EngineError>,
{
    fn render_formula(&self, tex: &str, display: bool) -> Result<String, EngineError> {
        self(tex, display)
    }
}

impl<F> DiagramEngine for F
where
    F: Fn(&str) -> Result<String, EngineError>,
{
    fn render_diagram(&self, source: &str) -> Result<String, EngineError> {
        self(source)
    }
}

/// Run an engine call, turning a panic into [`EngineError::Panicked`].
pub(crate) fn guarded<T>(
    engine: &'static str,
    call: impl FnOnce() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|_| {
        tracing::warn!(engine, "engine panicked");
        Err(EngineError::Panicked { engine })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_engines() {
        let upper = |source: &str| Ok::<_, EngineError>(source.to_uppercase());
        assert_eq!(upper.render_diagram("graph").unwrap(), "GRAPH");
    }

    #[test]
    fn panics_become_errors() {
        let result: Result<String, _> = guarded("test", || panic!("boom"));
        assert_eq!(result, Err(EngineError::Panicked { engine: "test" }));
    }
}
