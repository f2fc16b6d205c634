//! The extension registry: which engines render formulas and diagrams, which
//! code languages count as diagrams, and which custom inline syntaxes are
//! recognised on top of CommonMark.

use std::fmt;
use std::sync::Arc;

use cellmark_common::RenderConfig;
use pulldown_cmark_escape::escape_html_body_text;
use smol_str::SmolStr;

use crate::engine::{DiagramEngine, EngineError, FormulaEngine};
use crate::math::MathMlEngine;
use crate::normalize::Normalizer;

/// A span claimed by a [`SyntaxExtension`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMatch {
    /// Byte offset one past the end of the span, relative to the whole text.
    pub end: usize,
    /// What the extension wants to render, usually the span minus delimiters.
    pub payload: String,
    /// Block extensions are lifted out of their paragraph.
    pub block: bool,
}

/// A custom syntax recognised before CommonMark parsing.
///
/// The scanner calls [`scan`](SyntaxExtension::scan) at every position where
/// one of the extension's trigger characters appears outside code.
pub trait SyntaxExtension: Send + Sync {
    fn name(&self) -> &str;

    fn triggers(&self) -> &[char];

    /// Try to match a span starting at byte offset `at` of `text`.
    fn scan(&self, text: &str, at: usize) -> Option<ExtensionMatch>;

    /// Markup for a matched span. Defaults to the escaped payload.
    fn render(&self, payload: &str, _block: bool) -> Result<String, EngineError> {
        let mut out = String::with_capacity(payload.len());
        let _ = escape_html_body_text(&mut out, payload);
        Ok(out)
    }
}

/// Which parser features are switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub alerts: bool,
    pub tables: bool,
    pub footnotes: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            alerts: true,
            tables: true,
            footnotes: true,
        }
    }
}

#[derive(Clone)]
pub struct ExtensionRegistry {
    pub(crate) formula: Arc<dyn FormulaEngine + Send + Sync>,
    pub(crate) diagram: Option<Arc<dyn DiagramEngine + Send + Sync>>,
    pub(crate) diagram_languages: Vec<SmolStr>,
    pub(crate) extensions: Vec<Arc<dyn SyntaxExtension>>,
    pub(crate) features: Features,
    pub(crate) normalizer: Normalizer,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("diagram_engine", &self.diagram.is_some())
            .field("diagram_languages", &self.diagram_languages)
            .field(
                "extensions",
                &self.extensions.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("features", &self.features)
            .finish()
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExtensionRegistry {
    pub fn builder() -> ExtensionRegistryBuilder {
        ExtensionRegistryBuilder::new()
    }

    /// A registry configured from the `render` section of the config file.
    pub fn from_config(config: &RenderConfig) -> Self {
        let mut builder = Self::builder()
            .features(Features {
                alerts: config.alerts,
                tables: config.tables,
                footnotes: config.footnotes,
            })
            .normalizer(Normalizer::from_config(config))
            .clear_diagram_languages();
        for lang in &config.diagram_languages {
            builder = builder.diagram_language(lang.as_str());
        }
        builder.build()
    }

    pub fn is_diagram_language(&self, lang: &str) -> bool {
        self.diagram_languages
            .iter()
            .any(|known| known.eq_ignore_ascii_case(lang))
    }

    pub fn extensions(&self) -> &[Arc<dyn SyntaxExtension>] {
        &self.extensions
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }
}

pub struct ExtensionRegistryBuilder {
    formula: Arc<dyn FormulaEngine + Send + Sync>,
    diagram: Option<Arc<dyn DiagramEngine + Send + Sync>>,
    diagram_languages: Vec<SmolStr>,
    extensions: Vec<Arc<dyn SyntaxExtension>>,
    features: Features,
    normalizer: Normalizer,
}

impl Default for ExtensionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistryBuilder {
    pub fn new() -> Self {
        Self {
            formula: Arc::new(MathMlEngine),
            diagram: None,
            diagram_languages: vec![SmolStr::new_static("mermaid")],
            extensions: Vec::new(),
            features: Features::default(),
            normalizer: Normalizer::default(),
        }
    }

    pub fn formula_engine(mut self, engine: impl FormulaEngine + Send + Sync + 'static) -> Self {
        self.formula = Arc::new(engine);
        self
    }

    pub fn diagram_engine(mut self, engine: impl DiagramEngine + Send + Sync + 'static) -> Self {
        self.diagram = Some(Arc::new(engine));
        self
    }

    pub fn diagram_language(mut self, lang: impl Into<SmolStr>) -> Self {
        let lang = lang.into();
        if !self.diagram_languages.contains(&lang) {
            self.diagram_languages.push(lang);
        }
        self
    }

    pub fn clear_diagram_languages(mut self) -> Self {
        self.diagram_languages.clear();
        self
    }

    /// Register a custom syntax. Extensions are tried in registration order,
    /// after the built-in math delimiters.
    pub fn extension(mut self, extension: impl SyntaxExtension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn build(self) -> ExtensionRegistry {
        ExtensionRegistry {
            formula: self.formula,
            diagram: self.diagram,
            diagram_languages: self.diagram_languages,
            extensions: self.extensions,
            features: self.features,
            normalizer: self.normalizer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let from_config = ExtensionRegistry::from_config(&RenderConfig::default());
        let default = ExtensionRegistry::default();
        assert_eq!(from_config.diagram_languages, default.diagram_languages);
        assert_eq!(from_config.features, default.features);
    }

    #[test]
    fn diagram_languages_are_case_insensitive() {
        let registry = ExtensionRegistry::builder()
            .diagram_language("graphviz")
            .diagram_language("graphviz")
            .build();
        assert!(registry.is_diagram_language("Mermaid"));
        assert!(registry.is_diagram_language("graphviz"));
        assert!(!registry.is_diagram_language("rust"));
        assert_eq!(registry.diagram_languages.len(), 2);
    }

    #[test]
    fn config_can_disable_features() {
        let config = RenderConfig {
            alerts: false,
            diagram_languages: vec![],
            ..RenderConfig::default()
        };
        let registry = ExtensionRegistry::from_config(&config);
        assert!(!registry.features().alerts);
        assert!(!registry.is_diagram_language("mermaid"));
    }
}
