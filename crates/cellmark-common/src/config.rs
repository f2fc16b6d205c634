use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::CellmarkError;

/// Top-level configuration. Every section falls back to its defaults, so an
/// empty document (`{}`) is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub sanitizer: SanitizerConfig,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self, CellmarkError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CellmarkError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self, CellmarkError> {
        loader.load().await
    }
}

/// Renderer and extension registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Fenced code info strings that are treated as diagrams.
    pub diagram_languages: Vec<String>,
    /// Recognise `[!TYPE]` alert blocks.
    pub alerts: bool,
    pub tables: bool,
    pub footnotes: bool,
    /// Upper bound on normalizer rounds before giving up on a fixed point.
    pub max_normalize_rounds: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            diagram_languages: vec!["mermaid".to_owned()],
            alerts: true,
            tables: true,
            footnotes: true,
            max_normalize_rounds: 8,
        }
    }
}

/// Additions to the built-in sanitizer allowlists. The denylist (script,
/// style, `on*` attributes) cannot be overridden from here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub extra_tags: Vec<String>,
    pub extra_attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub autosave: bool,
    /// Quiet interval after the last edit before autosave fires.
    pub autosave_interval_ms: u64,
}

impl SessionConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave: true,
            autosave_interval_ms: 1500,
        }
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    fn load(&self) -> impl Future<Output = Result<Config, CellmarkError>> + Send;
}

/// Reads a [`Config`] from a `.json` or `.toml` file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Loader for FileStore {
    async fn load(&self) -> Result<Config, CellmarkError> {
        let read = || {
            std::fs::read_to_string(&self.path).map_err(|source| CellmarkError::Io {
                path: self.path.clone(),
                source,
            })
        };
        let parse = || -> Result<Config, CellmarkError> {
            match self.path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => Config::from_json_str(&read()?),
                Some("toml") => Config::from_toml_str(&read()?),
                _ => Err(CellmarkError::UnsupportedFormat {
                    path: self.path.clone(),
                }),
            }
        };
        let config = parse();
        match &config {
            Ok(_) => tracing::debug!(path = %self.path.display(), "loaded config"),
            Err(error) => tracing::warn!(path = %self.path.display(), %error, "config not loaded"),
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_all_defaults() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.render.diagram_languages, vec!["mermaid"]);
        assert_eq!(
            config.session.autosave_interval(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_json_str(
            r#"{"session": {"autosave_interval_ms": 250}, "render": {"alerts": false}}"#,
        )
        .unwrap();
        assert_eq!(config.session.autosave_interval_ms, 250);
        assert!(config.session.autosave);
        assert!(!config.render.alerts);
        assert!(config.render.tables);
    }

    #[test]
    fn toml_sections() {
        let config = Config::from_toml_str(
            "[render]\ndiagram_languages = [\"mermaid\", \"dot\"]\n\n[sanitizer]\nextra_tags = [\"kbd\"]\n",
        )
        .unwrap();
        assert_eq!(config.render.diagram_languages, vec!["mermaid", "dot"]);
        assert_eq!(config.sanitizer.extra_tags, vec!["kbd"]);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(
            Config::from_json_str("{not json"),
            Err(CellmarkError::Json(_))
        ));
    }

    #[tokio::test]
    async fn file_store_rejects_unknown_extension() {
        let store = FileStore::new("/nonexistent/cellmark.yaml");
        assert!(matches!(
            Config::load(&store).await,
            Err(CellmarkError::UnsupportedFormat { .. })
        ));
    }

    #[tokio::test]
    async fn file_store_reads_json() {
        let path = std::env::temp_dir().join(format!("cellmark-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"session": {"autosave": false}}"#).unwrap();
        let config = Config::load(&FileStore::new(&path)).await.unwrap();
        std::fs::remove_file(&path).ok();
        assert!(!config.session.autosave);
    }

    #[tokio::test]
    async fn file_store_reads_toml() {
        let path = std::env::temp_dir().join(format!("cellmark-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[session]\nautosave_interval_ms = 300\n").unwrap();
        let config = Config::load(&FileStore::new(&path)).await.unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.session.autosave_interval(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn file_store_missing_file_is_io_error() {
        let store = FileStore::new("/nonexistent/cellmark.json");
        assert!(matches!(
            Config::load(&store).await,
            Err(CellmarkError::Io { .. })
        ));
    }
}
