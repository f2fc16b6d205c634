//! Error types shared across cellmark crates.

use miette::Diagnostic;
use std::path::PathBuf;

/// Errors raised while loading configuration.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum CellmarkError {
    /// IO error
    #[error("failed to read {}", path.display())]
    #[diagnostic(code(cellmark::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON config did not parse
    #[error(transparent)]
    #[diagnostic(code(cellmark::config::json))]
    Json(#[from] serde_json::Error),

    /// TOML config did not parse
    #[error(transparent)]
    #[diagnostic(code(cellmark::config::toml))]
    Toml(#[from] toml::de::Error),

    /// Extension is neither `.json` nor `.toml`
    #[error("unsupported config format: {}", path.display())]
    #[diagnostic(
        code(cellmark::config::format),
        help("use a .json or .toml file")
    )]
    UnsupportedFormat { path: PathBuf },
}
