//! cellmark-common: pieces shared by the renderer and the editor core.
//!
//! - [`CellmarkError`]: error type for config loading
//! - [`config`]: serde configuration for rendering, sanitizing and sessions
//! - `telemetry` (feature): tracing subscriber setup

pub mod config;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use config::{Config, FileStore, Loader, RenderConfig, SanitizerConfig, SessionConfig};
pub use error::CellmarkError;
