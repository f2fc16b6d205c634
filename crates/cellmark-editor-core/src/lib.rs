//! cellmark-editor-core: the editing session for one cell, without any UI.
//!
//! This crate provides:
//! - `CellStore` trait for the external storage the session reads and writes
//! - `MemoryCellStore` - in-memory implementation for hosts and tests
//! - `EditingSession<S>` - save state machine with cell-switch prompts
//! - Debounced autosave tickets and a ready-made tokio driver

pub mod autosave;
pub mod error;
pub mod session;
pub mod state;
pub mod store;

pub use autosave::{AutosaveTicket, drive_autosave};
pub use error::SessionError;
pub use session::EditingSession;
pub use smol_str::SmolStr;
pub use state::{SaveOutcome, SaveState, SessionSnapshot, SwitchDecision, SwitchOutcome};
pub use store::{CellRef, CellStore, MemoryCellStore, StoreError};
