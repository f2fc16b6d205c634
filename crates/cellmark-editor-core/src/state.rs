use serde::Serialize;

use crate::store::CellRef;

/// Save status of the session's content relative to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SaveState {
    /// Content matches what the store holds.
    #[default]
    Clean,
    /// Content has changes the store doesn't have.
    Dirty,
    /// A write is in flight.
    Saving,
    /// The last write failed. Retry with `save()`.
    Error(String),
}

impl SaveState {
    pub fn is_clean(&self) -> bool {
        matches!(self, SaveState::Clean)
    }

    pub fn is_saving(&self) -> bool {
        matches!(self, SaveState::Saving)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SaveState::Clean => "Saved",
            SaveState::Dirty => "Unsaved changes",
            SaveState::Saving => "Saving...",
            SaveState::Error(_) => "Save failed",
        }
    }
}

/// What subscribers see after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub save_state: SaveState,
    pub content: String,
    pub prompt_pending: bool,
    pub active_cell: Option<CellRef>,
    pub pending_cell: Option<CellRef>,
    pub version: u64,
}

/// Answer to the unsaved-changes prompt raised by a cell switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    /// Drop the in-memory content without writing it.
    Discard,
    SaveThenSwitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Nothing to write.
    AlreadyClean,
    /// Another write is in flight; this call did nothing.
    AlreadySaving,
    /// No cell is bound, so there is nowhere to write.
    Unbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The session now edits the requested cell.
    Switched,
    /// The session has unsaved changes; a prompt is waiting for a decision.
    Prompted,
    /// A prompt was already pending; it now targets the new cell.
    Retargeted,
    /// The requested cell is the active one.
    AlreadyActive,
}
