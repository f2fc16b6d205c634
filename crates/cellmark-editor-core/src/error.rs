use miette::Diagnostic;
use thiserror::Error;

use crate::store::{CellRef, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SessionError {
    #[error("failed to read cell {cell}")]
    #[diagnostic(code(cellmark::session::read))]
    Read {
        cell: CellRef,
        #[source]
        source: StoreError,
    },

    #[error("failed to write cell {cell}")]
    #[diagnostic(code(cellmark::session::write), help("the content is kept; call save() to retry"))]
    Write {
        cell: CellRef,
        #[source]
        source: StoreError,
    },

    #[error("no cell switch is waiting for a decision")]
    #[diagnostic(code(cellmark::session::no_pending_switch))]
    NoPendingSwitch,

    #[error("the pending cell switch is already being resolved")]
    #[diagnostic(code(cellmark::session::switch_in_progress))]
    SwitchInProgress,
}
