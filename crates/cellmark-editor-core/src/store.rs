//! The external cell store the session reads from and writes to.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// One field of one record: the unit of storage an editing session binds to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub record_id: SmolStr,
    pub field_id: SmolStr,
}

impl CellRef {
    pub fn new(record_id: impl Into<SmolStr>, field_id: impl Into<SmolStr>) -> Self {
        Self {
            record_id: record_id.into(),
            field_id: field_id.into(),
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.record_id, self.field_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum StoreError {
    #[error("cell {0} does not exist")]
    #[diagnostic(code(cellmark::store::not_found))]
    NotFound(CellRef),

    /// Transient: the store could not be reached.
    #[error("store unavailable: {0}")]
    #[diagnostic(code(cellmark::store::unavailable), help("retry the save"))]
    Unavailable(String),

    /// Permanent: the store refused the operation.
    #[error("store rejected the operation: {0}")]
    #[diagnostic(code(cellmark::store::rejected))]
    Rejected(String),
}

/// Reads and writes cell contents. Futures need not be `Send`; the session
/// drives them on a single-threaded executor.
pub trait CellStore {
    fn read_cell(&self, cell: &CellRef) -> impl Future<Output = Result<String, StoreError>>;

    fn write_cell(
        &self,
        cell: &CellRef,
        content: &str,
    ) -> impl Future<Output = Result<(), StoreError>>;
}

impl<S: CellStore + ?Sized> CellStore for &S {
    fn read_cell(&self, cell: &CellRef) -> impl Future<Output = Result<String, StoreError>> {
        (**self).read_cell(cell)
    }

    fn write_cell(
        &self,
        cell: &CellRef,
        content: &str,
    ) -> impl Future<Output = Result<(), StoreError>> {
        (**self).write_cell(cell, content)
    }
}

impl<S: CellStore + ?Sized> CellStore for Rc<S> {
    fn read_cell(&self, cell: &CellRef) -> impl Future<Output = Result<String, StoreError>> {
        (**self).read_cell(cell)
    }

    fn write_cell(
        &self,
        cell: &CellRef,
        content: &str,
    ) -> impl Future<Output = Result<(), StoreError>> {
        (**self).write_cell(cell, content)
    }
}

/// An in-memory [`CellStore`] that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryCellStore {
    cells: RefCell<HashMap<CellRef, String>>,
    reads: Cell<usize>,
    writes: Cell<usize>,
    fail_read: RefCell<Option<StoreError>>,
    fail_write: RefCell<Option<StoreError>>,
}

impl MemoryCellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cell(self, cell: CellRef, content: impl Into<String>) -> Self {
        self.insert(cell, content);
        self
    }

    pub fn insert(&self, cell: CellRef, content: impl Into<String>) {
        self.cells.borrow_mut().insert(cell, content.into());
    }

    pub fn get(&self, cell: &CellRef) -> Option<String> {
        self.cells.borrow().get(cell).cloned()
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// The next read fails with `error`.
    pub fn fail_next_read(&self, error: StoreError) {
        *self.fail_read.borrow_mut() = Some(error);
    }

    /// The next write fails with `error`.
    pub fn fail_next_write(&self, error: StoreError) {
        *self.fail_write.borrow_mut() = Some(error);
    }
}

impl CellStore for MemoryCellStore {
    async fn read_cell(&self, cell: &CellRef) -> Result<String, StoreError> {
        self.reads.set(self.reads.get() + 1);
        if let Some(error) = self.fail_read.borrow_mut().take() {
            return Err(error);
        }
        self.get(cell).ok_or_else(|| StoreError::NotFound(cell.clone()))
    }

    async fn write_cell(&self, cell: &CellRef, content: &str) -> Result<(), StoreError> {
        self.writes.set(self.writes.get() + 1);
        if let Some(error) = self.fail_write.borrow_mut().take() {
            return Err(error);
        }
        self.insert(cell.clone(), content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip_and_counts() {
        let cell = CellRef::new("rec1", "notes");
        let store = MemoryCellStore::new().with_cell(cell.clone(), "hello");
        assert_eq!(store.read_cell(&cell).await.unwrap(), "hello");
        store.write_cell(&cell, "bye").await.unwrap();
        assert_eq!(store.get(&cell).as_deref(), Some("bye"));
        assert_eq!((store.read_count(), store.write_count()), (1, 1));
    }

    #[tokio::test]
    async fn missing_cells_and_injected_failures() {
        let cell = CellRef::new("rec1", "notes");
        let store = MemoryCellStore::new();
        assert_eq!(
            store.read_cell(&cell).await,
            Err(StoreError::NotFound(cell.clone()))
        );

        store.fail_next_write(StoreError::Unavailable("offline".into()));
        assert!(store.write_cell(&cell, "x").await.is_err());
        assert_eq!(store.get(&cell), None);
        assert!((&store).write_cell(&cell, "x").await.is_ok());
        assert_eq!(store.get(&cell).as_deref(), Some("x"));
    }

    #[test]
    fn cell_ref_display() {
        assert_eq!(CellRef::new("r", "f").to_string(), "r/f");
    }
}
