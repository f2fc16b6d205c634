//! The editing session: one document bound to one cell of the external store.
//!
//! All state lives behind a `RefCell` and no borrow is held across an
//! `.await`, so every transition is atomic with respect to the executor.
//! Methods take `&self`: a host on a single-threaded executor can have a
//! save, a cell switch and the autosave driver pending at the same time.

use std::cell::RefCell;
use std::time::Duration;

use cellmark_common::SessionConfig;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use crate::autosave::AutosaveTicket;
use crate::error::SessionError;
use crate::state::{SaveOutcome, SaveState, SessionSnapshot, SwitchDecision, SwitchOutcome};
use crate::store::{CellRef, CellStore};

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) content: String,
    pub(crate) saved_content: String,
    pub(crate) save_state: SaveState,
    pub(crate) active_cell: Option<CellRef>,
    /// Target of the outstanding switch prompt.
    pub(crate) pending_cell: Option<CellRef>,
    pub(crate) autosave_enabled: bool,
    pub(crate) version: u64,
    /// Bumped on every rebind, so work started against an old binding can
    /// tell it is stale.
    binding: u64,
    /// Checked and set synchronously before a write starts.
    pub(crate) write_in_flight: bool,
    resolving: bool,
    generation: u64,
    pub(crate) autosave: Option<AutosaveTicket>,
}

impl Inner {
    fn new(content: String, active_cell: Option<CellRef>, autosave_enabled: bool) -> Self {
        Self {
            saved_content: content.clone(),
            content,
            save_state: SaveState::Clean,
            active_cell,
            pending_cell: None,
            autosave_enabled,
            version: 0,
            binding: 0,
            write_in_flight: false,
            resolving: false,
            generation: 0,
            autosave: None,
        }
    }

    /// Whether switching away would lose edits. A failed save still counts
    /// if its content never reached the store.
    fn has_unsaved_changes(&self) -> bool {
        match self.save_state {
            SaveState::Clean => false,
            SaveState::Dirty => true,
            SaveState::Saving | SaveState::Error(_) => self.content != self.saved_content,
        }
    }

    /// Clean or dirty, from the content alone.
    fn settle(&mut self) {
        let next = if self.content == self.saved_content {
            SaveState::Clean
        } else {
            SaveState::Dirty
        };
        if self.save_state != next {
            tracing::debug!(from = ?self.save_state, to = ?next, "save state changed");
            self.save_state = next;
        }
    }

    pub(crate) fn cancel_autosave(&mut self) {
        self.generation += 1;
        self.autosave = None;
    }

    /// Invalidate the current ticket and issue a new one if autosave can
    /// fire at all.
    pub(crate) fn reschedule(&mut self, interval: Duration) {
        self.cancel_autosave();
        if self.autosave_enabled
            && self.save_state == SaveState::Dirty
            && self.pending_cell.is_none()
            && !self.write_in_flight
        {
            self.autosave = Some(AutosaveTicket {
                generation: self.generation,
                due: Instant::now() + interval,
            });
        }
    }

    fn rebind(&mut self, cell: CellRef, content: String) {
        tracing::debug!(%cell, "rebinding session");
        self.binding += 1;
        self.saved_content = content.clone();
        self.content = content;
        self.save_state = SaveState::Clean;
        self.active_cell = Some(cell);
        self.pending_cell = None;
        self.version = 0;
        self.cancel_autosave();
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            save_state: self.save_state.clone(),
            content: self.content.clone(),
            prompt_pending: self.pending_cell.is_some(),
            active_cell: self.active_cell.clone(),
            pending_cell: self.pending_cell.clone(),
            version: self.version,
        }
    }
}

/// Clears the resolving flag even if the resolving future is dropped.
struct Resolving<'a>(&'a RefCell<Inner>);

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().resolving = false;
    }
}

enum SwitchStep {
    Done(SwitchOutcome),
    Load { binding: u64, version: u64 },
}

pub struct EditingSession<S> {
    store: S,
    pub(crate) inner: RefCell<Inner>,
    changes: watch::Sender<SessionSnapshot>,
    tickets: watch::Sender<Option<AutosaveTicket>>,
    write_done: Notify,
    pub(crate) autosave_interval: Duration,
}

impl<S: CellStore> EditingSession<S> {
    /// An unbound session with empty content.
    pub fn new(store: S, config: &SessionConfig) -> Self {
        Self::with_content(store, config, String::new())
    }

    /// An unbound session holding startup content. It starts clean and can
    /// switch to a cell without a prompt.
    pub fn with_content(store: S, config: &SessionConfig, content: impl Into<String>) -> Self {
        Self::from_inner(store, config, Inner::new(content.into(), None, config.autosave))
    }

    /// A session bound to `cell`, starting from its stored content.
    #[tracing::instrument(skip(store, config))]
    pub async fn open(store: S, config: &SessionConfig, cell: CellRef) -> Result<Self, SessionError> {
        let content = store
            .read_cell(&cell)
            .await
            .map_err(|source| SessionError::Read {
                cell: cell.clone(),
                source,
            })?;
        Ok(Self::from_inner(
            store,
            config,
            Inner::new(content, Some(cell), config.autosave),
        ))
    }

    fn from_inner(store: S, config: &SessionConfig, inner: Inner) -> Self {
        let (changes, _) = watch::channel(inner.snapshot());
        let (tickets, _) = watch::channel(None);
        Self {
            store,
            inner: RefCell::new(inner),
            changes,
            tickets,
            write_done: Notify::new(),
            autosave_interval: config.autosave_interval(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn content(&self) -> String {
        self.inner.borrow().content.clone()
    }

    pub fn saved_content(&self) -> String {
        self.inner.borrow().saved_content.clone()
    }

    pub fn save_state(&self) -> SaveState {
        self.inner.borrow().save_state.clone()
    }

    pub fn active_cell(&self) -> Option<CellRef> {
        self.inner.borrow().active_cell.clone()
    }

    pub fn pending_cell(&self) -> Option<CellRef> {
        self.inner.borrow().pending_cell.clone()
    }

    pub fn prompt_pending(&self) -> bool {
        self.inner.borrow().pending_cell.is_some()
    }

    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.borrow().snapshot()
    }

    /// Receives a new snapshot after every observable change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }

    pub(crate) fn autosave_receiver(&self) -> watch::Receiver<Option<AutosaveTicket>> {
        self.tickets.subscribe()
    }

    pub(crate) fn publish(&self) {
        let (snapshot, ticket) = {
            let inner = self.inner.borrow();
            (inner.snapshot(), inner.autosave)
        };
        self.changes.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        self.tickets.send_if_modified(|current| {
            if *current == ticket {
                false
            } else {
                *current = ticket;
                true
            }
        });
    }

    /// Replace the in-memory content. Never touches the store.
    #[tracing::instrument(level = "trace", skip_all, fields(len = text.as_ref().len()))]
    pub fn set_content(&self, text: impl AsRef<str>) {
        {
            let mut inner = self.inner.borrow_mut();
            let text = text.as_ref();
            if inner.content == text {
                return;
            }
            inner.content = text.to_owned();
            inner.version += 1;
            // A write in flight settles the state when it resolves.
            if !inner.save_state.is_saving() {
                inner.settle();
            }
            inner.reschedule(self.autosave_interval);
        }
        self.publish();
    }

    /// Write the current content to the active cell. At most one write is in
    /// flight: a call made while one is pending returns
    /// [`SaveOutcome::AlreadySaving`] without touching the store.
    #[tracing::instrument(skip(self))]
    pub async fn save(&self) -> Result<SaveOutcome, SessionError> {
        let (cell, text, binding) = {
            let mut inner = self.inner.borrow_mut();
            if inner.write_in_flight {
                tracing::debug!("save already in flight");
                return Ok(SaveOutcome::AlreadySaving);
            }
            let Some(cell) = inner.active_cell.clone() else {
                tracing::debug!("no cell bound, nothing to save to");
                return Ok(SaveOutcome::Unbound);
            };
            if inner.save_state.is_clean() {
                return Ok(SaveOutcome::AlreadyClean);
            }
            inner.write_in_flight = true;
            inner.save_state = SaveState::Saving;
            inner.cancel_autosave();
            (cell, inner.content.clone(), inner.binding)
        };
        self.publish();

        let result = self.store.write_cell(&cell, &text).await;

        let outcome = {
            let mut inner = self.inner.borrow_mut();
            inner.write_in_flight = false;
            if inner.binding != binding {
                // Rebinding waits for writes, so this only happens if the
                // host bypassed the session. Leave the new binding alone.
                tracing::debug!(%cell, "binding changed during save");
                result
                    .map(|()| SaveOutcome::Saved)
                    .map_err(|source| SessionError::Write { cell, source })
            } else {
                match result {
                    Ok(()) => {
                        inner.saved_content = text;
                        inner.settle();
                        inner.reschedule(self.autosave_interval);
                        tracing::debug!(state = ?inner.save_state, "save finished");
                        Ok(SaveOutcome::Saved)
                    }
                    Err(source) => {
                        tracing::warn!(%cell, error = %source, "save failed");
                        inner.save_state = SaveState::Error(source.to_string());
                        inner.cancel_autosave();
                        Err(SessionError::Write { cell, source })
                    }
                }
            }
        };
        self.write_done.notify_waiters();
        self.publish();
        outcome
    }

    async fn wait_for_write(&self) {
        loop {
            // Registered before the check so a wakeup in between isn't lost.
            let done = self.write_done.notified();
            if !self.inner.borrow().write_in_flight {
                return;
            }
            done.await;
        }
    }

    async fn read(&self, cell: &CellRef) -> Result<String, SessionError> {
        self.store.read_cell(cell).await.map_err(|source| {
            tracing::warn!(%cell, error = %source, "failed to read cell");
            SessionError::Read {
                cell: cell.clone(),
                source,
            }
        })
    }

    /// Move the session to another cell. With unsaved changes this raises a
    /// prompt instead and returns [`SwitchOutcome::Prompted`]; answer it with
    /// [`resolve_switch_prompt`](Self::resolve_switch_prompt). A switch asked
    /// for during a save waits for the save first.
    #[tracing::instrument(skip(self))]
    pub async fn request_cell_switch(&self, cell: CellRef) -> Result<SwitchOutcome, SessionError> {
        loop {
            self.wait_for_write().await;
            let step = {
                let mut inner = self.inner.borrow_mut();
                if inner.write_in_flight {
                    continue;
                }
                if inner.active_cell.as_ref() == Some(&cell) {
                    if inner.pending_cell.take().is_some() {
                        tracing::debug!("switch back to the active cell, dropping prompt");
                        inner.reschedule(self.autosave_interval);
                    }
                    SwitchStep::Done(SwitchOutcome::AlreadyActive)
                } else if inner.pending_cell.is_some() {
                    inner.pending_cell = Some(cell.clone());
                    SwitchStep::Done(SwitchOutcome::Retargeted)
                } else if inner.active_cell.is_some() && inner.has_unsaved_changes() {
                    tracing::debug!("unsaved changes, prompting before switch");
                    inner.pending_cell = Some(cell.clone());
                    inner.cancel_autosave();
                    SwitchStep::Done(SwitchOutcome::Prompted)
                } else {
                    SwitchStep::Load {
                        binding: inner.binding,
                        version: inner.version,
                    }
                }
            };
            let (binding, version) = match step {
                SwitchStep::Done(outcome) => {
                    self.publish();
                    return Ok(outcome);
                }
                SwitchStep::Load { binding, version } => (binding, version),
            };

            let content = self.read(&cell).await?;
            {
                let mut inner = self.inner.borrow_mut();
                if inner.binding != binding
                    || inner.version != version
                    || inner.write_in_flight
                    || inner.pending_cell.is_some()
                {
                    tracing::debug!("session changed while reading, re-evaluating switch");
                    continue;
                }
                inner.rebind(cell, content);
            }
            self.publish();
            return Ok(SwitchOutcome::Switched);
        }
    }

    /// Answer the pending switch prompt. If the read of the new cell fails
    /// the prompt stays pending so the host can retry. If the write of a
    /// save-then-switch fails the switch is abandoned and the session is left
    /// in [`SaveState::Error`].
    #[tracing::instrument(skip(self))]
    pub async fn resolve_switch_prompt(
        &self,
        decision: SwitchDecision,
    ) -> Result<SwitchOutcome, SessionError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.pending_cell.is_none() {
                return Err(SessionError::NoPendingSwitch);
            }
            if inner.resolving {
                return Err(SessionError::SwitchInProgress);
            }
            inner.resolving = true;
        }
        let _resolving = Resolving(&self.inner);

        loop {
            self.wait_for_write().await;
            if decision == SwitchDecision::SaveThenSwitch {
                let unsaved = self.inner.borrow().has_unsaved_changes();
                if unsaved {
                    match self.save().await {
                        Ok(SaveOutcome::Unbound) => {}
                        Ok(_) => continue,
                        Err(error) => {
                            tracing::debug!("save failed, abandoning switch");
                            self.inner.borrow_mut().pending_cell = None;
                            self.publish();
                            return Err(error);
                        }
                    }
                }
            }

            let (target, binding, version) = {
                let inner = self.inner.borrow();
                let Some(target) = inner.pending_cell.clone() else {
                    return Err(SessionError::NoPendingSwitch);
                };
                (target, inner.binding, inner.version)
            };

            let content = self.read(&target).await?;
            {
                let mut inner = self.inner.borrow_mut();
                let stale = inner.binding != binding
                    || inner.write_in_flight
                    || inner.pending_cell.as_ref() != Some(&target)
                    || (decision == SwitchDecision::SaveThenSwitch && inner.version != version);
                if stale {
                    tracing::debug!("session changed while reading, resolving again");
                    continue;
                }
                inner.rebind(target, content);
            }
            self.publish();
            return Ok(SwitchOutcome::Switched);
        }
    }
}
