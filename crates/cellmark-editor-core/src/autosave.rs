//! Debounced autosave.
//!
//! Every edit that leaves the session dirty issues a fresh ticket due one
//! quiet interval later and invalidates the previous one. Anything that makes
//! autosave pointless (a save starting, dirtiness clearing, a prompt, a
//! rebind, autosave being turned off) invalidates the current ticket.

use tokio::time::Instant;

use crate::error::SessionError;
use crate::session::EditingSession;
use crate::state::{SaveOutcome, SaveState};
use crate::store::CellStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveTicket {
    pub generation: u64,
    pub due: Instant,
}

impl<S: CellStore> EditingSession<S> {
    pub fn autosave_enabled(&self) -> bool {
        self.inner.borrow().autosave_enabled
    }

    pub fn set_autosave(&self, enabled: bool) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.autosave_enabled == enabled {
                return;
            }
            tracing::debug!(enabled, "autosave toggled");
            inner.autosave_enabled = enabled;
            inner.reschedule(self.autosave_interval);
        }
        self.publish();
    }

    /// The ticket that would currently fire, if any.
    pub fn autosave_ticket(&self) -> Option<AutosaveTicket> {
        self.inner.borrow().autosave
    }

    /// Save if `ticket` is still current and due. Returns `None` when the
    /// ticket was skipped.
    pub async fn fire_autosave(
        &self,
        ticket: AutosaveTicket,
    ) -> Option<Result<SaveOutcome, SessionError>> {
        {
            let inner = self.inner.borrow();
            let live = inner.autosave == Some(ticket)
                && Instant::now() >= ticket.due
                && inner.save_state == SaveState::Dirty
                && inner.autosave_enabled
                && inner.pending_cell.is_none()
                && !inner.write_in_flight;
            if !live {
                tracing::trace!(generation = ticket.generation, "skipping stale autosave ticket");
                return None;
            }
        }
        tracing::debug!(generation = ticket.generation, "autosave firing");
        Some(self.save().await)
    }
}

/// Run autosave for `session` on the tokio timer until the session goes
/// away. Meant to be joined or selected alongside the host's own work on a
/// local executor.
pub async fn drive_autosave<S: CellStore>(session: &EditingSession<S>) {
    let mut tickets = session.autosave_receiver();
    loop {
        let ticket = *tickets.borrow_and_update();
        match ticket {
            Some(ticket) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(ticket.due) => {
                        if let Some(Err(error)) = session.fire_autosave(ticket).await {
                            tracing::debug!(%error, "autosave did not go through");
                        }
                    }
                    changed = tickets.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
            None => {
                if tickets.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CellRef, MemoryCellStore};
    use cellmark_common::SessionConfig;
    use std::time::Duration;

    async fn session(store: &MemoryCellStore) -> EditingSession<&MemoryCellStore> {
        EditingSession::open(store, &SessionConfig::default(), CellRef::new("r", "f"))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn edits_reset_the_ticket() {
        let store = MemoryCellStore::new().with_cell(CellRef::new("r", "f"), "");
        let session = session(&store).await;
        session.set_content("a");
        let first = session.autosave_ticket().unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        session.set_content("ab");
        let second = session.autosave_ticket().unwrap();
        assert!(second.generation > first.generation);
        assert_eq!(second.due - first.due, Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(session.fire_autosave(first).await.is_none());
        assert_eq!(session.fire_autosave(second).await, Some(Ok(SaveOutcome::Saved)));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_is_not_early() {
        let store = MemoryCellStore::new().with_cell(CellRef::new("r", "f"), "");
        let session = session(&store).await;
        session.set_content("a");
        let ticket = session.autosave_ticket().unwrap();
        assert!(session.fire_autosave(ticket).await.is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_and_reverting_cancel_the_ticket() {
        let store = MemoryCellStore::new().with_cell(CellRef::new("r", "f"), "x");
        let session = session(&store).await;
        session.set_content("y");
        assert!(session.autosave_ticket().is_some());
        session.set_autosave(false);
        assert!(session.autosave_ticket().is_none());
        session.set_autosave(true);
        assert!(session.autosave_ticket().is_some());
        session.set_content("x");
        assert_eq!(session.save_state(), SaveState::Clean);
        assert!(session.autosave_ticket().is_none());
    }
}
